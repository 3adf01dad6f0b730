use serde::de::DeserializeOwned;

use crate::clock::Clock;
use crate::error::{ServiceError, ServiceResult};
use crate::ipc::error::{err, ok, service_err};
use crate::ipc::types::{AppState, Request};
use crate::model::Actor;
use crate::store::RecordStore;

/// What a store-backed handler gets to work with.
pub struct Ctx<'a> {
    pub store: &'a dyn RecordStore,
    pub clock: &'a dyn Clock,
}

pub type Handler = fn(&Ctx<'_>, &Request) -> ServiceResult<serde_json::Value>;

/// Runs `handler` against the open workspace and wraps its outcome in a
/// response envelope.
pub fn with_store(state: &AppState, req: &Request, handler: Handler) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let ctx = Ctx {
        store,
        clock: state.clock.as_ref(),
    };
    match handler(&ctx, req) {
        Ok(result) => ok(&req.id, result),
        Err(e) => {
            tracing::debug!(method = %req.method, code = e.kind.code(), error = %e, "request failed");
            service_err(&req.id, &e)
        }
    }
}

pub fn actor(req: &Request) -> ServiceResult<&Actor> {
    req.actor
        .as_ref()
        .ok_or_else(|| ServiceError::forbidden("request carries no actor"))
}

/// First string value found under any of `keys`. Callers pass both the
/// camelCase and snake_case spelling.
pub fn opt_str<'a>(params: &'a serde_json::Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| params.get(*k).and_then(|v| v.as_str()))
}

pub fn required_str<'a>(params: &'a serde_json::Value, keys: &[&str]) -> ServiceResult<&'a str> {
    opt_str(params, keys)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ServiceError::invalid_request(format!("missing params.{}", keys[0])))
}

pub fn required_f64(params: &serde_json::Value, keys: &[&str]) -> ServiceResult<f64> {
    keys.iter()
        .find_map(|k| params.get(*k).and_then(|v| v.as_f64()))
        .ok_or_else(|| ServiceError::invalid_request(format!("missing params.{}", keys[0])))
}

pub fn parse_params<T: DeserializeOwned>(params: &serde_json::Value) -> ServiceResult<T> {
    serde_json::from_value(params.clone())
        .map_err(|e| ServiceError::invalid_request(format!("bad params: {e}")))
}

pub fn to_value<T: serde::Serialize>(value: &T) -> ServiceResult<serde_json::Value> {
    serde_json::to_value(value).map_err(ServiceError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_tried_in_order() {
        let p = json!({ "student_id": "s1", "studentId": "s2" });
        assert_eq!(opt_str(&p, &["studentId", "student_id"]), Some("s2"));
        assert_eq!(opt_str(&p, &["exam"]), None);
        let e = required_str(&json!({ "exam": "  " }), &["exam"]).unwrap_err();
        assert_eq!(e.message, "missing params.exam");
    }
}
