use serde_json::json;

use crate::admissions::{self, AdmissionForm};
use crate::error::ServiceResult;
use crate::ipc::helpers::{actor, parse_params, required_str, to_value, with_store, Ctx, Handler};
use crate::ipc::types::{AppState, Request};

// Public form submission; no actor.
fn handle_apply(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let form: AdmissionForm = parse_params(&req.params)?;
    let admission = admissions::apply(ctx.store, form)?;
    Ok(json!({
        "message": "Application submitted successfully",
        "admission": admission,
    }))
}

fn handle_pending(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let pending = admissions::list_pending(ctx.store, actor)?;
    Ok(json!({ "admissions": pending }))
}

fn handle_approve(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let admission_id = required_str(&req.params, &["admissionId", "admission_id", "id"])?;
    let student = admissions::approve(ctx.store, actor, admission_id)?;
    Ok(json!({
        "message": "Admission approved and student added",
        "student": to_value(&student)?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: Handler = match req.method.as_str() {
        "admissions.apply" => handle_apply,
        "admissions.pending" => handle_pending,
        "admissions.approve" => handle_approve,
        _ => return None,
    };
    Some(with_store(state, req, handler))
}
