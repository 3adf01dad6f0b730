use serde_json::json;

use crate::error::ServiceResult;
use crate::ipc::helpers::{actor, opt_str, required_str, to_value, with_store, Ctx, Handler};
use crate::ipc::types::{AppState, Request};
use crate::notices;

fn handle_announcement_add(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let p = &req.params;
    let a = notices::add_announcement(
        ctx.store,
        actor,
        opt_str(p, &["title"]).unwrap_or_default(),
        opt_str(p, &["message"]).unwrap_or_default(),
    )?;
    to_value(&a)
}

fn handle_announcement_list(ctx: &Ctx<'_>, _req: &Request) -> ServiceResult<serde_json::Value> {
    let list = notices::list_announcements(ctx.store)?;
    Ok(json!({ "announcements": list }))
}

fn handle_notification_add(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let p = &req.params;
    let n = notices::add_notification(
        ctx.store,
        actor,
        opt_str(p, &["title"]).unwrap_or_default(),
        opt_str(p, &["message"]).unwrap_or_default(),
        opt_str(p, &["userId", "user_id"]),
    )?;
    to_value(&n)
}

fn handle_notification_for_user(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let user_id = required_str(&req.params, &["userId", "user_id"])?;
    let list = notices::notifications_for_user(ctx.store, actor, user_id)?;
    Ok(json!({ "notifications": list }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: Handler = match req.method.as_str() {
        "announcements.add" => handle_announcement_add,
        "announcements.list" => handle_announcement_list,
        "notifications.add" => handle_notification_add,
        "notifications.forUser" => handle_notification_for_user,
        _ => return None,
    };
    Some(with_store(state, req, handler))
}
