use serde_json::json;

use crate::error::ServiceResult;
use crate::guard;
use crate::ipc::helpers::{actor, opt_str, required_str, to_value, with_store, Ctx, Handler};
use crate::ipc::types::{AppState, Request};
use crate::users;

fn handle_register(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let p = &req.params;
    let user = users::register_user(
        ctx.store,
        actor,
        opt_str(p, &["name"]).unwrap_or_default(),
        opt_str(p, &["email"]).unwrap_or_default(),
        opt_str(p, &["role"]).unwrap_or_default(),
    )?;
    to_value(&user)
}

fn handle_list(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let list = users::list_users(ctx.store, actor, opt_str(&req.params, &["role"]))?;
    Ok(json!({ "users": list }))
}

fn handle_public_teachers(ctx: &Ctx<'_>, _req: &Request) -> ServiceResult<serde_json::Value> {
    let teachers = users::public_teachers(ctx.store)?;
    Ok(json!({ "teachers": teachers }))
}

fn handle_update_photo(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let user_id = required_str(&req.params, &["userId", "user_id", "id"])?;
    let photo = required_str(&req.params, &["photo"])?;
    let user = users::set_photo(ctx.store, actor, user_id, photo)?;
    Ok(json!({ "message": "Photo updated successfully", "photo": user.photo }))
}

fn handle_delete_teacher(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let teacher_id = required_str(&req.params, &["teacherId", "teacher_id", "id"])?;
    guard::delete_teacher(ctx.store, actor, teacher_id)?;
    Ok(json!({ "message": "Teacher deleted successfully" }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: Handler = match req.method.as_str() {
        "users.register" => handle_register,
        "users.list" => handle_list,
        "users.publicTeachers" => handle_public_teachers,
        "users.updatePhoto" => handle_update_photo,
        "users.deleteTeacher" => handle_delete_teacher,
        _ => return None,
    };
    Some(with_store(state, req, handler))
}
