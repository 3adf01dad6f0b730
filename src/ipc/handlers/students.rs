use serde_json::json;

use crate::error::ServiceResult;
use crate::guard;
use crate::ipc::helpers::{actor, parse_params, required_str, to_value, with_store, Ctx, Handler};
use crate::ipc::types::{AppState, Request};
use crate::students::{self, NewStudent, StudentPatch};

fn handle_add(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let input: NewStudent = parse_params(&req.params)?;
    let student = students::add_student(ctx.store, actor, &input)?;
    to_value(&student)
}

fn handle_update(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let student_id = required_str(&req.params, &["studentId", "student_id", "id"])?;
    // Fields may sit under `patch` or directly beside the id.
    let patch: StudentPatch = parse_params(req.params.get("patch").unwrap_or(&req.params))?;
    let student = students::update_student(ctx.store, actor, student_id, &patch)?;
    to_value(&student)
}

fn handle_list(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let rows = students::list_students(ctx.store, actor)?;
    Ok(json!({ "students": rows }))
}

fn handle_delete(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let student_id = required_str(&req.params, &["studentId", "student_id", "id"])?;
    let steps = guard::delete_student(ctx.store, actor, student_id)?;
    Ok(json!({ "message": "Student deleted successfully", "steps": steps }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: Handler = match req.method.as_str() {
        "students.add" => handle_add,
        "students.update" => handle_update,
        "students.list" => handle_list,
        "students.delete" => handle_delete,
        _ => return None,
    };
    Some(with_store(state, req, handler))
}
