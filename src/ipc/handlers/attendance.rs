use serde_json::json;

use crate::attendance::{self, BatchEntry};
use crate::error::{ServiceError, ServiceResult};
use crate::ipc::helpers::{actor, opt_str, required_str, to_value, with_store, Ctx, Handler};
use crate::ipc::types::{AppState, Request};

fn handle_mark(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let p = &req.params;
    let record = attendance::mark_attendance(
        ctx.store,
        ctx.clock,
        actor,
        opt_str(p, &["studentId", "student_id"]).unwrap_or_default(),
        opt_str(p, &["date"]).unwrap_or_default(),
        opt_str(p, &["status"]).unwrap_or_default(),
    )?;
    to_value(&record)
}

fn batch_entries(params: &serde_json::Value) -> ServiceResult<Vec<BatchEntry>> {
    let Some(items) = params.get("records").and_then(|v| v.as_array()) else {
        return Ok(Vec::new());
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            if !item.is_object() {
                return Err(ServiceError::invalid_request("records must be objects")
                    .with_details(json!({ "index": i })));
            }
            Ok(BatchEntry {
                student_id: opt_str(item, &["studentId", "student_id"])
                    .unwrap_or_default()
                    .to_string(),
                status: opt_str(item, &["status"]).unwrap_or_default().to_string(),
            })
        })
        .collect()
}

fn handle_batch_mark(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let entries = batch_entries(&req.params)?;
    let summary = attendance::mark_attendance_batch(
        ctx.store,
        ctx.clock,
        actor,
        opt_str(&req.params, &["date"]).unwrap_or_default(),
        &entries,
    )?;
    Ok(json!({ "message": summary.message, "count": summary.count }))
}

fn handle_by_student(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let student_id = required_str(&req.params, &["studentId", "student_id"])?;
    let records = attendance::get_attendance(ctx.store, actor, student_id)?;
    Ok(json!({ "records": records }))
}

fn handle_by_date(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let day = required_str(&req.params, &["date"])?;
    let records = attendance::get_attendance_by_date(ctx.store, actor, day)?;
    Ok(json!({ "records": records }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: Handler = match req.method.as_str() {
        "attendance.mark" => handle_mark,
        "attendance.batchMark" => handle_batch_mark,
        "attendance.byStudent" => handle_by_student,
        "attendance.byDate" => handle_by_date,
        _ => return None,
    };
    Some(with_store(state, req, handler))
}
