use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use serde_json::json;

use crate::error::{ErrorKind, ServiceError, ServiceResult};
use crate::ipc::helpers::{actor, parse_params, required_str, to_value, with_store, Ctx, Handler};
use crate::ipc::types::{AppState, Request};
use crate::report;
use crate::results::{self, SubjectInput};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubjectParam {
    #[serde(default)]
    subject: String,
    marks: f64,
    #[serde(alias = "totalmarks", alias = "total_marks")]
    total_marks: f64,
    #[serde(default)]
    grade: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddMultipleParams {
    #[serde(default, alias = "student_id")]
    student_id: String,
    #[serde(default)]
    exam: String,
    #[serde(default)]
    subjects: Vec<SubjectParam>,
}

fn handle_add_multiple(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let p: AddMultipleParams = parse_params(&req.params)?;
    let inputs: Vec<SubjectInput> = p
        .subjects
        .into_iter()
        .map(|s| SubjectInput {
            subject: s.subject,
            marks: s.marks,
            total_marks: s.total_marks,
            grade: s.grade,
        })
        .collect();
    let rows = results::add_results(ctx.store, actor, &p.student_id, &p.exam, &inputs)?;
    Ok(json!({ "message": "Results added successfully", "results": rows }))
}

fn handle_report(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let student_id = required_str(&req.params, &["studentId", "student_id"])?;
    let groups = results::grouped_results(ctx.store, actor, student_id)?;
    let views = results::exam_views(groups)?;

    let mut exams = serde_json::Map::new();
    let mut summaries = Vec::with_capacity(views.len());
    for v in views {
        summaries.push(json!({ "exam": v.exam, "summary": v.summary }));
        exams.insert(v.exam, to_value(&v.entries)?);
    }
    Ok(json!({
        "studentId": student_id,
        "exams": exams,
        "summaries": summaries,
    }))
}

fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn handle_report_pdf(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let student_id = required_str(&req.params, &["studentId", "student_id"])?;
    let out_path = PathBuf::from(required_str(&req.params, &["outPath", "out_path"])?);
    let rendered = report::render_report_card(ctx.store, actor, student_id)?;
    write_output(&out_path, &rendered.bytes)
        .map_err(|e| ServiceError::new(ErrorKind::IoFailure, format!("{e:#}")))?;
    Ok(json!({
        "filename": rendered.filename,
        "contentType": rendered.content_type,
        "outPath": out_path.to_string_lossy(),
        "bytes": rendered.bytes.len(),
        "pages": rendered.pages,
        "sha256": rendered.sha256_hex(),
    }))
}

fn handle_for_student(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let student_id = required_str(&req.params, &["studentId", "student_id"])?;
    let rows = results::raw_results(ctx.store, actor, student_id)?;
    Ok(json!({ "results": rows }))
}

fn handle_aggregated(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let rows = results::aggregated_results(ctx.store, actor)?;
    Ok(json!({ "results": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: Handler = match req.method.as_str() {
        "results.addMultiple" => handle_add_multiple,
        "results.report" => handle_report,
        "results.reportPdf" => handle_report_pdf,
        "results.forStudent" => handle_for_student,
        "results.aggregated" => handle_aggregated,
        _ => return None,
    };
    Some(with_store(state, req, handler))
}
