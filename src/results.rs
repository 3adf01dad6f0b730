use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::calc::{self, ExamGroup, ExamSummary};
use crate::error::{ErrorKind, ServiceError, ServiceResult};
use crate::model::{new_id, now_timestamp, Actor, ResultRow, Student};
use crate::scope::{ensure_student_visible, row_predicate, RowPredicate};
use crate::store::{self, decode_all, Direction, Filter, Query, RecordStore, Row, Table};

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectInput {
    pub subject: String,
    pub marks: f64,
    pub total_marks: f64,
    /// Per-subject grade as entered. Derived from the marks when absent.
    pub grade: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamReport {
    pub exam: String,
    pub entries: Vec<ResultRow>,
    pub summary: ExamSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamView {
    pub exam: String,
    pub entries: Vec<ResultRow>,
    pub summary: Option<ExamSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedResult {
    pub student_id: String,
    pub name: String,
    pub exam: String,
    pub obtained: f64,
    pub total: f64,
    pub subjects: i64,
    pub percentage: Option<f64>,
    pub grade: Option<&'static str>,
}

fn validate_subject(i: usize, s: &SubjectInput) -> ServiceResult<()> {
    let bad = |msg: &str| -> ServiceResult<()> {
        Err(ServiceError::invalid_request(msg.to_string())
            .with_details(json!({ "index": i, "subject": s.subject })))
    };
    if s.subject.trim().is_empty() {
        return bad("subject name is required");
    }
    if !s.total_marks.is_finite() || s.total_marks <= 0.0 {
        return bad("totalMarks must be greater than zero");
    }
    if !s.marks.is_finite() || s.marks < 0.0 || s.marks > s.total_marks {
        return bad("marks must be between 0 and totalMarks");
    }
    Ok(())
}

pub fn add_results(
    store: &dyn RecordStore,
    actor: &Actor,
    student_id: &str,
    exam: &str,
    subjects: &[SubjectInput],
) -> ServiceResult<Vec<ResultRow>> {
    actor.require_staff("add results")?;
    let student_id = student_id.trim();
    let exam = exam.trim();
    if student_id.is_empty() || exam.is_empty() || subjects.is_empty() {
        return Err(ServiceError::invalid_request("invalid request data"));
    }
    for (i, s) in subjects.iter().enumerate() {
        validate_subject(i, s)?;
    }
    let student: Option<Student> =
        store::select_one(store, Table::Students, Filter::new().eq("id", student_id))?;
    if student.is_none() {
        return Err(ServiceError::not_found("student not found"));
    }

    let created_at = now_timestamp();
    let rows: Vec<Row> = subjects
        .iter()
        .map(|s| {
            let grade = match s.grade.as_deref().map(str::trim) {
                Some(g) if !g.is_empty() => g.to_string(),
                _ => calc::letter_grade(calc::round_2_decimals(100.0 * s.marks / s.total_marks))
                    .to_string(),
            };
            let mut row = Row::new();
            row.insert("id".into(), json!(new_id()));
            row.insert("student_id".into(), json!(student_id));
            row.insert("exam".into(), json!(exam));
            row.insert("subject".into(), json!(s.subject.trim()));
            row.insert("marks".into(), json!(s.marks));
            row.insert("totalmarks".into(), json!(s.total_marks));
            row.insert("grade".into(), json!(grade));
            row.insert("created_at".into(), json!(created_at));
            row
        })
        .collect();
    let inserted = decode_all(store.insert(Table::Results, &rows)?)?;
    tracing::info!(student_id, exam, subjects = rows.len(), "results added");
    Ok(inserted)
}

/// Result rows for a student, ordered by exam then subject.
pub fn raw_results(
    store: &dyn RecordStore,
    actor: &Actor,
    student_id: &str,
) -> ServiceResult<Vec<ResultRow>> {
    ensure_student_visible(store, actor, student_id, "results")?;
    let query = Query::new(
        Filter::new()
            .eq("student_id", student_id)
            .scoped(row_predicate(actor)),
    )
    .order_by("exam", Direction::Asc)
    .order_by("subject", Direction::Asc);
    decode_all(store.select(Table::Results, &query)?)
}

pub fn grouped_results(
    store: &dyn RecordStore,
    actor: &Actor,
    student_id: &str,
) -> ServiceResult<Vec<ExamGroup>> {
    let rows = raw_results(store, actor, student_id)?;
    if rows.is_empty() {
        return Err(ServiceError::not_found("no results found")
            .with_details(json!({ "studentId": student_id })));
    }
    Ok(calc::group_by_exam(rows))
}

/// Exam groups with their summaries. An exam whose rows add up to zero total
/// marks is still listed, with no summary.
pub fn exam_views(groups: Vec<ExamGroup>) -> ServiceResult<Vec<ExamView>> {
    groups
        .into_iter()
        .map(|g| {
            let summary = match calc::exam_summary(&g.entries) {
                Ok(summary) => Some(summary),
                Err(e) if e.kind == ErrorKind::InvalidState => None,
                Err(e) => return Err(e),
            };
            Ok(ExamView {
                exam: g.exam,
                entries: g.entries,
                summary,
            })
        })
        .collect()
}

pub fn exam_reports(groups: Vec<ExamGroup>) -> ServiceResult<Vec<ExamReport>> {
    groups
        .into_iter()
        .map(|g| {
            let summary = calc::exam_summary(&g.entries)?;
            Ok(ExamReport {
                exam: g.exam,
                entries: g.entries,
                summary,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct AggregateRow {
    student_id: String,
    name: String,
    exam: String,
    obtained: f64,
    total: f64,
    subjects: i64,
}

fn aggregate_rows(raw: serde_json::Value) -> ServiceResult<Vec<AggregatedResult>> {
    let serde_json::Value::Array(items) = raw else {
        return Err(ServiceError::store("aggregated_results returned a non-array"));
    };
    let rows = items
        .into_iter()
        .map(|v| match v {
            serde_json::Value::Object(row) => Ok(row),
            _ => Err(ServiceError::store("aggregated_results returned a non-object row")),
        })
        .collect::<ServiceResult<Vec<Row>>>()?;
    let rows: Vec<AggregateRow> = decode_all(rows).map_err(|e| {
        ServiceError::store(format!("aggregated_results: {}", e.message))
    })?;
    Ok(rows
        .into_iter()
        .map(|r| {
            let percentage =
                (r.total > 0.0).then(|| calc::round_2_decimals(100.0 * r.obtained / r.total));
            AggregatedResult {
                student_id: r.student_id,
                name: r.name,
                exam: r.exam,
                obtained: r.obtained,
                total: r.total,
                subjects: r.subjects,
                percentage,
                grade: percentage.map(calc::letter_grade),
            }
        })
        .collect())
}

pub fn aggregated_results(
    store: &dyn RecordStore,
    actor: &Actor,
) -> ServiceResult<Vec<AggregatedResult>> {
    let params = match row_predicate(actor) {
        RowPredicate::Unrestricted => json!({}),
        RowPredicate::ParentOf(parent_id) => json!({ "parent_id": parent_id }),
    };
    aggregate_rows(store.aggregate("aggregated_results", &params)?)
}
