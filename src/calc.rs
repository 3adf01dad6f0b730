use serde::Serialize;

use crate::error::{ErrorKind, ServiceError, ServiceResult};
use crate::model::ResultRow;

/// Half-away-from-zero rounding to two decimals, the precision percentages
/// are reported and graded at.
pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Final letter grade for a percentage. Lower bounds are inclusive.
pub fn letter_grade(percentage: f64) -> &'static str {
    if percentage >= 90.0 {
        "A+"
    } else if percentage >= 80.0 {
        "A"
    } else if percentage >= 70.0 {
        "B+"
    } else if percentage >= 60.0 {
        "B"
    } else if percentage >= 50.0 {
        "C"
    } else {
        "F"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSummary {
    pub obtained: f64,
    pub total: f64,
    pub percentage: f64,
    pub grade: &'static str,
}

/// Sums obtained and possible marks across an exam's subjects. Order of the
/// entries does not matter.
pub fn exam_summary(entries: &[ResultRow]) -> ServiceResult<ExamSummary> {
    let obtained: f64 = entries.iter().map(|r| r.marks).sum();
    let total: f64 = entries.iter().map(|r| r.totalmarks).sum();
    if total <= 0.0 {
        return Err(ServiceError::new(
            ErrorKind::InvalidState,
            "exam has zero total marks",
        )
        .with_details(serde_json::json!({
            "exam": entries.first().map(|r| r.exam.as_str()),
            "subjects": entries.len(),
        })));
    }
    let percentage = round_2_decimals(100.0 * obtained / total);
    Ok(ExamSummary {
        obtained,
        total,
        percentage,
        grade: letter_grade(percentage),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamGroup {
    pub exam: String,
    pub entries: Vec<ResultRow>,
}

/// Groups rows by exam label, keeping exams in order of first appearance
/// and rows within an exam in input order.
pub fn group_by_exam(rows: Vec<ResultRow>) -> Vec<ExamGroup> {
    let mut groups: Vec<ExamGroup> = Vec::new();
    for row in rows {
        match groups.iter_mut().find(|g| g.exam == row.exam) {
            Some(group) => group.entries.push(row),
            None => groups.push(ExamGroup {
                exam: row.exam.clone(),
                entries: vec![row],
            }),
        }
    }
    groups
}

/// Whole numbers print without a fractional part; everything else keeps up
/// to two decimals.
pub fn format_marks(x: f64) -> String {
    if x.fract() == 0.0 {
        format!("{}", x as i64)
    } else {
        let s = format!("{:.2}", x);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
