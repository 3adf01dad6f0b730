use sha2::{Digest, Sha256};

use crate::calc::format_marks;
use crate::error::{ServiceError, ServiceResult};
use crate::model::{Actor, Student};
use crate::pdf::{Cell, Document, Font, PageLayout};
use crate::results::{self, ExamReport};
use crate::scope::row_predicate;
use crate::store::{self, Filter, RecordStore, Table};

pub const CONTENT_TYPE: &str = "application/pdf";

/// Column offsets of the subject table, in points from the left edge.
const COL_SUBJECT: f64 = 50.0;
const COL_MARKS: f64 = 250.0;
const COL_TOTAL: f64 = 320.0;
const COL_GRADE: f64 = 390.0;

#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
    pub pages: usize,
}

impl RenderedReport {
    pub fn sha256_hex(&self) -> String {
        format!("{:x}", Sha256::digest(&self.bytes))
    }
}

pub fn report_filename(student_id: &str) -> String {
    let safe: String = student_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("report-card-{}.pdf", safe)
}

fn cells(items: [(f64, String); 4]) -> Vec<Cell> {
    items
        .into_iter()
        .map(|(x, text)| Cell { x, text })
        .collect()
}

/// Lays out the report card. Exams appear in the order given.
pub fn report_card_document(student: &Student, exams: &[ExamReport]) -> Document {
    let mut doc = Document::new(PageLayout::default());
    doc.centered(Font::Bold, 20.0, "Student Report Card").gap(12.0);
    doc.text(Font::Regular, 14.0, format!("Name: {}", student.name))
        .text(Font::Regular, 14.0, format!("Class: {}", student.class));
    if let Some(roll) = student.roll_no {
        doc.text(Font::Regular, 14.0, format!("Roll No: {}", roll));
    }
    doc.text(Font::Regular, 14.0, format!("Student ID: {}", student.id))
        .gap(12.0);

    for exam in exams {
        doc.gap(12.0).text(Font::Bold, 16.0, exam.exam.clone()).gap(6.0);
        doc.columns(
            Font::Bold,
            12.0,
            cells([
                (COL_SUBJECT, "Subject".to_string()),
                (COL_MARKS, "Marks".to_string()),
                (COL_TOTAL, "Total".to_string()),
                (COL_GRADE, "Grade".to_string()),
            ]),
        );
        for r in &exam.entries {
            doc.columns(
                Font::Regular,
                12.0,
                cells([
                    (COL_SUBJECT, r.subject.clone()),
                    (COL_MARKS, format_marks(r.marks)),
                    (COL_TOTAL, format_marks(r.totalmarks)),
                    (COL_GRADE, r.grade.clone()),
                ]),
            );
        }
        let s = &exam.summary;
        doc.gap(6.0)
            .text(
                Font::Regular,
                12.0,
                format!("Total: {} / {}", format_marks(s.obtained), format_marks(s.total)),
            )
            .text(Font::Regular, 12.0, format!("Percentage: {:.2}%", s.percentage))
            .text(Font::Bold, 12.0, format!("Final Grade: {}", s.grade));
    }
    doc
}

pub fn render_report_card(
    store: &dyn RecordStore,
    actor: &Actor,
    student_id: &str,
) -> ServiceResult<RenderedReport> {
    let student: Option<Student> =
        store::select_one(store, Table::Students, Filter::new().eq("id", student_id))?;
    let Some(student) = student else {
        return Err(ServiceError::not_found("student not found"));
    };
    if !row_predicate(actor).allows_student(&student) {
        return Err(ServiceError::forbidden(
            "not authorized to view this student's report card",
        ));
    }
    let groups = results::grouped_results(store, actor, student_id)?;
    let exams = results::exam_reports(groups)?;

    let doc = report_card_document(&student, &exams);
    let report = RenderedReport {
        filename: report_filename(student_id),
        content_type: CONTENT_TYPE,
        pages: doc.page_count(),
        bytes: doc.to_bytes(),
    };
    tracing::info!(
        student_id,
        exams = exams.len(),
        pages = report.pages,
        bytes = report.bytes.len(),
        "report card rendered"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::Role;
    use crate::results::{add_results, SubjectInput};
    use crate::store::SqliteStore;
    use serde_json::json;

    fn setup() -> SqliteStore {
        let store = SqliteStore::open_in_memory().expect("store");
        let row = json!({"id": "s1", "name": "Kavya (Jr)", "class": "8A", "roll_no": 3, "parent_id": "p1"});
        store
            .insert(Table::Students, &[row.as_object().cloned().expect("obj")])
            .expect("seed");
        store
    }

    fn add(store: &SqliteStore, exam: &str, subjects: &[(&str, f64, f64)]) {
        let inputs: Vec<SubjectInput> = subjects
            .iter()
            .map(|(s, m, t)| SubjectInput {
                subject: s.to_string(),
                marks: *m,
                total_marks: *t,
                grade: None,
            })
            .collect();
        add_results(store, &Actor::new("t1", Role::Teacher), "s1", exam, &inputs).expect("add");
    }

    fn pdf_text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    #[test]
    fn renders_exams_in_grouped_order_with_summary() {
        let store = setup();
        add(&store, "Midterm", &[("Math", 45.0, 50.0), ("Science", 40.0, 50.0)]);
        add(&store, "Final", &[("Math", 30.0, 50.0)]);

        let report = render_report_card(&store, &Actor::new("a1", Role::Admin), "s1")
            .expect("render");
        assert_eq!(report.filename, "report-card-s1.pdf");
        assert_eq!(report.content_type, "application/pdf");
        assert_eq!(report.pages, 1);
        assert_eq!(report.sha256_hex().len(), 64);

        let text = pdf_text(&report.bytes);
        assert!(text.starts_with("%PDF-"));
        assert!(text.contains("(Name: Kavya \\(Jr\\)) Tj"));
        let final_at = text.find("(Final) Tj").expect("final heading");
        let midterm_at = text.find("(Midterm) Tj").expect("midterm heading");
        assert!(final_at < midterm_at, "exams follow exam-ascending grouping");
        assert!(text.contains("(Total: 85 / 100) Tj"));
        assert!(text.contains("(Percentage: 85.00%) Tj"));
        assert!(text.contains("(Final Grade: A) Tj"));
        assert!(text.contains("(Percentage: 60.00%) Tj"));
    }

    #[test]
    fn many_exams_paginate() {
        let store = setup();
        for i in 0..12 {
            add(
                &store,
                &format!("Unit Test {i:02}"),
                &[("English", 20.0, 25.0), ("Hindi", 18.0, 25.0), ("Math", 25.0, 25.0)],
            );
        }
        let report = render_report_card(&store, &Actor::new("a1", Role::Admin), "s1")
            .expect("render");
        assert!(report.pages > 1);
        assert!(pdf_text(&report.bytes).contains(&format!("/Count {}", report.pages)));
    }

    #[test]
    fn missing_student_results_or_scope_fail() {
        let store = setup();
        let admin = Actor::new("a1", Role::Admin);
        assert_eq!(
            render_report_card(&store, &admin, "ghost").unwrap_err().kind,
            ErrorKind::NotFound
        );
        assert_eq!(
            render_report_card(&store, &admin, "s1").unwrap_err().kind,
            ErrorKind::NotFound
        );
        add(&store, "Midterm", &[("Math", 45.0, 50.0)]);
        assert_eq!(
            render_report_card(&store, &Actor::new("p2", Role::Parent), "s1")
                .unwrap_err()
                .kind,
            ErrorKind::Forbidden
        );
        assert!(render_report_card(&store, &Actor::new("p1", Role::Parent), "s1").is_ok());
    }

    #[test]
    fn filename_is_path_safe() {
        assert_eq!(report_filename("../x y"), "report-card-___x_y.pdf");
    }
}
