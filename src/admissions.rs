use serde::Deserialize;
use serde_json::json;

use crate::cascade::Cascade;
use crate::error::{ServiceError, ServiceResult};
use crate::model::{new_id, now_timestamp, Actor, PendingAdmission, Student};
use crate::store::{self, decode, decode_all, encode, Direction, Filter, Query, RecordStore, Table};
use crate::students::next_roll_no;

pub const ADMISSION_APPROVE_STEPS: [&str; 2] = ["insert_student", "remove_pending"];

/// Applicant form as submitted. Only the name and target class are required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionForm {
    #[serde(alias = "student_name")]
    pub student_name: String,
    #[serde(default, alias = "father_name")]
    pub father_name: Option<String>,
    #[serde(default, alias = "mother_name")]
    pub mother_name: Option<String>,
    #[serde(default)]
    pub dob: Option<String>,
    #[serde(default, alias = "mobile_number")]
    pub mobile_number: Option<String>,
    #[serde(default, alias = "aadhar_number")]
    pub aadhar_number: Option<String>,
    #[serde(default, alias = "permanent_address")]
    pub permanent_address: Option<String>,
    #[serde(default, alias = "father_occupation")]
    pub father_occupation: Option<String>,
    #[serde(default, alias = "last_institution")]
    pub last_institution: Option<String>,
    #[serde(default)]
    pub religion: Option<String>,
    #[serde(alias = "class_applied")]
    pub class_applied: String,
    #[serde(default, alias = "parent_email")]
    pub parent_email: Option<String>,
    #[serde(default, alias = "photo_url")]
    pub photo_url: Option<String>,
}

pub fn apply(store: &dyn RecordStore, form: AdmissionForm) -> ServiceResult<PendingAdmission> {
    let student_name = form.student_name.trim().to_string();
    let class_applied = form.class_applied.trim().to_string();
    if student_name.is_empty() || class_applied.is_empty() {
        return Err(ServiceError::invalid_request(
            "studentName and classApplied are required",
        ));
    }
    let admission = PendingAdmission {
        id: new_id(),
        student_name,
        father_name: form.father_name,
        mother_name: form.mother_name,
        dob: form.dob,
        mobile_number: form.mobile_number,
        aadhar_number: form.aadhar_number,
        permanent_address: form.permanent_address,
        father_occupation: form.father_occupation,
        last_institution: form.last_institution,
        religion: form.religion,
        class_applied,
        parent_email: form.parent_email,
        photo_url: form.photo_url,
        submitted_at: now_timestamp(),
    };
    let mut rows = store.insert(Table::PendingAdmissions, &[encode(&admission)?])?;
    let row = rows
        .pop()
        .ok_or_else(|| ServiceError::store("insert returned no row"))?;
    tracing::info!(admission_id = %admission.id, class = %admission.class_applied, "admission submitted");
    decode(row)
}

pub fn list_pending(store: &dyn RecordStore, actor: &Actor) -> ServiceResult<Vec<PendingAdmission>> {
    actor.require_admin("view pending admissions")?;
    let query = Query::all().order_by("submitted_at", Direction::Desc);
    decode_all(store.select(Table::PendingAdmissions, &query)?)
}

/// Converts a pending admission into a student with the next roll number in
/// the applied class, then removes the application.
///
/// A concurrent approval into the same class can compute the same roll
/// number; the second insert then fails on `UNIQUE(class, roll_no)` and the
/// application stays pending.
pub fn approve(
    store: &dyn RecordStore,
    actor: &Actor,
    admission_id: &str,
) -> ServiceResult<Student> {
    actor.require_admin("approve admissions")?;
    let admission: Option<PendingAdmission> = store::select_one(
        store,
        Table::PendingAdmissions,
        Filter::new().eq("id", admission_id),
    )?;
    let Some(admission) = admission else {
        return Err(ServiceError::not_found("pending admission not found")
            .with_details(json!({ "admissionId": admission_id })));
    };
    let roll_no = next_roll_no(store, &admission.class_applied)?;

    let student = Student {
        id: new_id(),
        name: admission.student_name.clone(),
        class: admission.class_applied.clone(),
        roll_no: Some(roll_no),
        parent_id: None,
        created_at: Some(now_timestamp()),
    };
    let [insert_step, remove_step] = ADMISSION_APPROVE_STEPS;
    let mut cascade = Cascade::new("admission_approve");
    let inserted = cascade.step(insert_step, || {
        let mut rows = store.insert(Table::Students, &[encode(&student)?])?;
        rows.pop()
            .ok_or_else(|| ServiceError::store("insert returned no row"))
    })?;
    cascade.step(remove_step, || {
        store.delete(Table::PendingAdmissions, &Filter::new().eq("id", admission_id))
    })?;
    cascade.finish();
    tracing::info!(admission_id, student_id = %student.id, roll_no, "admission approved");
    decode(inserted)
}
