use serde_json::json;

use crate::cascade::Cascade;
use crate::error::{ErrorKind, ServiceError, ServiceResult};
use crate::model::{Actor, Fee, Role, Salary, Student, User};
use crate::store::{self, decode_all, Filter, Query, RecordStore, Table};

/// Deletion order for a student. Dependents go first so a failure never
/// leaves rows pointing at a missing student.
pub const STUDENT_DELETE_STEPS: [&str; 3] = ["attendance", "fees", "student"];

pub fn can_delete_student(fees: &[Fee]) -> ServiceResult<()> {
    let pending = fees.iter().filter(|f| !f.paid).count();
    if pending == 0 {
        return Ok(());
    }
    Err(ServiceError::new(
        ErrorKind::HasPendingFees,
        "clear pending fees before deleting student",
    )
    .with_details(json!({ "pendingFees": pending })))
}

pub fn can_delete_teacher(user: &User, salaries: &[Salary]) -> ServiceResult<()> {
    if Role::parse(&user.role) != Some(Role::Teacher) {
        return Err(ServiceError::new(
            ErrorKind::InvalidTarget,
            "only teachers can be deleted here",
        )
        .with_details(json!({ "role": user.role })));
    }
    let pending = salaries.iter().filter(|s| !s.paid).count();
    if pending > 0 {
        return Err(ServiceError::new(
            ErrorKind::HasPendingSalary,
            "cannot delete teacher: some salary records are still pending",
        )
        .with_details(json!({ "pendingSalaries": pending })));
    }
    Ok(())
}

pub fn delete_student(
    store: &dyn RecordStore,
    actor: &Actor,
    student_id: &str,
) -> ServiceResult<Vec<&'static str>> {
    actor.require_admin("delete students")?;
    let student: Option<Student> =
        store::select_one(store, Table::Students, Filter::new().eq("id", student_id))?;
    if student.is_none() {
        return Err(ServiceError::not_found("student not found"));
    }

    let fees: Vec<Fee> = decode_all(store.select(
        Table::Fees,
        &Query::new(Filter::new().eq("student_id", student_id).eq("paid", false)),
    )?)?;
    can_delete_student(&fees)?;

    let by_student = Filter::new().eq("student_id", student_id);
    let [attendance, fee_rows, student_row] = STUDENT_DELETE_STEPS;
    let mut cascade = Cascade::new("student_delete");
    cascade.step(attendance, || store.delete(Table::Attendance, &by_student))?;
    cascade.step(fee_rows, || store.delete(Table::Fees, &by_student))?;
    cascade.step(student_row, || {
        store.delete(Table::Students, &Filter::new().eq("id", student_id))
    })?;
    tracing::info!(student_id, "student deleted");
    Ok(cascade.finish())
}

pub fn delete_teacher(
    store: &dyn RecordStore,
    actor: &Actor,
    teacher_id: &str,
) -> ServiceResult<()> {
    actor.require_admin("delete teachers")?;
    let user: Option<User> =
        store::select_one(store, Table::Users, Filter::new().eq("id", teacher_id))?;
    let Some(user) = user else {
        return Err(ServiceError::new(
            ErrorKind::InvalidTarget,
            "only teachers can be deleted here",
        ));
    };
    let salaries: Vec<Salary> = decode_all(store.select(
        Table::Salaries,
        &Query::new(Filter::new().eq("teacher_id", teacher_id)),
    )?)?;
    can_delete_teacher(&user, &salaries)?;
    store.delete(Table::Users, &Filter::new().eq("id", teacher_id))?;
    tracing::info!(teacher_id, "teacher deleted");
    Ok(())
}
