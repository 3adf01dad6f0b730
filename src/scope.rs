use crate::error::{ServiceError, ServiceResult};
use crate::model::{Actor, Role, Student};
use crate::store::{self, Filter, RecordStore, Table};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowPredicate {
    Unrestricted,
    /// Rows whose student has `parent_id` equal to the contained actor id.
    ParentOf(String),
}

pub fn row_predicate(actor: &Actor) -> RowPredicate {
    match actor.role {
        Role::Admin | Role::Teacher => RowPredicate::Unrestricted,
        Role::Parent => RowPredicate::ParentOf(actor.id.clone()),
    }
}

/// Fails with `Forbidden` when a scoped actor asks about a student outside
/// their scope. Unrestricted actors pass without a store read.
pub fn ensure_student_visible(
    store: &dyn RecordStore,
    actor: &Actor,
    student_id: &str,
    what: &str,
) -> ServiceResult<()> {
    let predicate = row_predicate(actor);
    if predicate.is_unrestricted() {
        return Ok(());
    }
    let owned: Option<Student> = store::select_one(
        store,
        Table::Students,
        Filter::new().eq("id", student_id).scoped(predicate),
    )?;
    match owned {
        Some(_) => Ok(()),
        None => Err(ServiceError::forbidden(format!(
            "not authorized to view this student's {what}"
        ))),
    }
}

impl RowPredicate {
    pub fn is_unrestricted(&self) -> bool {
        matches!(self, RowPredicate::Unrestricted)
    }

    pub fn allows_student(&self, student: &Student) -> bool {
        match self {
            RowPredicate::Unrestricted => true,
            RowPredicate::ParentOf(parent_id) => {
                student.parent_id.as_deref() == Some(parent_id.as_str())
            }
        }
    }
}
