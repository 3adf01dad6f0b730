use serde::Deserialize;
use serde_json::json;

use crate::error::{ServiceError, ServiceResult};
use crate::model::{new_id, now_timestamp, Actor, Student};
use crate::scope::{row_predicate, RowPredicate};
use crate::store::{decode, decode_all, encode, Direction, Filter, Query, RecordStore, Row, Table};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub name: String,
    #[serde(alias = "class")]
    pub class_name: String,
    #[serde(default, alias = "parent_id")]
    pub parent_id: Option<String>,
    #[serde(default, alias = "roll_no")]
    pub roll_no: Option<i64>,
}

/// Fields left as `None` are not touched. `parent_id: Some(None)` unlinks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "class")]
    pub class_name: Option<String>,
    #[serde(default, alias = "parent_id", with = "double_option")]
    pub parent_id: Option<Option<String>>,
    #[serde(default, alias = "roll_no")]
    pub roll_no: Option<i64>,
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(d: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(d).map(Some)
    }
}

/// One past the highest roll number in the class, or 1 for an empty class.
///
/// Not serialized against concurrent callers; the `UNIQUE(class, roll_no)`
/// constraint rejects the losing insert.
pub fn next_roll_no(store: &dyn RecordStore, class: &str) -> ServiceResult<i64> {
    let max = store.aggregate("max_roll_no", &json!({ "class": class }))?;
    Ok(max.as_i64().map(|m| m + 1).unwrap_or(1))
}

pub fn add_student(
    store: &dyn RecordStore,
    actor: &Actor,
    input: &NewStudent,
) -> ServiceResult<Student> {
    actor.require_admin("add students")?;
    let name = input.name.trim();
    let class = input.class_name.trim();
    if name.is_empty() || class.is_empty() {
        return Err(ServiceError::invalid_request("name and className are required"));
    }
    let roll_no = match input.roll_no {
        Some(r) => r,
        None => next_roll_no(store, class)?,
    };
    let student = Student {
        id: new_id(),
        name: name.to_string(),
        class: class.to_string(),
        roll_no: Some(roll_no),
        parent_id: input.parent_id.clone().filter(|p| !p.trim().is_empty()),
        created_at: Some(now_timestamp()),
    };
    let mut rows = store.insert(Table::Students, &[encode(&student)?])?;
    let row = rows
        .pop()
        .ok_or_else(|| ServiceError::store("insert returned no row"))?;
    tracing::info!(student_id = %student.id, class, roll_no, "student added");
    decode(row)
}

pub fn update_student(
    store: &dyn RecordStore,
    actor: &Actor,
    student_id: &str,
    patch: &StudentPatch,
) -> ServiceResult<Student> {
    actor.require_staff("update students")?;
    let mut row = Row::new();
    if let Some(name) = &patch.name {
        row.insert("name".into(), json!(name.trim()));
    }
    if let Some(class) = &patch.class_name {
        row.insert("class".into(), json!(class.trim()));
    }
    if let Some(parent) = &patch.parent_id {
        row.insert("parent_id".into(), json!(parent));
    }
    if let Some(roll) = patch.roll_no {
        row.insert("roll_no".into(), json!(roll));
    }
    if row.is_empty() {
        return Err(ServiceError::invalid_request("nothing to update"));
    }
    let mut updated = store.update(Table::Students, &Filter::new().eq("id", student_id), &row)?;
    match updated.pop() {
        Some(r) => decode(r),
        None => Err(ServiceError::not_found("student not found")),
    }
}

/// Staff get plain student rows; parents get their children with attendance
/// and fee counters.
pub fn list_students(store: &dyn RecordStore, actor: &Actor) -> ServiceResult<serde_json::Value> {
    match row_predicate(actor) {
        RowPredicate::ParentOf(parent_id) => {
            store.aggregate("students_with_stats", &json!({ "parent_id": parent_id }))
        }
        RowPredicate::Unrestricted => {
            let query = Query::all()
                .order_by("class", Direction::Asc)
                .order_by("roll_no", Direction::Asc);
            let students: Vec<Student> = decode_all(store.select(Table::Students, &query)?)?;
            Ok(json!(students))
        }
    }
}
