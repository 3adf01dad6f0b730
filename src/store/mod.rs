mod sqlite;

pub use sqlite::SqliteStore;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ServiceError, ServiceResult};
use crate::scope::RowPredicate;

pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Real,
    Bool,
}

/// How a table's rows resolve to a student for parent scoping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentLink {
    /// The row is the student; match on `parent_id` directly.
    IsStudent,
    /// The row carries `student_id`; match through `students`.
    ViaStudentId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Users,
    Students,
    PendingAdmissions,
    Attendance,
    Fees,
    Salaries,
    Results,
    Announcements,
    Notifications,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Students => "students",
            Table::PendingAdmissions => "pending_admissions",
            Table::Attendance => "attendance",
            Table::Fees => "fees",
            Table::Salaries => "salaries",
            Table::Results => "results",
            Table::Announcements => "announcements",
            Table::Notifications => "notifications",
        }
    }

    pub fn columns(self) -> &'static [(&'static str, ColumnKind)] {
        use ColumnKind::*;
        match self {
            Table::Users => &[
                ("id", Text),
                ("name", Text),
                ("email", Text),
                ("role", Text),
                ("photo", Text),
            ],
            Table::Students => &[
                ("id", Text),
                ("name", Text),
                ("class", Text),
                ("roll_no", Integer),
                ("parent_id", Text),
                ("created_at", Text),
            ],
            Table::PendingAdmissions => &[
                ("id", Text),
                ("student_name", Text),
                ("father_name", Text),
                ("mother_name", Text),
                ("dob", Text),
                ("mobile_number", Text),
                ("aadhar_number", Text),
                ("permanent_address", Text),
                ("father_occupation", Text),
                ("last_institution", Text),
                ("religion", Text),
                ("class_applied", Text),
                ("parent_email", Text),
                ("photo_url", Text),
                ("submitted_at", Text),
            ],
            Table::Attendance => &[
                ("id", Text),
                ("student_id", Text),
                ("date", Text),
                ("status", Text),
            ],
            Table::Fees => &[
                ("id", Text),
                ("student_id", Text),
                ("amount", Real),
                ("due_date", Text),
                ("paid", Bool),
                ("paid_date", Text),
            ],
            Table::Salaries => &[
                ("id", Text),
                ("teacher_id", Text),
                ("month", Text),
                ("amount", Real),
                ("paid", Bool),
                ("paid_date", Text),
            ],
            Table::Results => &[
                ("id", Text),
                ("student_id", Text),
                ("exam", Text),
                ("subject", Text),
                ("marks", Real),
                ("totalmarks", Real),
                ("grade", Text),
                ("created_at", Text),
            ],
            Table::Announcements => &[
                ("id", Text),
                ("title", Text),
                ("message", Text),
                ("created_at", Text),
            ],
            Table::Notifications => &[
                ("id", Text),
                ("title", Text),
                ("message", Text),
                ("user_id", Text),
                ("created_at", Text),
            ],
        }
    }

    pub fn student_link(self) -> Option<StudentLink> {
        match self {
            Table::Students => Some(StudentLink::IsStudent),
            Table::Attendance | Table::Fees | Table::Results => Some(StudentLink::ViaStudentId),
            _ => None,
        }
    }

    pub fn column_kind(self, column: &str) -> Option<ColumnKind> {
        self.columns()
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, kind)| *kind)
    }

    pub fn check_column(self, column: &str) -> ServiceResult<()> {
        match self.column_kind(column) {
            Some(_) => Ok(()),
            None => Err(ServiceError::invalid_request(format!(
                "unknown column {}.{}",
                self.name(),
                column
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, serde_json::Value),
    In(String, Vec<serde_json::Value>),
    Scoped(RowPredicate),
}

/// Conjunction of conditions. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<serde_json::Value>) -> Self {
        self.conditions
            .push(Condition::Eq(column.to_string(), value.into()));
        self
    }

    pub fn is_in(mut self, column: &str, values: Vec<serde_json::Value>) -> Self {
        self.conditions.push(Condition::In(column.to_string(), values));
        self
    }

    pub fn scoped(mut self, predicate: RowPredicate) -> Self {
        if !predicate.is_unrestricted() {
            self.conditions.push(Condition::Scoped(predicate));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub order: Vec<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.order.push((column.to_string(), direction));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
}

/// Capability interface over the backing store.
///
/// Every method is a single store round trip. Nothing here spans calls, so
/// callers that chain several operations own the partial-failure story.
pub trait RecordStore {
    fn select(&self, table: Table, query: &Query) -> ServiceResult<Vec<Row>>;

    /// Inserts all rows in one statement and returns them as stored.
    fn insert(&self, table: Table, rows: &[Row]) -> ServiceResult<Vec<Row>>;

    fn update(&self, table: Table, filter: &Filter, patch: &Row) -> ServiceResult<Vec<Row>>;

    /// Inserts or, when a row collides on `conflict` columns, overwrites the
    /// existing row's non-key columns. Uniqueness is enforced by the store.
    fn upsert(&self, table: Table, rows: &[Row], conflict: &[&str]) -> ServiceResult<Vec<Row>>;

    /// Returns the number of deleted rows. An empty filter is rejected.
    fn delete(&self, table: Table, filter: &Filter) -> ServiceResult<usize>;

    fn aggregate(&self, name: &str, params: &serde_json::Value) -> ServiceResult<serde_json::Value>;
}

pub fn decode<T: DeserializeOwned>(row: Row) -> ServiceResult<T> {
    Ok(serde_json::from_value(serde_json::Value::Object(row))?)
}

pub fn decode_all<T: DeserializeOwned>(rows: Vec<Row>) -> ServiceResult<Vec<T>> {
    rows.into_iter().map(decode).collect()
}

pub fn encode<T: Serialize>(value: &T) -> ServiceResult<Row> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(ServiceError::invalid_request("record must encode as an object")),
    }
}

pub fn select_one<T: DeserializeOwned>(
    store: &dyn RecordStore,
    table: Table,
    filter: Filter,
) -> ServiceResult<Option<T>> {
    let mut rows = store.select(table, &Query::new(filter).limit(1))?;
    match rows.pop() {
        Some(row) => Ok(Some(decode(row)?)),
        None => Ok(None),
    }
}
