use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;

use super::{Condition, Direction, Filter, Query, RecordStore, Row, StudentLink, Table};
use super::ColumnKind;
use crate::db;
use crate::error::{ServiceError, ServiceResult};
use crate::model::new_id;
use crate::scope::RowPredicate;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        db::init_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn quote(column: &str) -> String {
    format!("\"{}\"", column)
}

fn column_list(table: Table) -> String {
    table
        .columns()
        .iter()
        .map(|(name, _)| quote(name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn to_sql_value(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

fn from_sql_value(kind: ColumnKind, v: ValueRef<'_>) -> serde_json::Value {
    match v {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => match kind {
            ColumnKind::Bool => json!(i != 0),
            ColumnKind::Real => json!(i as f64),
            _ => json!(i),
        },
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(t) => json!(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => serde_json::Value::Null,
    }
}

fn where_clause(table: Table, filter: &Filter, params: &mut Vec<Value>) -> ServiceResult<String> {
    let mut parts: Vec<String> = Vec::new();
    for condition in &filter.conditions {
        match condition {
            Condition::Eq(column, value) => {
                table.check_column(column)?;
                if value.is_null() {
                    parts.push(format!("{} IS NULL", quote(column)));
                } else {
                    parts.push(format!("{} = ?", quote(column)));
                    params.push(to_sql_value(value));
                }
            }
            Condition::In(column, values) => {
                table.check_column(column)?;
                if values.is_empty() {
                    parts.push("0".to_string());
                    continue;
                }
                let marks = vec!["?"; values.len()].join(", ");
                parts.push(format!("{} IN ({})", quote(column), marks));
                params.extend(values.iter().map(to_sql_value));
            }
            Condition::Scoped(RowPredicate::Unrestricted) => {}
            Condition::Scoped(RowPredicate::ParentOf(parent_id)) => {
                match table.student_link() {
                    Some(StudentLink::IsStudent) => parts.push("\"parent_id\" = ?".to_string()),
                    Some(StudentLink::ViaStudentId) => parts.push(
                        "\"student_id\" IN (SELECT id FROM students WHERE parent_id = ?)"
                            .to_string(),
                    ),
                    None => {
                        return Err(ServiceError::invalid_request(format!(
                            "table {} has no student link to scope by",
                            table.name()
                        )))
                    }
                }
                params.push(Value::Text(parent_id.clone()));
            }
        }
    }
    if parts.is_empty() {
        return Ok(String::new());
    }
    Ok(format!(" WHERE {}", parts.join(" AND ")))
}

fn order_clause(table: Table, order: &[(String, Direction)]) -> ServiceResult<String> {
    if order.is_empty() {
        return Ok(String::new());
    }
    let mut parts = Vec::with_capacity(order.len());
    for (column, direction) in order {
        table.check_column(column)?;
        let dir = match direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        parts.push(format!("{} {}", quote(column), dir));
    }
    Ok(format!(" ORDER BY {}", parts.join(", ")))
}

/// Column names shared by every row, validated against the table. Rows
/// without an `id` get a fresh one.
fn prepare_rows(table: Table, rows: &[Row]) -> ServiceResult<(Vec<String>, Vec<Row>)> {
    let mut prepared: Vec<Row> = rows.to_vec();
    if table.column_kind("id").is_some() {
        for row in prepared.iter_mut() {
            if !row.contains_key("id") {
                row.insert("id".to_string(), json!(new_id()));
            }
        }
    }
    let Some(first) = prepared.first() else {
        return Ok((Vec::new(), prepared));
    };
    let columns: Vec<String> = first.keys().cloned().collect();
    for column in &columns {
        table.check_column(column)?;
    }
    for row in &prepared {
        if row.len() != columns.len() || columns.iter().any(|c| !row.contains_key(c)) {
            return Err(ServiceError::invalid_request(format!(
                "rows for {} must share the same columns",
                table.name()
            )));
        }
    }
    Ok((columns, prepared))
}

fn values_clause(columns: &[String], rows: &[Row], params: &mut Vec<Value>) -> String {
    let tuple = format!("({})", vec!["?"; columns.len()].join(", "));
    let mut tuples = Vec::with_capacity(rows.len());
    for row in rows {
        for column in columns {
            params.push(to_sql_value(row.get(column).unwrap_or(&serde_json::Value::Null)));
        }
        tuples.push(tuple.clone());
    }
    tuples.join(", ")
}

impl SqliteStore {
    fn collect_rows(&self, table: Table, sql: &str, params: &[Value]) -> ServiceResult<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns = table.columns();
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |r| {
                let mut row = Row::new();
                for (i, (name, kind)) in columns.iter().enumerate() {
                    row.insert(name.to_string(), from_sql_value(*kind, r.get_ref(i)?));
                }
                Ok(row)
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(rows)
    }

    fn students_with_stats(&self, parent_id: Option<&str>) -> ServiceResult<serde_json::Value> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.name, s.class, s.roll_no, s.parent_id,
                    (SELECT COUNT(*) FROM attendance a
                       WHERE a.student_id = s.id AND a.status = 'Present'),
                    (SELECT COUNT(*) FROM attendance a
                       WHERE a.student_id = s.id AND a.status = 'Absent'),
                    (SELECT COUNT(*) FROM fees f
                       WHERE f.student_id = s.id AND f.paid = 0)
             FROM students s
             WHERE (?1 IS NULL OR s.parent_id = ?1)
             ORDER BY s.class, s.roll_no",
        )?;
        let rows = stmt
            .query_map([parent_id], |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "name": r.get::<_, String>(1)?,
                    "class": r.get::<_, String>(2)?,
                    "roll_no": r.get::<_, Option<i64>>(3)?,
                    "parent_id": r.get::<_, Option<String>>(4)?,
                    "present_days": r.get::<_, i64>(5)?,
                    "absent_days": r.get::<_, i64>(6)?,
                    "pending_fees": r.get::<_, i64>(7)?,
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(serde_json::Value::Array(rows))
    }

    fn aggregated_results(&self, parent_id: Option<&str>) -> ServiceResult<serde_json::Value> {
        let mut stmt = self.conn.prepare(
            "SELECT r.student_id, s.name, r.exam,
                    SUM(r.marks), SUM(r.totalmarks), COUNT(*)
             FROM results r
             JOIN students s ON s.id = r.student_id
             WHERE (?1 IS NULL OR s.parent_id = ?1)
             GROUP BY r.student_id, r.exam
             ORDER BY s.name, r.student_id, r.exam",
        )?;
        let rows = stmt
            .query_map([parent_id], |r| {
                Ok(json!({
                    "student_id": r.get::<_, String>(0)?,
                    "name": r.get::<_, String>(1)?,
                    "exam": r.get::<_, String>(2)?,
                    "obtained": r.get::<_, f64>(3)?,
                    "total": r.get::<_, f64>(4)?,
                    "subjects": r.get::<_, i64>(5)?,
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(serde_json::Value::Array(rows))
    }

    fn max_roll_no(&self, class: &str) -> ServiceResult<serde_json::Value> {
        let max: Option<i64> = self
            .conn
            .query_row(
                "SELECT MAX(roll_no) FROM students WHERE class = ?",
                [class],
                |r| r.get(0),
            )
            .optional()?
            .flatten();
        Ok(json!(max))
    }
}

impl RecordStore for SqliteStore {
    fn select(&self, table: Table, query: &Query) -> ServiceResult<Vec<Row>> {
        let mut params = Vec::new();
        let mut sql = format!("SELECT {} FROM {}", column_list(table), table.name());
        sql.push_str(&where_clause(table, &query.filter, &mut params)?);
        sql.push_str(&order_clause(table, &query.order)?);
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        self.collect_rows(table, &sql, &params)
    }

    fn insert(&self, table: Table, rows: &[Row]) -> ServiceResult<Vec<Row>> {
        let (columns, prepared) = prepare_rows(table, rows)?;
        if prepared.is_empty() {
            return Ok(Vec::new());
        }
        let mut params = Vec::new();
        let values = values_clause(&columns, &prepared, &mut params);
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {} RETURNING {}",
            table.name(),
            columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
            values,
            column_list(table)
        );
        self.collect_rows(table, &sql, &params)
    }

    fn update(&self, table: Table, filter: &Filter, patch: &Row) -> ServiceResult<Vec<Row>> {
        if filter.is_empty() {
            return Err(ServiceError::invalid_request("update requires a filter"));
        }
        if patch.is_empty() {
            return Err(ServiceError::invalid_request("update requires a patch"));
        }
        let mut params = Vec::new();
        let mut sets = Vec::with_capacity(patch.len());
        for (column, value) in patch {
            table.check_column(column)?;
            sets.push(format!("{} = ?", quote(column)));
            params.push(to_sql_value(value));
        }
        let mut sql = format!("UPDATE {} SET {}", table.name(), sets.join(", "));
        sql.push_str(&where_clause(table, filter, &mut params)?);
        sql.push_str(&format!(" RETURNING {}", column_list(table)));
        self.collect_rows(table, &sql, &params)
    }

    fn upsert(&self, table: Table, rows: &[Row], conflict: &[&str]) -> ServiceResult<Vec<Row>> {
        if conflict.is_empty() {
            return Err(ServiceError::invalid_request("upsert requires conflict columns"));
        }
        for column in conflict {
            table.check_column(column)?;
        }
        let (columns, prepared) = prepare_rows(table, rows)?;
        if prepared.is_empty() {
            return Ok(Vec::new());
        }
        let updates: Vec<String> = columns
            .iter()
            .filter(|c| c.as_str() != "id" && !conflict.contains(&c.as_str()))
            .map(|c| format!("{0} = excluded.{0}", quote(c)))
            .collect();
        let action = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };
        let mut params = Vec::new();
        let values = values_clause(&columns, &prepared, &mut params);
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {} ON CONFLICT({}) {} RETURNING {}",
            table.name(),
            columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
            values,
            conflict.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
            action,
            column_list(table)
        );
        self.collect_rows(table, &sql, &params)
    }

    fn delete(&self, table: Table, filter: &Filter) -> ServiceResult<usize> {
        if filter.is_empty() {
            return Err(ServiceError::invalid_request("delete requires a filter"));
        }
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM {}", table.name());
        sql.push_str(&where_clause(table, filter, &mut params)?);
        Ok(self.conn.execute(&sql, params_from_iter(params.iter()))?)
    }

    fn aggregate(&self, name: &str, params: &serde_json::Value) -> ServiceResult<serde_json::Value> {
        let parent_id = params.get("parent_id").and_then(|v| v.as_str());
        match name {
            "students_with_stats" => self.students_with_stats(parent_id),
            "aggregated_results" => self.aggregated_results(parent_id),
            "max_roll_no" => {
                let class = params
                    .get("class")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ServiceError::invalid_request("max_roll_no requires class"))?;
                self.max_roll_no(class)
            }
            other => Err(ServiceError::invalid_request(format!(
                "unknown aggregate: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn row(v: serde_json::Value) -> Row {
        v.as_object().cloned().expect("object")
    }

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("in-memory store")
    }

    fn seed_student(store: &SqliteStore, id: &str, parent: Option<&str>) {
        store
            .insert(
                Table::Students,
                &[row(json!({
                    "id": id,
                    "name": format!("Student {id}"),
                    "class": "5A",
                    "roll_no": null,
                    "parent_id": parent,
                }))],
            )
            .expect("insert student");
    }

    #[test]
    fn upsert_keeps_one_row_per_conflict_key() {
        let store = store();
        seed_student(&store, "s1", None);
        let first = store
            .upsert(
                Table::Attendance,
                &[row(json!({"student_id": "s1", "date": "2026-10-17", "status": "Present"}))],
                &["student_id", "date"],
            )
            .expect("first upsert");
        let second = store
            .upsert(
                Table::Attendance,
                &[
                    row(json!({"student_id": "s1", "date": "2026-10-17", "status": "Absent"})),
                    row(json!({"student_id": "s1", "date": "2026-10-17", "status": "Present"})),
                ],
                &["student_id", "date"],
            )
            .expect("second upsert");
        assert_eq!(first[0]["id"], second[0]["id"]);

        let all = store.select(Table::Attendance, &Query::all()).expect("select");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0]["status"], json!("Present"));
    }

    #[test]
    fn two_handles_converge_on_one_attendance_row() {
        let workspace = tempfile::tempdir().expect("tempdir");
        let path = workspace.path();
        let a = SqliteStore::new(db::open_db(path).expect("open a"));
        let b = SqliteStore::new(db::open_db(path).expect("open b"));
        seed_student(&a, "s1", None);

        let mark = |store: &SqliteStore, status: &str| {
            store
                .upsert(
                    Table::Attendance,
                    &[row(json!({"student_id": "s1", "date": "2026-10-17", "status": status}))],
                    &["student_id", "date"],
                )
                .expect("upsert")
        };

        std::thread::scope(|scope| {
            for status in ["Present", "Late"] {
                scope.spawn(move || {
                    let store = SqliteStore::new(db::open_db(path).expect("open"));
                    for _ in 0..20 {
                        mark(&store, status);
                    }
                });
            }
        });
        assert_eq!(a.select(Table::Attendance, &Query::all()).expect("select").len(), 1);

        mark(&a, "Present");
        mark(&b, "Absent");
        for store in [&a, &b] {
            let all = store.select(Table::Attendance, &Query::all()).expect("select");
            assert_eq!(all.len(), 1);
            assert_eq!(all[0]["status"], json!("Absent"));
        }
    }

    #[test]
    fn bool_columns_round_trip_as_json_booleans() {
        let store = store();
        seed_student(&store, "s1", None);
        let rows = store
            .insert(
                Table::Fees,
                &[row(json!({"student_id": "s1", "amount": 1200, "due_date": "2026-11-01", "paid": false, "paid_date": null}))],
            )
            .expect("insert fee");
        assert_eq!(rows[0]["paid"], json!(false));
        assert_eq!(rows[0]["amount"], json!(1200.0));

        let updated = store
            .update(
                Table::Fees,
                &Filter::new().eq("student_id", "s1"),
                &row(json!({"paid": true})),
            )
            .expect("update");
        assert_eq!(updated[0]["paid"], json!(true));
    }

    #[test]
    fn parent_scope_joins_through_students() {
        let store = store();
        seed_student(&store, "s1", Some("p1"));
        seed_student(&store, "s2", Some("p2"));
        for sid in ["s1", "s2"] {
            store
                .insert(
                    Table::Attendance,
                    &[row(json!({"student_id": sid, "date": "2026-10-17", "status": "Present"}))],
                )
                .expect("insert attendance");
        }
        let scoped = Filter::new()
            .eq("date", "2026-10-17")
            .scoped(RowPredicate::ParentOf("p1".to_string()));
        let rows = store
            .select(Table::Attendance, &Query::new(scoped))
            .expect("select");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["student_id"], json!("s1"));

        let err = store
            .select(
                Table::Salaries,
                &Query::new(Filter::new().scoped(RowPredicate::ParentOf("p1".to_string()))),
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
    }

    #[test]
    fn unknown_columns_and_unfiltered_deletes_are_rejected() {
        let store = store();
        let err = store
            .select(Table::Students, &Query::new(Filter::new().eq("nope", 1)))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        let err = store.delete(Table::Students, &Filter::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
    }

    #[test]
    fn max_roll_no_is_null_for_empty_class() {
        let store = store();
        let v = store
            .aggregate("max_roll_no", &json!({ "class": "9Z" }))
            .expect("aggregate");
        assert!(v.is_null());
    }
}
