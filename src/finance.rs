use std::collections::HashMap;

use serde::Serialize;
use serde_json::json;

use crate::error::{ErrorKind, ServiceError, ServiceResult};
use crate::model::{new_id, now_timestamp, Actor, Fee, Role, Salary, Student, User};
use crate::scope::row_predicate;
use crate::store::{self, decode, decode_all, encode, Direction, Filter, Query, RecordStore, Row, Table};

fn check_amount(amount: f64) -> ServiceResult<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ServiceError::invalid_request("amount must be greater than zero")
            .with_details(json!({ "amount": amount })));
    }
    Ok(())
}

fn paid_patch() -> Row {
    let mut patch = Row::new();
    patch.insert("paid".into(), json!(true));
    patch.insert("paid_date".into(), json!(now_timestamp()));
    patch
}

fn first_row(mut rows: Vec<Row>) -> ServiceResult<Row> {
    rows.pop()
        .ok_or_else(|| ServiceError::store("write returned no row"))
}

/// Fees visible to the actor; parents only see their children's.
pub fn list_fees(store: &dyn RecordStore, actor: &Actor) -> ServiceResult<Vec<Fee>> {
    let query = Query::new(Filter::new().scoped(row_predicate(actor)))
        .order_by("due_date", Direction::Asc);
    decode_all(store.select(Table::Fees, &query)?)
}

pub fn add_fee(
    store: &dyn RecordStore,
    actor: &Actor,
    student_id: &str,
    amount: f64,
    due_date: Option<String>,
) -> ServiceResult<Fee> {
    actor.require_admin("add fees")?;
    if student_id.trim().is_empty() {
        return Err(ServiceError::invalid_request("studentId is required"));
    }
    check_amount(amount)?;
    let student: Option<Student> =
        store::select_one(store, Table::Students, Filter::new().eq("id", student_id))?;
    if student.is_none() {
        return Err(ServiceError::not_found("student not found"));
    }
    let fee = Fee {
        id: new_id(),
        student_id: student_id.to_string(),
        amount,
        due_date,
        paid: false,
        paid_date: None,
    };
    let row = first_row(store.insert(Table::Fees, &[encode(&fee)?])?)?;
    tracing::info!(fee_id = %fee.id, student_id, amount, "fee added");
    decode(row)
}

/// Marks a fee paid. Paying an already-paid fee returns it unchanged.
pub fn pay_fee(store: &dyn RecordStore, actor: &Actor, fee_id: &str) -> ServiceResult<Fee> {
    actor.require_admin("update fee status")?;
    let fee: Option<Fee> = store::select_one(store, Table::Fees, Filter::new().eq("id", fee_id))?;
    let Some(fee) = fee else {
        return Err(ServiceError::not_found("fee not found"));
    };
    if fee.paid {
        return Ok(fee);
    }
    let row = first_row(store.update(Table::Fees, &Filter::new().eq("id", fee_id), &paid_patch())?)?;
    tracing::info!(fee_id, "fee paid");
    decode(row)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalaryView {
    #[serde(flatten)]
    pub salary: Salary,
    pub status: &'static str,
    pub teacher_name: String,
}

impl SalaryView {
    fn new(salary: Salary, names: &HashMap<String, String>) -> Self {
        Self {
            status: if salary.paid { "Paid" } else { "Pending" },
            teacher_name: names
                .get(&salary.teacher_id)
                .cloned()
                .unwrap_or_else(|| "N/A".to_string()),
            salary,
        }
    }
}

pub fn list_salaries(store: &dyn RecordStore, actor: &Actor) -> ServiceResult<Vec<SalaryView>> {
    actor.require_admin("view salaries")?;
    let salaries: Vec<Salary> = decode_all(
        store.select(Table::Salaries, &Query::all().order_by("month", Direction::Desc))?,
    )?;
    let ids: Vec<serde_json::Value> = salaries.iter().map(|s| json!(s.teacher_id)).collect();
    let users: Vec<User> = decode_all(
        store.select(Table::Users, &Query::new(Filter::new().is_in("id", ids)))?,
    )?;
    let names: HashMap<String, String> = users.into_iter().map(|u| (u.id, u.name)).collect();
    Ok(salaries
        .into_iter()
        .map(|s| SalaryView::new(s, &names))
        .collect())
}

pub fn add_salary(
    store: &dyn RecordStore,
    actor: &Actor,
    teacher_id: &str,
    month: Option<String>,
    amount: f64,
) -> ServiceResult<Salary> {
    actor.require_admin("add salaries")?;
    check_amount(amount)?;
    let user: Option<User> =
        store::select_one(store, Table::Users, Filter::new().eq("id", teacher_id))?;
    match user {
        Some(u) if u.role == Role::Teacher.as_str() => {}
        _ => {
            return Err(ServiceError::new(
                ErrorKind::InvalidTarget,
                "salaries can only be recorded for teachers",
            )
            .with_details(json!({ "teacherId": teacher_id })))
        }
    }
    let salary = Salary {
        id: new_id(),
        teacher_id: teacher_id.to_string(),
        month,
        amount,
        paid: false,
        paid_date: None,
    };
    let row = first_row(store.insert(Table::Salaries, &[encode(&salary)?])?)?;
    tracing::info!(salary_id = %salary.id, teacher_id, amount, "salary added");
    decode(row)
}

pub fn pay_salary(store: &dyn RecordStore, actor: &Actor, salary_id: &str) -> ServiceResult<Salary> {
    actor.require_admin("update salary status")?;
    let salary: Option<Salary> =
        store::select_one(store, Table::Salaries, Filter::new().eq("id", salary_id))?;
    let Some(salary) = salary else {
        return Err(ServiceError::not_found("salary not found"));
    };
    if salary.paid {
        return Ok(salary);
    }
    let row = first_row(store.update(
        Table::Salaries,
        &Filter::new().eq("id", salary_id),
        &paid_patch(),
    )?)?;
    tracing::info!(salary_id, "salary paid");
    decode(row)
}

/// Salary rows of one teacher. Teachers may read their own.
pub fn salaries_for_teacher(
    store: &dyn RecordStore,
    actor: &Actor,
    teacher_id: &str,
) -> ServiceResult<Vec<Salary>> {
    if actor.role != Role::Admin && !(actor.role == Role::Teacher && actor.id == teacher_id) {
        return Err(ServiceError::forbidden("not authorized to view these salaries"));
    }
    let query = Query::new(Filter::new().eq("teacher_id", teacher_id))
        .order_by("month", Direction::Asc);
    decode_all(store.select(Table::Salaries, &query)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn admin() -> Actor {
        Actor::new("a1", Role::Admin)
    }

    fn seed(store: &SqliteStore) {
        for v in [
            json!({"id": "t1", "name": "Mrs. Iyer", "email": "iyer@school.test", "role": "teacher"}),
            json!({"id": "p1", "name": "Parent One", "email": "p1@home.test", "role": "parent"}),
        ] {
            store
                .insert(Table::Users, &[v.as_object().cloned().expect("obj")])
                .expect("seed user");
        }
        for (id, parent) in [("s1", "p1"), ("s2", "p9")] {
            let v = json!({"id": id, "name": id, "class": "6A", "roll_no": null, "parent_id": parent});
            store
                .insert(Table::Students, &[v.as_object().cloned().expect("obj")])
                .expect("seed student");
        }
    }

    #[test]
    fn fees_are_scoped_and_payable_once() {
        let store = SqliteStore::open_in_memory().expect("store");
        seed(&store);
        let f1 = add_fee(&store, &admin(), "s1", 1200.0, Some("2026-04-01".into())).expect("fee");
        add_fee(&store, &admin(), "s2", 900.0, None).expect("fee");
        assert!(!f1.paid);

        assert_eq!(list_fees(&store, &admin()).expect("list").len(), 2);
        let mine = list_fees(&store, &Actor::new("p1", Role::Parent)).expect("list");
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].student_id, "s1");

        let paid = pay_fee(&store, &admin(), &f1.id).expect("pay");
        assert!(paid.paid);
        let stamp = paid.paid_date.clone().expect("paid date");
        let again = pay_fee(&store, &admin(), &f1.id).expect("pay again");
        assert_eq!(again.paid_date, Some(stamp));

        assert_eq!(pay_fee(&store, &admin(), "nope").unwrap_err().kind, ErrorKind::NotFound);
        assert_eq!(
            add_fee(&store, &admin(), "ghost", 10.0, None).unwrap_err().kind,
            ErrorKind::NotFound
        );
        assert_eq!(
            add_fee(&store, &admin(), "s1", 0.0, None).unwrap_err().kind,
            ErrorKind::InvalidRequest
        );
        assert_eq!(
            add_fee(&store, &Actor::new("t1", Role::Teacher), "s1", 5.0, None)
                .unwrap_err()
                .kind,
            ErrorKind::Forbidden
        );
    }

    #[test]
    fn salaries_carry_status_and_teacher_name() {
        let store = SqliteStore::open_in_memory().expect("store");
        seed(&store);
        let s = add_salary(&store, &admin(), "t1", Some("2026-03".into()), 30000.0).expect("add");
        assert_eq!(
            add_salary(&store, &admin(), "p1", None, 1.0).unwrap_err().kind,
            ErrorKind::InvalidTarget
        );

        let views = list_salaries(&store, &admin()).expect("list");
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].status, "Pending");
        assert_eq!(views[0].teacher_name, "Mrs. Iyer");
        let flat = serde_json::to_value(&views[0]).expect("json");
        assert_eq!(flat["teacher_id"], json!("t1"));
        assert_eq!(flat["status"], json!("Pending"));

        pay_salary(&store, &admin(), &s.id).expect("pay");
        assert_eq!(list_salaries(&store, &admin()).expect("list")[0].status, "Paid");

        let own = salaries_for_teacher(&store, &Actor::new("t1", Role::Teacher), "t1").expect("own");
        assert_eq!(own.len(), 1);
        assert_eq!(
            salaries_for_teacher(&store, &Actor::new("t2", Role::Teacher), "t1")
                .unwrap_err()
                .kind,
            ErrorKind::Forbidden
        );
    }
}
