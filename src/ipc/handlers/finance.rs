use serde_json::json;

use crate::error::ServiceResult;
use crate::finance;
use crate::ipc::helpers::{
    actor, opt_str, required_f64, required_str, to_value, with_store, Ctx, Handler,
};
use crate::ipc::types::{AppState, Request};

fn handle_fees_list(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let fees = finance::list_fees(ctx.store, actor)?;
    Ok(json!({ "fees": fees }))
}

fn handle_fees_add(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let p = &req.params;
    let fee = finance::add_fee(
        ctx.store,
        actor,
        opt_str(p, &["studentId", "student_id"]).unwrap_or_default(),
        required_f64(p, &["amount"])?,
        opt_str(p, &["dueDate", "due_date"]).map(String::from),
    )?;
    to_value(&fee)
}

fn handle_fees_pay(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let fee_id = required_str(&req.params, &["feeId", "fee_id", "id"])?;
    let fee = finance::pay_fee(ctx.store, actor, fee_id)?;
    to_value(&fee)
}

fn handle_salaries_list(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let salaries = finance::list_salaries(ctx.store, actor)?;
    Ok(json!({ "salaries": salaries }))
}

fn handle_salaries_add(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let p = &req.params;
    let salary = finance::add_salary(
        ctx.store,
        actor,
        required_str(p, &["teacherId", "teacher_id"])?,
        opt_str(p, &["month"]).map(String::from),
        required_f64(p, &["amount"])?,
    )?;
    to_value(&salary)
}

fn handle_salaries_pay(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let salary_id = required_str(&req.params, &["salaryId", "salary_id", "id"])?;
    let salary = finance::pay_salary(ctx.store, actor, salary_id)?;
    to_value(&salary)
}

fn handle_salaries_for_teacher(ctx: &Ctx<'_>, req: &Request) -> ServiceResult<serde_json::Value> {
    let actor = actor(req)?;
    let teacher_id = required_str(&req.params, &["teacherId", "teacher_id"])?;
    let salaries = finance::salaries_for_teacher(ctx.store, actor, teacher_id)?;
    Ok(json!({ "salaries": salaries }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: Handler = match req.method.as_str() {
        "fees.list" => handle_fees_list,
        "fees.add" => handle_fees_add,
        "fees.pay" => handle_fees_pay,
        "salaries.list" => handle_salaries_list,
        "salaries.add" => handle_salaries_add,
        "salaries.pay" => handle_salaries_pay,
        "salaries.forTeacher" => handle_salaries_for_teacher,
        _ => return None,
    };
    Some(with_store(state, req, handler))
}
