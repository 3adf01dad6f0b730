use serde_json::json;

use crate::error::{ServiceError, ServiceResult};
use crate::model::{new_id, Actor, Role, User};
use crate::store::{self, decode, decode_all, encode, Direction, Filter, Query, RecordStore, Row, Table};

pub fn register_user(
    store: &dyn RecordStore,
    actor: &Actor,
    name: &str,
    email: &str,
    role: &str,
) -> ServiceResult<User> {
    actor.require_admin("register users")?;
    let (name, email) = (name.trim(), email.trim());
    if name.is_empty() || email.is_empty() || role.is_empty() {
        return Err(ServiceError::invalid_request("name, email and role are required"));
    }
    let role = Role::parse(role).ok_or_else(|| {
        ServiceError::invalid_request("unknown role").with_details(json!({ "role": role }))
    })?;
    let existing: Option<User> =
        store::select_one(store, Table::Users, Filter::new().eq("email", email))?;
    if existing.is_some() {
        return Err(ServiceError::invalid_request("email already registered"));
    }
    let user = User {
        id: new_id(),
        name: name.to_string(),
        email: Some(email.to_string()),
        role: role.as_str().to_string(),
        photo: None,
    };
    let mut rows = store.insert(Table::Users, &[encode(&user)?])?;
    let row = rows
        .pop()
        .ok_or_else(|| ServiceError::store("insert returned no row"))?;
    tracing::info!(user_id = %user.id, role = role.as_str(), "user registered");
    decode(row)
}

pub fn list_users(
    store: &dyn RecordStore,
    actor: &Actor,
    role: Option<&str>,
) -> ServiceResult<Vec<User>> {
    actor.require_admin("list users")?;
    let mut filter = Filter::new();
    if let Some(raw) = role.filter(|r| !r.is_empty()) {
        let role = Role::parse(raw).ok_or_else(|| {
            ServiceError::invalid_request("unknown role").with_details(json!({ "role": raw }))
        })?;
        filter = filter.eq("role", role.as_str());
    }
    decode_all(store.select(Table::Users, &Query::new(filter).order_by("name", Direction::Asc))?)
}

/// Teacher directory shown on the public site.
pub fn public_teachers(store: &dyn RecordStore) -> ServiceResult<Vec<User>> {
    let query = Query::new(Filter::new().eq("role", Role::Teacher.as_str()))
        .order_by("name", Direction::Asc);
    decode_all(store.select(Table::Users, &query)?)
}

/// Stores an already-uploaded photo reference on a profile.
pub fn set_photo(
    store: &dyn RecordStore,
    actor: &Actor,
    user_id: &str,
    photo: &str,
) -> ServiceResult<User> {
    actor.require_admin("update user photos")?;
    if photo.trim().is_empty() {
        return Err(ServiceError::invalid_request("photo is required"));
    }
    let mut patch = Row::new();
    patch.insert("photo".into(), json!(photo.trim()));
    let mut rows = store.update(Table::Users, &Filter::new().eq("id", user_id), &patch)?;
    match rows.pop() {
        Some(row) => decode(row),
        None => Err(ServiceError::not_found("user not found")),
    }
}
