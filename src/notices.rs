use serde_json::json;

use crate::error::{ServiceError, ServiceResult};
use crate::model::{new_id, now_timestamp, Actor, Announcement, Notification, Role};
use crate::store::{decode, decode_all, encode, Direction, Filter, Query, RecordStore, Table};

fn require_text(title: &str, message: &str) -> ServiceResult<()> {
    if title.trim().is_empty() || message.trim().is_empty() {
        return Err(ServiceError::invalid_request("title and message are required"));
    }
    Ok(())
}

pub fn add_announcement(
    store: &dyn RecordStore,
    actor: &Actor,
    title: &str,
    message: &str,
) -> ServiceResult<Announcement> {
    actor.require_admin("post announcements")?;
    require_text(title, message)?;
    let a = Announcement {
        id: new_id(),
        title: title.trim().to_string(),
        message: message.trim().to_string(),
        created_at: now_timestamp(),
    };
    let mut rows = store.insert(Table::Announcements, &[encode(&a)?])?;
    let row = rows
        .pop()
        .ok_or_else(|| ServiceError::store("insert returned no row"))?;
    decode(row)
}

pub fn list_announcements(store: &dyn RecordStore) -> ServiceResult<Vec<Announcement>> {
    let query = Query::all().order_by("created_at", Direction::Desc);
    decode_all(store.select(Table::Announcements, &query)?)
}

/// `user_id: None` broadcasts to everyone.
pub fn add_notification(
    store: &dyn RecordStore,
    actor: &Actor,
    title: &str,
    message: &str,
    user_id: Option<&str>,
) -> ServiceResult<Notification> {
    actor.require_admin("send notifications")?;
    require_text(title, message)?;
    let n = Notification {
        id: new_id(),
        title: title.trim().to_string(),
        message: message.trim().to_string(),
        user_id: user_id.map(str::trim).filter(|u| !u.is_empty()).map(String::from),
        created_at: now_timestamp(),
    };
    let mut rows = store.insert(Table::Notifications, &[encode(&n)?])?;
    let row = rows
        .pop()
        .ok_or_else(|| ServiceError::store("insert returned no row"))?;
    tracing::debug!(notification_id = %n.id, broadcast = n.user_id.is_none(), "notification added");
    decode(row)
}

/// The user's own notifications plus broadcasts, newest first.
pub fn notifications_for_user(
    store: &dyn RecordStore,
    actor: &Actor,
    user_id: &str,
) -> ServiceResult<Vec<Notification>> {
    if actor.role != Role::Admin && actor.id != user_id {
        return Err(ServiceError::forbidden("not authorized to view these notifications")
            .with_details(json!({ "userId": user_id })));
    }
    let newest = |filter: Filter| Query::new(filter).order_by("created_at", Direction::Desc);
    let mut out: Vec<Notification> =
        decode_all(store.select(Table::Notifications, &newest(Filter::new().eq("user_id", user_id)))?)?;
    let broadcasts: Vec<Notification> = decode_all(store.select(
        Table::Notifications,
        &newest(Filter::new().eq("user_id", serde_json::Value::Null)),
    )?)?;
    out.extend(broadcasts);
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(out)
}
