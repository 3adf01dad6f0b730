use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde_json::json;

use crate::clock::Clock;
use crate::error::{ErrorKind, ServiceError, ServiceResult};
use crate::model::{new_id, Actor, AttendanceRecord, AttendanceStatus, Student};
use crate::scope::{ensure_student_visible, row_predicate};
use crate::store::{decode, decode_all, Direction, Filter, Query, RecordStore, Row, Table};

const CONFLICT_KEY: &[&str] = &["student_id", "date"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub student_id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub message: String,
    pub count: usize,
}

const LOCAL_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Calendar day of a client-supplied date. Accepts `YYYY-MM-DD`, a local
/// ISO-8601 date-time (seconds and fraction optional), or an RFC 3339
/// timestamp (taken in server-local time).
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.with_timezone(&Local).date_naive());
    }
    LOCAL_DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(t, f).ok())
        .map(|dt| dt.date())
}

fn require_today(clock: &dyn Clock, raw: &str) -> ServiceResult<NaiveDate> {
    let today = clock.today();
    match parse_day(raw) {
        Some(day) if day == today => Ok(day),
        _ => Err(
            ServiceError::new(ErrorKind::InvalidDate, "attendance can only be marked for today")
                .with_details(json!({ "date": raw, "today": today.to_string() })),
        ),
    }
}

fn require_field<'a>(value: &'a str, name: &str) -> ServiceResult<&'a str> {
    let t = value.trim();
    if t.is_empty() {
        return Err(ServiceError::invalid_request(format!("missing {}", name)));
    }
    Ok(t)
}

fn attendance_row(student_id: &str, day: NaiveDate, status: AttendanceStatus) -> Row {
    let mut row = Row::new();
    row.insert("id".to_string(), json!(new_id()));
    row.insert("student_id".to_string(), json!(student_id));
    row.insert("date".to_string(), json!(day.format("%Y-%m-%d").to_string()));
    row.insert("status".to_string(), json!(status.as_str()));
    row
}

fn missing_students(store: &dyn RecordStore, ids: &[&str]) -> ServiceResult<Vec<String>> {
    let values = ids.iter().map(|id| json!(id)).collect();
    let found: Vec<Student> = decode_all(
        store.select(Table::Students, &Query::new(Filter::new().is_in("id", values)))?,
    )?;
    let mut missing: Vec<String> = ids
        .iter()
        .filter(|id| !found.iter().any(|s| s.id == **id))
        .map(|id| id.to_string())
        .collect();
    missing.sort();
    missing.dedup();
    Ok(missing)
}

pub fn mark_attendance(
    store: &dyn RecordStore,
    clock: &dyn Clock,
    actor: &Actor,
    student_id: &str,
    day: &str,
    status: &str,
) -> ServiceResult<AttendanceRecord> {
    actor.require_staff("mark attendance")?;
    let student_id = require_field(student_id, "studentId")?;
    let day = require_field(day, "date")?;
    let status = AttendanceStatus::parse(require_field(status, "status")?)?;
    let day = require_today(clock, day)?;

    if !missing_students(store, &[student_id])?.is_empty() {
        return Err(ServiceError::not_found("student not found")
            .with_details(json!({ "studentId": student_id })));
    }

    let mut written = store.upsert(
        Table::Attendance,
        &[attendance_row(student_id, day, status)],
        CONFLICT_KEY,
    )?;
    let row = written
        .pop()
        .ok_or_else(|| ServiceError::store("upsert returned no row"))?;
    tracing::info!(student_id, date = %day, status = status.as_str(), "attendance marked");
    decode(row)
}

pub fn mark_attendance_batch(
    store: &dyn RecordStore,
    clock: &dyn Clock,
    actor: &Actor,
    day: &str,
    entries: &[BatchEntry],
) -> ServiceResult<BatchSummary> {
    actor.require_staff("mark attendance")?;
    let day = require_field(day, "date")?;
    if entries.is_empty() {
        return Err(ServiceError::invalid_request("missing records"));
    }
    let day = require_today(clock, day)?;

    // Validate the whole batch before anything is written.
    let mut parsed: Vec<(&str, AttendanceStatus)> = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let student_id = require_field(&entry.student_id, "studentId").map_err(|e| {
            e.with_details(json!({ "index": i }))
        })?;
        let status = AttendanceStatus::parse(entry.status.trim()).map_err(|e| {
            e.with_details(json!({ "index": i, "studentId": student_id, "status": entry.status }))
        })?;
        parsed.push((student_id, status));
    }
    let ids: Vec<&str> = parsed.iter().map(|(id, _)| *id).collect();
    let missing = missing_students(store, &ids)?;
    if !missing.is_empty() {
        return Err(ServiceError::not_found("student not found")
            .with_details(json!({ "studentIds": missing })));
    }

    let rows: Vec<Row> = parsed
        .iter()
        .map(|(id, status)| attendance_row(id, day, *status))
        .collect();
    store.upsert(Table::Attendance, &rows, CONFLICT_KEY)?;
    tracing::info!(date = %day, count = rows.len(), "attendance batch marked");
    Ok(BatchSummary {
        message: "Attendance marked for all students".to_string(),
        count: rows.len(),
    })
}

pub fn get_attendance(
    store: &dyn RecordStore,
    actor: &Actor,
    student_id: &str,
) -> ServiceResult<Vec<AttendanceRecord>> {
    let student_id = require_field(student_id, "studentId")?;
    ensure_student_visible(store, actor, student_id, "attendance")?;
    let query = Query::new(
        Filter::new()
            .eq("student_id", student_id)
            .scoped(row_predicate(actor)),
    )
        .order_by("date", Direction::Asc);
    decode_all(store.select(Table::Attendance, &query)?)
}

pub fn get_attendance_by_date(
    store: &dyn RecordStore,
    actor: &Actor,
    day: &str,
) -> ServiceResult<Vec<AttendanceRecord>> {
    let day = parse_day(require_field(day, "date")?)
        .ok_or_else(|| ServiceError::invalid_request("date must be YYYY-MM-DD"))?;
    let query = Query::new(
        Filter::new()
            .eq("date", day.format("%Y-%m-%d").to_string())
            .scoped(row_predicate(actor)),
    )
    .order_by("student_id", Direction::Asc);
    decode_all(store.select(Table::Attendance, &query)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::model::Role;
    use crate::store::SqliteStore;
    use rstest::rstest;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).expect("date")
    }

    fn clock() -> FixedClock {
        FixedClock(today())
    }

    #[rstest]
    #[case("2026-10-17")]
    #[case("2026-10-17T08:30:00")]
    #[case("2026-10-17T08:30:00.000")]
    #[case("2026-10-17 08:30:00")]
    #[case("2026-10-17 08:30:00.250")]
    #[case("2026-10-17T08:30")]
    #[case(" 2026-10-17 08:30 ")]
    fn local_date_forms(#[case] raw: &str) {
        assert_eq!(parse_day(raw), Some(today()));
    }

    #[rstest]
    #[case("")]
    #[case("17/10/2026")]
    #[case("2026-10-17T8")]
    #[case("tomorrow")]
    fn unparseable_dates(#[case] raw: &str) {
        assert_eq!(parse_day(raw), None);
    }

    fn setup() -> SqliteStore {
        let store = SqliteStore::open_in_memory().expect("store");
        for (id, parent) in [("s1", Some("p1")), ("s2", Some("p2")), ("s3", None)] {
            let row = json!({
                "id": id, "name": id, "class": "5A", "roll_no": null, "parent_id": parent
            });
            store
                .insert(Table::Students, &[row.as_object().cloned().expect("obj")])
                .expect("seed");
        }
        store
    }

    fn teacher() -> Actor {
        Actor::new("t1", Role::Teacher)
    }

    #[test]
    fn marking_twice_keeps_one_row_with_last_status() {
        let store = setup();
        let a = mark_attendance(&store, &clock(), &teacher(), "s1", "2026-10-17", "Present")
            .expect("first");
        let b = mark_attendance(&store, &clock(), &teacher(), "s1", "2026-10-17", "Absent")
            .expect("second");
        assert_eq!(a.id, b.id);
        assert_eq!(b.status, AttendanceStatus::Absent);
        let rows = get_attendance(&store, &teacher(), "s1").expect("read");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, AttendanceStatus::Absent);
    }

    #[test]
    fn only_today_is_writable_for_every_role() {
        let store = setup();
        for role in [Role::Admin, Role::Teacher] {
            let actor = Actor::new("x", role);
            for day in ["2026-10-16", "2026-10-18", "not-a-date"] {
                let e = mark_attendance(&store, &clock(), &actor, "s1", day, "Present")
                    .unwrap_err();
                assert_eq!(e.kind, ErrorKind::InvalidDate, "{day}");
            }
        }
        let ok = mark_attendance(
            &store,
            &clock(),
            &teacher(),
            "s1",
            "2026-10-17T08:30:00",
            "Present",
        )
        .expect("timestamp on today");
        assert_eq!(ok.date, "2026-10-17");
    }

    #[test]
    fn parent_cannot_mark_and_bad_status_is_rejected() {
        let store = setup();
        let parent = Actor::new("p1", Role::Parent);
        let e = mark_attendance(&store, &clock(), &parent, "s1", "2026-10-17", "Present")
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::Forbidden);
        let e = mark_attendance(&store, &clock(), &teacher(), "s1", "2026-10-17", "Late")
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidStatus);
        let e = mark_attendance(&store, &clock(), &teacher(), "", "2026-10-17", "Present")
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidRequest);
        let e = mark_attendance(&store, &clock(), &teacher(), "ghost", "2026-10-17", "Present")
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::NotFound);
    }

    #[test]
    fn batch_with_one_bad_status_writes_nothing() {
        let store = setup();
        let entries = vec![
            BatchEntry { student_id: "s1".into(), status: "Present".into() },
            BatchEntry { student_id: "s2".into(), status: "Sick".into() },
        ];
        let e = mark_attendance_batch(&store, &clock(), &teacher(), "2026-10-17", &entries)
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidStatus);
        let rows = get_attendance_by_date(&store, &teacher(), "2026-10-17").expect("read");
        assert!(rows.is_empty());
    }

    #[test]
    fn batch_upserts_every_entry() {
        let store = setup();
        let entries = vec![
            BatchEntry { student_id: "s1".into(), status: "Present".into() },
            BatchEntry { student_id: "s2".into(), status: "Absent".into() },
            BatchEntry { student_id: "s3".into(), status: "Present".into() },
        ];
        let summary = mark_attendance_batch(&store, &clock(), &teacher(), "2026-10-17", &entries)
            .expect("batch");
        assert_eq!(summary.count, 3);
        let e = mark_attendance_batch(&store, &clock(), &teacher(), "2026-10-17", &[])
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidRequest);
        let e = mark_attendance_batch(&store, &clock(), &teacher(), "2026-10-01", &entries)
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidDate);
    }

    #[test]
    fn parent_reads_are_scoped_to_linked_children() {
        let store = setup();
        let entries = vec![
            BatchEntry { student_id: "s1".into(), status: "Present".into() },
            BatchEntry { student_id: "s2".into(), status: "Absent".into() },
        ];
        mark_attendance_batch(&store, &clock(), &teacher(), "2026-10-17", &entries)
            .expect("batch");

        let parent = Actor::new("p1", Role::Parent);
        let e = get_attendance(&store, &parent, "s2").unwrap_err();
        assert_eq!(e.kind, ErrorKind::Forbidden);
        let own = get_attendance(&store, &parent, "s1").expect("own child");
        assert_eq!(own.len(), 1);
        assert!(own.iter().all(|r| r.student_id == "s1"));

        let by_date = get_attendance_by_date(&store, &parent, "2026-10-17").expect("by date");
        assert_eq!(by_date.len(), 1);
        assert_eq!(by_date[0].student_id, "s1");
        let all = get_attendance_by_date(&store, &teacher(), "2026-10-17").expect("by date");
        assert_eq!(all.len(), 2);
    }
}
