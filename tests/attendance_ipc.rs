mod common;

use chrono::{Duration, Local};
use common::{add_student, admin, parent, teacher, today, Sidecar};
use rstest::rstest;
use serde_json::json;

fn day_offset(days: i64) -> String {
    (Local::now().date_naive() + Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}

#[test]
fn marking_twice_overwrites_the_same_record() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut s = Sidecar::open(workspace.path());
    let sid = add_student(&mut s, "Asha", "4A", Some("p1"));

    let first = s.request_ok(
        "attendance.mark",
        teacher("t1"),
        json!({ "studentId": sid, "date": today(), "status": "Present" }),
    );
    let second = s.request_ok(
        "attendance.mark",
        teacher("t1"),
        json!({ "studentId": sid, "date": today(), "status": "Absent" }),
    );
    assert_eq!(first["id"], second["id"]);
    assert_eq!(second["status"], json!("Absent"));

    let records = s.request_ok("attendance.byStudent", admin(), json!({ "studentId": sid }));
    let rows = records["records"].as_array().expect("records");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["status"], json!("Absent"));
    assert_eq!(rows[0]["date"], json!(today()));
}

#[rstest]
#[case(-1)]
#[case(1)]
#[case(-30)]
fn only_today_can_be_marked(#[case] offset: i64) {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut s = Sidecar::open(workspace.path());
    let sid = add_student(&mut s, "Asha", "4A", None);
    let code = s.request_err(
        "attendance.mark",
        teacher("t1"),
        json!({ "studentId": sid, "date": day_offset(offset), "status": "Present" }),
    );
    assert_eq!(code, "invalid_date");
    let records = s.request_ok("attendance.byStudent", admin(), json!({ "studentId": sid }));
    assert!(records["records"].as_array().expect("records").is_empty());
}

#[rstest]
#[case("%Y-%m-%dT%H:%M:%S%.3f")]
#[case("%Y-%m-%d %H:%M:%S")]
#[case("%Y-%m-%dT%H:%M")]
#[case("%Y-%m-%dT%H:%M:%S")]
fn local_timestamps_for_today_are_accepted(#[case] format: &str) {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut s = Sidecar::open(workspace.path());
    let sid = add_student(&mut s, "Asha", "4A", None);
    let date = Local::now().naive_local().format(format).to_string();
    let marked = s.request_ok(
        "attendance.mark",
        teacher("t1"),
        json!({ "studentId": sid, "date": date, "status": "Late" }),
    );
    assert_eq!(marked["date"], json!(today()));
}

#[rstest]
#[case("present")]
#[case("Late")]
#[case("ABSENT")]
fn statuses_are_exact(#[case] status: &str) {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut s = Sidecar::open(workspace.path());
    let sid = add_student(&mut s, "Asha", "4A", None);
    let code = s.request_err(
        "attendance.mark",
        teacher("t1"),
        json!({ "studentId": sid, "date": today(), "status": status }),
    );
    assert_eq!(code, "invalid_status");
}

#[test]
fn parents_cannot_mark() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut s = Sidecar::open(workspace.path());
    let sid = add_student(&mut s, "Asha", "4A", Some("p1"));
    let code = s.request_err(
        "attendance.mark",
        parent("p1"),
        json!({ "studentId": sid, "date": today(), "status": "Present" }),
    );
    assert_eq!(code, "forbidden");
}

#[test]
fn batch_with_one_bad_status_writes_nothing() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut s = Sidecar::open(workspace.path());
    let a = add_student(&mut s, "Asha", "4A", None);
    let b = add_student(&mut s, "Bala", "4A", None);

    let resp = s.request(
        "attendance.batchMark",
        teacher("t1"),
        json!({
            "date": today(),
            "records": [
                { "studentId": a, "status": "Present" },
                { "studentId": b, "status": "Excused" },
            ],
        }),
    );
    assert_eq!(resp["error"]["code"], json!("invalid_status"));
    assert_eq!(resp["error"]["details"]["index"], json!(1));
    let by_date = s.request_ok("attendance.byDate", admin(), json!({ "date": today() }));
    assert!(by_date["records"].as_array().expect("records").is_empty());

    let ok = s.request_ok(
        "attendance.batchMark",
        teacher("t1"),
        json!({
            "date": today(),
            "records": [
                { "studentId": a, "status": "Present" },
                { "studentId": b, "status": "Absent" },
            ],
        }),
    );
    assert_eq!(ok["message"], json!("Attendance marked for all students"));
    assert_eq!(ok["count"], json!(2));

    assert_eq!(
        s.request_err("attendance.batchMark", teacher("t1"), json!({ "date": today(), "records": [] })),
        "invalid_request"
    );
}

#[test]
fn parents_only_see_their_children() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let mut s = Sidecar::open(workspace.path());
    let mine = add_student(&mut s, "Asha", "4A", Some("p1"));
    let other = add_student(&mut s, "Bala", "4A", Some("p2"));
    s.request_ok(
        "attendance.batchMark",
        admin(),
        json!({
            "date": today(),
            "records": [
                { "studentId": mine, "status": "Present" },
                { "studentId": other, "status": "Present" },
            ],
        }),
    );

    let seen = s.request_ok("attendance.byDate", parent("p1"), json!({ "date": today() }));
    let rows = seen["records"].as_array().expect("records");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["student_id"], json!(mine));

    assert_eq!(
        s.request_err("attendance.byStudent", parent("p1"), json!({ "studentId": other })),
        "forbidden"
    );
    let all = s.request_ok("attendance.byDate", teacher("t1"), json!({ "date": today() }));
    assert_eq!(all["records"].as_array().expect("records").len(), 2);
}
