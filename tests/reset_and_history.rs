use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use sessiond::students::{self, NewStudent, StudentPatch};
use sessiond::timeline::default_timeline;
use sessiond::{db, history, integrity, reset, roster, weeks};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn open(prefix: &str) -> (PathBuf, Connection) {
    let workspace = temp_dir(prefix);
    let conn = db::open_db(&workspace, Duration::from_millis(5000)).expect("open db");
    (workspace, conn)
}

fn create(conn: &Connection, name: &str, home_center: &str) -> i64 {
    students::create_student(
        conn,
        &NewStudent {
            name: name.to_string(),
            grade: Some("Sec 2".to_string()),
            home_center: home_center.to_string(),
            ..Default::default()
        },
    )
    .expect("create student")
    .identity
    .id
}

fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 9, day)
        .and_then(|d| d.and_hms_opt(hour, 15, 0))
        .expect("valid date")
}

fn dirty_timeline(conn: &Connection, id: i64) {
    weeks::mark_attendance(conn, id, 1, at(1, 10), "Dokki").expect("mark");
    weeks::set_homework_state(conn, id, 1, true).expect("homework");
    weeks::set_payment_state(conn, id, 4, true).expect("payment");
    weeks::record_quiz_score(conn, id, 6, 7.5, 10.0).expect("quiz");
    weeks::set_notification_state(conn, id, 20, true).expect("notification");
}

#[test]
fn reset_one_student_restores_defaults_and_keeps_history() {
    let (workspace, conn) = open("sessiond-reset-one");
    let a = create(&conn, "Hana Mostafa", "Dokki");
    let b = create(&conn, "Ziad Fathy", "Maadi");
    dirty_timeline(&conn, a);
    dirty_timeline(&conn, b);

    reset::reset_one_student(&conn, a).expect("reset a");

    let student_a = students::get_student(&conn, a).expect("get a");
    assert_eq!(student_a.timeline, default_timeline());
    let student_b = students::get_student(&conn, b).expect("get b");
    assert!(student_b.timeline[0].attended);
    assert_eq!(history::count_history(&conn).expect("count"), 2);

    let err = reset::reset_one_student(&conn, 999).expect_err("missing student");
    assert_eq!(err.code(), "not_found");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn reset_all_clears_timelines_and_history_and_is_idempotent() {
    let (workspace, conn) = open("sessiond-reset-all");
    let ids: Vec<i64> = ["Laila", "Adham", "Farida"]
        .iter()
        .map(|name| create(&conn, name, "Heliopolis"))
        .collect();
    for id in &ids {
        dirty_timeline(&conn, *id);
    }
    weeks::mark_attendance(&conn, ids[0], 2, at(8, 10), "Heliopolis").expect("mark");

    let summary = reset::reset_all(&conn).expect("reset all");
    assert_eq!(summary.students_updated, 3);
    assert_eq!(summary.history_records_deleted, 4);
    for id in &ids {
        let student = students::get_student(&conn, *id).expect("get student");
        assert_eq!(student.timeline, default_timeline());
    }
    assert_eq!(history::count_history(&conn).expect("count"), 0);

    let again = reset::reset_all(&conn).expect("reset all again");
    assert_eq!(again.students_updated, 3);
    assert_eq!(again.history_records_deleted, 0);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn reset_all_on_empty_workspace_reports_zero() {
    let (workspace, conn) = open("sessiond-reset-empty");
    let summary = reset::reset_all(&conn).expect("reset all");
    assert_eq!(summary.students_updated, 0);
    assert_eq!(summary.history_records_deleted, 0);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn history_query_groups_by_student_with_current_identity() {
    let (workspace, conn) = open("sessiond-history-query");
    let a = create(&conn, "Rana Ehab", "Dokki");
    let b = create(&conn, "Seif Amr", "Maadi");
    let c = create(&conn, "No Visits", "Maadi");

    weeks::mark_attendance(&conn, b, 1, at(2, 9), "Maadi").expect("b w1");
    weeks::mark_attendance(&conn, a, 1, at(2, 10), "Dokki").expect("a w1");
    weeks::mark_attendance(&conn, b, 2, at(9, 9), "Dokki").expect("b w2");

    students::update_student(
        &conn,
        a,
        &StudentPatch {
            name: Some("Rana E. Mahmoud".to_string()),
            phone: Some(Some("0100".to_string())),
            ..Default::default()
        },
    )
    .expect("rename a");

    let views = history::query_history(&conn).expect("query");
    assert_eq!(views.len(), 2);
    assert_eq!(views[0].student.id, a);
    assert_eq!(views[0].student.name, "Rana E. Mahmoud");
    assert_eq!(views[0].student.phone.as_deref(), Some("0100"));
    assert_eq!(views[0].records.len(), 1);
    assert_eq!(views[1].student.id, b);
    let weeks_seen: Vec<u8> = views[1].records.iter().map(|r| r.week).collect();
    assert_eq!(weeks_seen, vec![1, 2]);
    assert_eq!(views[1].records[1].home_center, "Maadi");
    assert_eq!(views[1].records[1].attendance_center, "Dokki");
    assert!(views.iter().all(|v| v.student.id != c));

    let json = views[1].to_json();
    assert_eq!(json["historyRecords"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(
        json["historyRecords"][1]["attendanceTimestamp"].as_str(),
        Some("09/09/2024 in Dokki at 09:15 AM")
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn history_of_deleted_student_is_kept_but_not_listed() {
    let (workspace, conn) = open("sessiond-history-orphan");
    let a = create(&conn, "Gone Soon", "Dokki");
    let b = create(&conn, "Still Here", "Dokki");
    weeks::mark_attendance(&conn, a, 3, at(3, 12), "Dokki").expect("a");
    weeks::mark_attendance(&conn, b, 3, at(3, 12), "Dokki").expect("b");

    students::delete_student(&conn, a).expect("delete a");

    let views = history::query_history(&conn).expect("query");
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].student.id, b);
    assert_eq!(history::count_history(&conn).expect("count"), 2);
    let err = history::history_for_student(&conn, a).expect_err("deleted student");
    assert_eq!(err.code(), "not_found");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn roster_lists_attended_students_for_a_week() {
    let (workspace, conn) = open("sessiond-roster");
    let a = create(&conn, "Amira", "Dokki");
    let b = create(&conn, "Bassel", "Maadi");
    let _c = create(&conn, "Camelia", "Maadi");

    weeks::mark_attendance(&conn, b, 4, at(20, 16), "Maadi").expect("b");
    weeks::mark_attendance(&conn, a, 4, at(20, 17), "Maadi").expect("a");
    weeks::mark_attendance(&conn, a, 5, at(27, 17), "Dokki").expect("a w5");

    let entries = roster::session_roster(&conn, 4, None).expect("roster");
    let ids: Vec<i64> = entries.iter().map(|e| e.student.id).collect();
    assert_eq!(ids, vec![a, b]);
    assert!(entries.iter().all(|e| e.slot.week == 4 && e.slot.attended));

    let dokki = roster::session_roster(&conn, 5, Some("Dokki")).expect("roster w5");
    assert_eq!(dokki.len(), 1);
    let maadi = roster::session_roster(&conn, 5, Some("Maadi")).expect("roster w5 maadi");
    assert!(maadi.is_empty());

    let err = roster::session_roster(&conn, 21, None).expect_err("bad week");
    assert_eq!(err.code(), "invalid_week");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn integrity_check_flags_attendance_without_ledger_and_backfill_repairs_slots() {
    let (workspace, conn) = open("sessiond-integrity");
    let a = create(&conn, "Tamer", "Dokki");
    weeks::mark_attendance(&conn, a, 1, at(1, 8), "Dokki").expect("mark");

    let report = integrity::check_timelines(&conn).expect("check");
    assert!(report.is_clean());
    assert_eq!(report.students_checked, 1);

    // Simulate damage from outside the API.
    conn.execute(
        "UPDATE student_weeks SET attended = 1, attended_at = '2024-09-02T08:00:00',
           attendance_center = 'Dokki'
         WHERE student_id = ? AND week = 2",
        [a],
    )
    .expect("direct update");
    conn.execute(
        "DELETE FROM student_weeks WHERE student_id = ? AND week = 20",
        [a],
    )
    .expect("drop slot");

    let report = integrity::check_timelines(&conn).expect("check damaged");
    assert!(!report.is_clean());
    assert_eq!(report.slot_count_mismatches, vec![(a, 19)]);
    assert_eq!(report.unrecorded_attendance, vec![(a, 2)]);
    let err = students::get_student(&conn, a).expect_err("corrupt timeline");
    assert_eq!(err.code(), "timeline_corrupt");

    drop(conn);
    let conn = db::open_db(&workspace, Duration::from_millis(5000)).expect("reopen");
    let student = students::get_student(&conn, a).expect("repaired");
    assert_eq!(student.timeline.len(), 20);
    assert_eq!(student.timeline[19], default_timeline()[19]);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn reset_rewrites_every_field_and_restores_missing_rows() {
    let (workspace, conn) = open("sessiond-reset-rows");
    let id = create(&conn, "Every Field", "Dokki");
    for week in 1..=20 {
        weeks::mark_attendance(&conn, id, week, at(10, 8), "Maadi").expect("mark");
        weeks::set_homework_state(&conn, id, week, true).expect("homework");
        weeks::set_payment_state(&conn, id, week, true).expect("payment");
        weeks::record_quiz_score(&conn, id, week, 9.0, 10.0).expect("quiz");
        weeks::set_notification_state(&conn, id, week, true).expect("notification");
    }
    conn.execute(
        "DELETE FROM student_weeks WHERE student_id = ? AND week IN (7, 13)",
        [id],
    )
    .expect("drop slots");

    reset::reset_one_student(&conn, id).expect("reset");
    let student = students::get_student(&conn, id).expect("get student");
    assert_eq!(student.timeline, default_timeline());
    assert_eq!(history::count_history(&conn).expect("count"), 20);

    weeks::record_quiz_score(&conn, id, 7, 3.0, 5.0).expect("quiz");
    conn.execute(
        "DELETE FROM student_weeks WHERE student_id = ? AND week = 1",
        [id],
    )
    .expect("drop slot");
    reset::reset_all(&conn).expect("reset all");
    let student = students::get_student(&conn, id).expect("get student");
    assert_eq!(student.timeline, default_timeline());

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn update_can_clear_nullable_identity_fields() {
    let (workspace, conn) = open("sessiond-student-clear");
    let id = students::create_student(
        &conn,
        &NewStudent {
            name: "Clear Me".to_string(),
            age: Some(15),
            grade: Some("Sec 1".to_string()),
            school: Some("Orman".to_string()),
            phone: Some("0111".to_string()),
            parents_phone: Some("0122".to_string()),
            home_center: "Dokki".to_string(),
        },
    )
    .expect("create student")
    .identity
    .id;

    let identity = students::update_student(
        &conn,
        id,
        &StudentPatch {
            age: Some(None),
            phone: Some(None),
            school: Some(Some("Horreya".to_string())),
            ..Default::default()
        },
    )
    .expect("patch");
    assert_eq!(identity.age, None);
    assert_eq!(identity.phone, None);
    assert_eq!(identity.school.as_deref(), Some("Horreya"));
    assert_eq!(identity.grade.as_deref(), Some("Sec 1"));
    assert_eq!(identity.parents_phone.as_deref(), Some("0122"));
    assert_eq!(identity.name, "Clear Me");
    assert_eq!(identity.home_center, "Dokki");

    let err = students::update_student(&conn, 9999, &StudentPatch::default())
        .expect_err("missing student");
    assert_eq!(err.code(), "not_found");

    let _ = std::fs::remove_dir_all(workspace);
}
