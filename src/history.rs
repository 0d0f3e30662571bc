//! Append-only attendance ledger.
//!
//! Records carry immutable event facts (week, centers, stamp). Identity data is
//! never copied onto a record; `query_history` joins the current student row at
//! read time instead.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{storage, CoreError, CoreResult};
use crate::students::{self, StudentIdentity};
use crate::timeline::{stamp_display, QuizScore, Week, STAMP_STORAGE_FORMAT};

const RECORD_COLUMNS: &str = "id, student_id, week, home_center, attendance_center, attended_at, \
     homework_done, payment_received, quiz_obtained, quiz_out_of, notification_sent, recorded_at";

#[derive(Debug, Clone)]
pub struct NewHistoryRecord {
    pub student_id: i64,
    pub week: Week,
    pub home_center: String,
    pub attendance_center: String,
    pub attended_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub id: String,
    pub student_id: i64,
    pub week: u8,
    pub home_center: String,
    pub attendance_center: String,
    pub attended_at: NaiveDateTime,
    // Snapshot fields: written with defaults, never updated afterwards.
    pub homework_done: bool,
    pub payment_received: bool,
    pub quiz: Option<QuizScore>,
    pub notification_sent: bool,
    pub recorded_at: String,
}

impl HistoryRecord {
    pub fn attendance_timestamp(&self) -> String {
        stamp_display(&self.attended_at, &self.attendance_center)
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "studentId": self.student_id,
            "week": self.week,
            "homeCenter": self.home_center,
            "attendanceCenter": self.attendance_center,
            "attendanceTimestamp": self.attendance_timestamp(),
            "attendedAt": self.attended_at.format(STAMP_STORAGE_FORMAT).to_string(),
            "homeworkDone": self.homework_done,
            "paymentReceived": self.payment_received,
            "quizScore": self.quiz.map(|q| q.to_string()),
            "notificationSent": self.notification_sent,
            "recordedAt": self.recorded_at
        })
    }
}

/// One student's ledger entries joined with their current identity.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentHistoryView {
    pub student: StudentIdentity,
    pub records: Vec<HistoryRecord>,
}

impl StudentHistoryView {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.student.id,
            "name": self.student.name,
            "grade": self.student.grade,
            "school": self.student.school,
            "phone": self.student.phone,
            "parentsPhone": self.student.parents_phone,
            "historyRecords": self.records.iter().map(|r| r.to_json()).collect::<Vec<_>>()
        })
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryRecord> {
    let raw_at: String = row.get(5)?;
    let attended_at = NaiveDateTime::parse_from_str(&raw_at, STAMP_STORAGE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    let quiz_obtained: Option<f64> = row.get(8)?;
    let quiz_out_of: Option<f64> = row.get(9)?;
    Ok(HistoryRecord {
        id: row.get(0)?,
        student_id: row.get(1)?,
        week: row.get(2)?,
        home_center: row.get(3)?,
        attendance_center: row.get(4)?,
        attended_at,
        homework_done: row.get::<_, i64>(6)? != 0,
        payment_received: row.get::<_, i64>(7)? != 0,
        quiz: match (quiz_obtained, quiz_out_of) {
            (Some(obtained), Some(out_of)) => Some(QuizScore { obtained, out_of }),
            _ => None,
        },
        notification_sent: row.get::<_, i64>(10)? != 0,
        recorded_at: row.get(11)?,
    })
}

/// Insert-only. Returns the new record id.
pub fn append_history(conn: &Connection, record: &NewHistoryRecord) -> CoreResult<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO attendance_history(
           id, student_id, week, home_center, attendance_center, attended_at, recorded_at
         ) VALUES(?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &id,
            record.student_id,
            record.week.number(),
            &record.home_center,
            &record.attendance_center,
            record.attended_at.format(STAMP_STORAGE_FORMAT).to_string(),
        ),
    )
    .map_err(storage("db_insert_failed"))?;
    info!(
        target: "sessiond_audit",
        record_id = %id,
        student_id = record.student_id,
        week = record.week.number(),
        attendance_center = %record.attendance_center,
        "attendance recorded"
    );
    Ok(id)
}

fn load_records(conn: &Connection, student_id: Option<i64>) -> CoreResult<Vec<HistoryRecord>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {RECORD_COLUMNS}
             FROM attendance_history
             WHERE (?1 IS NULL OR student_id = ?1)
             ORDER BY rowid"
        ))
        .map_err(storage("db_query_failed"))?;
    let rows = stmt
        .query_map([student_id], record_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(storage("db_query_failed"))?;
    Ok(rows)
}

/// Every ledger record grouped by student, groups in ascending student id.
///
/// Identity fields come from the current student rows. Records whose student
/// no longer exists are left out.
pub fn query_history(conn: &Connection) -> CoreResult<Vec<StudentHistoryView>> {
    let records = load_records(conn, None)?;
    let identities: HashMap<i64, StudentIdentity> = students::list_students(conn)?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let mut grouped: BTreeMap<i64, StudentHistoryView> = BTreeMap::new();
    let mut orphaned = 0usize;
    for record in records {
        let Some(identity) = identities.get(&record.student_id) else {
            orphaned += 1;
            continue;
        };
        grouped
            .entry(record.student_id)
            .or_insert_with(|| StudentHistoryView {
                student: identity.clone(),
                records: Vec::new(),
            })
            .records
            .push(record);
    }
    if orphaned > 0 {
        debug!(orphaned, "history records without a student were skipped");
    }
    Ok(grouped.into_values().collect())
}

/// Ledger records of one student, oldest first.
pub fn history_for_student(conn: &Connection, student_id: i64) -> CoreResult<Vec<HistoryRecord>> {
    if !students::student_exists(conn, student_id)? {
        return Err(CoreError::student_not_found(student_id));
    }
    load_records(conn, Some(student_id))
}

pub fn count_history(conn: &Connection) -> CoreResult<i64> {
    conn.query_row("SELECT COUNT(*) FROM attendance_history", [], |r| r.get(0))
        .map_err(storage("db_query_failed"))
}
