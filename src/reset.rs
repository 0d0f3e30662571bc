use rusqlite::{named_params, Connection, Transaction, TransactionBehavior};
use tracing::{info, warn};

use crate::error::{storage, CoreError, CoreResult};
use crate::students;
use crate::timeline::{default_timeline, STAMP_STORAGE_FORMAT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetSummary {
    pub students_updated: i64,
    pub history_records_deleted: i64,
}

/// Binds every column from `default_timeline()`, so a reset slot is exactly
/// `WeekSlot::new(week)`. `student_id = None` covers every student.
fn write_default_slots(conn: &Connection, student_id: Option<i64>) -> CoreResult<()> {
    let mut stmt = conn
        .prepare(
            "UPDATE student_weeks SET
               attended = :attended,
               attended_at = :attended_at,
               attendance_center = :attendance_center,
               homework_done = :homework_done,
               payment_received = :payment_received,
               quiz_obtained = :quiz_obtained,
               quiz_out_of = :quiz_out_of,
               notification_sent = :notification_sent
             WHERE week = :week AND (:student_id IS NULL OR student_id = :student_id)",
        )
        .map_err(storage("db_update_failed"))?;
    for slot in default_timeline() {
        let attended_at = slot
            .attended_at
            .map(|at| at.format(STAMP_STORAGE_FORMAT).to_string());
        stmt.execute(named_params! {
            ":attended": slot.attended,
            ":attended_at": attended_at,
            ":attendance_center": slot.attendance_center,
            ":homework_done": slot.homework_done,
            ":payment_received": slot.payment_received,
            ":quiz_obtained": slot.quiz.map(|q| q.obtained),
            ":quiz_out_of": slot.quiz.map(|q| q.out_of),
            ":notification_sent": slot.notification_sent,
            ":week": slot.week,
            ":student_id": student_id,
        })
        .map_err(storage("db_update_failed"))?;
    }
    Ok(())
}

/// Restores any missing slot rows of `student_id`, then rewrites all 20.
/// Ledger untouched.
fn write_default_timeline(conn: &Connection, student_id: i64) -> CoreResult<()> {
    let mut stmt = conn
        .prepare("INSERT OR IGNORE INTO student_weeks(student_id, week) VALUES(?, ?)")
        .map_err(storage("db_insert_failed"))?;
    let mut restored = 0usize;
    for slot in default_timeline() {
        restored += stmt
            .execute((student_id, slot.week))
            .map_err(storage("db_insert_failed"))?;
    }
    if restored > 0 {
        warn!(student_id, restored, "restored missing timeline slots during reset");
    }
    write_default_slots(conn, Some(student_id))
}

pub fn reset_one_student(conn: &Connection, student_id: i64) -> CoreResult<()> {
    let tx = conn.unchecked_transaction().map_err(storage("db_tx_failed"))?;
    if !students::student_exists(&tx, student_id)? {
        return Err(CoreError::student_not_found(student_id));
    }
    write_default_timeline(&tx, student_id)?;
    tx.commit().map_err(storage("db_commit_failed"))?;
    info!(student_id, "student timeline reset");
    Ok(())
}

/// Resets every timeline and empties the ledger in one transaction.
///
/// `students_updated` counts every student whose timeline was rewritten, which is
/// all of them, so a repeated call reports the same student count and zero
/// deleted records.
pub fn reset_all(conn: &Connection) -> CoreResult<ResetSummary> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(storage("db_tx_failed"))?;
    let students_updated: i64 = tx
        .query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))
        .map_err(storage("db_query_failed"))?;
    let restored = crate::db::backfill_missing_slots(&tx).map_err(|e| CoreError::Storage {
        code: "db_insert_failed",
        message: e.to_string(),
    })?;
    if restored > 0 {
        warn!(restored, "restored missing timeline slots during reset");
    }
    write_default_slots(&tx, None)?;
    let deleted = tx
        .execute("DELETE FROM attendance_history", [])
        .map_err(storage("db_delete_failed"))?;
    tx.commit().map_err(storage("db_commit_failed"))?;

    let summary = ResetSummary {
        students_updated,
        history_records_deleted: deleted as i64,
    };
    info!(
        students_updated = summary.students_updated,
        history_records_deleted = summary.history_records_deleted,
        "all timelines reset"
    );
    Ok(summary)
}
