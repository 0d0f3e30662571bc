//! Field-level mutations of a single week slot.
//!
//! Every operation validates the week before touching storage, then applies one
//! `UPDATE ... RETURNING` addressed by `(student_id, week)`, so concurrent writes to
//! other slots (or other fields) of the same student are never overwritten. None of
//! these operations invert state: callers compute toggles themselves.

use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension, ToSql, Transaction, TransactionBehavior};
use tracing::info;

use crate::error::{storage, CoreError, CoreResult};
use crate::history::{self, NewHistoryRecord};
use crate::students;
use crate::timeline::{self, Week, WeekSlot, SLOT_COLUMNS, STAMP_STORAGE_FORMAT};

fn apply_slot_update(
    conn: &Connection,
    student_id: i64,
    week: Week,
    assignments: &str,
    values: &[(&str, &dyn ToSql)],
) -> CoreResult<WeekSlot> {
    let sql = format!(
        "UPDATE student_weeks SET {assignments}
         WHERE student_id = :student_id AND week = :week
         RETURNING {SLOT_COLUMNS}"
    );
    let week_no = week.number();
    let mut params: Vec<(&str, &dyn ToSql)> = vec![
        (":student_id", &student_id as &dyn ToSql),
        (":week", &week_no as &dyn ToSql),
    ];
    params.extend_from_slice(values);

    let updated = conn
        .query_row(&sql, params.as_slice(), timeline::slot_from_row)
        .optional()
        .map_err(storage("db_update_failed"))?;
    match updated {
        Some(slot) => Ok(slot),
        None => Err(missing_slot_error(conn, student_id, week)?),
    }
}

/// Explains why no slot row matched: unknown student, or a hole in the timeline.
fn missing_slot_error(conn: &Connection, student_id: i64, week: Week) -> CoreResult<CoreError> {
    if !students::student_exists(conn, student_id)? {
        return Ok(CoreError::student_not_found(student_id));
    }
    Ok(CoreError::Storage {
        code: "timeline_corrupt",
        message: format!("student {student_id} has no slot for week {week}"),
    })
}

/// Marks the slot attended and appends one ledger record, atomically.
///
/// Re-marking an attended week overwrites the slot stamp and appends another
/// ledger record.
pub fn mark_attendance(
    conn: &Connection,
    student_id: i64,
    week: i64,
    attended_at: NaiveDateTime,
    center: &str,
) -> CoreResult<WeekSlot> {
    let week = Week::new(week)?;
    // Immediate: the read below must not be upgraded to a write under contention.
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
        .map_err(storage("db_tx_failed"))?;

    let home_center: Option<String> = tx
        .query_row(
            "SELECT home_center FROM students WHERE id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(storage("db_query_failed"))?;
    let Some(home_center) = home_center else {
        return Err(CoreError::student_not_found(student_id));
    };

    let stamp = attended_at.format(STAMP_STORAGE_FORMAT).to_string();
    let center = center.to_string();
    let slot = apply_slot_update(
        &tx,
        student_id,
        week,
        "attended = 1, attended_at = :attended_at, attendance_center = :center",
        &[
            (":attended_at", &stamp as &dyn ToSql),
            (":center", &center as &dyn ToSql),
        ],
    )?;

    let record_id = history::append_history(
        &tx,
        &NewHistoryRecord {
            student_id,
            week,
            home_center,
            attendance_center: center,
            attended_at,
        },
    )?;

    tx.commit().map_err(storage("db_commit_failed"))?;
    info!(student_id, week = week.number(), record_id = %record_id, "attendance marked");
    Ok(slot)
}

pub fn set_homework_state(
    conn: &Connection,
    student_id: i64,
    week: i64,
    done: bool,
) -> CoreResult<WeekSlot> {
    let week = Week::new(week)?;
    let slot = apply_slot_update(
        conn,
        student_id,
        week,
        "homework_done = :value",
        &[(":value", &done as &dyn ToSql)],
    )?;
    info!(student_id, week = week.number(), done, "homework state set");
    Ok(slot)
}

pub fn set_payment_state(
    conn: &Connection,
    student_id: i64,
    week: i64,
    paid: bool,
) -> CoreResult<WeekSlot> {
    let week = Week::new(week)?;
    let slot = apply_slot_update(
        conn,
        student_id,
        week,
        "payment_received = :value",
        &[(":value", &paid as &dyn ToSql)],
    )?;
    info!(student_id, week = week.number(), paid, "payment state set");
    Ok(slot)
}

/// Stores `obtained / out_of` as given; neither value is range-checked.
pub fn record_quiz_score(
    conn: &Connection,
    student_id: i64,
    week: i64,
    obtained: f64,
    out_of: f64,
) -> CoreResult<WeekSlot> {
    let week = Week::new(week)?;
    let slot = apply_slot_update(
        conn,
        student_id,
        week,
        "quiz_obtained = :obtained, quiz_out_of = :out_of",
        &[
            (":obtained", &obtained as &dyn ToSql),
            (":out_of", &out_of as &dyn ToSql),
        ],
    )?;
    info!(student_id, week = week.number(), obtained, out_of, "quiz score recorded");
    Ok(slot)
}

pub fn set_notification_state(
    conn: &Connection,
    student_id: i64,
    week: i64,
    sent: bool,
) -> CoreResult<WeekSlot> {
    let week = Week::new(week)?;
    let slot = apply_slot_update(
        conn,
        student_id,
        week,
        "notification_sent = :value",
        &[(":value", &sent as &dyn ToSql)],
    )?;
    info!(student_id, week = week.number(), sent, "notification state set");
    Ok(slot)
}
