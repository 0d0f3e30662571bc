use rusqlite::Connection;
use serde_json::json;
use tracing::warn;

use crate::error::{storage, CoreResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelineReport {
    pub students_checked: i64,
    /// `(student_id, slot_rows)` for every student without exactly 20 slots.
    pub slot_count_mismatches: Vec<(i64, i64)>,
    /// `(student_id, week)` for attended slots with no ledger record for that week.
    pub unrecorded_attendance: Vec<(i64, u8)>,
}

impl TimelineReport {
    pub fn is_clean(&self) -> bool {
        self.slot_count_mismatches.is_empty() && self.unrecorded_attendance.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "clean": self.is_clean(),
            "studentsChecked": self.students_checked,
            "slotCountMismatches": self
                .slot_count_mismatches
                .iter()
                .map(|(id, n)| json!({ "studentId": id, "slots": n }))
                .collect::<Vec<_>>(),
            "unrecordedAttendance": self
                .unrecorded_attendance
                .iter()
                .map(|(id, week)| json!({ "studentId": id, "week": week }))
                .collect::<Vec<_>>()
        })
    }
}

/// Detects timelines that break the 20-slot invariant and attendance marks that
/// have no matching ledger entry. Read only.
pub fn check_timelines(conn: &Connection) -> CoreResult<TimelineReport> {
    let students_checked: i64 = conn
        .query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))
        .map_err(storage("db_query_failed"))?;

    let mut stmt = conn
        .prepare(
            "SELECT s.id, COUNT(w.week)
             FROM students s
             LEFT JOIN student_weeks w ON w.student_id = s.id
             GROUP BY s.id
             HAVING COUNT(w.week) != 20
             ORDER BY s.id",
        )
        .map_err(storage("db_query_failed"))?;
    let slot_count_mismatches = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(storage("db_query_failed"))?;

    let mut stmt = conn
        .prepare(
            "SELECT w.student_id, w.week
             FROM student_weeks w
             WHERE w.attended = 1
               AND NOT EXISTS (
                 SELECT 1 FROM attendance_history h
                 WHERE h.student_id = w.student_id AND h.week = w.week
               )
             ORDER BY w.student_id, w.week",
        )
        .map_err(storage("db_query_failed"))?;
    let unrecorded_attendance = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(storage("db_query_failed"))?;

    let report = TimelineReport {
        students_checked,
        slot_count_mismatches,
        unrecorded_attendance,
    };
    if !report.is_clean() {
        warn!(
            slot_count_mismatches = report.slot_count_mismatches.len(),
            unrecorded_attendance = report.unrecorded_attendance.len(),
            "timeline check found discrepancies"
        );
    }
    Ok(report)
}
