use rusqlite::Connection;
use serde_json::json;

use crate::error::{storage, CoreResult};
use crate::students::{identity_from_row, StudentIdentity};
use crate::timeline::{slot_from_row_at, Week, WeekSlot, SLOT_COLUMNS};

/// A student who attended a given week, with that week's slot.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub student: StudentIdentity,
    pub slot: WeekSlot,
}

impl RosterEntry {
    pub fn to_json(&self) -> serde_json::Value {
        let mut v = self.student.to_json();
        v["slot"] = self.slot.to_json();
        v
    }
}

/// Students whose `week` slot is attended, optionally only those seen at
/// `center`, ordered by student id.
pub fn session_roster(
    conn: &Connection,
    week: i64,
    center: Option<&str>,
) -> CoreResult<Vec<RosterEntry>> {
    let week = Week::new(week)?;
    let mut stmt = conn
        .prepare(&format!(
            "SELECT s.id, s.name, s.age, s.grade, s.school, s.phone, s.parents_phone, s.home_center,
                    {SLOT_COLUMNS}
             FROM students s
             JOIN student_weeks w ON w.student_id = s.id
             WHERE w.week = ?1 AND w.attended = 1
               AND (?2 IS NULL OR w.attendance_center = ?2)
             ORDER BY s.id"
        ))
        .map_err(storage("db_query_failed"))?;
    let rows = stmt
        .query_map((week.number(), center), |row| {
            Ok(RosterEntry {
                student: identity_from_row(row)?,
                slot: slot_from_row_at(row, 8)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(storage("db_query_failed"))?;
    Ok(rows)
}

pub fn roster_json(entries: &[RosterEntry]) -> serde_json::Value {
    json!({
        "count": entries.len(),
        "students": entries.iter().map(|e| e.to_json()).collect::<Vec<_>>()
    })
}
