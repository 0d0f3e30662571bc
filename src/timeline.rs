//! Week slot model and the fixed 20-week student timeline.
//!
//! Composite values (quiz score, attendance stamp) are kept structured here and
//! only rendered to their legacy string forms by the `*_display` helpers and
//! `WeekSlot::to_json`.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::Type;
use rusqlite::Row;
use serde_json::json;

use crate::error::{CoreError, CoreResult};

pub const WEEKS_PER_TIMELINE: u8 = 20;

/// Storage encoding of attendance date-times (local wall clock, no offset).
pub const STAMP_STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Column list matching `slot_from_row`.
pub const SLOT_COLUMNS: &str = "week, attended, attended_at, attendance_center, homework_done, \
     payment_received, quiz_obtained, quiz_out_of, notification_sent";

/// A validated 1-based week number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Week(u8);

impl Week {
    pub fn new(week: i64) -> CoreResult<Self> {
        if (1..=i64::from(WEEKS_PER_TIMELINE)).contains(&week) {
            Ok(Week(week as u8))
        } else {
            Err(CoreError::InvalidWeek(week))
        }
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// Position of this week in a timeline.
    pub fn index(self) -> usize {
        usize::from(self.0) - 1
    }

    pub fn all() -> impl Iterator<Item = Week> {
        (1..=WEEKS_PER_TIMELINE).map(Week)
    }
}

impl TryFrom<i64> for Week {
    type Error = CoreError;

    fn try_from(week: i64) -> CoreResult<Self> {
        Week::new(week)
    }
}

impl Display for Week {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuizScore {
    pub obtained: f64,
    pub out_of: f64,
}

impl Display for QuizScore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.obtained, self.out_of)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeekSlot {
    pub week: u8,
    pub attended: bool,
    pub attended_at: Option<NaiveDateTime>,
    pub attendance_center: Option<String>,
    pub homework_done: bool,
    pub payment_received: bool,
    pub quiz: Option<QuizScore>,
    pub notification_sent: bool,
}

impl WeekSlot {
    pub fn new(week: Week) -> Self {
        WeekSlot {
            week: week.number(),
            attended: false,
            attended_at: None,
            attendance_center: None,
            homework_done: false,
            payment_received: false,
            quiz: None,
            notification_sent: false,
        }
    }

    /// Legacy `lastAttendance` rendering, e.g. `15/10/2026 in Egypt Center at 02:05 PM`.
    pub fn last_attendance_timestamp(&self) -> Option<String> {
        let at = self.attended_at?;
        let center = self.attendance_center.as_deref().unwrap_or("n/a");
        Some(stamp_display(&at, center))
    }

    pub fn quiz_score(&self) -> Option<String> {
        self.quiz.map(|q| q.to_string())
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "weekNumber": self.week,
            "attended": self.attended,
            "lastAttendanceTimestamp": self.last_attendance_timestamp(),
            "lastAttendanceCenter": self.attendance_center,
            "attendedAt": self.attended_at.map(|at| at.format(STAMP_STORAGE_FORMAT).to_string()),
            "homeworkDone": self.homework_done,
            "paymentReceived": self.payment_received,
            "quizScore": self.quiz_score(),
            "quiz": self.quiz.map(|q| json!({ "obtained": q.obtained, "outOf": q.out_of })),
            "notificationSent": self.notification_sent
        })
    }
}

/// The only constructor for timelines: 20 default slots numbered 1..20.
pub fn default_timeline() -> Vec<WeekSlot> {
    Week::all().map(WeekSlot::new).collect()
}

/// True when `slots` has exactly one slot per week, in order.
pub fn is_well_formed(slots: &[WeekSlot]) -> bool {
    slots.len() == usize::from(WEEKS_PER_TIMELINE)
        && slots
            .iter()
            .enumerate()
            .all(|(i, s)| usize::from(s.week) == i + 1)
}

pub fn stamp_display(at: &NaiveDateTime, center: &str) -> String {
    format!(
        "{} in {} at {}",
        at.format("%d/%m/%Y"),
        center,
        at.format("%I:%M %p")
    )
}

/// Parses the legacy display form back into its date-time and center.
pub fn parse_stamp_display(raw: &str) -> Option<(NaiveDateTime, String)> {
    let (date, rest) = raw.trim().split_once(" in ")?;
    let (center, time) = rest.rsplit_once(" at ")?;
    let date = NaiveDate::parse_from_str(date.trim(), "%d/%m/%Y").ok()?;
    let time = NaiveTime::parse_from_str(time.trim(), "%I:%M %p").ok()?;
    let center = center.trim();
    if center.is_empty() {
        return None;
    }
    Some((date.and_time(time), center.to_string()))
}

/// Accepts `YYYY-MM-DDTHH:MM[:SS]` (or a space separator) and RFC 3339 with
/// an offset, which is reduced to its local wall-clock time.
pub fn parse_iso_stamp(raw: &str) -> Option<NaiveDateTime> {
    let t = raw.trim();
    for fmt in [
        STAMP_STORAGE_FORMAT,
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(v) = NaiveDateTime::parse_from_str(t, fmt) {
            return Some(v);
        }
    }
    DateTime::parse_from_rfc3339(t).ok().map(|d| d.naive_local())
}

pub fn slot_from_row(row: &Row<'_>) -> rusqlite::Result<WeekSlot> {
    slot_from_row_at(row, 0)
}

/// Maps `SLOT_COLUMNS` starting at column `base`, for joined selects.
pub fn slot_from_row_at(row: &Row<'_>, base: usize) -> rusqlite::Result<WeekSlot> {
    let attended_at = match row.get::<_, Option<String>>(base + 2)? {
        Some(raw) => Some(
            NaiveDateTime::parse_from_str(&raw, STAMP_STORAGE_FORMAT).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(base + 2, Type::Text, Box::new(e))
            })?,
        ),
        None => None,
    };
    let quiz_obtained: Option<f64> = row.get(base + 6)?;
    let quiz_out_of: Option<f64> = row.get(base + 7)?;
    Ok(WeekSlot {
        week: row.get(base)?,
        attended: row.get::<_, i64>(base + 1)? != 0,
        attended_at,
        attendance_center: row.get(base + 3)?,
        homework_done: row.get::<_, i64>(base + 4)? != 0,
        payment_received: row.get::<_, i64>(base + 5)? != 0,
        quiz: match (quiz_obtained, quiz_out_of) {
            (Some(obtained), Some(out_of)) => Some(QuizScore { obtained, out_of }),
            _ => None,
        },
        notification_sent: row.get::<_, i64>(base + 8)? != 0,
    })
}
