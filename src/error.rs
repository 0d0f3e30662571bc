use std::fmt::{Display, Formatter};

use serde_json::json;

/// Failure of a core timeline / ledger operation.
#[derive(Debug)]
pub enum CoreError {
    NotFound(String),
    InvalidWeek(i64),
    Storage { code: &'static str, message: String },
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn student_not_found(student_id: i64) -> Self {
        CoreError::NotFound(format!("student {student_id} not found"))
    }

    /// Wire error code used in IPC responses.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound(_) => "not_found",
            CoreError::InvalidWeek(_) => "invalid_week",
            CoreError::Storage { code, .. } => code,
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            CoreError::InvalidWeek(week) => Some(json!({ "week": week, "min": 1, "max": 20 })),
            _ => None,
        }
    }
}

/// Maps a rusqlite failure into a storage error tagged with `code`.
pub fn storage(code: &'static str) -> impl Fn(rusqlite::Error) -> CoreError {
    move |e| CoreError::Storage {
        code,
        message: e.to_string(),
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::NotFound(message) => write!(f, "{message}"),
            CoreError::InvalidWeek(week) => {
                write!(f, "week {week} is outside 1..20")
            }
            CoreError::Storage { code, message } => write!(f, "{code}: {message}"),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::Storage {
            code: "db_query_failed",
            message: e.to_string(),
        }
    }
}
