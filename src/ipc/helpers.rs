use rusqlite::Connection;
use tracing::warn;

use crate::error::CoreError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, req: &Request) -> serde_json::Value {
        warn!(
            method = %req.method,
            request_id = %req.id,
            code = self.code,
            message = %self.message,
            "request failed"
        );
        err(&req.id, self.code, self.message, self.details)
    }
}

impl From<CoreError> for HandlerErr {
    fn from(e: CoreError) -> Self {
        HandlerErr {
            code: e.code(),
            details: e.details(),
            message: e.to_string(),
        }
    }
}

/// Runs `f` against the open workspace and wraps the outcome in a response.
pub fn with_conn<F>(state: &AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return HandlerErr {
            code: "no_workspace",
            message: "select a workspace first".to_string(),
            details: None,
        }
        .response(req);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(req),
    }
}

pub fn required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let value = params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    if value.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(value)
}

/// Trimmed string, `None` when absent, null or blank.
pub fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn required_bool(params: &serde_json::Value, key: &str) -> Result<bool, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a boolean", key)))
}

pub fn required_f64(params: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key)))
}

fn as_i64_lenient(v: &serde_json::Value) -> Option<i64> {
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
}

/// Student ids arrive as numbers or as numeric strings (scanned codes).
pub fn student_id(params: &serde_json::Value) -> Result<i64, HandlerErr> {
    let Some(raw) = params.get("studentId") else {
        return Err(HandlerErr::bad_params("missing studentId"));
    };
    as_i64_lenient(raw).ok_or_else(|| HandlerErr::bad_params("studentId must be an integer"))
}

/// Week number; a request without one targets week 1.
pub fn week(params: &serde_json::Value, method: &str) -> Result<i64, HandlerErr> {
    match params.get("week") {
        None | Some(serde_json::Value::Null) => {
            warn!(method, "request without week, defaulting to week 1");
            Ok(1)
        }
        Some(raw) => {
            as_i64_lenient(raw).ok_or_else(|| HandlerErr::bad_params("week must be an integer"))
        }
    }
}
