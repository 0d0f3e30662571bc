//! Response envelopes written to stdout, one JSON object per line.

use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({ "id": id, "ok": true, "result": result })
}

fn error_body(code: &str, message: String, details: Option<serde_json::Value>) -> serde_json::Value {
    match details {
        Some(details) => json!({ "code": code, "message": message, "details": details }),
        None => json!({ "code": code, "message": message }),
    }
}

/// Failure envelope; `details` is omitted rather than sent as `null`.
pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    json!({ "id": id, "ok": false, "error": error_body(code, message.into(), details) })
}

/// Reply to a line that did not decode as a request, so there is no id to echo.
pub fn bad_json(message: impl Into<String>) -> serde_json::Value {
    json!({ "ok": false, "error": error_body("bad_json", message.into(), None) })
}
