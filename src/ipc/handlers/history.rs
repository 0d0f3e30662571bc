use crate::history;
use crate::ipc::helpers::{student_id, with_conn};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_history_query(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_conn(state, req, |conn, _params| {
        let views = history::query_history(conn)?;
        Ok(json!({
            "students": views.iter().map(|v| v.to_json()).collect::<Vec<_>>()
        }))
    })
}

fn handle_history_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_conn(state, req, |conn, params| {
        let id = student_id(params)?;
        let records = history::history_for_student(conn, id)?;
        Ok(json!({
            "studentId": id,
            "historyRecords": records.iter().map(|r| r.to_json()).collect::<Vec<_>>()
        }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "history.query" => Some(handle_history_query(state, req)),
        "history.student" => Some(handle_history_student(state, req)),
        _ => None,
    }
}
