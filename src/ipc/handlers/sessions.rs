use crate::ipc::helpers::{optional_str, week, with_conn};
use crate::ipc::types::{AppState, Request};
use crate::roster;

fn handle_sessions_roster(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_conn(state, req, |conn, params| {
        let week = week(params, &req.method)?;
        let center = optional_str(params, "center");
        let entries = roster::session_roster(conn, week, center.as_deref())?;
        Ok(roster::roster_json(&entries))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sessions.roster" => Some(handle_sessions_roster(state, req)),
        _ => None,
    }
}
