use crate::ipc::helpers::{
    optional_str, required_bool, required_f64, student_id, week, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::timeline::{parse_iso_stamp, parse_stamp_display};
use crate::weeks;
use chrono::{NaiveDateTime, Timelike};

/// Resolves the attendance moment and center from either `attendedAt` + `center`
/// or the legacy `lastAttendance` display string. Falls back to local now.
fn attendance_stamp(params: &serde_json::Value) -> Result<(NaiveDateTime, String), HandlerErr> {
    let mut center =
        optional_str(params, "center").or_else(|| optional_str(params, "lastAttendanceCenter"));
    let at = if let Some(raw) = optional_str(params, "attendedAt") {
        parse_iso_stamp(&raw).ok_or_else(|| {
            HandlerErr::bad_params("attendedAt must be YYYY-MM-DDTHH:MM[:SS] or RFC 3339")
        })?
    } else if let Some(raw) = optional_str(params, "lastAttendance") {
        let (at, stamp_center) = parse_stamp_display(&raw).ok_or_else(|| {
            HandlerErr::bad_params("lastAttendance must look like DD/MM/YYYY in <center> at HH:MM AM")
        })?;
        center = center.or(Some(stamp_center));
        at
    } else {
        let now = chrono::Local::now().naive_local();
        now.with_nanosecond(0).unwrap_or(now)
    };
    let center = center.ok_or_else(|| HandlerErr::bad_params("missing center"))?;
    Ok((at, center))
}

fn handle_mark_attendance(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_conn(state, req, |conn, params| {
        let id = student_id(params)?;
        let week = week(params, &req.method)?;
        let (at, center) = attendance_stamp(params)?;
        let slot = weeks::mark_attendance(conn, id, week, at, &center)?;
        Ok(slot.to_json())
    })
}

fn handle_set_homework(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_conn(state, req, |conn, params| {
        let id = student_id(params)?;
        let week = week(params, &req.method)?;
        let done = required_bool(params, "done")?;
        Ok(weeks::set_homework_state(conn, id, week, done)?.to_json())
    })
}

fn handle_set_payment(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_conn(state, req, |conn, params| {
        let id = student_id(params)?;
        let week = week(params, &req.method)?;
        let paid = required_bool(params, "paid")?;
        Ok(weeks::set_payment_state(conn, id, week, paid)?.to_json())
    })
}

fn handle_record_quiz(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_conn(state, req, |conn, params| {
        let id = student_id(params)?;
        let week = week(params, &req.method)?;
        let obtained = required_f64(params, "obtained")?;
        let out_of = required_f64(params, "outOf")?;
        Ok(weeks::record_quiz_score(conn, id, week, obtained, out_of)?.to_json())
    })
}

fn handle_set_notification(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_conn(state, req, |conn, params| {
        let id = student_id(params)?;
        let week = week(params, &req.method)?;
        let sent = required_bool(params, "sent")?;
        Ok(weeks::set_notification_state(conn, id, week, sent)?.to_json())
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "weeks.markAttendance" => Some(handle_mark_attendance(state, req)),
        "weeks.setHomework" => Some(handle_set_homework(state, req)),
        "weeks.setPayment" => Some(handle_set_payment(state, req)),
        "weeks.recordQuiz" => Some(handle_record_quiz(state, req)),
        "weeks.setNotification" => Some(handle_set_notification(state, req)),
        _ => None,
    }
}
