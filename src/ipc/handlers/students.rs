use crate::ipc::helpers::{optional_str, required_str, student_id, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::students::{self, NewStudent, StudentPatch};
use serde_json::json;

fn optional_age(params: &serde_json::Value) -> Result<Option<i64>, HandlerErr> {
    match params.get("age") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params("age must be an integer")),
    }
}

/// Patch value of a nullable text field: absent keeps it, `null` or blank clears it.
fn nullable_str(patch: &serde_json::Value, key: &str) -> Result<Option<Option<String>>, HandlerErr> {
    match patch.get(key) {
        None => Ok(None),
        Some(serde_json::Value::Null) => Ok(Some(None)),
        Some(serde_json::Value::String(s)) => {
            let s = s.trim();
            Ok(Some((!s.is_empty()).then(|| s.to_string())))
        }
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a string or null", key))),
    }
}

fn nullable_age(patch: &serde_json::Value) -> Result<Option<Option<i64>>, HandlerErr> {
    match patch.get("age") {
        None => Ok(None),
        Some(_) => optional_age(patch).map(Some),
    }
}

/// Patch value of a required text field: absent keeps it, anything else must be non-blank.
fn required_patch_str(patch: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match patch.get(key) {
        None => Ok(None),
        Some(_) => required_str(patch, key).map(Some),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_conn(state, req, |conn, params| {
        let new = NewStudent {
            name: required_str(params, "name")?,
            age: optional_age(params)?,
            grade: optional_str(params, "grade"),
            school: optional_str(params, "school"),
            phone: optional_str(params, "phone"),
            parents_phone: optional_str(params, "parentsPhone"),
            home_center: required_str(params, "homeCenter")?,
        };
        let student = students::create_student(conn, &new)?;
        Ok(json!({ "studentId": student.identity.id, "student": student.to_json() }))
    })
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_conn(state, req, |conn, params| {
        let student = students::get_student(conn, student_id(params)?)?;
        Ok(student.to_json())
    })
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_conn(state, req, |conn, _params| {
        let rows = students::list_students(conn)?;
        Ok(json!({
            "students": rows.iter().map(|s| s.to_json()).collect::<Vec<_>>()
        }))
    })
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_conn(state, req, |conn, params| {
        let id = student_id(params)?;
        let Some(patch) = params.get("patch").filter(|v| v.is_object()) else {
            return Err(HandlerErr::bad_params("missing patch"));
        };
        if patch.get("weeks").is_some() {
            return Err(HandlerErr::bad_params(
                "weeks cannot be patched; use the weeks.* methods",
            ));
        }
        let patch = StudentPatch {
            name: required_patch_str(patch, "name")?,
            age: nullable_age(patch)?,
            grade: nullable_str(patch, "grade")?,
            school: nullable_str(patch, "school")?,
            phone: nullable_str(patch, "phone")?,
            parents_phone: nullable_str(patch, "parentsPhone")?,
            home_center: required_patch_str(patch, "homeCenter")?,
        };
        let identity = students::update_student(conn, id, &patch)?;
        Ok(identity.to_json())
    })
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_conn(state, req, |conn, params| {
        let id = student_id(params)?;
        students::delete_student(conn, id)?;
        Ok(json!({ "ok": true, "studentId": id }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(handle_students_create(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
