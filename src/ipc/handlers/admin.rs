use std::path::{Path, PathBuf};

use crate::backup;
use crate::integrity;
use crate::ipc::helpers::{optional_str, student_id, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::reset;
use crate::students;
use rusqlite::Connection;
use serde_json::json;
use tracing::info;

fn handle_reset_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_conn(state, req, |conn, params| {
        let id = student_id(params)?;
        reset::reset_one_student(conn, id)?;
        Ok(students::get_student(conn, id)?.to_json())
    })
}

fn backup_failed(path: &Path, message: String) -> HandlerErr {
    HandlerErr {
        code: "backup_failed",
        message,
        details: Some(json!({ "path": path.to_string_lossy() })),
    }
}

/// Snapshots the workspace into `out` after folding the WAL into the main file.
fn snapshot_workspace(conn: &Connection, workspace: &Path, out: &Path) -> Result<(), HandlerErr> {
    conn.query_row("PRAGMA wal_checkpoint(FULL)", [], |_| Ok(()))
        .map_err(|e| backup_failed(out, format!("wal checkpoint failed: {e}")))?;
    let summary = backup::export_workspace_bundle(workspace, out)
        .map_err(|e| backup_failed(out, format!("{e:#}")))?;
    info!(path = %out.display(), db_sha256 = %summary.db_sha256, "pre-reset backup written");
    Ok(())
}

fn handle_reset_all(state: &mut AppState, req: &Request) -> serde_json::Value {
    let backup_target = optional_str(&req.params, "backupPath")
        .map(PathBuf::from)
        .or_else(|| {
            state
                .config
                .reset_backup_dir
                .as_deref()
                .map(backup::reset_snapshot_path)
        });
    let workspace = state.workspace.clone();

    with_conn(state, req, |conn, _params| {
        if let (Some(out), Some(workspace)) = (backup_target.as_deref(), workspace.as_deref()) {
            snapshot_workspace(conn, workspace, out)?;
        }
        let summary = reset::reset_all(conn)?;
        Ok(json!({
            "studentsUpdated": summary.students_updated,
            "historyRecordsDeleted": summary.history_records_deleted,
            "backupPath": backup_target.as_ref().map(|p| p.to_string_lossy().to_string())
        }))
    })
}

fn handle_check_timelines(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_conn(state, req, |conn, _params| {
        Ok(integrity::check_timelines(conn)?.to_json())
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "admin.resetStudent" => Some(handle_reset_student(state, req)),
        "admin.resetAll" => Some(handle_reset_all(state, req)),
        "admin.checkTimelines" => Some(handle_check_timelines(state, req)),
        _ => None,
    }
}
