use anyhow::Context;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub const DB_FILE_NAME: &str = "sessiond.sqlite3";

pub fn open_db(workspace: &Path, busy_timeout: Duration) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.display()))?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    conn.busy_timeout(busy_timeout)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            age INTEGER,
            grade TEXT,
            school TEXT,
            phone TEXT,
            parents_phone TEXT,
            home_center TEXT NOT NULL,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    // One row per (student, week); rows are created with the student and never removed
    // while the student exists.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_weeks(
            student_id INTEGER NOT NULL,
            week INTEGER NOT NULL CHECK(week BETWEEN 1 AND 20),
            attended INTEGER NOT NULL DEFAULT 0,
            attended_at TEXT,
            attendance_center TEXT,
            homework_done INTEGER NOT NULL DEFAULT 0,
            payment_received INTEGER NOT NULL DEFAULT 0,
            quiz_obtained REAL,
            quiz_out_of REAL,
            notification_sent INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(student_id, week),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    // No foreign key: ledger records outlive the student row they reference.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_history(
            id TEXT PRIMARY KEY,
            student_id INTEGER NOT NULL,
            week INTEGER NOT NULL,
            home_center TEXT NOT NULL,
            attendance_center TEXT NOT NULL,
            attended_at TEXT NOT NULL,
            homework_done INTEGER NOT NULL DEFAULT 0,
            payment_received INTEGER NOT NULL DEFAULT 0,
            quiz_obtained REAL,
            quiz_out_of REAL,
            notification_sent INTEGER NOT NULL DEFAULT 0,
            recorded_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_history_student ON attendance_history(student_id)",
        [],
    )?;

    let backfilled = backfill_missing_slots(&conn)?;
    if backfilled > 0 {
        warn!(slots = backfilled, "backfilled missing timeline slots");
    }

    info!(path = %db_path.display(), journal_mode = %mode, "workspace database ready");
    Ok(conn)
}

/// Inserts default rows for any (student, week) pair that is missing.
pub fn backfill_missing_slots(conn: &Connection) -> anyhow::Result<usize> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO student_weeks(student_id, week)
             WITH RECURSIVE weeks(w) AS (
               SELECT 1 UNION ALL SELECT w + 1 FROM weeks WHERE w < 20
             )
             SELECT s.id, weeks.w FROM students s CROSS JOIN weeks",
            [],
        )
        .context("failed to backfill student_weeks")?;
    Ok(inserted)
}
