use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::NaiveDate;
use sessiond::students::{self, NewStudent};
use sessiond::{db, weeks};
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

struct BufferWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for SharedBuffer {
    type Writer = BufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        BufferWriter(Arc::clone(&self.0))
    }
}

impl io::Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "lock poisoned"))?;
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn attendance_append_emits_audit_event() {
    let workspace = std::env::temp_dir().join(format!(
        "sessiond-audit-{}",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    let conn = db::open_db(&workspace, Duration::from_millis(5000)).expect("open db");
    let student = students::create_student(
        &conn,
        &NewStudent {
            name: "Audit Trail".to_string(),
            home_center: "Dokki".to_string(),
            ..Default::default()
        },
    )
    .expect("create student");
    let at = NaiveDate::from_ymd_opt(2024, 10, 1)
        .and_then(|d| d.and_hms_opt(18, 0, 0))
        .expect("valid date");

    let sink = SharedBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(sink.clone())
        .json()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        weeks::mark_attendance(&conn, student.identity.id, 6, at, "Maadi").expect("mark");
    });

    let bytes = sink.0.lock().expect("lock output").clone();
    let text = String::from_utf8(bytes).expect("utf8 log output");
    let audit: Vec<serde_json::Value> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).expect("json log line"))
        .filter(|v: &serde_json::Value| {
            v.get("target").and_then(|t| t.as_str()) == Some("sessiond_audit")
        })
        .collect();
    assert_eq!(audit.len(), 1);

    let fields = audit[0].get("fields").expect("fields object");
    assert_eq!(
        fields.get("student_id").and_then(|v| v.as_i64()),
        Some(student.identity.id)
    );
    assert_eq!(fields.get("week").and_then(|v| v.as_i64()), Some(6));
    assert_eq!(
        fields.get("attendance_center").and_then(|v| v.as_str()),
        Some("Maadi")
    );
    assert!(fields.get("record_id").and_then(|v| v.as_str()).is_some());

    drop(conn);
    let _ = std::fs::remove_dir_all(workspace);
}
