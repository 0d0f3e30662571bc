use rusqlite::{named_params, Connection, OptionalExtension, Row};
use serde_json::json;
use tracing::info;

use crate::error::{storage, CoreError, CoreResult};
use crate::timeline::{self, default_timeline, WeekSlot, SLOT_COLUMNS};

const IDENTITY_COLUMNS: &str =
    "id, name, age, grade, school, phone, parents_phone, home_center";

/// Identity fields of a student; everything the timeline subsystem reads
/// besides the timeline itself.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentIdentity {
    pub id: i64,
    pub name: String,
    pub age: Option<i64>,
    pub grade: Option<String>,
    pub school: Option<String>,
    pub phone: Option<String>,
    pub parents_phone: Option<String>,
    pub home_center: String,
}

impl StudentIdentity {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "name": self.name,
            "age": self.age,
            "grade": self.grade,
            "school": self.school,
            "phone": self.phone,
            "parentsPhone": self.parents_phone,
            "homeCenter": self.home_center
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    pub identity: StudentIdentity,
    pub timeline: Vec<WeekSlot>,
}

impl Student {
    pub fn to_json(&self) -> serde_json::Value {
        let mut v = self.identity.to_json();
        v["weeks"] = serde_json::Value::Array(self.timeline.iter().map(|s| s.to_json()).collect());
        v
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewStudent {
    pub name: String,
    pub age: Option<i64>,
    pub grade: Option<String>,
    pub school: Option<String>,
    pub phone: Option<String>,
    pub parents_phone: Option<String>,
    pub home_center: String,
}

/// Identity patch. `None` leaves a field unchanged; for the nullable fields
/// `Some(None)` clears the stored value.
#[derive(Debug, Clone, Default)]
pub struct StudentPatch {
    pub name: Option<String>,
    pub age: Option<Option<i64>>,
    pub grade: Option<Option<String>>,
    pub school: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub parents_phone: Option<Option<String>>,
    pub home_center: Option<String>,
}

pub(crate) fn identity_from_row(row: &Row<'_>) -> rusqlite::Result<StudentIdentity> {
    Ok(StudentIdentity {
        id: row.get(0)?,
        name: row.get(1)?,
        age: row.get(2)?,
        grade: row.get(3)?,
        school: row.get(4)?,
        phone: row.get(5)?,
        parents_phone: row.get(6)?,
        home_center: row.get(7)?,
    })
}

/// Creates the identity row and its 20 default slots in one transaction.
pub fn create_student(conn: &Connection, new: &NewStudent) -> CoreResult<Student> {
    let tx = conn.unchecked_transaction().map_err(storage("db_tx_failed"))?;
    tx.execute(
        "INSERT INTO students(
           name, age, grade, school, phone, parents_phone, home_center, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?,
           strftime('%Y-%m-%dT%H:%M:%SZ','now'),
           strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &new.name,
            new.age,
            new.grade.as_deref(),
            new.school.as_deref(),
            new.phone.as_deref(),
            new.parents_phone.as_deref(),
            &new.home_center,
        ),
    )
    .map_err(storage("db_insert_failed"))?;
    let student_id = tx.last_insert_rowid();

    {
        let mut stmt = tx
            .prepare("INSERT INTO student_weeks(student_id, week) VALUES(?, ?)")
            .map_err(storage("db_insert_failed"))?;
        for slot in default_timeline() {
            stmt.execute((student_id, slot.week))
                .map_err(storage("db_insert_failed"))?;
        }
    }
    tx.commit().map_err(storage("db_commit_failed"))?;

    info!(student_id, "student created");
    get_student(conn, student_id)
}

pub fn find_identity(conn: &Connection, student_id: i64) -> CoreResult<Option<StudentIdentity>> {
    conn.query_row(
        &format!("SELECT {IDENTITY_COLUMNS} FROM students WHERE id = ?"),
        [student_id],
        identity_from_row,
    )
    .optional()
    .map_err(storage("db_query_failed"))
}

pub fn student_exists(conn: &Connection, student_id: i64) -> CoreResult<bool> {
    conn.query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(storage("db_query_failed"))
}

pub fn load_timeline(conn: &Connection, student_id: i64) -> CoreResult<Vec<WeekSlot>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {SLOT_COLUMNS} FROM student_weeks WHERE student_id = ? ORDER BY week"
        ))
        .map_err(storage("db_query_failed"))?;
    let slots = stmt
        .query_map([student_id], timeline::slot_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(storage("db_query_failed"))?;
    Ok(slots)
}

/// `GetStudent`: identity plus the full timeline.
pub fn get_student(conn: &Connection, student_id: i64) -> CoreResult<Student> {
    let identity =
        find_identity(conn, student_id)?.ok_or_else(|| CoreError::student_not_found(student_id))?;
    let timeline = load_timeline(conn, student_id)?;
    if !timeline::is_well_formed(&timeline) {
        return Err(CoreError::Storage {
            code: "timeline_corrupt",
            message: format!(
                "student {student_id} has {} timeline slots, expected 20",
                timeline.len()
            ),
        });
    }
    Ok(Student { identity, timeline })
}

pub fn list_students(conn: &Connection) -> CoreResult<Vec<StudentIdentity>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {IDENTITY_COLUMNS} FROM students ORDER BY id"))
        .map_err(storage("db_query_failed"))?;
    let rows = stmt
        .query_map([], identity_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(storage("db_query_failed"))?;
    Ok(rows)
}

/// Patches identity fields only; the timeline is never touched here.
pub fn update_student(
    conn: &Connection,
    student_id: i64,
    patch: &StudentPatch,
) -> CoreResult<StudentIdentity> {
    let changed = conn
        .execute(
            "UPDATE students SET
               name = COALESCE(:name, name),
               age = CASE WHEN :age_set THEN :age ELSE age END,
               grade = CASE WHEN :grade_set THEN :grade ELSE grade END,
               school = CASE WHEN :school_set THEN :school ELSE school END,
               phone = CASE WHEN :phone_set THEN :phone ELSE phone END,
               parents_phone = CASE WHEN :parents_phone_set THEN :parents_phone
                                    ELSE parents_phone END,
               home_center = COALESCE(:home_center, home_center),
               updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
             WHERE id = :id",
            named_params! {
                ":name": patch.name.as_deref(),
                ":age_set": patch.age.is_some(),
                ":age": patch.age.flatten(),
                ":grade_set": patch.grade.is_some(),
                ":grade": patch.grade.as_ref().and_then(Option::as_deref),
                ":school_set": patch.school.is_some(),
                ":school": patch.school.as_ref().and_then(Option::as_deref),
                ":phone_set": patch.phone.is_some(),
                ":phone": patch.phone.as_ref().and_then(Option::as_deref),
                ":parents_phone_set": patch.parents_phone.is_some(),
                ":parents_phone": patch.parents_phone.as_ref().and_then(Option::as_deref),
                ":home_center": patch.home_center.as_deref(),
                ":id": student_id,
            },
        )
        .map_err(storage("db_update_failed"))?;
    if changed == 0 {
        return Err(CoreError::student_not_found(student_id));
    }
    find_identity(conn, student_id)?.ok_or_else(|| CoreError::student_not_found(student_id))
}

/// Removes the student and their slots. Ledger records are kept.
pub fn delete_student(conn: &Connection, student_id: i64) -> CoreResult<()> {
    let tx = conn.unchecked_transaction().map_err(storage("db_tx_failed"))?;
    tx.execute("DELETE FROM student_weeks WHERE student_id = ?", [student_id])
        .map_err(storage("db_delete_failed"))?;
    let removed = tx
        .execute("DELETE FROM students WHERE id = ?", [student_id])
        .map_err(storage("db_delete_failed"))?;
    if removed == 0 {
        // Dropping the transaction rolls it back.
        return Err(CoreError::student_not_found(student_id));
    }
    tx.commit().map_err(storage("db_commit_failed"))?;
    info!(student_id, "student deleted");
    Ok(())
}
