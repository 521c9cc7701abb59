use crate::model::{ClassRecord, Student, StudentDraft};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

pub const DB_FILE: &str = "trackedu.sqlite3";

const NOW_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%fZ','now')";

pub fn open_db(workspace: &Path, busy_timeout: Duration) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    // Must be set before anything else touches the file: other sidecars may
    // be migrating the same workspace.
    conn.busy_timeout(busy_timeout)?;

    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(journal_mode = %mode, "database is not in WAL mode");
    }
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS config(
            key TEXT PRIMARY KEY,
            doc TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            teacher TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            name TEXT NOT NULL,
            class_id TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT,
            dob TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    // Not UNIQUE: manually entered ids are stored as given.
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_student_id ON students(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            subject TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notices(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            author TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notices_created ON notices(created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_accounts(
            student_id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            password_salt TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    Ok(conn)
}

/// Raw scheme document and its version, if present.
pub fn config_doc_get(conn: &Connection, key: &str) -> rusqlite::Result<Option<(String, i64)>> {
    conn.query_row(
        "SELECT doc, version FROM config WHERE key = ?",
        [key],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()
}

pub const STUDENT_COLUMNS: &str =
    "id, student_id, name, class_id, email, phone, dob, created_at, updated_at";

pub fn student_from_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        student_id: row.get(1)?,
        name: row.get(2)?,
        class_id: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        dob: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub fn insert_student(
    conn: &Connection,
    draft: &StudentDraft,
    student_id: &str,
) -> rusqlite::Result<Student> {
    let id = Uuid::new_v4().to_string();
    let sql = format!(
        "INSERT INTO students(id, student_id, name, class_id, email, phone, dob, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, {NOW_SQL})"
    );
    conn.execute(
        &sql,
        params![
            &id,
            student_id,
            draft.name.trim(),
            &draft.class_id,
            draft.email.trim(),
            draft.phone.as_deref(),
            draft.dob.as_deref(),
        ],
    )?;
    get_student(conn, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn get_student(conn: &Connection, id: &str) -> rusqlite::Result<Option<Student>> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?");
    conn.query_row(&sql, [id], student_from_row).optional()
}

pub fn list_students(conn: &Connection, class_id: Option<&str>) -> rusqlite::Result<Vec<Student>> {
    match class_id {
        Some(cid) => {
            let sql = format!(
                "SELECT {STUDENT_COLUMNS} FROM students WHERE class_id = ?
                 ORDER BY student_id, name, rowid"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([cid], student_from_row)?;
            rows.collect()
        }
        None => {
            let sql =
                format!("SELECT {STUDENT_COLUMNS} FROM students ORDER BY student_id, name, rowid");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], student_from_row)?;
            rows.collect()
        }
    }
}

pub fn list_classes(conn: &Connection) -> rusqlite::Result<Vec<ClassRecord>> {
    let mut stmt = conn.prepare("SELECT id, name, teacher FROM classes ORDER BY name, rowid")?;
    let rows = stmt.query_map([], |r| {
        Ok(ClassRecord {
            id: r.get(0)?,
            name: r.get(1)?,
            teacher: r.get(2)?,
        })
    })?;
    rows.collect()
}

pub fn get_class(conn: &Connection, id: &str) -> rusqlite::Result<Option<ClassRecord>> {
    conn.query_row(
        "SELECT id, name, teacher FROM classes WHERE id = ?",
        [id],
        |r| {
            Ok(ClassRecord {
                id: r.get(0)?,
                name: r.get(1)?,
                teacher: r.get(2)?,
            })
        },
    )
    .optional()
}

pub fn now_sql() -> &'static str {
    NOW_SQL
}

pub fn count_rows(conn: &Connection, table: &str) -> rusqlite::Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    conn.query_row(&sql, [], |r| r.get(0))
}
