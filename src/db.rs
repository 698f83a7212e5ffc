use log::{error, info};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Instant;

pub const DB_FILE_NAME: &str = "school.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    let started_at = Instant::now();
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = match Connection::open(&db_path) {
        Ok(c) => c,
        Err(e) => {
            error!(
                "event=db_open module=db status=error path={} error={}",
                db_path.display(),
                e
            );
            return Err(e.into());
        }
    };
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    create_schema(&conn)?;
    info!(
        "event=db_open module=db status=ok path={} duration_ms={}",
        db_path.display(),
        started_at.elapsed().as_millis()
    );
    Ok(conn)
}

fn create_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS institutions(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            municipality TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            institution_id TEXT NOT NULL,
            level TEXT NOT NULL,
            FOREIGN KEY(institution_id) REFERENCES institutions(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_departments_institution ON departments(institution_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            date_of_birth TEXT,
            gender TEXT NOT NULL,
            level TEXT NOT NULL,
            institution_id TEXT NOT NULL,
            status TEXT NOT NULL,
            department_id TEXT,
            updated_at TEXT,
            FOREIGN KEY(institution_id) REFERENCES institutions(id),
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_institution_level ON students(institution_id, level)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_department ON students(department_id)",
        [],
    )?;

    // department_id is a snapshot taken at write time, so no foreign key:
    // records outlive the department they were taken in.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendances(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            department_id TEXT,
            month TEXT NOT NULL,
            slot_kind TEXT NOT NULL DEFAULT 'week',
            records TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(student_id, month)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendances_month ON attendances(month)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendances_department_month ON attendances(department_id, month)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS professor_profile(
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
