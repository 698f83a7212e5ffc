//! Row types and read queries shared by several handler families.

use crate::ipc::helpers::{query_err, HandlerErr};
use log::warn;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const PROFILE_DOC_ID: &str = "main_profile";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Institution {
    pub id: String,
    pub name: String,
    pub municipality: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: String,
    pub name: String,
    pub institution_id: String,
    pub level: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<String>,
    pub gender: String,
    pub level: String,
    pub institution_id: String,
    pub status: String,
    pub department_id: Option<String>,
}

impl Student {
    /// "lastName firstName", the order used on every printed list.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.last_name, self.first_name)
    }
}

const STUDENT_COLUMNS: &str =
    "id, first_name, last_name, date_of_birth, gender, level, institution_id, status, department_id";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        first_name: r.get(1)?,
        last_name: r.get(2)?,
        date_of_birth: r.get::<_, Option<String>>(3)?.filter(|s| !s.trim().is_empty()),
        gender: r.get(4)?,
        level: r.get(5)?,
        institution_id: r.get(6)?,
        status: r.get(7)?,
        department_id: r.get(8)?,
    })
}

#[derive(Debug, Default, Clone)]
pub struct StudentFilter {
    pub institution_id: Option<String>,
    pub level: Option<String>,
    pub department_id: Option<String>,
    pub unassigned: bool,
}

/// Ordered by last name, then first name.
pub fn list_students(conn: &Connection, filter: &StudentFilter) -> Result<Vec<Student>, HandlerErr> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<SqlValue> = Vec::new();
    if let Some(v) = &filter.institution_id {
        clauses.push("institution_id = ?");
        binds.push(SqlValue::Text(v.clone()));
    }
    if let Some(v) = &filter.level {
        clauses.push("level = ?");
        binds.push(SqlValue::Text(v.clone()));
    }
    if let Some(v) = &filter.department_id {
        clauses.push("department_id = ?");
        binds.push(SqlValue::Text(v.clone()));
    }
    if filter.unassigned {
        clauses.push("department_id IS NULL");
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {} FROM students {} ORDER BY last_name, first_name, id",
        STUDENT_COLUMNS, where_sql
    );
    let mut stmt = conn.prepare(&sql).map_err(query_err)?;
    stmt.query_map(params_from_iter(binds), student_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_err)
}

pub fn get_student(conn: &Connection, student_id: &str) -> Result<Option<Student>, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS),
        [student_id],
        student_from_row,
    )
    .optional()
    .map_err(query_err)
}

pub fn require_student(conn: &Connection, student_id: &str) -> Result<Student, HandlerErr> {
    get_student(conn, student_id)?.ok_or_else(|| HandlerErr::not_found("student not found"))
}

fn department_from_row(r: &Row<'_>) -> rusqlite::Result<Department> {
    Ok(Department {
        id: r.get(0)?,
        name: r.get(1)?,
        institution_id: r.get(2)?,
        level: r.get(3)?,
    })
}

pub fn list_departments(
    conn: &Connection,
    institution_id: Option<&str>,
) -> Result<Vec<Department>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, institution_id, level
             FROM departments
             WHERE (?1 IS NULL OR institution_id = ?1)
             ORDER BY level, name, id",
        )
        .map_err(query_err)?;
    stmt.query_map([institution_id], department_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_err)
}

pub fn require_department(conn: &Connection, department_id: &str) -> Result<Department, HandlerErr> {
    conn.query_row(
        "SELECT id, name, institution_id, level FROM departments WHERE id = ?",
        [department_id],
        department_from_row,
    )
    .optional()
    .map_err(query_err)?
    .ok_or_else(|| HandlerErr::not_found("department not found"))
}

fn institution_from_row(r: &Row<'_>) -> rusqlite::Result<Institution> {
    Ok(Institution {
        id: r.get(0)?,
        name: r.get(1)?,
        municipality: r.get(2)?,
    })
}

pub fn list_institutions(conn: &Connection) -> Result<Vec<Institution>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT id, name, municipality FROM institutions ORDER BY name, id")
        .map_err(query_err)?;
    stmt.query_map([], institution_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_err)
}

pub fn get_institution(conn: &Connection, id: &str) -> Result<Option<Institution>, HandlerErr> {
    conn.query_row(
        "SELECT id, name, municipality FROM institutions WHERE id = ?",
        [id],
        institution_from_row,
    )
    .optional()
    .map_err(query_err)
}

pub fn require_institution(conn: &Connection, id: &str) -> Result<Institution, HandlerErr> {
    get_institution(conn, id)?.ok_or_else(|| HandlerErr::not_found("institution not found"))
}

pub fn institution_names(conn: &Connection) -> Result<HashMap<String, String>, HandlerErr> {
    Ok(list_institutions(conn)?
        .into_iter()
        .map(|i| (i.id, i.name))
        .collect())
}

/// One student's month: slot number -> status.
#[derive(Debug, Clone)]
pub struct AttendanceDoc {
    pub student_id: String,
    pub department_id: Option<String>,
    pub month: String,
    pub slot_kind: String,
    pub records: BTreeMap<u32, String>,
}

pub fn attendance_doc_id(student_id: &str, month: &str) -> String {
    format!("{}_{}", student_id, month)
}

pub fn parse_records(raw: &str) -> BTreeMap<u32, String> {
    let parsed: BTreeMap<String, String> = match serde_json::from_str(raw) {
        Ok(map) => map,
        Err(e) => {
            warn!(
                "event=attendance_parse module=attendance status=error bytes={} error={}",
                raw.len(),
                e
            );
            BTreeMap::new()
        }
    };
    parsed
        .into_iter()
        .filter_map(|(k, v)| k.trim().parse::<u32>().ok().map(|slot| (slot, v)))
        .collect()
}

pub fn records_json(records: &BTreeMap<u32, String>) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = records
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
        .collect();
    serde_json::Value::Object(map)
}

fn attendance_from_row(r: &Row<'_>) -> rusqlite::Result<AttendanceDoc> {
    let raw: String = r.get(4)?;
    Ok(AttendanceDoc {
        student_id: r.get(0)?,
        department_id: r.get(1)?,
        month: r.get(2)?,
        slot_kind: r.get(3)?,
        records: parse_records(&raw),
    })
}

pub fn get_attendance(
    conn: &Connection,
    student_id: &str,
    month: &str,
) -> Result<Option<AttendanceDoc>, HandlerErr> {
    conn.query_row(
        "SELECT student_id, department_id, month, slot_kind, records
         FROM attendances
         WHERE student_id = ? AND month = ?",
        (student_id, month),
        attendance_from_row,
    )
    .optional()
    .map_err(query_err)
}

/// Keyed by student id.
pub fn attendance_for_month(
    conn: &Connection,
    month: &str,
) -> Result<HashMap<String, AttendanceDoc>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT student_id, department_id, month, slot_kind, records
             FROM attendances
             WHERE month = ?",
        )
        .map_err(query_err)?;
    let docs = stmt
        .query_map([month], attendance_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_err)?;
    Ok(docs.into_iter().map(|d| (d.student_id.clone(), d)).collect())
}

/// Every record whose month key falls in `[from_month, to_month]`.
pub fn attendance_between(
    conn: &Connection,
    from_month: &str,
    to_month: &str,
) -> Result<Vec<AttendanceDoc>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT student_id, department_id, month, slot_kind, records
             FROM attendances
             WHERE month >= ? AND month <= ?
             ORDER BY month, student_id",
        )
        .map_err(query_err)?;
    stmt.query_map((from_month, to_month), attendance_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_err)
}

pub fn attendance_for_student(
    conn: &Connection,
    student_id: &str,
) -> Result<Vec<AttendanceDoc>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT student_id, department_id, month, slot_kind, records
             FROM attendances
             WHERE student_id = ?
             ORDER BY month",
        )
        .map_err(query_err)?;
    stmt.query_map([student_id], attendance_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_err)
}

/// The stored profile document; an empty object when none was saved yet.
pub fn load_profile(conn: &Connection) -> Result<serde_json::Map<String, serde_json::Value>, HandlerErr> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT data FROM professor_profile WHERE id = ?",
            [PROFILE_DOC_ID],
            |r| r.get(0),
        )
        .optional()
        .map_err(query_err)?;
    Ok(raw
        .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default())
}

pub fn profile_str(profile: &serde_json::Map<String, serde_json::Value>, key: &str) -> String {
    profile
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string()
}
