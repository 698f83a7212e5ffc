use crate::ipc::helpers::{
    get_optional_str, get_required_str, get_str_array, with_conn, write_err, HandlerErr,
};
use crate::ipc::queries::{
    get_student, list_departments, list_students, require_department, require_institution,
    Department, StudentFilter,
};
use crate::ipc::types::{AppState, Request};
use log::info;
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

/// Every listed student must exist, belong to the department's institution
/// and level, and not sit in another department yet.
fn check_assignable(
    conn: &Connection,
    institution_id: &str,
    level: &str,
    student_ids: &[String],
) -> Result<(), HandlerErr> {
    let mut missing: Vec<&str> = Vec::new();
    let mut mismatched: Vec<&str> = Vec::new();
    let mut already_assigned: Vec<&str> = Vec::new();
    for id in student_ids {
        match get_student(conn, id)? {
            None => missing.push(id),
            Some(s) if s.institution_id != institution_id || s.level != level => {
                mismatched.push(id)
            }
            Some(s) if s.department_id.is_some() => already_assigned.push(id),
            Some(_) => {}
        }
    }
    if missing.is_empty() && mismatched.is_empty() && already_assigned.is_empty() {
        return Ok(());
    }
    Err(
        HandlerErr::bad_params("some students cannot join this department").with_details(json!({
            "missing": missing,
            "mismatched": mismatched,
            "alreadyAssigned": already_assigned
        })),
    )
}

fn assign_all(conn: &Connection, department_id: &str, student_ids: &[String]) -> Result<usize, HandlerErr> {
    let mut n = 0usize;
    for id in student_ids {
        n += conn
            .execute(
                "UPDATE students SET department_id = ?, updated_at = datetime('now') WHERE id = ?",
                (department_id, id),
            )
            .map_err(write_err("db_update_failed", "students"))?;
    }
    Ok(n)
}

fn department_json(conn: &Connection, d: &Department) -> Result<Value, HandlerErr> {
    let students = list_students(
        conn,
        &StudentFilter {
            department_id: Some(d.id.clone()),
            ..StudentFilter::default()
        },
    )?;
    let rows: Vec<Value> = students
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "firstName": s.first_name,
                "lastName": s.last_name,
                "gender": s.gender,
                "status": s.status
            })
        })
        .collect();
    let mut v = json!(d);
    v["studentCount"] = json!(rows.len());
    v["students"] = json!(rows);
    Ok(v)
}

fn departments_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let institution_id = get_optional_str(params, "institutionId")?;
    let departments = list_departments(conn, institution_id.as_deref())?;
    let rows = departments
        .iter()
        .map(|d| department_json(conn, d))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "departments": rows }))
}

fn departments_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let institution_id = get_required_str(params, "institutionId")?;
    let level = get_required_str(params, "level")?;
    let student_ids = match params.get("studentIds") {
        None | Some(Value::Null) => Vec::new(),
        Some(_) => get_str_array(params, "studentIds")?,
    };
    require_institution(conn, &institution_id)?;
    check_assignable(conn, &institution_id, &level, &student_ids)?;

    let department_id = Uuid::new_v4().to_string();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "INSERT INTO departments(id, name, institution_id, level) VALUES(?, ?, ?, ?)",
        (&department_id, &name, &institution_id, &level),
    )
    .map_err(write_err("db_insert_failed", "departments"))?;
    let assigned = assign_all(&tx, &department_id, &student_ids)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    info!(
        "event=department_create module=departments status=ok department_id={} assigned={}",
        department_id, assigned
    );
    Ok(json!({ "departmentId": department_id, "assigned": assigned }))
}

fn departments_rename(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let department_id = get_required_str(params, "departmentId")?;
    let name = get_required_str(params, "name")?;
    require_department(conn, &department_id)?;
    conn.execute(
        "UPDATE departments SET name = ? WHERE id = ?",
        (&name, &department_id),
    )
    .map_err(write_err("db_update_failed", "departments"))?;
    Ok(json!({ "ok": true }))
}

fn departments_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let department_id = get_required_str(params, "departmentId")?;
    require_department(conn, &department_id)?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let released = tx
        .execute(
            "UPDATE students SET department_id = NULL, updated_at = datetime('now')
             WHERE department_id = ?",
            [&department_id],
        )
        .map_err(write_err("db_update_failed", "students"))?;
    tx.execute("DELETE FROM departments WHERE id = ?", [&department_id])
        .map_err(write_err("db_delete_failed", "departments"))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    info!(
        "event=department_delete module=departments status=ok department_id={} released={}",
        department_id, released
    );
    Ok(json!({ "ok": true, "releasedStudents": released }))
}

fn departments_assign_students(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let department_id = get_required_str(params, "departmentId")?;
    let student_ids = get_str_array(params, "studentIds")?;
    let department = require_department(conn, &department_id)?;
    check_assignable(conn, &department.institution_id, &department.level, &student_ids)?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let assigned = assign_all(&tx, &department_id, &student_ids)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "assigned": assigned }))
}

fn departments_unassign_students(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let department_id = get_required_str(params, "departmentId")?;
    let student_ids = get_str_array(params, "studentIds")?;
    require_department(conn, &department_id)?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let mut released = 0usize;
    for id in &student_ids {
        released += tx
            .execute(
                "UPDATE students SET department_id = NULL, updated_at = datetime('now')
                 WHERE id = ? AND department_id = ?",
                (id, &department_id),
            )
            .map_err(write_err("db_update_failed", "students"))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "unassigned": released }))
}

fn departments_unassigned_students(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let filter = StudentFilter {
        institution_id: Some(get_required_str(params, "institutionId")?),
        level: Some(get_required_str(params, "level")?),
        department_id: None,
        unassigned: true,
    };
    let rows: Vec<Value> = list_students(conn, &filter)?
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "displayName": s.display_name(),
                "gender": s.gender,
                "status": s.status
            })
        })
        .collect();
    Ok(json!({ "students": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "departments.list" => Some(with_conn(state, req, departments_list)),
        "departments.create" => Some(with_conn(state, req, departments_create)),
        "departments.rename" => Some(with_conn(state, req, departments_rename)),
        "departments.delete" => Some(with_conn(state, req, departments_delete)),
        "departments.assignStudents" => Some(with_conn(state, req, departments_assign_students)),
        "departments.unassignStudents" => {
            Some(with_conn(state, req, departments_unassign_students))
        }
        "departments.unassignedStudents" => {
            Some(with_conn(state, req, departments_unassigned_students))
        }
        _ => None,
    }
}
