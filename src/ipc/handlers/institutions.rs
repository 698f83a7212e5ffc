use crate::ipc::helpers::{get_required_str, query_err, with_conn, write_err, HandlerErr};
use crate::ipc::queries::require_institution;
use crate::ipc::types::{AppState, Request};
use log::info;
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

fn institutions_list(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT
               i.id,
               i.name,
               i.municipality,
               (SELECT COUNT(*) FROM students s WHERE s.institution_id = i.id) AS student_count,
               (SELECT COUNT(*) FROM departments d WHERE d.institution_id = i.id) AS department_count
             FROM institutions i
             ORDER BY i.name, i.id",
        )
        .map_err(query_err)?;
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "municipality": r.get::<_, String>(2)?,
                "studentCount": r.get::<_, i64>(3)?,
                "departmentCount": r.get::<_, i64>(4)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_err)?;
    Ok(json!({ "institutions": rows }))
}

fn institutions_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let municipality = get_required_str(params, "municipality")?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO institutions(id, name, municipality) VALUES(?, ?, ?)",
        (&id, &name, &municipality),
    )
    .map_err(write_err("db_insert_failed", "institutions"))?;
    info!("event=institution_create module=institutions status=ok institution_id={}", id);
    Ok(json!({ "institutionId": id, "name": name, "municipality": municipality }))
}

fn institutions_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let institution_id = get_required_str(params, "institutionId")?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };
    let mut current = require_institution(conn, &institution_id)?;
    for (k, v) in patch {
        let value = v
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a non-empty string", k)))?;
        match k.as_str() {
            "name" => current.name = value,
            "municipality" => current.municipality = value,
            other => {
                return Err(HandlerErr::bad_params(format!("unknown institution field: {}", other)))
            }
        }
    }
    conn.execute(
        "UPDATE institutions SET name = ?, municipality = ? WHERE id = ?",
        (&current.name, &current.municipality, &institution_id),
    )
    .map_err(write_err("db_update_failed", "institutions"))?;
    Ok(json!({ "ok": true }))
}

fn institutions_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let institution_id = get_required_str(params, "institutionId")?;
    require_institution(conn, &institution_id)?;
    let (students, departments): (i64, i64) = conn
        .query_row(
            "SELECT
               (SELECT COUNT(*) FROM students WHERE institution_id = ?1),
               (SELECT COUNT(*) FROM departments WHERE institution_id = ?1)",
            [&institution_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .map_err(query_err)?;
    if students > 0 || departments > 0 {
        return Err(HandlerErr::new(
            "in_use",
            "institution still has students or departments",
        )
        .with_details(json!({ "students": students, "departments": departments })));
    }
    conn.execute("DELETE FROM institutions WHERE id = ?", [&institution_id])
        .map_err(write_err("db_delete_failed", "institutions"))?;
    info!(
        "event=institution_delete module=institutions status=ok institution_id={}",
        institution_id
    );
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "institutions.list" => Some(with_conn(state, req, institutions_list)),
        "institutions.create" => Some(with_conn(state, req, institutions_create)),
        "institutions.update" => Some(with_conn(state, req, institutions_update)),
        "institutions.delete" => Some(with_conn(state, req, institutions_delete)),
        _ => None,
    }
}
