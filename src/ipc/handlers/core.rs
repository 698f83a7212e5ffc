use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{query_err, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use log::info;
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            info!(
                "event=workspace_select module=core status=ok path={}",
                path.display()
            );
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:#}"), None),
    }
}

fn count(conn: &Connection, sql: &str) -> Result<i64, HandlerErr> {
    conn.query_row(sql, [], |r| r.get(0)).map_err(query_err)
}

fn dashboard_summary(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({
        "totalStudents": count(conn, "SELECT COUNT(*) FROM students")?,
        "totalMales": count(conn, "SELECT COUNT(*) FROM students WHERE gender = 'male'")?,
        "totalFemales": count(conn, "SELECT COUNT(*) FROM students WHERE gender = 'female'")?,
        "activeStudents": count(conn, "SELECT COUNT(*) FROM students WHERE status = 'active'")?,
        "exemptStudents": count(conn, "SELECT COUNT(*) FROM students WHERE status = 'exempt'")?,
        "unassignedStudents": count(conn, "SELECT COUNT(*) FROM students WHERE department_id IS NULL")?,
        "totalDepartments": count(conn, "SELECT COUNT(*) FROM departments")?,
        "totalInstitutions": count(conn, "SELECT COUNT(*) FROM institutions")?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "dashboard.summary" => Some(with_conn(state, req, dashboard_summary)),
        _ => None,
    }
}
