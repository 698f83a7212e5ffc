use crate::backup;
use crate::db;
use crate::ipc::helpers::{get_required_str, HandlerErr};
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use log::{info, warn};
use serde_json::{json, Value};
use std::path::PathBuf;

fn target_workspace(state: &AppState, params: &Value) -> Result<PathBuf, HandlerErr> {
    params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn export_bundle(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let out_path = get_required_str(params, "outPath")?;
    let workspace_path = target_workspace(state, params)?;

    if let Some(conn) = state.db.as_ref() {
        let _ = conn.execute_batch("PRAGMA wal_checkpoint(FULL)");
    }

    let summary = backup::export_workspace_bundle(&workspace_path, &PathBuf::from(&out_path))
        .map_err(|e| {
            warn!(
                "event=backup_export module=backup status=error path={} error={:#}",
                out_path, e
            );
            HandlerErr::new("backup_failed", format!("{e:#}"))
                .with_details(json!({ "path": out_path }))
        })?;
    info!(
        "event=backup_export module=backup status=ok path={} sha256={}",
        out_path, summary.db_sha256
    );
    Ok(json!({
        "ok": true,
        "path": out_path,
        "bundleFormat": summary.bundle_format,
        "entryCount": summary.entry_count,
        "dbSha256": summary.db_sha256
    }))
}

/// Puts back the connection to the selected workspace after a failed restore.
fn reopen_current(state: &mut AppState) {
    let Some(path) = state.workspace.clone() else {
        return;
    };
    match db::open_db(&path) {
        Ok(conn) => state.db = Some(conn),
        Err(e) => warn!(
            "event=db_reopen module=backup status=error path={} error={:#}",
            path.display(),
            e
        ),
    }
}

fn import_bundle(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let in_path = get_required_str(params, "inPath")?;
    let workspace_path = target_workspace(state, params)?;
    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr::not_found("bundle file not found")
            .with_details(json!({ "path": in_path })));
    }

    let failed = |e: anyhow::Error| {
        warn!(
            "event=backup_import module=backup status=error path={} error={:#}",
            in_path, e
        );
        HandlerErr::new("backup_failed", format!("{e:#}")).with_details(json!({ "path": in_path }))
    };
    let staged = backup::stage_import(&src).map_err(failed)?;

    // The open handle must go before the file underneath it is replaced.
    state.db = None;
    let summary = match backup::restore_staged(&staged, &workspace_path) {
        Ok(summary) => summary,
        Err(e) => {
            reopen_current(state);
            return Err(failed(e));
        }
    };

    let conn = match db::open_db(&workspace_path) {
        Ok(conn) => conn,
        Err(e) => {
            reopen_current(state);
            return Err(HandlerErr::new("db_open_failed", format!("{e:#}")));
        }
    };
    state.workspace = Some(workspace_path.clone());
    state.db = Some(conn);
    info!(
        "event=backup_import module=backup status=ok path={} format={}",
        in_path, summary.bundle_format_detected
    );
    Ok(json!({
        "ok": true,
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormatDetected": summary.bundle_format_detected
    }))
}

fn respond(
    state: &mut AppState,
    req: &Request,
    f: fn(&mut AppState, &Value) -> Result<Value, HandlerErr>,
) -> Value {
    match f(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(respond(state, req, export_bundle)),
        "backup.importWorkspaceBundle" => Some(respond(state, req, import_bundle)),
        _ => None,
    }
}
