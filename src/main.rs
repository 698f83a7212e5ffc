mod backup;
mod calendar;
mod config;
mod db;
mod grouping;
mod ipc;
mod logging;
mod print;

use log::{error, info, warn};
use std::io::{self, BufRead, Write};

fn main() {
    let cfg = match config::Config::from_env_and_args() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("schoold: {e:#}");
            std::process::exit(2);
        }
    };
    if let Err(e) = logging::init_logging(&cfg.log_level, cfg.log_dir.as_deref()) {
        eprintln!("schoold: logging disabled: {e}");
    }

    let mut state = ipc::AppState::default();
    if let Some(path) = cfg.workspace.as_ref() {
        match db::open_db(path) {
            Ok(conn) => {
                state.workspace = Some(path.clone());
                state.db = Some(conn);
            }
            Err(e) => warn!(
                "event=workspace_autoselect module=core status=error path={} error={:#}",
                path.display(),
                e
            ),
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                error!("event=stdin_read module=core status=error error={}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!("event=ipc_request module=ipc status=error error_code=bad_json");
                let _ = writeln!(stdout, "{}", ipc::bad_json(e.to_string()));
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("event=app_stop module=core status=ok");
}
