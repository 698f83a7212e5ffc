use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;
use log::{debug, warn};
use std::time::Instant;

type TryHandle = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const FAMILIES: &[TryHandle] = &[
    handlers::core::try_handle,
    handlers::institutions::try_handle,
    handlers::students::try_handle,
    handlers::departments::try_handle,
    handlers::attendance::try_handle,
    handlers::reports::try_handle,
    handlers::print::try_handle,
    handlers::profile::try_handle,
    handlers::groups::try_handle,
    handlers::setup::try_handle,
    handlers::backup::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    let started_at = Instant::now();
    for family in FAMILIES {
        if let Some(resp) = family(state, &req) {
            log_outcome(&req, &resp, started_at);
            return resp;
        }
    }

    warn!(
        "event=ipc_request module=ipc status=error method={} error_code=not_implemented",
        req.method
    );
    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}

fn log_outcome(req: &Request, resp: &serde_json::Value, started_at: Instant) {
    let elapsed = started_at.elapsed().as_millis();
    if resp.get("ok").and_then(|v| v.as_bool()) == Some(true) {
        debug!(
            "event=ipc_request module=ipc status=ok method={} duration_ms={}",
            req.method, elapsed
        );
    } else {
        let code = resp
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        warn!(
            "event=ipc_request module=ipc status=error method={} error_code={} duration_ms={}",
            req.method, code, elapsed
        );
    }
}
