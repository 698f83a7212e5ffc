use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One request line: `{"id", "method", "params"}`.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The selected workspace directory and its open database. Both are `None`
/// until `workspace.select` succeeds.
#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
