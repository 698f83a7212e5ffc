use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::Value;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn query_err(e: rusqlite::Error) -> HandlerErr {
    HandlerErr::new("db_query_failed", e.to_string())
}

/// Maps a failed write on `table` to `code`, keeping the table in details.
pub fn write_err(code: &'static str, table: &'static str) -> impl Fn(rusqlite::Error) -> HandlerErr {
    move |e| HandlerErr::new(code, e.to_string()).with_details(serde_json::json!({ "table": table }))
}

/// Runs `f` against the open workspace, or fails with `no_workspace`.
pub fn with_conn(
    state: &AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &Value) -> Result<Value, HandlerErr>,
) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Absent, null and blank all read as `None`.
pub fn get_optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(non_empty_trimmed(s)),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be string", key))),
    }
}

pub fn get_str_array(params: &Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let Some(arr) = params.get(key).and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    Ok(arr
        .iter()
        .filter_map(|v| v.as_str())
        .filter_map(non_empty_trimmed)
        .collect())
}

pub fn non_empty_trimmed(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

pub fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                buf.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => out.push(std::mem::take(&mut buf)),
            _ => buf.push(ch),
        }
    }
    out.push(buf);
    out
}

/// Every field is quoted so Arabic text and embedded commas survive
/// spreadsheet imports unchanged.
pub fn csv_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub fn write_text_file(path: &str, text: &str) -> Result<(), HandlerErr> {
    let p = std::path::Path::new(path);
    if let Some(parent) = p.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HandlerErr::new("io_failed", e.to_string()))?;
        }
    }
    std::fs::write(p, text).map_err(|e| {
        HandlerErr::new("io_failed", e.to_string()).with_details(serde_json::json!({ "path": path }))
    })
}

#[cfg(test)]
mod tests {
    use super::{csv_quote, parse_csv_record};

    #[test]
    fn csv_record_handles_quotes_and_commas() {
        assert_eq!(
            parse_csv_record(r#"a,"b,c","say ""hi""",,"#),
            vec!["a", "b,c", "say \"hi\"", "", ""]
        );
        assert_eq!(parse_csv_record("أحمد,علي"), vec!["أحمد", "علي"]);
    }

    #[test]
    fn csv_quote_escapes_inner_quotes() {
        assert_eq!(csv_quote("ab"), "\"ab\"");
        assert_eq!(csv_quote("a\"b"), "\"a\"\"b\"");
        assert_eq!(parse_csv_record(&csv_quote("x, \"y\"")), vec!["x, \"y\""]);
    }
}
