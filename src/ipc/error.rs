//! Response envelopes written back on stdout, one per request line.

use serde_json::{json, Map, Value};

pub fn ok(id: &str, result: Value) -> Value {
    json!({ "id": id, "ok": true, "result": result })
}

/// `details` is omitted from the envelope when absent.
pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    let mut body = Map::new();
    body.insert("code".into(), Value::from(code));
    body.insert("message".into(), Value::from(message.into()));
    if let Some(d) = details {
        body.insert("details".into(), d);
    }
    json!({ "id": id, "ok": false, "error": body })
}

/// Reply for a line that could not be parsed, so no id is known.
pub fn bad_json(message: impl Into<String>) -> Value {
    json!({ "ok": false, "error": { "code": "bad_json", "message": message.into() } })
}
