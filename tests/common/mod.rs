#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_schoold");
        let mut child = Command::new(exe)
            .env_remove("SCHOOLD_WORKSPACE")
            .env("SCHOOLD_LOG_LEVEL", "off")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn schoold");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    /// Spawns a sidecar with a fresh workspace already selected.
    pub fn with_workspace(prefix: &str) -> (Self, PathBuf) {
        let workspace = temp_dir(prefix);
        let mut sidecar = Self::spawn();
        sidecar.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        (sidecar, workspace)
    }

    pub fn send_raw(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        let value = self.send_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    /// Returns `result`, panicking with the error envelope otherwise.
    pub fn ok(&mut self, method: &str, params: Value) -> Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or(Value::Null)
    }

    /// Returns the error code, panicking when the call succeeded.
    pub fn err_code(&mut self, method: &str, params: Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value["error"]["code"]
            .as_str()
            .unwrap_or("unknown")
            .to_string()
    }

    pub fn error(&mut self, method: &str, params: Value) -> Value {
        let value = self.request(method, params);
        assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
        value["error"].clone()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn create_institution(s: &mut Sidecar, name: &str) -> String {
    let res = s.ok(
        "institutions.create",
        json!({ "name": name, "municipality": "بلدية" }),
    );
    res["institutionId"].as_str().expect("institutionId").to_string()
}

pub fn create_student(
    s: &mut Sidecar,
    institution_id: &str,
    level: &str,
    first: &str,
    last: &str,
    gender: &str,
) -> String {
    let res = s.ok(
        "students.create",
        json!({
            "firstName": first,
            "lastName": last,
            "gender": gender,
            "level": level,
            "institutionId": institution_id,
            "status": "active"
        }),
    );
    res["studentId"].as_str().expect("studentId").to_string()
}

pub fn create_department(
    s: &mut Sidecar,
    institution_id: &str,
    level: &str,
    name: &str,
    student_ids: &[String],
) -> String {
    let res = s.ok(
        "departments.create",
        json!({
            "name": name,
            "institutionId": institution_id,
            "level": level,
            "studentIds": student_ids
        }),
    );
    res["departmentId"].as_str().expect("departmentId").to_string()
}
