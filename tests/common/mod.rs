#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

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

    /// Spawns and selects `workspace`.
    pub fn open(workspace: &Path) -> Self {
        let mut s = Self::spawn();
        s.request_ok(
            "workspace.select",
            None,
            json!({ "path": workspace.to_string_lossy() }),
        );
        s
    }

    pub fn send_line(&mut self, line: &str) -> serde_json::Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(
        &mut self,
        method: &str,
        actor: Option<serde_json::Value>,
        params: serde_json::Value,
    ) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let mut payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(a) = actor {
            payload["actor"] = a;
        }
        let value = self.send_line(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn request_ok(
        &mut self,
        method: &str,
        actor: Option<serde_json::Value>,
        params: serde_json::Value,
    ) -> serde_json::Value {
        let value = self.request(method, actor, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
                .get("error")
                .cloned()
                .unwrap_or_else(|| json!({ "message": "unknown error" }))
        );
        value.get("result").cloned().unwrap_or(json!({}))
    }

    /// Expects a failure and returns its error code.
    pub fn request_err(
        &mut self,
        method: &str,
        actor: Option<serde_json::Value>,
        params: serde_json::Value,
    ) -> String {
        let value = self.request(method, actor, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn admin() -> Option<serde_json::Value> {
    Some(json!({ "id": "admin-1", "role": "admin" }))
}

pub fn teacher(id: &str) -> Option<serde_json::Value> {
    Some(json!({ "id": id, "role": "teacher" }))
}

pub fn parent(id: &str) -> Option<serde_json::Value> {
    Some(json!({ "id": id, "role": "parent" }))
}

pub fn today() -> String {
    chrono::Local::now().date_naive().format("%Y-%m-%d").to_string()
}

/// Adds a student as admin and returns its id.
pub fn add_student(s: &mut Sidecar, name: &str, class: &str, parent_id: Option<&str>) -> String {
    let created = s.request_ok(
        "students.add",
        admin(),
        json!({ "name": name, "className": class, "parentId": parent_id }),
    );
    created
        .get("id")
        .and_then(|v| v.as_str())
        .expect("student id")
        .to_string()
}
