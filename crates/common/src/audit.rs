//! Append-only JSONL audit log
//!
//! Auditing is best-effort: a record that cannot be written is reported at
//! debug level and otherwise ignored, so it never changes the outcome of the
//! operation being audited.

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use crate::paths;

/// Standard audit record keys
pub mod schema {
    pub const TIMESTAMP: &str = "ts";
    pub const EVENT: &str = "event";
    pub const COMMAND: &str = "command";
    pub const PID: &str = "pid";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    Install,
    Uninstall,
    Bypass,
    Block,
    Redirect,
    Recover,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Bypass => "bypass",
            Self::Block => "block",
            Self::Redirect => "redirect",
            Self::Recover => "recover",
        }
    }
}

pub fn format_timestamp(timestamp: SystemTime) -> String {
    let dt: chrono::DateTime<chrono::Utc> = timestamp.into();
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Build a record; `fields` must be a JSON object and is merged in.
pub fn build_entry(event: AuditEvent, command: &str, fields: Value) -> Value {
    let mut entry = Map::new();
    entry.insert(
        schema::TIMESTAMP.into(),
        json!(format_timestamp(SystemTime::now())),
    );
    entry.insert(schema::EVENT.into(), json!(event.as_str()));
    entry.insert(schema::COMMAND.into(), json!(command));
    entry.insert(schema::PID.into(), json!(std::process::id()));
    if let Value::Object(extra) = fields {
        entry.extend(extra);
    }
    Value::Object(entry)
}

/// Append one line to `log_path`, creating parents as needed.
pub fn write_entry(log_path: &Path, entry: &Value) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut line = serde_json::to_string(entry).context("failed to serialize audit entry")?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("failed to open audit log {}", log_path.display()))?;
    // Single write so concurrent appenders never interleave within a line.
    file.write_all(line.as_bytes())
        .with_context(|| format!("failed to append to {}", log_path.display()))
}

/// Record an event in the default audit log.
pub fn record(event: AuditEvent, command: &str, fields: Value) {
    let entry = build_entry(event, command, fields);
    let result = paths::audit_file().and_then(|path| write_entry(&path, &entry));
    if let Err(e) = result {
        log::debug!("audit record dropped: {e:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_build_entry_merges_fields() {
        let entry = build_entry(
            AuditEvent::Bypass,
            "npm",
            json!({"original": "/usr/local/bin/npm.ribbin-original"}),
        );
        assert_eq!(entry["event"], "bypass");
        assert_eq!(entry["command"], "npm");
        assert_eq!(entry["original"], "/usr/local/bin/npm.ribbin-original");
        assert!(entry["ts"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_write_entry_appends_lines() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("nested").join("audit.log");

        write_entry(&log, &build_entry(AuditEvent::Install, "tsc", json!({}))).unwrap();
        write_entry(&log, &build_entry(AuditEvent::Uninstall, "tsc", json!({}))).unwrap();

        let contents = fs::read_to_string(&log).unwrap();
        let lines: Vec<Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "install");
        assert_eq!(lines[1]["event"], "uninstall");
    }
}
