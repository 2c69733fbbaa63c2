//! Security audit stream.
//!
//! Self-close exceptions are appended as JSON lines to
//! `.todos/security_events.jsonl`, separate from the store so they survive
//! undo and store resets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::Result;
use crate::models::ts;
use crate::storage::MARKER_DIR;

const SECURITY_FILE: &str = "security_events.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEvent {
    #[serde(with = "ts")]
    pub timestamp: DateTime<Utc>,
    pub issue_id: String,
    pub session_id: String,
    pub event: String,
    pub reason: String,
}

impl SecurityEvent {
    pub fn self_close_exception(issue_id: &str, session_id: &str, reason: &str) -> Self {
        Self {
            timestamp: ts::now(),
            issue_id: issue_id.to_string(),
            session_id: session_id.to_string(),
            event: "self_close_exception".to_string(),
            reason: reason.to_string(),
        }
    }
}

fn events_path(root: &Path) -> PathBuf {
    root.join(MARKER_DIR).join(SECURITY_FILE)
}

/// Append one event line.
pub fn record(root: &Path, event: &SecurityEvent) -> Result<()> {
    let path = events_path(root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    writeln!(file, "{}", serde_json::to_string(event)?)?;
    Ok(())
}

/// Read every event, skipping lines that do not parse.
pub fn read_events(root: &Path) -> Result<Vec<SecurityEvent>> {
    let path = events_path(root);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(fs::File::open(path)?);
    let mut events = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(event) => events.push(event),
            Err(e) => tracing::warn!(error = %e, "skipping malformed security event"),
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_appends_lines() {
        let dir = TempDir::new().unwrap();
        record(
            dir.path(),
            &SecurityEvent::self_close_exception("td-aaaaaa", "ses_1", "hotfix"),
        )
        .unwrap();
        record(
            dir.path(),
            &SecurityEvent::self_close_exception("td-bbbbbb", "ses_1", "cleanup"),
        )
        .unwrap();

        let events = read_events(dir.path()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].reason, "hotfix");
        assert_eq!(events[1].event, "self_close_exception");
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(MARKER_DIR)).unwrap();
        fs::write(events_path(dir.path()), "garbage\n").unwrap();
        assert!(read_events(dir.path()).unwrap().is_empty());
    }
}
