//! Append-only activity records: progress logs, comments, session history,
//! and work sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ts;
use crate::Error;

/// Kind of progress note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    #[default]
    Progress,
    Blocker,
    Decision,
    Hypothesis,
    Tried,
    Result,
    Orchestration,
    Security,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Progress => "progress",
            LogType::Blocker => "blocker",
            LogType::Decision => "decision",
            LogType::Hypothesis => "hypothesis",
            LogType::Tried => "tried",
            LogType::Result => "result",
            LogType::Orchestration => "orchestration",
            LogType::Security => "security",
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LogType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "progress" => Ok(LogType::Progress),
            "blocker" => Ok(LogType::Blocker),
            "decision" => Ok(LogType::Decision),
            "hypothesis" => Ok(LogType::Hypothesis),
            "tried" => Ok(LogType::Tried),
            "result" => Ok(LogType::Result),
            "orchestration" => Ok(LogType::Orchestration),
            "security" => Ok(LogType::Security),
            other => Err(Error::InvalidInput(format!("unknown log type '{}'", other))),
        }
    }
}

/// A free-form progress note attached to an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub id: i64,
    pub issue_id: String,
    pub session_id: String,
    #[serde(default)]
    pub work_session_id: Option<String>,
    pub log_type: LogType,
    pub message: String,
    #[serde(with = "ts")]
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(issue_id: &str, session_id: &str, log_type: LogType, message: &str) -> Self {
        Self {
            id: 0,
            issue_id: issue_id.to_string(),
            session_id: session_id.to_string(),
            work_session_id: None,
            log_type,
            message: message.to_string(),
            timestamp: ts::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub id: i64,
    pub issue_id: String,
    pub session_id: String,
    pub text: String,
    #[serde(with = "ts")]
    pub created_at: DateTime<Utc>,
}

/// Role a session played on an issue, as recorded in the session-history ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionAction {
    Started,
    Unstarted,
    Reviewed,
}

impl SessionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionAction::Started => "started",
            SessionAction::Unstarted => "unstarted",
            SessionAction::Reviewed => "reviewed",
        }
    }
}

impl FromStr for SessionAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(SessionAction::Started),
            "unstarted" => Ok(SessionAction::Unstarted),
            "reviewed" => Ok(SessionAction::Reviewed),
            other => Err(Error::InvalidInput(format!(
                "unknown session action '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHistoryEntry {
    pub issue_id: String,
    pub session_id: String,
    pub action: SessionAction,
    #[serde(with = "ts")]
    pub timestamp: DateTime<Utc>,
}

/// A named span of work that progress logs can be grouped under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSession {
    pub id: String,
    pub name: String,
    pub session_id: String,
    #[serde(with = "ts")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "ts::option", default)]
    pub ended_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_type_roundtrip_names() {
        for name in [
            "progress",
            "blocker",
            "decision",
            "hypothesis",
            "tried",
            "result",
            "orchestration",
            "security",
        ] {
            assert_eq!(name.parse::<LogType>().unwrap().as_str(), name);
        }
        assert!("note".parse::<LogType>().is_err());
    }

    #[test]
    fn test_session_action_parse() {
        assert_eq!(
            "reviewed".parse::<SessionAction>().unwrap(),
            SessionAction::Reviewed
        );
        assert!("approved".parse::<SessionAction>().is_err());
    }
}
