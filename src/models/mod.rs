//! Data models for td entities.
//!
//! This module defines the core data structures:
//! - `Issue` - Work items with status, type, priority, optional parent
//! - `Dependency` - Directed "blocked by" edge between two issues
//! - `Handoff` - Structured progress snapshots required before review
//! - `LogEntry`, `Comment`, `SessionHistoryEntry`, `WorkSession` - append-only activity
//! - `FileLink` - Files associated with an issue, with content hashes
//! - `Board`, `BoardPosition` - Ordered views over issues
//!
//! Every model serializes with a fixed field order, lowercase enum values,
//! and timestamps in a single ISO-8601 form (see [`ts`]) so that action-log
//! snapshots are diff-comparable.

pub mod activity;
pub mod board;
pub mod handoff;
pub mod links;
pub mod ts;

pub use activity::{Comment, LogEntry, LogType, SessionAction, SessionHistoryEntry, WorkSession};
pub use board::{Board, BoardPosition, BoardSnapshot};
pub use handoff::Handoff;
pub use links::{FileLink, FileRole};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Issue status in the workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Blocked,
    InReview,
    Closed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Open => "open",
            Status::InProgress => "in_progress",
            Status::Blocked => "blocked",
            Status::InReview => "in_review",
            Status::Closed => "closed",
        }
    }

    pub fn all() -> &'static [Status] {
        &[
            Status::Open,
            Status::InProgress,
            Status::Blocked,
            Status::InReview,
            Status::Closed,
        ]
    }

    /// Whether this status satisfies the cascade predicate for `target`.
    ///
    /// For `in_review` the predicate is {in_review, closed}; for `closed` it is
    /// {closed}. Other targets only match themselves.
    pub fn at_or_beyond(&self, target: Status) -> bool {
        match target {
            Status::InReview => matches!(self, Status::InReview | Status::Closed),
            _ => *self == target,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" | "todo" => Ok(Status::Open),
            "in_progress" | "in-progress" | "inprogress" | "progress" | "wip" => {
                Ok(Status::InProgress)
            }
            "blocked" => Ok(Status::Blocked),
            "in_review" | "in-review" | "inreview" | "review" => Ok(Status::InReview),
            "closed" | "done" | "complete" => Ok(Status::Closed),
            other => Err(Error::InvalidInput(format!(
                "unknown status '{}' (expected open, in_progress, blocked, in_review, closed)",
                other
            ))),
        }
    }
}

/// Kind of work an issue represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Bug,
    Feature,
    #[default]
    Task,
    Epic,
    Chore,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Bug => "bug",
            IssueType::Feature => "feature",
            IssueType::Task => "task",
            IssueType::Epic => "epic",
            IssueType::Chore => "chore",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IssueType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bug" => Ok(IssueType::Bug),
            "feature" | "story" => Ok(IssueType::Feature),
            "task" => Ok(IssueType::Task),
            "epic" => Ok(IssueType::Epic),
            "chore" => Ok(IssueType::Chore),
            other => Err(Error::InvalidInput(format!(
                "unknown type '{}' (expected bug, feature, task, epic, chore)",
                other
            ))),
        }
    }
}

/// Priority from P0 (highest) to P4 (lowest).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Priority {
    P0,
    P1,
    #[default]
    P2,
    P3,
    P4,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::P0 => "P0",
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
            Priority::P4 => "P4",
        }
    }

    pub fn rank(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('P')
            .or_else(|| trimmed.strip_prefix('p'))
            .unwrap_or(trimmed);
        match digits {
            "0" => Ok(Priority::P0),
            "1" => Ok(Priority::P1),
            "2" => Ok(Priority::P2),
            "3" => Ok(Priority::P3),
            "4" => Ok(Priority::P4),
            _ => Err(Error::InvalidInput(format!(
                "priority must be P0-P4, got '{}'",
                s
            ))),
        }
    }
}

/// Allowed story-point values; zero means unestimated.
pub const VALID_POINTS: [u8; 8] = [0, 1, 2, 3, 5, 8, 13, 21];

/// Validate a story-point estimate.
pub fn validate_points(points: u8) -> crate::Result<u8> {
    if VALID_POINTS.contains(&points) {
        Ok(points)
    } else {
        Err(Error::InvalidInput(format!(
            "points must be one of 1, 2, 3, 5, 8, 13, 21 (or 0 for unestimated), got {}",
            points
        )))
    }
}

/// A unit of work tracked by td.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Unique identifier (e.g., "td-a1b2c3")
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Acceptance criteria
    #[serde(default)]
    pub acceptance: String,

    #[serde(rename = "type", default)]
    pub issue_type: IssueType,

    #[serde(default)]
    pub priority: Priority,

    /// Fibonacci estimate, 0 when unestimated
    #[serde(default)]
    pub points: u8,

    #[serde(default)]
    pub status: Status,

    #[serde(default)]
    pub labels: Vec<String>,

    #[serde(default)]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub creator_session: Option<String>,

    #[serde(default)]
    pub implementer_session: Option<String>,

    #[serde(default)]
    pub reviewer_session: Option<String>,

    /// Self-reviewable task
    #[serde(default)]
    pub minor: bool,

    #[serde(default)]
    pub sprint: Option<String>,

    #[serde(with = "ts")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "ts")]
    pub updated_at: DateTime<Utc>,

    #[serde(with = "ts::option", default)]
    pub closed_at: Option<DateTime<Utc>>,

    /// Soft-delete marker
    #[serde(with = "ts::option", default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Issue {
    /// Create a new open task with the given ID and title.
    pub fn new(id: String, title: String) -> Self {
        let now = ts::now();
        Self {
            id,
            title,
            description: String::new(),
            acceptance: String::new(),
            issue_type: IssueType::default(),
            priority: Priority::default(),
            points: 0,
            status: Status::default(),
            labels: Vec::new(),
            parent_id: None,
            creator_session: None,
            implementer_session: None,
            reviewer_session: None,
            minor: false,
            sprint: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_epic(&self) -> bool {
        self.issue_type == IssueType::Epic
    }

    /// Move to `status`, keeping `closed_at` consistent with it.
    pub fn set_status(&mut self, status: Status, at: DateTime<Utc>) {
        self.status = status;
        if status == Status::Closed {
            if self.closed_at.is_none() {
                self.closed_at = Some(at);
            }
        } else {
            self.closed_at = None;
        }
        self.updated_at = at;
    }

    /// Replace labels, normalizing to a sorted set of non-empty strings.
    pub fn set_labels<I, S>(&mut self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut labels: Vec<String> = labels
            .into_iter()
            .map(|l| l.as_ref().trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        labels.sort();
        labels.dedup();
        self.labels = labels;
    }

    /// Snapshot used for action-log `previous_data` / `new_data`.
    pub fn snapshot(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A dependency edge: `issue_id` is blocked by `depends_on_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub issue_id: String,
    pub depends_on_id: String,
}

impl Dependency {
    pub fn new(issue_id: &str, depends_on_id: &str) -> Self {
        Self {
            issue_id: issue_id.to_string(),
            depends_on_id: depends_on_id.to_string(),
        }
    }

    pub fn entity_id(&self) -> String {
        format!("{}:{}", self.issue_id, self.depends_on_id)
    }
}
