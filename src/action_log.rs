//! Action log records for td mutations.
//!
//! Every mutating command appends one primary entry describing what changed:
//! who did it, the action and entity kinds, and JSON snapshots of the entity
//! before and after. Entries are append-only; only the `undone` flag changes
//! after insertion. The log feeds undo, and downstream consumers such as sync
//! and webhooks read it in rowid order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;
use crate::models::ts;

/// Closed set of logged actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
    Restore,
    Start,
    Unstart,
    Review,
    Approve,
    Reject,
    Block,
    Unblock,
    Close,
    Reopen,
    Handoff,
    LinkFile,
    UnlinkFile,
    AddDep,
    RemoveDep,
    BoardCreate,
    BoardUpdate,
    BoardDelete,
    BoardSetPosition,
    BoardUnposition,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
            ActionKind::Restore => "restore",
            ActionKind::Start => "start",
            ActionKind::Unstart => "unstart",
            ActionKind::Review => "review",
            ActionKind::Approve => "approve",
            ActionKind::Reject => "reject",
            ActionKind::Block => "block",
            ActionKind::Unblock => "unblock",
            ActionKind::Close => "close",
            ActionKind::Reopen => "reopen",
            ActionKind::Handoff => "handoff",
            ActionKind::LinkFile => "link_file",
            ActionKind::UnlinkFile => "unlink_file",
            ActionKind::AddDep => "add_dep",
            ActionKind::RemoveDep => "remove_dep",
            ActionKind::BoardCreate => "board_create",
            ActionKind::BoardUpdate => "board_update",
            ActionKind::BoardDelete => "board_delete",
            ActionKind::BoardSetPosition => "board_set_position",
            ActionKind::BoardUnposition => "board_unposition",
        }
    }

    pub fn all() -> &'static [ActionKind] {
        &[
            ActionKind::Create,
            ActionKind::Update,
            ActionKind::Delete,
            ActionKind::Restore,
            ActionKind::Start,
            ActionKind::Unstart,
            ActionKind::Review,
            ActionKind::Approve,
            ActionKind::Reject,
            ActionKind::Block,
            ActionKind::Unblock,
            ActionKind::Close,
            ActionKind::Reopen,
            ActionKind::Handoff,
            ActionKind::LinkFile,
            ActionKind::UnlinkFile,
            ActionKind::AddDep,
            ActionKind::RemoveDep,
            ActionKind::BoardCreate,
            ActionKind::BoardUpdate,
            ActionKind::BoardDelete,
            ActionKind::BoardSetPosition,
            ActionKind::BoardUnposition,
        ]
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown action kind '{}'", s)))
    }
}

/// Closed set of entity kinds an action can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Issue,
    Dependency,
    FileLink,
    BoardPosition,
    Board,
    Handoff,
    Logs,
    Comments,
    WorkSessions,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Issue => "issue",
            EntityKind::Dependency => "dependency",
            EntityKind::FileLink => "file_link",
            EntityKind::BoardPosition => "board_position",
            EntityKind::Board => "board",
            EntityKind::Handoff => "handoff",
            EntityKind::Logs => "logs",
            EntityKind::Comments => "comments",
            EntityKind::WorkSessions => "work_sessions",
        }
    }

    /// Append-only streams cannot be undone.
    pub fn is_append_only(&self) -> bool {
        matches!(
            self,
            EntityKind::Logs | EntityKind::Comments | EntityKind::WorkSessions
        )
    }

    pub fn all() -> &'static [EntityKind] {
        &[
            EntityKind::Issue,
            EntityKind::Dependency,
            EntityKind::FileLink,
            EntityKind::BoardPosition,
            EntityKind::Board,
            EntityKind::Handoff,
            EntityKind::Logs,
            EntityKind::Comments,
            EntityKind::WorkSessions,
        ]
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown entity kind '{}'", s)))
    }
}

/// A single persisted action-log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    /// Monotonic, gap-free within a store
    pub rowid: i64,
    #[serde(with = "ts")]
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub action: ActionKind,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub previous_data: Option<String>,
    pub new_data: Option<String>,
    pub undone: bool,
    /// Set on compensating entries written by undo
    pub undo_of: Option<i64>,
}

impl ActionLogEntry {
    /// Deserialize `previous_data`, failing when it is absent or malformed.
    pub fn previous<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        decode(self.previous_data.as_deref(), "previous_data", self.rowid)
    }

    /// Deserialize `new_data`, failing when it is absent or malformed.
    pub fn new_state<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        decode(self.new_data.as_deref(), "new_data", self.rowid)
    }

    /// One-line description for `last` and `undo --list`.
    pub fn describe(&self) -> String {
        let mut line = format!(
            "#{} {} {} {} {}",
            self.rowid,
            ts::format(&self.timestamp),
            self.action,
            self.entity_kind,
            self.entity_id
        );
        if let Some(original) = self.undo_of {
            line.push_str(&format!(" (undo of #{})", original));
        }
        if self.undone {
            line.push_str(" [undone]");
        }
        line
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    raw: Option<&str>,
    field: &str,
    rowid: i64,
) -> crate::Result<T> {
    let raw = raw.ok_or_else(|| {
        Error::InvalidInput(format!("action #{} has no {} to restore", rowid, field))
    })?;
    serde_json::from_str(raw).map_err(|e| {
        Error::InvalidInput(format!("action #{} has unreadable {}: {}", rowid, field, e))
    })
}

/// An action about to be appended.
#[derive(Debug, Clone)]
pub struct NewAction {
    pub session_id: String,
    pub action: ActionKind,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub previous_data: Option<String>,
    pub new_data: Option<String>,
    pub undo_of: Option<i64>,
}

impl NewAction {
    pub fn new(session_id: &str, action: ActionKind, entity_kind: EntityKind, entity_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            action,
            entity_kind,
            entity_id: entity_id.to_string(),
            previous_data: None,
            new_data: None,
            undo_of: None,
        }
    }

    /// Shorthand for an issue action with before/after snapshots.
    pub fn issue(
        session_id: &str,
        action: ActionKind,
        before: Option<&crate::models::Issue>,
        after: Option<&crate::models::Issue>,
    ) -> crate::Result<Self> {
        let entity_id = after
            .or(before)
            .map(|i| i.id.clone())
            .unwrap_or_default();
        Ok(Self::new(session_id, action, EntityKind::Issue, &entity_id)
            .with_previous(before)?
            .with_new(after)?)
    }

    pub fn with_previous<T: Serialize>(mut self, value: Option<&T>) -> crate::Result<Self> {
        self.previous_data = value.map(serde_json::to_string).transpose()?;
        Ok(self)
    }

    pub fn with_new<T: Serialize>(mut self, value: Option<&T>) -> crate::Result<Self> {
        self.new_data = value.map(serde_json::to_string).transpose()?;
        Ok(self)
    }

    pub fn compensating(mut self, original: i64) -> Self {
        self.undo_of = Some(original);
        self
    }
}
