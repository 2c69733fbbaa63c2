//! Boards: named, manually ordered views over issues.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ts;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub id: String,
    pub name: String,
    /// Stored verbatim; evaluated by the query engine, not here
    #[serde(default)]
    pub query: String,
    #[serde(with = "ts")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "ts")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardPosition {
    pub board_id: String,
    pub issue_id: String,
    pub position: i64,
    #[serde(with = "ts")]
    pub added_at: DateTime<Utc>,
}

impl BoardPosition {
    pub fn entity_id(&self) -> String {
        format!("{}:{}", self.board_id, self.issue_id)
    }
}

/// A board together with its positions, captured before deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub board: Board,
    #[serde(default)]
    pub positions: Vec<BoardPosition>,
}
