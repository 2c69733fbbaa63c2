//! Handoffs: structured progress snapshots attached to an issue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ts;

/// A snapshot of working state so another session can resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handoff {
    /// Auto-incrementing store key (0 before insertion)
    #[serde(default)]
    pub id: i64,
    pub issue_id: String,
    pub session_id: String,
    #[serde(default)]
    pub done: Vec<String>,
    #[serde(default)]
    pub remaining: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub uncertain: Vec<String>,
    #[serde(with = "ts")]
    pub timestamp: DateTime<Utc>,
}

impl Handoff {
    pub fn new(issue_id: &str, session_id: &str) -> Self {
        Self {
            id: 0,
            issue_id: issue_id.to_string(),
            session_id: session_id.to_string(),
            done: Vec::new(),
            remaining: Vec::new(),
            decisions: Vec::new(),
            uncertain: Vec::new(),
            timestamp: ts::now(),
        }
    }

    /// Minimal handoff synthesized when an issue is submitted without one.
    pub fn auto_generated(issue_id: &str, session_id: &str) -> Self {
        let mut handoff = Self::new(issue_id, session_id);
        handoff
            .done
            .push("Submitted for review without a recorded handoff".to_string());
        handoff
    }

    /// Handoff synthesized for a descendant swept into review by its parent.
    pub fn cascaded(issue_id: &str, session_id: &str, parent_id: &str) -> Self {
        let mut handoff = Self::new(issue_id, session_id);
        handoff.done.push(format!("Cascaded from {}", parent_id));
        handoff
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
            && self.remaining.is_empty()
            && self.decisions.is_empty()
            && self.uncertain.is_empty()
    }

    /// "done 1, remaining 0, decisions 0, uncertain 0"
    pub fn summary(&self) -> String {
        format!(
            "done {}, remaining {}, decisions {}, uncertain {}",
            self.done.len(),
            self.remaining.len(),
            self.decisions.len(),
            self.uncertain.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cascaded_handoff_names_parent() {
        let h = Handoff::cascaded("td-aaaaaa", "ses_1", "td-epi001");
        assert_eq!(h.done, vec!["Cascaded from td-epi001"]);
        assert!(!h.is_empty());
    }

    #[test]
    fn test_summary() {
        let mut h = Handoff::new("td-aaaaaa", "ses_1");
        h.done.push("x".to_string());
        h.uncertain.push("y".to_string());
        assert_eq!(h.summary(), "done 1, remaining 0, decisions 0, uncertain 1");
    }
}
