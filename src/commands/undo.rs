//! `undo`, `undo --list`, and `last`.

use serde::Serialize;
use std::path::Path;

use super::{Context, Output, json_line};
use crate::Result;
use crate::action_log::ActionLogEntry;
use crate::undo::{self, UndoOutcome};

/// How many entries `undo --list` shows.
const UNDO_LIST_LIMIT: usize = 10;

#[derive(Serialize)]
pub struct Undone {
    #[serde(flatten)]
    pub outcome: UndoOutcome,
    pub session: String,
}

impl Output for Undone {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        let original = &self.outcome.original;
        format!(
            "UNDONE #{} {} {} {} (compensating #{} {})",
            original.rowid,
            original.action,
            original.entity_kind,
            original.entity_id,
            self.outcome.compensating_rowid,
            self.outcome.compensating_action
        )
    }
}

pub fn undo(root: &Path) -> Result<Undone> {
    let ctx = Context::open(root)?;
    let outcome = undo::undo_last(&ctx.storage, &ctx.session)?;
    tracing::info!(
        rowid = outcome.original.rowid,
        action = %outcome.original.action,
        "undo applied"
    );
    Ok(Undone {
        outcome,
        session: ctx.session,
    })
}

/// A list of action-log entries, newest first.
#[derive(Serialize)]
pub struct ActionList {
    pub session: String,
    pub entries: Vec<ActionLogEntry>,
    #[serde(skip)]
    pub empty_message: &'static str,
}

impl Output for ActionList {
    fn to_json(&self) -> String {
        self.entries
            .iter()
            .map(json_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn to_human(&self) -> String {
        if self.entries.is_empty() {
            return self.empty_message.to_string();
        }
        self.entries
            .iter()
            .map(ActionLogEntry::describe)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// What `undo` would reverse, in the order it would reverse it.
pub fn undo_list(root: &Path) -> Result<ActionList> {
    let ctx = Context::open(root)?;
    let entries = ctx.storage.undo_candidates(&ctx.session, UNDO_LIST_LIMIT)?;
    Ok(ActionList {
        session: ctx.session,
        entries,
        empty_message: "Nothing to undo",
    })
}

/// The session's most recent actions, including undone and compensating ones.
pub fn last(root: &Path, n: usize) -> Result<ActionList> {
    let ctx = Context::open(root)?;
    let entries = ctx.storage.recent_actions(&ctx.session, n)?;
    Ok(ActionList {
        session: ctx.session,
        entries,
        empty_message: "No actions recorded in this session",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::workflow;
    use crate::models::Status;
    use crate::session::SESSION_ENV;
    use crate::test_utils::TestEnv;
    use crate::Error;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_undo_walks_back_and_lists() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        unsafe { std::env::set_var(SESSION_ENV, "ses_1") };

        workflow::start(env.path(), vec!["td-aaaaaa".to_string()], None).unwrap();
        workflow::block(env.path(), vec!["td-aaaaaa".to_string()], None).unwrap();
        assert_eq!(undo_list(env.path()).unwrap().entries.len(), 2);

        let undone = undo(env.path()).unwrap();
        assert!(undone.to_human().starts_with("UNDONE #2 block issue td-aaaaaa"));
        assert_eq!(env.get("td-aaaaaa").status, Status::InProgress);

        undo(env.path()).unwrap();
        assert_eq!(env.get("td-aaaaaa").status, Status::Open);
        assert!(matches!(undo(env.path()), Err(Error::NothingToUndo)));

        let history = last(env.path(), 10).unwrap();
        unsafe { std::env::remove_var(SESSION_ENV) };
        assert_eq!(history.entries.len(), 4);
        assert!(history.to_human().contains("(undo of #1)"));
    }
}
