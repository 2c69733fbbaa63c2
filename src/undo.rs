//! Single-step undo over the action log.
//!
//! `undo` picks the newest entry for the session that is neither undone nor
//! itself a compensating entry, performs the inverse, appends a compensating
//! entry pointing back at it, and flags it undone. All three happen in one
//! transaction, so a failed inverse leaves the original un-flagged.

use serde::Serialize;

use crate::action_log::{ActionKind, ActionLogEntry, EntityKind, NewAction};
use crate::models::{
    Board, BoardPosition, BoardSnapshot, Dependency, FileLink, Handoff, Issue, ts,
};
use crate::storage::Storage;
use crate::{Error, Result};

/// What an undo did.
#[derive(Debug, Clone, Serialize)]
pub struct UndoOutcome {
    /// The entry that was reversed (before its flag was flipped)
    pub original: ActionLogEntry,
    /// Rowid of the compensating entry
    pub compensating_rowid: i64,
    pub compensating_action: ActionKind,
}

/// Undo the most recent undoable action of `session`.
pub fn undo_last(storage: &Storage, session: &str) -> Result<UndoOutcome> {
    let entry = storage.last_undoable(session)?.ok_or(Error::NothingToUndo)?;
    undo_entry(storage, session, &entry)
}

/// Undo a specific entry.
pub fn undo_entry(storage: &Storage, session: &str, entry: &ActionLogEntry) -> Result<UndoOutcome> {
    if entry.undone {
        return Err(Error::InvalidInput(format!(
            "action #{} is already undone",
            entry.rowid
        )));
    }
    if entry.undo_of.is_some() {
        return Err(Error::UndoNotSupported(format!(
            "compensating action #{}",
            entry.rowid
        )));
    }

    storage.transaction(|s| {
        let compensating = inverse(s, session, entry)?.compensating(entry.rowid);
        let compensating_action = compensating.action;
        let compensating_rowid = s.append_action(&compensating)?;
        s.mark_undone(entry.rowid)?;
        tracing::debug!(
            original = entry.rowid,
            compensating = compensating_rowid,
            "undid action"
        );
        Ok(UndoOutcome {
            original: entry.clone(),
            compensating_rowid,
            compensating_action,
        })
    })
}

/// Perform the inverse of `entry` and describe the compensating entry.
fn inverse(storage: &Storage, session: &str, entry: &ActionLogEntry) -> Result<NewAction> {
    match entry.entity_kind {
        EntityKind::Issue => undo_issue(storage, session, entry),
        EntityKind::Dependency => undo_dependency(storage, session, entry),
        EntityKind::FileLink => undo_file_link(storage, session, entry),
        EntityKind::BoardPosition => undo_board_position(storage, session, entry),
        EntityKind::Board => undo_board(storage, session, entry),
        EntityKind::Handoff => undo_handoff(storage, session, entry),
        EntityKind::Logs | EntityKind::Comments | EntityKind::WorkSessions => {
            Err(Error::UndoNotSupported(format!(
                "{} on {} (append-only)",
                entry.action, entry.entity_kind
            )))
        }
    }
}

fn unsupported(entry: &ActionLogEntry) -> Error {
    Error::UndoNotSupported(format!("{} on {}", entry.action, entry.entity_kind))
}

fn undo_issue(storage: &Storage, session: &str, entry: &ActionLogEntry) -> Result<NewAction> {
    let current = storage.get_issue(&entry.entity_id)?;
    let now = ts::now();

    let (restored, kind) = match entry.action {
        ActionKind::Create | ActionKind::Restore => {
            let mut deleted = current.clone();
            deleted.deleted_at = Some(now);
            deleted.updated_at = now;
            (deleted, ActionKind::Delete)
        }
        ActionKind::Delete => {
            let mut live = current.clone();
            live.deleted_at = None;
            live.updated_at = now;
            (live, ActionKind::Restore)
        }
        ActionKind::Update
        | ActionKind::Start
        | ActionKind::Unstart
        | ActionKind::Review
        | ActionKind::Approve
        | ActionKind::Reject
        | ActionKind::Block
        | ActionKind::Unblock
        | ActionKind::Close
        | ActionKind::Reopen => {
            let mut previous: Issue = entry.previous()?;
            if previous.id != current.id {
                return Err(Error::InvalidInput(format!(
                    "action #{} snapshot is for {}, not {}",
                    entry.rowid, previous.id, current.id
                )));
            }
            previous.updated_at = now;
            (previous, ActionKind::Update)
        }
        _ => return Err(unsupported(entry)),
    };

    storage.update_issue(&restored)?;
    NewAction::issue(session, kind, Some(&current), Some(&restored))
}

fn undo_dependency(storage: &Storage, session: &str, entry: &ActionLogEntry) -> Result<NewAction> {
    match entry.action {
        ActionKind::AddDep => {
            let edge: Dependency = entry.new_state()?;
            storage.remove_dependency(&edge.issue_id, &edge.depends_on_id)?;
            NewAction::new(session, ActionKind::RemoveDep, EntityKind::Dependency, &edge.entity_id())
                .with_previous(Some(&edge))
        }
        ActionKind::RemoveDep => {
            let edge: Dependency = entry.previous()?;
            storage.add_dependency(&edge.issue_id, &edge.depends_on_id)?;
            NewAction::new(session, ActionKind::AddDep, EntityKind::Dependency, &edge.entity_id())
                .with_new(Some(&edge))
        }
        _ => Err(unsupported(entry)),
    }
}

fn undo_file_link(storage: &Storage, session: &str, entry: &ActionLogEntry) -> Result<NewAction> {
    match entry.action {
        ActionKind::LinkFile => {
            let link: FileLink = entry.new_state()?;
            let current = storage.get_file_link(&link.issue_id, &link.file_path)?;

            // A relink replaced an existing link; put that one back.
            if entry.previous_data.is_some() {
                let prior: FileLink = entry.previous()?;
                storage.insert_file_link(&prior)?;
                NewAction::new(session, ActionKind::LinkFile, EntityKind::FileLink, &prior.entity_id())
                    .with_previous(current.as_ref())?
                    .with_new(Some(&prior))
            } else {
                storage.remove_file_link(&link.issue_id, &link.file_path)?;
                NewAction::new(session, ActionKind::UnlinkFile, EntityKind::FileLink, &link.entity_id())
                    .with_previous(current.as_ref().or(Some(&link)))
            }
        }
        ActionKind::UnlinkFile => {
            // Relink with the role and hash recorded at unlink time.
            let link: FileLink = entry.previous()?;
            storage.insert_file_link(&link)?;
            NewAction::new(session, ActionKind::LinkFile, EntityKind::FileLink, &link.entity_id())
                .with_new(Some(&link))
        }
        _ => Err(unsupported(entry)),
    }
}

fn undo_board_position(
    storage: &Storage,
    session: &str,
    entry: &ActionLogEntry,
) -> Result<NewAction> {
    match entry.action {
        ActionKind::BoardSetPosition => {
            let placed: BoardPosition = entry.new_state()?;
            let current = storage.get_board_position(&placed.board_id, &placed.issue_id)?;

            if entry.previous_data.is_some() {
                let prior: BoardPosition = entry.previous()?;
                storage.set_board_position(&prior)?;
                NewAction::new(
                    session,
                    ActionKind::BoardSetPosition,
                    EntityKind::BoardPosition,
                    &prior.entity_id(),
                )
                .with_previous(current.as_ref())?
                .with_new(Some(&prior))
            } else {
                storage.remove_board_position(&placed.board_id, &placed.issue_id)?;
                NewAction::new(
                    session,
                    ActionKind::BoardUnposition,
                    EntityKind::BoardPosition,
                    &placed.entity_id(),
                )
                .with_previous(current.as_ref())
            }
        }
        ActionKind::BoardUnposition => {
            let prior: BoardPosition = entry.previous()?;
            storage.set_board_position(&prior)?;
            NewAction::new(
                session,
                ActionKind::BoardSetPosition,
                EntityKind::BoardPosition,
                &prior.entity_id(),
            )
            .with_new(Some(&prior))
        }
        _ => Err(unsupported(entry)),
    }
}

fn undo_board(storage: &Storage, session: &str, entry: &ActionLogEntry) -> Result<NewAction> {
    match entry.action {
        ActionKind::BoardCreate => {
            let created: Board = entry.new_state()?;
            let snapshot = BoardSnapshot {
                positions: storage.board_positions(&created.id)?,
                board: storage.get_board(&created.id)?,
            };
            storage.delete_board(&created.id)?;
            NewAction::new(session, ActionKind::BoardDelete, EntityKind::Board, &created.id)
                .with_previous(Some(&snapshot))
        }
        ActionKind::BoardDelete => {
            let snapshot: BoardSnapshot = entry.previous()?;
            storage.insert_board(&snapshot.board)?;
            for position in &snapshot.positions {
                storage.set_board_position(position)?;
            }
            NewAction::new(
                session,
                ActionKind::BoardCreate,
                EntityKind::Board,
                &snapshot.board.id,
            )
            .with_new(Some(&snapshot.board))
        }
        ActionKind::BoardUpdate => {
            let mut prior: Board = entry.previous()?;
            let current = storage.get_board(&prior.id)?;
            prior.updated_at = ts::now();
            storage.update_board(&prior)?;
            NewAction::new(session, ActionKind::BoardUpdate, EntityKind::Board, &prior.id)
                .with_previous(Some(&current))?
                .with_new(Some(&prior))
        }
        _ => Err(unsupported(entry)),
    }
}

fn undo_handoff(storage: &Storage, session: &str, entry: &ActionLogEntry) -> Result<NewAction> {
    match entry.action {
        ActionKind::Handoff => {
            let handoff: Handoff = entry.new_state()?;
            storage.delete_handoff(handoff.id)?;
            NewAction::new(session, ActionKind::Delete, EntityKind::Handoff, &entry.entity_id)
                .with_previous(Some(&handoff))
        }
        _ => Err(unsupported(entry)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileRole, Status};
    use crate::test_utils::TestEnv;
    use crate::workflow::record_issue_change;

    fn transition(env: &TestEnv, id: &str, kind: ActionKind, status: Status) -> i64 {
        let before = env.get(id);
        let mut after = before.clone();
        after.set_status(status, ts::now());
        env.storage
            .transaction(|s| record_issue_change(s, "ses_1", kind, &before, &after))
            .unwrap()
    }

    #[test]
    fn test_nothing_to_undo() {
        let env = TestEnv::new();
        assert!(matches!(
            undo_last(&env.storage, "ses_1"),
            Err(Error::NothingToUndo)
        ));
    }

    #[test]
    fn test_undo_reject_restores_previous_state() {
        let env = TestEnv::new();
        let mut issue = Issue::new("td-aaaaaa".to_string(), "A".to_string());
        issue.status = Status::InReview;
        issue.implementer_session = Some("ses_1".to_string());
        env.insert(&issue);
        let reject = transition(&env, "td-aaaaaa", ActionKind::Reject, Status::InProgress);

        let outcome = undo_last(&env.storage, "ses_1").unwrap();
        assert_eq!(outcome.original.rowid, reject);
        assert_eq!(outcome.compensating_action, ActionKind::Update);

        let restored = env.get("td-aaaaaa");
        assert_eq!(restored.status, Status::InReview);
        assert_eq!(restored.implementer_session.as_deref(), Some("ses_1"));

        assert!(env.storage.get_action(reject).unwrap().undone);
        let compensating = env.storage.get_action(outcome.compensating_rowid).unwrap();
        assert_eq!(compensating.undo_of, Some(reject));
        assert!(!compensating.undone);
    }

    #[test]
    fn test_repeated_undo_walks_back() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        transition(&env, "td-aaaaaa", ActionKind::Start, Status::InProgress);
        transition(&env, "td-aaaaaa", ActionKind::Block, Status::Blocked);

        undo_last(&env.storage, "ses_1").unwrap();
        assert_eq!(env.get("td-aaaaaa").status, Status::InProgress);
        undo_last(&env.storage, "ses_1").unwrap();
        assert_eq!(env.get("td-aaaaaa").status, Status::Open);
        assert!(matches!(
            undo_last(&env.storage, "ses_1"),
            Err(Error::NothingToUndo)
        ));
    }

    #[test]
    fn test_undo_closed_restores_closed_at_invariant() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        transition(&env, "td-aaaaaa", ActionKind::Close, Status::Closed);
        assert!(env.get("td-aaaaaa").closed_at.is_some());
        undo_last(&env.storage, "ses_1").unwrap();
        let issue = env.get("td-aaaaaa");
        assert_eq!(issue.status, Status::Open);
        assert!(issue.closed_at.is_none());
    }

    #[test]
    fn test_undo_create_soft_deletes() {
        let env = TestEnv::new();
        let issue = env.issue("td-aaaaaa", "A");
        env.storage
            .append_action(&NewAction::issue("ses_1", ActionKind::Create, None, Some(&issue)).unwrap())
            .unwrap();

        let outcome = undo_last(&env.storage, "ses_1").unwrap();
        assert_eq!(outcome.compensating_action, ActionKind::Delete);
        assert!(env.get("td-aaaaaa").is_deleted());
    }

    #[test]
    fn test_undo_dependency_add() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        env.issue("td-bbbbbb", "B");
        env.storage.add_dependency("td-bbbbbb", "td-aaaaaa").unwrap();
        let edge = Dependency::new("td-bbbbbb", "td-aaaaaa");
        env.storage
            .append_action(
                &NewAction::new("ses_1", ActionKind::AddDep, EntityKind::Dependency, &edge.entity_id())
                    .with_new(Some(&edge))
                    .unwrap(),
            )
            .unwrap();

        let outcome = undo_last(&env.storage, "ses_1").unwrap();
        assert_eq!(outcome.compensating_action, ActionKind::RemoveDep);
        assert!(!env.storage.has_dependency("td-bbbbbb", "td-aaaaaa").unwrap());
    }

    #[test]
    fn test_undo_unlink_restores_role_and_hash() {
        let env = TestEnv::new();
        let link = FileLink {
            issue_id: "td-aaaaaa".to_string(),
            file_path: "src/lib.rs".to_string(),
            role: FileRole::Test,
            content_hash: "deadbeef".to_string(),
            linked_at: ts::now(),
        };
        env.storage
            .append_action(
                &NewAction::new("ses_1", ActionKind::UnlinkFile, EntityKind::FileLink, &link.entity_id())
                    .with_previous(Some(&link))
                    .unwrap(),
            )
            .unwrap();

        undo_last(&env.storage, "ses_1").unwrap();
        let relinked = env
            .storage
            .get_file_link("td-aaaaaa", "src/lib.rs")
            .unwrap()
            .unwrap();
        assert_eq!(relinked.role, FileRole::Test);
        assert_eq!(relinked.content_hash, "deadbeef");
    }

    #[test]
    fn test_undo_relink_restores_prior_link() {
        let env = TestEnv::new();
        let original = FileLink {
            issue_id: "td-aaaaaa".to_string(),
            file_path: "a.rs".to_string(),
            role: FileRole::Test,
            content_hash: "0001".to_string(),
            linked_at: ts::now(),
        };
        let replacement = FileLink {
            role: FileRole::Reference,
            content_hash: "0002".to_string(),
            ..original.clone()
        };
        env.storage.insert_file_link(&replacement).unwrap();
        env.storage
            .append_action(
                &NewAction::new("ses_1", ActionKind::LinkFile, EntityKind::FileLink, &replacement.entity_id())
                    .with_previous(Some(&original))
                    .unwrap()
                    .with_new(Some(&replacement))
                    .unwrap(),
            )
            .unwrap();

        let outcome = undo_last(&env.storage, "ses_1").unwrap();
        assert_eq!(outcome.compensating_action, ActionKind::LinkFile);
        let restored = env.storage.get_file_link("td-aaaaaa", "a.rs").unwrap().unwrap();
        assert_eq!(restored.role, FileRole::Test);
        assert_eq!(restored.content_hash, "0001");
    }

    #[test]
    fn test_undo_first_link_removes_it() {
        let env = TestEnv::new();
        let link = FileLink {
            issue_id: "td-aaaaaa".to_string(),
            file_path: "a.rs".to_string(),
            role: FileRole::Implementation,
            content_hash: String::new(),
            linked_at: ts::now(),
        };
        env.storage.insert_file_link(&link).unwrap();
        env.storage
            .append_action(
                &NewAction::new("ses_1", ActionKind::LinkFile, EntityKind::FileLink, &link.entity_id())
                    .with_new(Some(&link))
                    .unwrap(),
            )
            .unwrap();

        let outcome = undo_last(&env.storage, "ses_1").unwrap();
        assert_eq!(outcome.compensating_action, ActionKind::UnlinkFile);
        assert!(env.storage.get_file_link("td-aaaaaa", "a.rs").unwrap().is_none());
    }

    #[test]
    fn test_undo_board_position_without_prior_removes_it() {
        let env = TestEnv::new();
        let position = BoardPosition {
            board_id: "bd-000001".to_string(),
            issue_id: "td-aaaaaa".to_string(),
            position: 1,
            added_at: ts::now(),
        };
        env.storage.set_board_position(&position).unwrap();
        env.storage
            .append_action(
                &NewAction::new(
                    "ses_1",
                    ActionKind::BoardSetPosition,
                    EntityKind::BoardPosition,
                    &position.entity_id(),
                )
                .with_new(Some(&position))
                .unwrap(),
            )
            .unwrap();

        let outcome = undo_last(&env.storage, "ses_1").unwrap();
        assert_eq!(outcome.compensating_action, ActionKind::BoardUnposition);
        assert!(env.storage.board_positions("bd-000001").unwrap().is_empty());
    }

    #[test]
    fn test_append_only_entities_not_supported_and_left_unflagged() {
        let env = TestEnv::new();
        let rowid = env
            .storage
            .append_action(&NewAction::new("ses_1", ActionKind::Create, EntityKind::Comments, "1"))
            .unwrap();

        assert!(matches!(
            undo_last(&env.storage, "ses_1"),
            Err(Error::UndoNotSupported(_))
        ));
        assert!(!env.storage.get_action(rowid).unwrap().undone);
    }

    #[test]
    fn test_missing_previous_data_leaves_original_unflagged() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        let rowid = env
            .storage
            .append_action(&NewAction::new("ses_1", ActionKind::Update, EntityKind::Issue, "td-aaaaaa"))
            .unwrap();

        assert!(undo_last(&env.storage, "ses_1").is_err());
        assert!(!env.storage.get_action(rowid).unwrap().undone);
        assert_eq!(env.storage.recent_actions("ses_1", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_undo_handoff_deletes_it() {
        let env = TestEnv::new();
        let handoff = env
            .storage
            .insert_handoff(&Handoff::new("td-aaaaaa", "ses_1"))
            .unwrap();
        env.storage
            .append_action(
                &NewAction::new("ses_1", ActionKind::Handoff, EntityKind::Handoff, &handoff.id.to_string())
                    .with_new(Some(&handoff))
                    .unwrap(),
            )
            .unwrap();

        undo_last(&env.storage, "ses_1").unwrap();
        assert!(env.storage.latest_handoff("td-aaaaaa").unwrap().is_none());
    }
}
