//! Board commands. A board is a named, ordered view over issues.

use serde::Serialize;
use std::path::Path;

use super::{Context, IssueSummary, Output, json_line};
use crate::action_log::{ActionKind, EntityKind, NewAction};
use crate::models::{Board, BoardPosition, BoardSnapshot, ts};
use crate::storage::{generate_id_with_prefix, validate_issue_id};
use crate::{Error, Result};

#[derive(Serialize)]
pub struct BoardChanged {
    #[serde(flatten)]
    pub board: Board,
    pub action: &'static str,
    pub session: String,
}

impl Output for BoardChanged {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        let verb = match self.action {
            "board_create" => "CREATED BOARD",
            "board_update" => "UPDATED BOARD",
            _ => "DELETED BOARD",
        };
        format!("{} {} \"{}\"", verb, self.board.id, self.board.name)
    }
}

fn board_action<T: Serialize>(
    ctx: &Context,
    kind: ActionKind,
    board_id: &str,
    previous: Option<&T>,
    new: Option<&T>,
) -> Result<NewAction> {
    NewAction::new(&ctx.session, kind, EntityKind::Board, board_id)
        .with_previous(previous)?
        .with_new(new)
}

pub fn create(root: &Path, name: &str, query: &str) -> Result<BoardChanged> {
    let ctx = Context::open(root)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("board name cannot be empty".to_string()));
    }

    let now = ts::now();
    let board = Board {
        id: generate_id_with_prefix("bd", name, 6),
        name: name.to_string(),
        query: query.trim().to_string(),
        created_at: now,
        updated_at: now,
    };
    ctx.storage.transaction(|s| {
        s.insert_board(&board)?;
        s.append_action(&board_action(
            &ctx,
            ActionKind::BoardCreate,
            &board.id,
            None,
            Some(&board),
        )?)?;
        Ok(())
    })?;

    Ok(BoardChanged {
        board,
        action: "board_create",
        session: ctx.session,
    })
}

pub fn update(
    root: &Path,
    key: &str,
    query: Option<String>,
    rename: Option<String>,
) -> Result<BoardChanged> {
    let ctx = Context::open(root)?;
    let before = ctx.storage.get_board(key)?;

    let mut after = before.clone();
    if let Some(name) = rename {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("board name cannot be empty".to_string()));
        }
        after.name = name.to_string();
    }
    if let Some(query) = query {
        after.query = query.trim().to_string();
    }
    if after == before {
        return Err(Error::InvalidInput(
            "nothing to update (use --query or --rename)".to_string(),
        ));
    }
    after.updated_at = ts::now();

    ctx.storage.transaction(|s| {
        s.update_board(&after)?;
        s.append_action(&board_action(
            &ctx,
            ActionKind::BoardUpdate,
            &after.id,
            Some(&before),
            Some(&after),
        )?)?;
        Ok(())
    })?;

    Ok(BoardChanged {
        board: after,
        action: "board_update",
        session: ctx.session,
    })
}

pub fn delete(root: &Path, key: &str) -> Result<BoardChanged> {
    let ctx = Context::open(root)?;
    let board = ctx.storage.get_board(key)?;

    ctx.storage.transaction(|s| {
        let before = BoardSnapshot {
            board: board.clone(),
            positions: s.board_positions(&board.id)?,
        };
        s.delete_board(&board.id)?;
        s.append_action(&board_action(
            &ctx,
            ActionKind::BoardDelete,
            &board.id,
            Some(&before),
            None,
        )?)?;
        Ok(())
    })?;

    Ok(BoardChanged {
        board,
        action: "board_delete",
        session: ctx.session,
    })
}

#[derive(Serialize)]
pub struct BoardList {
    pub boards: Vec<Board>,
}

impl Output for BoardList {
    fn to_json(&self) -> String {
        self.boards
            .iter()
            .map(json_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn to_human(&self) -> String {
        if self.boards.is_empty() {
            return "No boards".to_string();
        }
        self.boards
            .iter()
            .map(|b| {
                if b.query.is_empty() {
                    format!("{}  {}", b.id, b.name)
                } else {
                    format!("{}  {}  ({})", b.id, b.name, b.query)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn list(root: &Path) -> Result<BoardList> {
    let ctx = Context::open(root)?;
    Ok(BoardList {
        boards: ctx.storage.list_boards()?,
    })
}

#[derive(Serialize)]
pub struct PositionedIssue {
    pub position: i64,
    #[serde(flatten)]
    pub issue: IssueSummary,
}

#[derive(Serialize)]
pub struct BoardView {
    pub board: Board,
    pub issues: Vec<PositionedIssue>,
}

impl Output for BoardView {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("{} \"{}\"", self.board.id, self.board.name)];
        if self.issues.is_empty() {
            lines.push("  (no positioned issues)".to_string());
        }
        for entry in &self.issues {
            lines.push(format!("  {:>3}. {}", entry.position, entry.issue.line()));
        }
        lines.join("\n")
    }
}

pub fn show(root: &Path, key: &str) -> Result<BoardView> {
    let ctx = Context::open(root)?;
    let board = ctx.storage.get_board(key)?;

    let mut issues = Vec::new();
    for position in ctx.storage.board_positions(&board.id)? {
        match ctx.storage.find_issue(&position.issue_id)? {
            Some(issue) if !issue.is_deleted() => issues.push(PositionedIssue {
                position: position.position,
                issue: IssueSummary::from(&issue),
            }),
            _ => tracing::debug!(issue = %position.issue_id, "skipping missing board entry"),
        }
    }

    Ok(BoardView { board, issues })
}

#[derive(Debug, Serialize)]
pub struct PositionChanged {
    pub board_id: String,
    pub issue_id: String,
    pub position: Option<i64>,
    pub session: String,
}

impl Output for PositionChanged {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        match self.position {
            Some(p) => format!("MOVED {} to {} on {}", self.issue_id, p, self.board_id),
            None => format!("UNPOSITIONED {} on {}", self.issue_id, self.board_id),
        }
    }
}

pub fn move_issue(root: &Path, key: &str, id: &str, position: i64) -> Result<PositionChanged> {
    let ctx = Context::open(root)?;
    let board = ctx.storage.get_board(key)?;
    let id = validate_issue_id(id)?;
    ctx.storage.get_live_issue(&id)?;
    if position < 0 {
        return Err(Error::InvalidInput("position must be zero or greater".to_string()));
    }

    let pos = BoardPosition {
        board_id: board.id.clone(),
        issue_id: id.clone(),
        position,
        added_at: ts::now(),
    };
    ctx.storage.transaction(|s| {
        let previous = s.get_board_position(&board.id, &id)?;
        s.set_board_position(&pos)?;
        let entry = NewAction::new(
            &ctx.session,
            ActionKind::BoardSetPosition,
            EntityKind::BoardPosition,
            &pos.entity_id(),
        )
        .with_previous(previous.as_ref())?
        .with_new(Some(&pos))?;
        s.append_action(&entry)?;
        Ok(())
    })?;

    Ok(PositionChanged {
        board_id: board.id,
        issue_id: id,
        position: Some(position),
        session: ctx.session,
    })
}

pub fn unposition(root: &Path, key: &str, id: &str) -> Result<PositionChanged> {
    let ctx = Context::open(root)?;
    let board = ctx.storage.get_board(key)?;
    let id = validate_issue_id(id)?;

    ctx.storage.transaction(|s| {
        let previous = s.get_board_position(&board.id, &id)?.ok_or_else(|| {
            Error::NotFound(format!("{} has no position on {}", id, board.id))
        })?;
        s.remove_board_position(&board.id, &id)?;
        let entry = NewAction::new(
            &ctx.session,
            ActionKind::BoardUnposition,
            EntityKind::BoardPosition,
            &previous.entity_id(),
        )
        .with_previous(Some(&previous))?;
        s.append_action(&entry)?;
        Ok(())
    })?;

    Ok(PositionChanged {
        board_id: board.id,
        issue_id: id,
        position: None,
        session: ctx.session,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SESSION_ENV;
    use crate::test_utils::TestEnv;
    use crate::undo;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_board_lifecycle_and_undo_delete() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        env.issue("td-bbbbbb", "B");
        unsafe { std::env::set_var(SESSION_ENV, "ses_1") };

        let created = create(env.path(), "Sprint", "status:open").unwrap();
        move_issue(env.path(), "Sprint", "td-bbbbbb", 1).unwrap();
        move_issue(env.path(), "Sprint", "td-aaaaaa", 2).unwrap();

        let view = show(env.path(), "Sprint").unwrap();
        let order: Vec<&str> = view.issues.iter().map(|i| i.issue.id.as_str()).collect();
        assert_eq!(order, vec!["td-bbbbbb", "td-aaaaaa"]);

        delete(env.path(), &created.board.id).unwrap();
        assert!(list(env.path()).unwrap().boards.is_empty());
        unsafe { std::env::remove_var(SESSION_ENV) };

        undo::undo_last(&env.storage, "ses_1").unwrap();
        let positions = env.storage.board_positions(&created.board.id).unwrap();
        assert_eq!(positions.len(), 2);
    }

    #[test]
    #[serial]
    fn test_update_requires_a_change() {
        let env = TestEnv::new();
        unsafe { std::env::set_var(SESSION_ENV, "ses_1") };
        create(env.path(), "Triage", "").unwrap();
        assert!(update(env.path(), "Triage", None, None).is_err());
        let renamed = update(env.path(), "Triage", None, Some("Inbox".to_string())).unwrap();
        unsafe { std::env::remove_var(SESSION_ENV) };
        assert_eq!(renamed.board.name, "Inbox");
    }

    #[test]
    #[serial]
    fn test_unposition_missing_is_not_found() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        unsafe { std::env::set_var(SESSION_ENV, "ses_1") };
        create(env.path(), "Sprint", "").unwrap();
        let err = unposition(env.path(), "Sprint", "td-aaaaaa").unwrap_err();
        unsafe { std::env::remove_var(SESSION_ENV) };
        assert!(matches!(err, Error::NotFound(_)));
    }
}
