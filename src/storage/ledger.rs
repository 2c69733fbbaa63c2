//! Action log and session-history ledger.

use rusqlite::{OptionalExtension, Row, params};

use super::{Storage, parse_column, timestamp_column};
use crate::action_log::{ActionLogEntry, NewAction};
use crate::models::{SessionAction, SessionHistoryEntry, ts};
use crate::{Error, Result};

const ACTION_COLUMNS: &str = "id, timestamp, session_id, action_type, entity_type, entity_id, \
    previous_data, new_data, undone, undo_of";

fn action_from_row(row: &Row) -> rusqlite::Result<ActionLogEntry> {
    Ok(ActionLogEntry {
        rowid: row.get(0)?,
        timestamp: timestamp_column(row, 1)?,
        session_id: row.get(2)?,
        action: parse_column(row, 3)?,
        entity_kind: parse_column(row, 4)?,
        entity_id: row.get(5)?,
        previous_data: row.get(6)?,
        new_data: row.get(7)?,
        undone: row.get(8)?,
        undo_of: row.get(9)?,
    })
}

impl Storage {
    // === Action Log ===

    /// Append an entry and return its rowid.
    pub fn append_action(&self, action: &NewAction) -> Result<i64> {
        self.conn().execute(
            r#"INSERT INTO action_log (
                timestamp, session_id, action_type, entity_type, entity_id,
                previous_data, new_data, undone, undo_of
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)"#,
            params![
                ts::format(&ts::now()),
                action.session_id,
                action.action.as_str(),
                action.entity_kind.as_str(),
                action.entity_id,
                action.previous_data,
                action.new_data,
                action.undo_of,
            ],
        )?;
        let rowid = self.conn().last_insert_rowid();
        tracing::debug!(
            rowid,
            action = action.action.as_str(),
            entity = %action.entity_id,
            "appended action"
        );
        Ok(rowid)
    }

    pub fn get_action(&self, rowid: i64) -> Result<ActionLogEntry> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM action_log WHERE id = ?1", ACTION_COLUMNS),
                [rowid],
                action_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("action #{}", rowid)))
    }

    /// Most recent entry for `session_id` that is neither undone nor compensating.
    pub fn last_undoable(&self, session_id: &str) -> Result<Option<ActionLogEntry>> {
        let entry = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {} FROM action_log
                     WHERE session_id = ?1 AND undone = 0 AND undo_of IS NULL
                     ORDER BY id DESC LIMIT 1",
                    ACTION_COLUMNS
                ),
                [session_id],
                action_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Undo candidates for `session_id`, newest first.
    pub fn undo_candidates(&self, session_id: &str, limit: usize) -> Result<Vec<ActionLogEntry>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {} FROM action_log
             WHERE session_id = ?1 AND undone = 0 AND undo_of IS NULL
             ORDER BY id DESC LIMIT ?2",
            ACTION_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![session_id, limit as i64], action_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Most recent entries for `session_id`, including undone and compensating ones.
    pub fn recent_actions(&self, session_id: &str, limit: usize) -> Result<Vec<ActionLogEntry>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {} FROM action_log WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
            ACTION_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![session_id, limit as i64], action_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Every entry touching `entity_id`, oldest first.
    pub fn actions_for_entity(&self, entity_id: &str) -> Result<Vec<ActionLogEntry>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {} FROM action_log WHERE entity_id = ?1 ORDER BY id ASC",
            ACTION_COLUMNS
        ))?;
        let entries = stmt
            .query_map([entity_id], action_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Flip the only mutable column of an action-log row.
    pub fn mark_undone(&self, rowid: i64) -> Result<()> {
        let changed = self
            .conn()
            .execute("UPDATE action_log SET undone = 1 WHERE id = ?1", [rowid])?;
        if changed == 0 {
            return Err(Error::NotFound(format!("action #{}", rowid)));
        }
        Ok(())
    }

    // === Session History ===

    pub fn record_session_action(
        &self,
        issue_id: &str,
        session_id: &str,
        action: SessionAction,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO session_history (issue_id, session_id, action, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![issue_id, session_id, action.as_str(), ts::format(&ts::now())],
        )?;
        Ok(())
    }

    pub fn session_history(&self, issue_id: &str) -> Result<Vec<SessionHistoryEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT issue_id, session_id, action, timestamp FROM session_history
             WHERE issue_id = ?1 ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map([issue_id], |row| {
                Ok(SessionHistoryEntry {
                    issue_id: row.get(0)?,
                    session_id: row.get(1)?,
                    action: parse_column(row, 2)?,
                    timestamp: timestamp_column(row, 3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Whether `session_id` has any session-history entry on `issue_id`.
    pub fn was_session_involved(&self, issue_id: &str, session_id: &str) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM session_history WHERE issue_id = ?1 AND session_id = ?2",
            params![issue_id, session_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
