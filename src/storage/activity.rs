//! Handoffs, progress logs, comments and work sessions.

use rusqlite::{OptionalExtension, Row, params};

use super::{
    Storage, json_list_column, optional_timestamp_column, parse_column, timestamp_column,
};
use crate::models::{Comment, Handoff, LogEntry, WorkSession, ts};
use crate::{Error, Result};

const HANDOFF_COLUMNS: &str =
    "id, issue_id, session_id, done, remaining, decisions, uncertain, timestamp";

fn handoff_from_row(row: &Row) -> rusqlite::Result<Handoff> {
    Ok(Handoff {
        id: row.get(0)?,
        issue_id: row.get(1)?,
        session_id: row.get(2)?,
        done: json_list_column(row, 3)?,
        remaining: json_list_column(row, 4)?,
        decisions: json_list_column(row, 5)?,
        uncertain: json_list_column(row, 6)?,
        timestamp: timestamp_column(row, 7)?,
    })
}

fn log_from_row(row: &Row) -> rusqlite::Result<LogEntry> {
    Ok(LogEntry {
        id: row.get(0)?,
        issue_id: row.get(1)?,
        session_id: row.get(2)?,
        work_session_id: row.get(3)?,
        log_type: parse_column(row, 4)?,
        message: row.get(5)?,
        timestamp: timestamp_column(row, 6)?,
    })
}

fn work_session_from_row(row: &Row) -> rusqlite::Result<WorkSession> {
    Ok(WorkSession {
        id: row.get(0)?,
        name: row.get(1)?,
        session_id: row.get(2)?,
        started_at: timestamp_column(row, 3)?,
        ended_at: optional_timestamp_column(row, 4)?,
    })
}

impl Storage {
    // === Handoffs ===

    /// Insert a handoff and return it with its assigned ID.
    pub fn insert_handoff(&self, handoff: &Handoff) -> Result<Handoff> {
        self.conn().execute(
            r#"INSERT INTO handoffs (issue_id, session_id, done, remaining, decisions, uncertain, timestamp)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                handoff.issue_id,
                handoff.session_id,
                serde_json::to_string(&handoff.done)?,
                serde_json::to_string(&handoff.remaining)?,
                serde_json::to_string(&handoff.decisions)?,
                serde_json::to_string(&handoff.uncertain)?,
                ts::format(&handoff.timestamp),
            ],
        )?;
        let mut stored = handoff.clone();
        stored.id = self.conn().last_insert_rowid();
        Ok(stored)
    }

    /// Latest handoff for an issue, by insertion order.
    pub fn latest_handoff(&self, issue_id: &str) -> Result<Option<Handoff>> {
        let handoff = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {} FROM handoffs WHERE issue_id = ?1 ORDER BY id DESC LIMIT 1",
                    HANDOFF_COLUMNS
                ),
                [issue_id],
                handoff_from_row,
            )
            .optional()?;
        Ok(handoff)
    }

    pub fn get_handoff(&self, id: i64) -> Result<Handoff> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM handoffs WHERE id = ?1", HANDOFF_COLUMNS),
                [id],
                handoff_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("handoff {}", id)))
    }

    pub fn delete_handoff(&self, id: i64) -> Result<()> {
        let removed = self
            .conn()
            .execute("DELETE FROM handoffs WHERE id = ?1", [id])?;
        if removed == 0 {
            return Err(Error::NotFound(format!("handoff {}", id)));
        }
        Ok(())
    }

    // === Logs ===

    pub fn add_log(&self, entry: &LogEntry) -> Result<i64> {
        self.conn().execute(
            r#"INSERT INTO logs (issue_id, session_id, work_session_id, log_type, message, timestamp)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                entry.issue_id,
                entry.session_id,
                entry.work_session_id,
                entry.log_type.as_str(),
                entry.message,
                ts::format(&entry.timestamp),
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Logs for an issue, oldest first; `limit` keeps only the newest N.
    pub fn get_logs(&self, issue_id: &str, limit: Option<usize>) -> Result<Vec<LogEntry>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = self.conn().prepare(
            "SELECT id, issue_id, session_id, work_session_id, log_type, message, timestamp
             FROM (SELECT * FROM logs WHERE issue_id = ?1 ORDER BY id DESC LIMIT ?2)
             ORDER BY id ASC",
        )?;
        let logs = stmt
            .query_map(params![issue_id, limit], log_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    // === Comments ===

    pub fn add_comment(&self, issue_id: &str, session_id: &str, text: &str) -> Result<Comment> {
        let created_at = ts::now();
        self.conn().execute(
            "INSERT INTO comments (issue_id, session_id, text, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![issue_id, session_id, text, ts::format(&created_at)],
        )?;
        Ok(Comment {
            id: self.conn().last_insert_rowid(),
            issue_id: issue_id.to_string(),
            session_id: session_id.to_string(),
            text: text.to_string(),
            created_at,
        })
    }

    pub fn get_comments(&self, issue_id: &str) -> Result<Vec<Comment>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, issue_id, session_id, text, created_at FROM comments
             WHERE issue_id = ?1 ORDER BY id ASC",
        )?;
        let comments = stmt
            .query_map([issue_id], |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    issue_id: row.get(1)?,
                    session_id: row.get(2)?,
                    text: row.get(3)?,
                    created_at: timestamp_column(row, 4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(comments)
    }

    // === Work Sessions ===

    pub fn insert_work_session(&self, ws: &WorkSession) -> Result<()> {
        self.conn().execute(
            "INSERT INTO work_sessions (id, name, session_id, started_at, ended_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                ws.id,
                ws.name,
                ws.session_id,
                ts::format(&ws.started_at),
                ws.ended_at.as_ref().map(ts::format),
            ],
        )?;
        Ok(())
    }

    pub fn get_work_session(&self, id: &str) -> Result<WorkSession> {
        self.conn()
            .query_row(
                "SELECT id, name, session_id, started_at, ended_at FROM work_sessions WHERE id = ?1",
                [id],
                work_session_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("work session {}", id)))
    }

    pub fn end_work_session(&self, id: &str) -> Result<WorkSession> {
        self.conn().execute(
            "UPDATE work_sessions SET ended_at = ?2 WHERE id = ?1 AND ended_at IS NULL",
            params![id, ts::format(&ts::now())],
        )?;
        self.get_work_session(id)
    }
}

#[cfg(test)]
mod tests {
    use crate::models::{Handoff, LogEntry, LogType, WorkSession, ts};
    use crate::test_utils::TestEnv;

    #[test]
    fn test_latest_handoff_wins() {
        let env = TestEnv::new();
        assert!(env.storage.latest_handoff("td-aaaaaa").unwrap().is_none());

        let mut first = Handoff::new("td-aaaaaa", "ses_1");
        first.done.push("one".to_string());
        env.storage.insert_handoff(&first).unwrap();

        let mut second = Handoff::new("td-aaaaaa", "ses_1");
        second.remaining.push("two".to_string());
        let stored = env.storage.insert_handoff(&second).unwrap();

        let latest = env.storage.latest_handoff("td-aaaaaa").unwrap().unwrap();
        assert_eq!(latest.id, stored.id);
        assert_eq!(latest.remaining, vec!["two"]);
    }

    #[test]
    fn test_delete_handoff() {
        let env = TestEnv::new();
        let stored = env
            .storage
            .insert_handoff(&Handoff::auto_generated("td-aaaaaa", "ses_1"))
            .unwrap();
        env.storage.delete_handoff(stored.id).unwrap();
        assert!(env.storage.latest_handoff("td-aaaaaa").unwrap().is_none());
        assert!(env.storage.delete_handoff(stored.id).is_err());
    }

    #[test]
    fn test_logs_limit_keeps_newest() {
        let env = TestEnv::new();
        for msg in ["a", "b", "c"] {
            env.storage
                .add_log(&LogEntry::new("td-aaaaaa", "ses_1", LogType::Progress, msg))
                .unwrap();
        }
        let all = env.storage.get_logs("td-aaaaaa", None).unwrap();
        assert_eq!(all.len(), 3);
        let newest: Vec<String> = env
            .storage
            .get_logs("td-aaaaaa", Some(2))
            .unwrap()
            .into_iter()
            .map(|l| l.message)
            .collect();
        assert_eq!(newest, vec!["b", "c"]);
    }

    #[test]
    fn test_comments_in_order() {
        let env = TestEnv::new();
        env.storage.add_comment("td-aaaaaa", "ses_1", "first").unwrap();
        env.storage.add_comment("td-aaaaaa", "ses_2", "second").unwrap();
        let comments = env.storage.get_comments("td-aaaaaa").unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[1].session_id, "ses_2");
    }

    #[test]
    fn test_work_session_lifecycle() {
        let env = TestEnv::new();
        let ws = WorkSession {
            id: "ws-abc123".to_string(),
            name: "morning".to_string(),
            session_id: "ses_1".to_string(),
            started_at: ts::now(),
            ended_at: None,
        };
        env.storage.insert_work_session(&ws).unwrap();
        let ended = env.storage.end_work_session("ws-abc123").unwrap();
        assert!(ended.ended_at.is_some());
    }
}
