//! Session-scoped activity: log, comment, work sessions, focus, session.

use serde::Serialize;
use std::path::Path;

use super::{Context, Output, json_line};
use crate::models::{Comment, LogEntry, LogType, WorkSession, ts};
use crate::session::{self, Session, SessionSource};
use crate::storage::{Storage, generate_id_with_prefix, validate_issue_id};
use crate::{Error, Result, focus};

// === log ===

#[derive(Serialize)]
pub struct Logged {
    #[serde(flatten)]
    pub entry: LogEntry,
}

impl Output for Logged {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        format!(
            "LOGGED {} [{}] {}",
            self.entry.issue_id, self.entry.log_type, self.entry.message
        )
    }
}

pub fn log(root: &Path, message: &str, issue: Option<String>, log_type: &str) -> Result<Logged> {
    let ctx = Context::open(root)?;
    let log_type: LogType = log_type.parse()?;
    let message = message.trim();
    if message.is_empty() {
        return Err(Error::InvalidInput("log message cannot be empty".to_string()));
    }

    let raw = ctx.ids_or_focus(issue.into_iter().collect())?.remove(0);
    let id = validate_issue_id(&raw)?;
    ctx.storage.get_live_issue(&id)?;

    let rowid = ctx.log(&id, log_type, message)?;
    let mut entry = LogEntry::new(&id, &ctx.session, log_type, message);
    entry.id = rowid;
    entry.work_session_id = focus::get_work_session(&ctx.root)?;
    Ok(Logged { entry })
}

// === comment ===

#[derive(Serialize)]
pub struct Commented {
    #[serde(flatten)]
    pub comment: Comment,
}

impl Output for Commented {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        format!("COMMENTED {}", self.comment.issue_id)
    }
}

pub fn comment(root: &Path, id: &str, text: &str) -> Result<Commented> {
    let ctx = Context::open(root)?;
    let id = validate_issue_id(id)?;
    ctx.storage.get_live_issue(&id)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::InvalidInput("comment cannot be empty".to_string()));
    }
    let comment = ctx.storage.add_comment(&id, &ctx.session, text)?;
    Ok(Commented { comment })
}

// === work sessions ===

#[derive(Serialize)]
pub struct WorkSessionInfo {
    pub work_session: Option<WorkSession>,
    #[serde(skip)]
    pub verb: &'static str,
}

impl Output for WorkSessionInfo {
    fn to_json(&self) -> String {
        json_line(&self.work_session)
    }

    fn to_human(&self) -> String {
        match self.work_session {
            Some(ref ws) => {
                let mut line = format!("{} {} \"{}\"", self.verb, ws.id, ws.name);
                if let Some(ended) = ws.ended_at {
                    line.push_str(&format!(" (ended {})", ts::format(&ended)));
                }
                line
            }
            None => "No active work session".to_string(),
        }
    }
}

fn active_work_session(root: &Path, storage: &Storage) -> Result<Option<WorkSession>> {
    match focus::get_work_session(root)? {
        Some(id) => match storage.get_work_session(&id) {
            Ok(ws) if ws.ended_at.is_none() => Ok(Some(ws)),
            Ok(_) => Ok(None),
            Err(Error::NotFound(_)) => {
                tracing::warn!(work_session = %id, "marker points at a missing work session");
                Ok(None)
            }
            Err(e) => Err(e),
        },
        None => Ok(None),
    }
}

pub fn ws_start(root: &Path, name: &str) -> Result<WorkSessionInfo> {
    let ctx = Context::open(root)?;
    if let Some(active) = active_work_session(&ctx.root, &ctx.storage)? {
        return Err(Error::InvalidInput(format!(
            "work session {} is already active; run `td ws end` first",
            active.id
        )));
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("work session name cannot be empty".to_string()));
    }

    let ws = WorkSession {
        id: generate_id_with_prefix("ws", name, 6),
        name: name.to_string(),
        session_id: ctx.session.clone(),
        started_at: ts::now(),
        ended_at: None,
    };
    ctx.storage.insert_work_session(&ws)?;
    focus::set_work_session(&ctx.root, &ws.id)?;

    Ok(WorkSessionInfo {
        work_session: Some(ws),
        verb: "STARTED",
    })
}

pub fn ws_end(root: &Path) -> Result<WorkSessionInfo> {
    let ctx = Context::open(root)?;
    let active = active_work_session(&ctx.root, &ctx.storage)?
        .ok_or_else(|| Error::NotFound("active work session".to_string()))?;
    let ended = ctx.storage.end_work_session(&active.id)?;
    focus::clear_work_session(&ctx.root)?;
    Ok(WorkSessionInfo {
        work_session: Some(ended),
        verb: "ENDED",
    })
}

pub fn ws_current(root: &Path) -> Result<WorkSessionInfo> {
    let ctx = Context::open(root)?;
    Ok(WorkSessionInfo {
        work_session: active_work_session(&ctx.root, &ctx.storage)?,
        verb: "ACTIVE",
    })
}

// === focus ===

#[derive(Serialize)]
pub struct FocusInfo {
    pub focus: Option<String>,
    #[serde(skip)]
    pub changed: bool,
}

impl Output for FocusInfo {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        match (&self.focus, self.changed) {
            (Some(id), true) => format!("FOCUSED {}", id),
            (Some(id), false) => format!("Focused on {}", id),
            (None, true) => "UNFOCUSED".to_string(),
            (None, false) => "No issue focused".to_string(),
        }
    }
}

pub fn focus_cmd(root: &Path, id: Option<String>) -> Result<FocusInfo> {
    let ctx = Context::open(root)?;
    match id {
        Some(raw) => {
            let id = validate_issue_id(&raw)?;
            ctx.storage.get_live_issue(&id)?;
            focus::set_focus(&ctx.root, &id)?;
            Ok(FocusInfo {
                focus: Some(id),
                changed: true,
            })
        }
        None => Ok(FocusInfo {
            focus: focus::get_focus(&ctx.root)?,
            changed: false,
        }),
    }
}

pub fn unfocus(root: &Path) -> Result<FocusInfo> {
    if !Storage::exists(root) {
        return Err(Error::NotInitialized);
    }
    let cleared = focus::clear_focus(root)?;
    Ok(FocusInfo {
        focus: None,
        changed: cleared,
    })
}

// === session ===

#[derive(Serialize)]
pub struct SessionInfo {
    #[serde(flatten)]
    pub session: Session,
    #[serde(skip)]
    pub rotated: bool,
    #[serde(skip)]
    pub warnings: Vec<String>,
}

impl Output for SessionInfo {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        let mut line = if self.rotated {
            format!("NEW SESSION {}", self.session.id)
        } else {
            format!("Session {}", self.session.id)
        };
        if let Some(ref name) = self.session.name {
            line.push_str(&format!(" \"{}\"", name));
        }
        if let Some(ref previous) = self.session.previous {
            line.push_str(&format!(" (previous {})", previous));
        }
        if self.session.source == SessionSource::Env {
            line.push_str(" [from TD_SESSION]");
        }
        line
    }

    fn warnings(&self) -> Vec<String> {
        self.warnings.clone()
    }
}

pub fn session_cmd(root: &Path, new: bool, name: Option<String>) -> Result<SessionInfo> {
    if !Storage::exists(root) {
        return Err(Error::NotInitialized);
    }
    let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

    let mut warnings = Vec::new();
    let overridden = session::resolve(root)?.source == SessionSource::Env;
    if overridden && (new || name.is_some()) {
        warnings.push(format!(
            "{} is set and overrides the session file",
            session::SESSION_ENV
        ));
    }

    let (session, rotated) = if new {
        (session::rotate(root, name)?, true)
    } else if let Some(name) = name {
        (session::set_name(root, &name)?, false)
    } else {
        (session::resolve(root)?, false)
    };

    Ok(SessionInfo {
        session,
        rotated,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SESSION_ENV;
    use crate::test_utils::TestEnv;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_log_attaches_work_session() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        unsafe { std::env::set_var(SESSION_ENV, "ses_1") };

        let ws = ws_start(env.path(), "morning").unwrap();
        let ws_id = ws.work_session.unwrap().id;
        assert!(ws_id.starts_with("ws-"));
        assert!(ws_start(env.path(), "again").is_err());

        let logged = log(env.path(), "probing", Some("td-aaaaaa".to_string()), "tried").unwrap();
        assert_eq!(logged.entry.work_session_id.as_deref(), Some(ws_id.as_str()));

        let ended = ws_end(env.path()).unwrap();
        assert!(ended.work_session.unwrap().ended_at.is_some());
        assert!(ws_current(env.path()).unwrap().work_session.is_none());
        unsafe { std::env::remove_var(SESSION_ENV) };

        let logs = env.storage.get_logs("td-aaaaaa", None).unwrap();
        assert_eq!(logs[0].log_type, LogType::Tried);
        assert_eq!(logs[0].work_session_id.as_deref(), Some(ws_id.as_str()));
    }

    #[test]
    #[serial]
    fn test_log_without_issue_uses_focus() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        unsafe { std::env::set_var(SESSION_ENV, "ses_1") };

        assert!(log(env.path(), "x", None, "progress").is_err());
        focus_cmd(env.path(), Some("td-aaaaaa".to_string())).unwrap();
        let logged = log(env.path(), "x", None, "progress").unwrap();
        unsafe { std::env::remove_var(SESSION_ENV) };

        assert_eq!(logged.entry.issue_id, "td-aaaaaa");
        assert!(unfocus(env.path()).unwrap().changed);
    }

    #[test]
    #[serial]
    fn test_session_rotate_keeps_previous() {
        let env = TestEnv::new();
        unsafe { std::env::remove_var(SESSION_ENV) };

        let first = session_cmd(env.path(), false, None).unwrap();
        let second = session_cmd(env.path(), true, Some("pairing".to_string())).unwrap();

        assert_ne!(first.session.id, second.session.id);
        assert_eq!(second.session.previous.as_deref(), Some(first.session.id.as_str()));
        assert!(second.to_human().starts_with("NEW SESSION ses_"));
    }
}
