//! Session identity.
//!
//! A session names the acting agent. Resolution order:
//! 1. `TD_SESSION` environment variable
//! 2. `.todos/session` marker file
//! 3. a freshly generated `ses_<hex>` ID, persisted to the marker file

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::ts;
use crate::storage::{MARKER_DIR, write_atomic};
use crate::{Error, Result};

/// Environment variable that pins the session.
pub const SESSION_ENV: &str = "TD_SESSION";

const SESSION_FILE: &str = "session";

/// Where the current session came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionSource {
    Env,
    File,
    Created,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Session this one replaced via `session --new`
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(with = "ts")]
    pub started_at: DateTime<Utc>,
    #[serde(skip_deserializing, default = "default_source")]
    pub source: SessionSource,
}

fn default_source() -> SessionSource {
    SessionSource::File
}

impl Session {
    fn fresh(previous: Option<String>) -> Self {
        Self {
            id: generate_session_id(),
            name: None,
            previous,
            started_at: ts::now(),
            source: SessionSource::Created,
        }
    }
}

/// Generate a session ID (`ses_` + 6 hex chars).
pub fn generate_session_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("ses_{}", &hex[..6])
}

fn session_path(root: &Path) -> PathBuf {
    root.join(MARKER_DIR).join(SESSION_FILE)
}

fn env_session() -> Option<String> {
    std::env::var(SESSION_ENV)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn read_file(root: &Path) -> Result<Option<Session>> {
    let path = session_path(root);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)?;
    let session: Session = serde_json::from_str(&content)?;
    Ok(Some(session))
}

fn write_file(root: &Path, session: &Session) -> Result<()> {
    write_atomic(&session_path(root), &serde_json::to_string_pretty(session)?)
}

/// Resolve the current session, creating one if none exists.
pub fn resolve(root: &Path) -> Result<Session> {
    if let Some(id) = env_session() {
        tracing::debug!(session = %id, "session from environment");
        return Ok(Session {
            id,
            name: None,
            previous: None,
            started_at: ts::now(),
            source: SessionSource::Env,
        });
    }

    let existing = read_file(root).map_err(|e| {
        Error::NoActiveSession(format!("cannot read {}: {}", session_path(root).display(), e))
    })?;
    if let Some(session) = existing {
        return Ok(session);
    }

    let session = Session::fresh(None);
    write_file(root, &session).map_err(|e| {
        Error::NoActiveSession(format!("cannot create {}: {}", session_path(root).display(), e))
    })?;
    tracing::debug!(session = %session.id, "created session");
    Ok(session)
}

/// Resolve and return just the session ID.
pub fn current_id(root: &Path) -> Result<String> {
    Ok(resolve(root)?.id)
}

/// Start a new session, remembering the one it replaces.
pub fn rotate(root: &Path, name: Option<String>) -> Result<Session> {
    let previous = read_file(root).ok().flatten().map(|s| s.id);
    let mut session = Session::fresh(previous);
    session.name = name;
    write_file(root, &session)?;
    Ok(session)
}

/// Label the file-backed session.
pub fn set_name(root: &Path, name: &str) -> Result<Session> {
    let mut session = match read_file(root)? {
        Some(session) => session,
        None => Session::fresh(None),
    };
    session.name = Some(name.to_string());
    write_file(root, &session)?;
    Ok(session)
}
