//! Command implementations for the td CLI.
//!
//! Every command returns a result type implementing [`Output`]; `main`
//! renders it as human text or JSON lines. Commands are organized by area:
//! - `issue` - create, show, list, update, delete, restore
//! - `workflow` - start, unstart, review, approve, reject, close, block, reopen
//! - `handoff` - handoff capture
//! - `dep` - dependency edges
//! - `undo` - undo and action history
//! - `activity` - logs, comments, work sessions, focus, sessions
//! - `board` - boards and positions
//! - `link` - file links
//! - `config` - configuration get/set/list

pub mod activity;
pub mod board;
pub mod config;
pub mod dep;
pub mod handoff;
pub mod issue;
pub mod link;
pub mod undo;
pub mod workflow;

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::{ConfigOverrides, ResolvedConfig, resolve_config};
use crate::models::{LogEntry, LogType, Status};
use crate::storage::{Storage, validate_issue_id};
use crate::workflow::CascadeEvent;
use crate::{Error, Result, focus, session};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// One or more JSON objects, one per line.
    fn to_json(&self) -> String;

    /// Human-readable text.
    fn to_human(&self) -> String;

    /// Lines for stderr, printed as `Warning: <line>`.
    fn warnings(&self) -> Vec<String> {
        Vec::new()
    }

    /// Number of skipped items when nothing at all was processed.
    ///
    /// `Some` makes the command exit non-zero after printing its report.
    fn all_skipped(&self) -> Option<usize> {
        None
    }
}

/// Serialize one value as a single JSON line.
pub(crate) fn json_line<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error":"{}"}}"#, e))
}

/// Everything a command needs once the project is known.
pub struct Context {
    pub root: PathBuf,
    pub storage: Storage,
    pub session: String,
    pub config: ResolvedConfig,
}

impl Context {
    /// Open the store under `root` and resolve the acting session.
    pub fn open(root: &Path) -> Result<Self> {
        let storage = Storage::open(root)?;
        let session = session::current_id(root)?;
        let config = resolve_config(root, &ConfigOverrides::new())?;
        tracing::debug!(root = %root.display(), session = %session, "context opened");
        Ok(Self {
            root: root.to_path_buf(),
            storage,
            session,
            config,
        })
    }

    /// Append a log entry attributed to this session and the active work session.
    pub fn log(&self, issue_id: &str, log_type: LogType, message: &str) -> Result<i64> {
        let mut entry = LogEntry::new(issue_id, &self.session, log_type, message);
        entry.work_session_id = focus::get_work_session(&self.root).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not read work-session marker");
            None
        });
        self.storage.add_log(&entry)
    }

    /// Explicit IDs, or the focused issue when none were given.
    pub fn ids_or_focus(&self, ids: Vec<String>) -> Result<Vec<String>> {
        if !ids.is_empty() {
            return Ok(ids);
        }
        match focus::get_focus(&self.root)? {
            Some(id) => Ok(vec![id]),
            None => Err(Error::InvalidInput(
                "no issue ID given and no issue is focused".to_string(),
            )),
        }
    }

    /// Clear focus if it points at `issue_id`.
    pub fn unfocus(&self, issue_id: &str) {
        if focus::clear_focus_if(&self.root, issue_id) {
            tracing::debug!(issue = %issue_id, "cleared focus");
        }
    }
}

/// `init` - create the marker directory and store.
#[derive(Serialize)]
pub struct Initialized {
    pub path: String,
    pub created: bool,
}

impl Output for Initialized {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        if self.created {
            format!("Initialized td in {}", self.path)
        } else {
            format!("td already initialized in {}", self.path)
        }
    }
}

pub fn init(root: &Path) -> Result<Initialized> {
    let created = !Storage::exists(root);
    let storage = Storage::init(root)?;
    Ok(Initialized {
        path: storage.dir().display().to_string(),
        created,
    })
}

// === Bulk reporting ===

/// Per-ID result line of a bulk verb.
#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub id: String,
    pub status: Option<Status>,
    pub action: String,
    pub session: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Uppercase success label ("REVIEW REQUESTED")
    #[serde(skip)]
    pub label: String,
    #[serde(skip)]
    pub events: Vec<CascadeEvent>,
    #[serde(skip)]
    pub warnings: Vec<String>,
}

impl ItemOutcome {
    pub fn done(ctx: &Context, id: &str, status: Status, action: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            status: Some(status),
            action: action.to_string(),
            session: ctx.session.clone(),
            reason: None,
            error_code: None,
            message: None,
            label: label.to_string(),
            events: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Self-transition: reported as success with an "(already X)" annotation.
    pub fn unchanged(ctx: &Context, id: &str, status: Status, action: &str, label: &str) -> Self {
        let mut item = Self::done(ctx, id, status, action, label);
        item.message = Some(format!("already {}", status));
        item
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn with_events(mut self, events: Vec<CascadeEvent>) -> Self {
        for event in events {
            if let CascadeEvent::Warning { message } = &event {
                self.warnings.push(message.clone());
            }
            self.events.push(event);
        }
        self
    }

    fn is_skip(&self) -> bool {
        self.error_code.is_some()
    }

    fn skipped(ctx: &Context, id: &str, action: &str, err: &Error) -> Self {
        Self {
            id: id.to_string(),
            status: None,
            action: action.to_string(),
            session: ctx.session.clone(),
            reason: None,
            error_code: Some(err.code().to_string()),
            message: Some(err.to_string()),
            label: String::new(),
            events: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn event_json(&self) -> Vec<String> {
        #[derive(Serialize)]
        struct EventLine<'a> {
            id: &'a str,
            status: Status,
            action: &'static str,
            session: &'a str,
            message: String,
        }

        let mut lines = Vec::new();
        for event in &self.events {
            match event {
                CascadeEvent::ParentCascaded { id, status } => lines.push(json_line(&EventLine {
                    id,
                    status: *status,
                    action: "cascade_up",
                    session: &self.session,
                    message: format!("cascaded from {}", self.id),
                })),
                CascadeEvent::DescendantsReviewed { ids } => {
                    for id in ids {
                        lines.push(json_line(&EventLine {
                            id,
                            status: Status::InReview,
                            action: "cascade_down",
                            session: &self.session,
                            message: format!("cascaded from {}", self.id),
                        }));
                    }
                }
                CascadeEvent::DependentUnblocked { id } => lines.push(json_line(&EventLine {
                    id,
                    status: Status::Open,
                    action: "unblock",
                    session: &self.session,
                    message: format!("all dependencies resolved after {}", self.id),
                })),
                CascadeEvent::Warning { .. } => {}
            }
        }
        lines
    }
}

/// Outcome of a bulk verb over one or more IDs.
#[derive(Debug, Clone)]
pub struct BulkReport {
    /// Uppercase infinitive used in skip lines ("APPROVE")
    pub verb: String,
    pub items: Vec<ItemOutcome>,
}

impl BulkReport {
    pub fn processed(&self) -> usize {
        self.items.iter().filter(|i| !i.is_skip()).count()
    }

    pub fn skipped(&self) -> usize {
        self.items.iter().filter(|i| i.is_skip()).count()
    }
}

impl Output for BulkReport {
    fn to_json(&self) -> String {
        let mut lines = Vec::new();
        for item in &self.items {
            lines.push(json_line(item));
            lines.extend(item.event_json());
        }
        lines.join("\n")
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        for item in &self.items {
            if item.is_skip() {
                lines.push(format!(
                    "{} skipped {}: {}",
                    self.verb,
                    item.id,
                    item.message.as_deref().unwrap_or("failed")
                ));
                continue;
            }
            let mut line = format!("{} {}", item.label, item.id);
            if let Some(ref message) = item.message {
                line.push_str(&format!(" ({})", message));
            }
            lines.push(line);
            for event in item.events.iter().filter(|e| !e.is_warning()) {
                lines.push(event.to_string());
            }
        }
        if self.items.len() > 1 {
            lines.push(format!(
                "processed {}, skipped {}",
                self.processed(),
                self.skipped()
            ));
        }
        if lines.is_empty() {
            lines.push("No issues to process".to_string());
        }
        lines.join("\n")
    }

    fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for item in &self.items {
            warnings.extend(item.warnings.iter().cloned());
            if item.is_skip() && self.items.len() > 1 {
                warnings.push(format!(
                    "{} skipped: {}",
                    item.id,
                    item.message.as_deref().unwrap_or("failed")
                ));
            }
        }
        warnings
    }

    fn all_skipped(&self) -> Option<usize> {
        (!self.items.is_empty() && self.processed() == 0).then(|| self.skipped())
    }
}

/// Run `f` for each ID without short-circuiting.
///
/// IDs are validated first. With exactly one ID, its error is returned
/// directly instead of being folded into the report.
pub fn run_bulk<F>(ctx: &Context, verb: &str, action: &str, ids: &[String], mut f: F) -> Result<BulkReport>
where
    F: FnMut(&Context, &str) -> Result<ItemOutcome>,
{
    let mut items = Vec::new();

    for raw in ids {
        let result = validate_issue_id(raw).and_then(|id| f(ctx, &id));
        match result {
            Ok(item) => items.push(item),
            Err(e) if ids.len() == 1 => return Err(e),
            Err(e) => {
                tracing::debug!(id = %raw, error = %e, "bulk item skipped");
                items.push(ItemOutcome::skipped(ctx, raw.trim(), action, &e));
            }
        }
    }

    Ok(BulkReport {
        verb: verb.to_string(),
        items,
    })
}

/// Human summary of an issue used by list-like outputs.
#[derive(Debug, Clone, Serialize)]
pub struct IssueSummary {
    pub id: String,
    pub title: String,
    pub status: Status,
    #[serde(rename = "type")]
    pub issue_type: crate::models::IssueType,
    pub priority: crate::models::Priority,
}

impl From<&crate::models::Issue> for IssueSummary {
    fn from(issue: &crate::models::Issue) -> Self {
        Self {
            id: issue.id.clone(),
            title: issue.title.clone(),
            status: issue.status,
            issue_type: issue.issue_type,
            priority: issue.priority,
        }
    }
}

impl IssueSummary {
    pub fn line(&self) -> String {
        format!(
            "{}  [{}] {:<11} {:<7} {}",
            self.id, self.priority, self.status, self.issue_type, self.title
        )
    }
}
