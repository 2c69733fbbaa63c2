//! Issue CRUD: create, show, list, update, delete, restore.

use serde::Serialize;
use std::path::Path;

use super::{BulkReport, Context, IssueSummary, ItemOutcome, Output, json_line, run_bulk};
use crate::action_log::{ActionKind, NewAction};
use crate::models::{
    Comment, FileLink, Handoff, Issue, IssueType, LogEntry, Priority, Status, ts, validate_points,
};
use crate::storage::{IssueFilter, validate_issue_id};
use crate::workflow::record_issue_change;
use crate::{Error, Result};

/// Number of log entries `show` includes.
const SHOW_LOG_LIMIT: usize = 5;

// === create ===

/// Field values for a new issue as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct NewIssue {
    pub title: String,
    pub issue_type: Option<String>,
    pub priority: Option<String>,
    pub points: Option<u8>,
    pub labels: Vec<String>,
    pub description: Option<String>,
    pub acceptance: Option<String>,
    pub parent: Option<String>,
    pub sprint: Option<String>,
    pub minor: bool,
}

#[derive(Debug, Serialize)]
pub struct IssueCreated {
    pub id: String,
    pub title: String,
    pub status: Status,
    pub session: String,
}

impl Output for IssueCreated {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        format!("CREATED {} {}", self.id, self.title)
    }
}

fn parse_parent(ctx: &Context, raw: &str) -> Result<String> {
    let parent = validate_issue_id(raw)?;
    ctx.storage.get_live_issue(&parent)?;
    Ok(parent)
}

pub fn create(root: &Path, new: NewIssue) -> Result<IssueCreated> {
    let ctx = Context::open(root)?;

    let title = new.title.trim().to_string();
    if title.is_empty() {
        return Err(Error::InvalidInput("title cannot be empty".to_string()));
    }

    let id = ctx.storage.next_issue_id(&title)?;
    let mut issue = Issue::new(id.clone(), title);
    issue.issue_type = match new.issue_type {
        Some(ref t) => t.parse()?,
        None => ctx.config.default_type(),
    };
    issue.priority = match new.priority {
        Some(ref p) => p.parse()?,
        None => ctx.config.default_priority(),
    };
    if let Some(points) = new.points {
        issue.points = validate_points(points)?;
    }
    issue.set_labels(&new.labels);
    issue.description = new.description.unwrap_or_default();
    issue.acceptance = new.acceptance.unwrap_or_default();
    if let Some(ref parent) = new.parent {
        issue.parent_id = Some(parse_parent(&ctx, parent)?);
    }
    issue.sprint = new.sprint.filter(|s| !s.trim().is_empty());
    issue.minor = new.minor;
    issue.creator_session = Some(ctx.session.clone());

    ctx.storage.transaction(|s| {
        s.insert_issue(&issue)?;
        s.append_action(&NewAction::issue(
            &ctx.session,
            ActionKind::Create,
            None,
            Some(&issue),
        )?)?;
        Ok(())
    })?;
    tracing::debug!(issue = %id, "created issue");

    Ok(IssueCreated {
        id,
        title: issue.title,
        status: issue.status,
        session: ctx.session,
    })
}

// === show ===

#[derive(Serialize)]
pub struct IssueDetail {
    #[serde(flatten)]
    pub issue: Issue,
    pub handoff: Option<Handoff>,
    pub dependencies: Vec<IssueSummary>,
    pub dependents: Vec<IssueSummary>,
    pub children: Vec<IssueSummary>,
    pub files: Vec<FileLink>,
    pub logs: Vec<LogEntry>,
    pub comments: Vec<Comment>,
}

fn push_list(lines: &mut Vec<String>, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    lines.push(format!("  {}:", heading));
    for item in items {
        lines.push(format!("    - {}", item));
    }
}

impl Output for IssueDetail {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        let issue = &self.issue;
        let mut lines = vec![
            format!("{}: {}", issue.id, issue.title),
            format!(
                "Status: {}  Type: {}  Priority: {}{}",
                issue.status,
                issue.issue_type,
                issue.priority,
                if issue.minor { "  (minor)" } else { "" }
            ),
        ];
        if issue.points > 0 {
            lines.push(format!("Points: {}", issue.points));
        }
        if !issue.labels.is_empty() {
            lines.push(format!("Labels: {}", issue.labels.join(", ")));
        }
        if let Some(ref parent) = issue.parent_id {
            lines.push(format!("Parent: {}", parent));
        }
        if let Some(ref sprint) = issue.sprint {
            lines.push(format!("Sprint: {}", sprint));
        }
        for (role, session) in [
            ("Creator", &issue.creator_session),
            ("Implementer", &issue.implementer_session),
            ("Reviewer", &issue.reviewer_session),
        ] {
            if let Some(session) = session {
                lines.push(format!("{}: {}", role, session));
            }
        }
        if issue.is_deleted() {
            lines.push("Deleted: yes".to_string());
        }
        if !issue.description.is_empty() {
            lines.push(String::new());
            lines.push(issue.description.clone());
        }
        if !issue.acceptance.is_empty() {
            lines.push(String::new());
            lines.push("Acceptance:".to_string());
            lines.push(issue.acceptance.clone());
        }

        if !self.children.is_empty() {
            lines.push(String::new());
            lines.push("Children:".to_string());
            lines.extend(self.children.iter().map(|c| format!("  {}", c.line())));
        }
        if !self.dependencies.is_empty() {
            lines.push(String::new());
            lines.push("Depends on:".to_string());
            lines.extend(self.dependencies.iter().map(|c| format!("  {}", c.line())));
        }
        if !self.dependents.is_empty() {
            lines.push(String::new());
            lines.push("Blocks:".to_string());
            lines.extend(self.dependents.iter().map(|c| format!("  {}", c.line())));
        }

        if let Some(ref handoff) = self.handoff {
            lines.push(String::new());
            lines.push(format!(
                "Handoff ({} by {}):",
                ts::format(&handoff.timestamp),
                handoff.session_id
            ));
            push_list(&mut lines, "Done", &handoff.done);
            push_list(&mut lines, "Remaining", &handoff.remaining);
            push_list(&mut lines, "Decisions", &handoff.decisions);
            push_list(&mut lines, "Uncertain", &handoff.uncertain);
        }

        if !self.files.is_empty() {
            lines.push(String::new());
            lines.push("Files:".to_string());
            for link in &self.files {
                lines.push(format!("  {} ({})", link.file_path, link.role));
            }
        }

        if !self.logs.is_empty() {
            lines.push(String::new());
            lines.push("Recent log:".to_string());
            for log in &self.logs {
                lines.push(format!(
                    "  {} [{}] {}",
                    ts::format(&log.timestamp),
                    log.log_type,
                    log.message
                ));
            }
        }

        if !self.comments.is_empty() {
            lines.push(String::new());
            lines.push("Comments:".to_string());
            for comment in &self.comments {
                lines.push(format!("  {}: {}", comment.session_id, comment.text));
            }
        }

        lines.join("\n")
    }
}

fn summaries(ctx: &Context, ids: &[String]) -> Result<Vec<IssueSummary>> {
    let mut out = Vec::new();
    for id in ids {
        if let Some(issue) = ctx.storage.find_issue(id)? {
            out.push(IssueSummary::from(&issue));
        }
    }
    Ok(out)
}

pub fn show(root: &Path, id: &str) -> Result<IssueDetail> {
    let ctx = Context::open(root)?;
    let id = validate_issue_id(id)?;
    let issue = ctx.storage.get_issue(&id)?;

    let dependencies = summaries(&ctx, &ctx.storage.get_dependencies(&id)?)?;
    let dependents = summaries(&ctx, &ctx.storage.get_dependents(&id)?)?;
    let children = ctx
        .storage
        .get_children(&id)?
        .iter()
        .map(IssueSummary::from)
        .collect();

    Ok(IssueDetail {
        handoff: ctx.storage.latest_handoff(&id)?,
        dependencies,
        dependents,
        children,
        files: ctx.storage.file_links(&id)?,
        logs: ctx.storage.get_logs(&id, Some(SHOW_LOG_LIMIT))?,
        comments: ctx.storage.get_comments(&id)?,
        issue,
    })
}

// === list ===

/// Filters as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ListArgs {
    pub status: Vec<String>,
    pub issue_type: Option<String>,
    pub priority: Option<String>,
    pub label: Option<String>,
    pub parent: Option<String>,
    pub all: bool,
    pub deleted: bool,
}

#[derive(Serialize)]
pub struct IssueList {
    pub issues: Vec<IssueSummary>,
}

impl Output for IssueList {
    fn to_json(&self) -> String {
        self.issues
            .iter()
            .map(json_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn to_human(&self) -> String {
        if self.issues.is_empty() {
            return "No issues found".to_string();
        }
        self.issues
            .iter()
            .map(IssueSummary::line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn list(root: &Path, args: ListArgs) -> Result<IssueList> {
    let ctx = Context::open(root)?;

    let statuses = args
        .status
        .iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.parse::<Status>())
        .collect::<Result<Vec<_>>>()?;
    let filter = IssueFilter {
        statuses,
        issue_type: args
            .issue_type
            .as_deref()
            .map(str::parse::<IssueType>)
            .transpose()?,
        priority: args
            .priority
            .as_deref()
            .map(str::parse::<Priority>)
            .transpose()?,
        label: args.label,
        parent_id: args.parent.as_deref().map(validate_issue_id).transpose()?,
        include_closed: args.all,
        deleted_only: args.deleted,
    };

    let issues = ctx.storage.list_issues(&filter)?;
    Ok(IssueList {
        issues: issues.iter().map(IssueSummary::from).collect(),
    })
}

// === update ===

/// Field changes; `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct IssueChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub acceptance: Option<String>,
    pub issue_type: Option<String>,
    pub priority: Option<String>,
    pub points: Option<u8>,
    pub labels: Option<Vec<String>>,
    /// An empty string clears the parent
    pub parent: Option<String>,
    pub sprint: Option<String>,
    pub minor: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct IssueUpdated {
    pub id: String,
    pub changed: bool,
    pub session: String,
}

impl Output for IssueUpdated {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        if self.changed {
            format!("UPDATED {}", self.id)
        } else {
            format!("UPDATED {} (no changes)", self.id)
        }
    }
}

fn apply_changes(ctx: &Context, issue: &mut Issue, changes: IssueChanges) -> Result<()> {
    if let Some(title) = changes.title {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(Error::InvalidInput("title cannot be empty".to_string()));
        }
        issue.title = title;
    }
    if let Some(description) = changes.description {
        issue.description = description;
    }
    if let Some(acceptance) = changes.acceptance {
        issue.acceptance = acceptance;
    }
    if let Some(t) = changes.issue_type {
        issue.issue_type = t.parse()?;
    }
    if let Some(p) = changes.priority {
        issue.priority = p.parse()?;
    }
    if let Some(points) = changes.points {
        issue.points = validate_points(points)?;
    }
    if let Some(labels) = changes.labels {
        issue.set_labels(&labels);
    }
    if let Some(parent) = changes.parent {
        if parent.trim().is_empty() {
            issue.parent_id = None;
        } else {
            let parent = parse_parent(ctx, &parent)?;
            if parent == issue.id || ctx.storage.would_create_parent_cycle(&issue.id, &parent)? {
                return Err(Error::CycleDetected(format!(
                    "{} cannot be a child of {}",
                    issue.id, parent
                )));
            }
            issue.parent_id = Some(parent);
        }
    }
    if let Some(sprint) = changes.sprint {
        issue.sprint = Some(sprint).filter(|s| !s.trim().is_empty());
    }
    if let Some(minor) = changes.minor {
        issue.minor = minor;
    }
    Ok(())
}

pub fn update(root: &Path, id: &str, changes: IssueChanges) -> Result<IssueUpdated> {
    let ctx = Context::open(root)?;
    let id = validate_issue_id(id)?;
    let before = ctx.storage.get_live_issue(&id)?;

    let mut after = before.clone();
    apply_changes(&ctx, &mut after, changes)?;

    let changed = after != before;
    if changed {
        after.updated_at = ts::now();
        ctx.storage.transaction(|s| {
            record_issue_change(s, &ctx.session, ActionKind::Update, &before, &after)
        })?;
    }

    Ok(IssueUpdated {
        id,
        changed,
        session: ctx.session,
    })
}

// === delete / restore ===

pub fn delete(root: &Path, ids: Vec<String>) -> Result<BulkReport> {
    let ctx = Context::open(root)?;
    run_bulk(&ctx, "DELETE", "delete", &ids, |ctx, id| {
        let issue = ctx.storage.get_issue(id)?;
        if issue.is_deleted() {
            let mut item = ItemOutcome::done(ctx, id, issue.status, "delete", "DELETED");
            item.message = Some("already deleted".to_string());
            return Ok(item);
        }

        let mut after = issue.clone();
        let now = ts::now();
        after.deleted_at = Some(now);
        after.updated_at = now;
        ctx.storage.transaction(|s| {
            record_issue_change(s, &ctx.session, ActionKind::Delete, &issue, &after)
        })?;
        ctx.unfocus(id);

        Ok(ItemOutcome::done(ctx, id, issue.status, "delete", "DELETED"))
    })
}

pub fn restore(root: &Path, ids: Vec<String>) -> Result<BulkReport> {
    let ctx = Context::open(root)?;
    run_bulk(&ctx, "RESTORE", "restore", &ids, |ctx, id| {
        let issue = ctx.storage.get_issue(id)?;
        if !issue.is_deleted() {
            let mut item = ItemOutcome::done(ctx, id, issue.status, "restore", "RESTORED");
            item.message = Some("not deleted".to_string());
            return Ok(item);
        }

        let mut after = issue.clone();
        after.deleted_at = None;
        after.updated_at = ts::now();
        ctx.storage.transaction(|s| {
            record_issue_change(s, &ctx.session, ActionKind::Restore, &issue, &after)
        })?;

        Ok(ItemOutcome::done(ctx, id, issue.status, "restore", "RESTORED"))
    })
}
