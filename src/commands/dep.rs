//! Dependency commands: `dep add`, `dep rm`, and `dep <id> [--blocking]`.

use serde::Serialize;
use std::path::Path;

use super::{Context, IssueSummary, Output, json_line};
use crate::action_log::{ActionKind, EntityKind, NewAction};
use crate::models::Dependency;
use crate::storage::validate_issue_id;
use crate::Result;

#[derive(Debug, Clone, Serialize)]
pub struct DepChange {
    pub issue_id: String,
    pub depends_on_id: String,
    pub action: &'static str,
    pub session: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepChanges {
    pub changes: Vec<DepChange>,
    #[serde(skip)]
    pub warnings: Vec<String>,
}

impl Output for DepChanges {
    fn to_json(&self) -> String {
        self.changes
            .iter()
            .map(json_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn to_human(&self) -> String {
        self.changes
            .iter()
            .map(|c| match c.action {
                "add_dep" => format!("ADDED {} depends on {}", c.issue_id, c.depends_on_id),
                _ => format!(
                    "REMOVED {} no longer depends on {}",
                    c.issue_id, c.depends_on_id
                ),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn warnings(&self) -> Vec<String> {
        self.warnings.clone()
    }

    fn all_skipped(&self) -> Option<usize> {
        self.changes.is_empty().then(|| self.warnings.len())
    }
}

fn add_one(ctx: &Context, issue_id: &str, raw_dep: &str) -> Result<DepChange> {
    let depends_on = validate_issue_id(raw_dep)?;
    let edge = Dependency::new(issue_id, &depends_on);

    ctx.storage.transaction(|s| {
        s.add_dependency(issue_id, &depends_on)?;
        let entry = NewAction::new(
            &ctx.session,
            ActionKind::AddDep,
            EntityKind::Dependency,
            &edge.entity_id(),
        )
        .with_new(Some(&edge))?;
        s.append_action(&entry)?;
        Ok(())
    })?;

    Ok(DepChange {
        issue_id: issue_id.to_string(),
        depends_on_id: depends_on,
        action: "add_dep",
        session: ctx.session.clone(),
    })
}

/// Add `issue` -> `dep` edges. One bad edge does not stop the others.
pub fn add(root: &Path, id: &str, depends_on: &[String]) -> Result<DepChanges> {
    let ctx = Context::open(root)?;
    let issue_id = validate_issue_id(id)?;

    let mut changes = Vec::new();
    let mut warnings = Vec::new();
    for raw in depends_on {
        match add_one(&ctx, &issue_id, raw) {
            Ok(change) => changes.push(change),
            Err(e) if depends_on.len() == 1 => return Err(e),
            Err(e) => warnings.push(format!("{} -> {} skipped: {}", issue_id, raw.trim(), e)),
        }
    }

    Ok(DepChanges { changes, warnings })
}

pub fn remove(root: &Path, id: &str, depends_on: &str) -> Result<DepChanges> {
    let ctx = Context::open(root)?;
    let issue_id = validate_issue_id(id)?;
    let depends_on = validate_issue_id(depends_on)?;
    let edge = Dependency::new(&issue_id, &depends_on);

    ctx.storage.transaction(|s| {
        s.remove_dependency(&issue_id, &depends_on)?;
        let entry = NewAction::new(
            &ctx.session,
            ActionKind::RemoveDep,
            EntityKind::Dependency,
            &edge.entity_id(),
        )
        .with_previous(Some(&edge))?;
        s.append_action(&entry)?;
        Ok(())
    })?;

    Ok(DepChanges {
        changes: vec![DepChange {
            issue_id,
            depends_on_id: depends_on,
            action: "remove_dep",
            session: ctx.session,
        }],
        warnings: Vec::new(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct DepList {
    pub id: String,
    /// `true` when listing issues that `id` blocks
    pub blocking: bool,
    pub issues: Vec<IssueSummary>,
}

impl Output for DepList {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        let heading = if self.blocking {
            format!("{} blocks:", self.id)
        } else {
            format!("{} depends on:", self.id)
        };
        if self.issues.is_empty() {
            return format!("{} (none)", heading);
        }
        let mut lines = vec![heading];
        lines.extend(self.issues.iter().map(|i| format!("  {}", i.line())));
        lines.join("\n")
    }
}

pub fn list(root: &Path, id: &str, blocking: bool) -> Result<DepList> {
    let ctx = Context::open(root)?;
    let id = validate_issue_id(id)?;
    ctx.storage.get_issue(&id)?;

    let ids = if blocking {
        ctx.storage.get_dependents(&id)?
    } else {
        ctx.storage.get_dependencies(&id)?
    };
    let mut issues = Vec::new();
    for dep in ids {
        if let Some(issue) = ctx.storage.find_issue(&dep)? {
            issues.push(IssueSummary::from(&issue));
        }
    }

    Ok(DepList {
        id,
        blocking,
        issues,
    })
}
