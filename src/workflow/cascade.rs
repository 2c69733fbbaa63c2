//! Cascade engine.
//!
//! Three propagations, each run after the triggering mutation has committed:
//! - up: an epic follows its children once all of them reach a status
//! - down: submitting a parent for review sweeps its open/in-progress descendants
//! - unblock: closing an issue reopens blocked dependents with nothing left open
//!
//! Every cascaded step is its own transaction with its own action-log entry,
//! so undoing the trigger does not unwind them. A failing step becomes a
//! [`CascadeEvent::Warning`] and the remaining candidates are still processed.

use serde::Serialize;
use std::fmt;

use super::record_issue_change;
use super::transition::{self, Outcome, TransitionContext};
use crate::action_log::ActionKind;
use crate::models::{Handoff, Issue, LogEntry, LogType, Status, ts};
use crate::storage::Storage;
use crate::Result;

/// Something a cascade did (or failed to do).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CascadeEvent {
    ParentCascaded { id: String, status: Status },
    DescendantsReviewed { ids: Vec<String> },
    DependentUnblocked { id: String },
    Warning { message: String },
}

impl fmt::Display for CascadeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CascadeEvent::ParentCascaded { id, status } => {
                write!(f, "  ↑ Parent {} auto-cascaded to {}", id, status)
            }
            CascadeEvent::DescendantsReviewed { ids } => {
                write!(f, "  + {} descendant(s) also marked for review", ids.len())
            }
            CascadeEvent::DependentUnblocked { id } => {
                write!(f, "  ↓ Dependent {} auto-unblocked", id)
            }
            CascadeEvent::Warning { message } => write!(f, "Warning: {}", message),
        }
    }
}

impl CascadeEvent {
    pub fn is_warning(&self) -> bool {
        matches!(self, CascadeEvent::Warning { .. })
    }

    fn warning(message: String) -> Self {
        tracing::warn!("{}", message);
        CascadeEvent::Warning { message }
    }
}

/// Propagate `target` from `child` up through its epic ancestors.
pub fn cascade_up(
    storage: &Storage,
    session: &str,
    child: &Issue,
    target: Status,
) -> Vec<CascadeEvent> {
    let mut events = Vec::new();
    let mut current = child.clone();

    while let Some(parent_id) = current.parent_id.clone() {
        let parent = match storage.find_issue(&parent_id) {
            Ok(Some(parent)) if !parent.is_deleted() => parent,
            Ok(_) => break,
            Err(e) => {
                events.push(CascadeEvent::warning(format!(
                    "could not load parent {}: {}",
                    parent_id, e
                )));
                break;
            }
        };

        if !parent.is_epic() || parent.status.at_or_beyond(target) {
            break;
        }

        match all_children_reached(storage, &parent.id, target) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                events.push(CascadeEvent::warning(format!(
                    "could not check children of {}: {}",
                    parent.id, e
                )));
                break;
            }
        }

        match cascade_parent(storage, session, &parent, &current.id, target) {
            Ok(Some(updated)) => {
                tracing::debug!(parent = %updated.id, status = %target, "up-cascade");
                events.push(CascadeEvent::ParentCascaded {
                    id: updated.id.clone(),
                    status: target,
                });
                if target == Status::Closed {
                    events.extend(unblock_dependents(storage, session, &updated.id));
                }
                current = updated;
            }
            Ok(None) => break,
            Err(e) => {
                events.push(CascadeEvent::warning(format!(
                    "could not cascade {} to {}: {}",
                    parent.id, target, e
                )));
                break;
            }
        }
    }

    events
}

fn all_children_reached(storage: &Storage, parent_id: &str, target: Status) -> Result<bool> {
    let children = storage.get_children(parent_id)?;
    Ok(!children.is_empty() && children.iter().all(|c| c.status.at_or_beyond(target)))
}

/// Move one epic to `target`. Returns None when the state machine declines.
fn cascade_parent(
    storage: &Storage,
    session: &str,
    parent: &Issue,
    trigger_id: &str,
    target: Status,
) -> Result<Option<Issue>> {
    let status = match transition::validate(parent, target, TransitionContext::Automated, false) {
        Ok(Outcome::Apply(status)) => status,
        Ok(Outcome::Unchanged { .. }) => return Ok(None),
        Err(e) => {
            tracing::debug!(parent = %parent.id, error = %e, "up-cascade stopped");
            return Ok(None);
        }
    };

    storage.transaction(|s| {
        let mut after = parent.clone();
        after.set_status(status, ts::now());

        let kind = if status == Status::Closed {
            ActionKind::Close
        } else {
            if s.latest_handoff(&parent.id)?.is_none() {
                s.insert_handoff(&Handoff::auto_generated(&parent.id, session))?;
            }
            if after.implementer_session.is_none() {
                after.implementer_session = Some(session.to_string());
            }
            ActionKind::Review
        };

        record_issue_change(s, session, kind, parent, &after)?;
        s.add_log(&LogEntry::new(
            &parent.id,
            session,
            LogType::Progress,
            &format!(
                "Auto-cascaded to {} (all children {}, last: {})",
                status, status, trigger_id
            ),
        ))?;
        Ok(Some(after))
    })
}

/// Sweep open and in-progress descendants of `parent` into review.
pub fn cascade_down_review(storage: &Storage, session: &str, parent: &Issue) -> Vec<CascadeEvent> {
    let mut events = Vec::new();

    let descendants = match storage.get_descendants(&parent.id) {
        Ok(descendants) => descendants,
        Err(e) => {
            events.push(CascadeEvent::warning(format!(
                "could not load descendants of {}: {}",
                parent.id, e
            )));
            return events;
        }
    };

    let mut reviewed = Vec::new();
    for descendant in descendants
        .iter()
        .filter(|d| matches!(d.status, Status::Open | Status::InProgress))
    {
        match review_descendant(storage, session, descendant, &parent.id) {
            Ok(()) => reviewed.push(descendant.id.clone()),
            Err(e) => events.push(CascadeEvent::warning(format!(
                "could not mark {} for review: {}",
                descendant.id, e
            ))),
        }
    }

    if !reviewed.is_empty() {
        tracing::debug!(parent = %parent.id, count = reviewed.len(), "down-cascade");
        events.insert(0, CascadeEvent::DescendantsReviewed { ids: reviewed });
    }
    events
}

fn review_descendant(storage: &Storage, session: &str, issue: &Issue, parent_id: &str) -> Result<()> {
    let Outcome::Apply(status) =
        transition::validate(issue, Status::InReview, TransitionContext::Automated, false)?
    else {
        return Ok(());
    };

    storage.transaction(|s| {
        // Existing handoffs are left as the record of work.
        if s.latest_handoff(&issue.id)?.is_none() {
            s.insert_handoff(&Handoff::cascaded(&issue.id, session, parent_id))?;
        }

        let mut after = issue.clone();
        after.set_status(status, ts::now());
        if after.implementer_session.is_none() {
            after.implementer_session = Some(session.to_string());
        }

        record_issue_change(s, session, ActionKind::Review, issue, &after)?;
        s.add_log(&LogEntry::new(
            &issue.id,
            session,
            LogType::Progress,
            &format!("Cascaded review from {}", parent_id),
        ))?;
        Ok(())
    })
}

/// Reopen blocked dependents of `closed_id` whose dependencies are all closed.
pub fn unblock_dependents(storage: &Storage, session: &str, closed_id: &str) -> Vec<CascadeEvent> {
    let mut events = Vec::new();

    let dependents = match storage.get_dependents(closed_id) {
        Ok(ids) => ids,
        Err(e) => {
            events.push(CascadeEvent::warning(format!(
                "could not load dependents of {}: {}",
                closed_id, e
            )));
            return events;
        }
    };

    for id in dependents {
        match unblock_one(storage, session, &id) {
            Ok(true) => events.push(CascadeEvent::DependentUnblocked { id }),
            Ok(false) => {}
            Err(e) => events.push(CascadeEvent::warning(format!(
                "could not unblock {}: {}",
                id, e
            ))),
        }
    }
    events
}

fn unblock_one(storage: &Storage, session: &str, id: &str) -> Result<bool> {
    let Some(issue) = storage.find_issue(id)? else {
        return Ok(false);
    };
    if issue.is_deleted() || issue.status != Status::Blocked {
        return Ok(false);
    }
    if !storage.all_dependencies_closed(id)? {
        return Ok(false);
    }

    storage.transaction(|s| {
        let mut after = issue.clone();
        after.set_status(Status::Open, ts::now());
        record_issue_change(s, session, ActionKind::Unblock, &issue, &after)?;
        s.add_log(&LogEntry::new(
            id,
            session,
            LogType::Progress,
            "Auto-unblocked (all dependencies resolved)",
        ))?;
        Ok(true)
    })
}
