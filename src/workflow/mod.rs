//! Workflow engine: state machine, review protocol, and cascades.
//!
//! The command layer composes these per verb; nothing here prints.

pub mod cascade;
pub mod review;
pub mod transition;

pub use cascade::{CascadeEvent, cascade_down_review, cascade_up, unblock_dependents};
pub use review::{ClosePermission, ReviewMode};
pub use transition::{Outcome, TransitionContext, is_valid_transition};

use crate::Result;
use crate::action_log::{ActionKind, NewAction};
use crate::models::Issue;
use crate::storage::Storage;

/// Persist `after` and append its action-log entry.
///
/// Callers run this inside [`Storage::transaction`] so both halves commit together.
pub fn record_issue_change(
    storage: &Storage,
    session: &str,
    kind: ActionKind,
    before: &Issue,
    after: &Issue,
) -> Result<i64> {
    storage.update_issue(after)?;
    storage.append_action(&NewAction::issue(session, kind, Some(before), Some(after))?)
}
