//! Status state machine.
//!
//! Pure over (from, to, context). Two edges are restricted: `open -> in_review`
//! (the review shortcut) and `in_review -> open` (reopen-to-work). They are
//! legal only in the automated context or when forced by the caller.

use crate::models::{Issue, Status};
use crate::{Error, Result};

/// Who is asking for the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionContext {
    /// Interactive command
    Cli,
    /// Cascade, undo, or sync apply
    Automated,
}

/// Result of a permitted transition check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Move to the (normalized) target status.
    Apply(Status),
    /// Already at the target; nothing to write. `silent` is set for the
    /// automated context, where no output line is expected either.
    Unchanged { silent: bool },
}

/// Whether the table has an entry for `from -> to` (restricted edges included).
pub fn is_valid_transition(from: Status, to: Status) -> bool {
    use Status::*;
    matches!(
        (from, to),
        (Open, InProgress)
            | (Open, InReview)
            | (Open, Blocked)
            | (Open, Closed)
            | (InProgress, Open)
            | (InProgress, InReview)
            | (InProgress, Blocked)
            | (InProgress, Closed)
            | (InReview, Open)
            | (InReview, InProgress)
            | (InReview, Blocked)
            | (InReview, Closed)
            | (Blocked, Open)
            | (Blocked, InProgress)
            | (Blocked, Closed)
            | (Closed, Open)
    )
}

/// Edges that are not part of the normal interactive path.
pub fn is_restricted(from: Status, to: Status) -> bool {
    matches!(
        (from, to),
        (Status::Open, Status::InReview) | (Status::InReview, Status::Open)
    )
}

/// Validate moving `issue` to `to`.
///
/// `force` unlocks restricted edges in the CLI context; it never makes a
/// missing table entry legal.
pub fn validate(
    issue: &Issue,
    to: Status,
    context: TransitionContext,
    force: bool,
) -> Result<Outcome> {
    let from = issue.status;

    if from == to {
        return Ok(Outcome::Unchanged {
            silent: context == TransitionContext::Automated,
        });
    }

    if !is_valid_transition(from, to) {
        return Err(Error::InvalidTransition(format!(
            "{} cannot move from {} to {}",
            issue.id, from, to
        )));
    }

    if is_restricted(from, to) && context == TransitionContext::Cli && !force {
        return Err(Error::InvalidTransition(format!(
            "{} cannot move from {} to {} interactively",
            issue.id, from, to
        )));
    }

    Ok(Outcome::Apply(to))
}

/// Parse a user-supplied status, applying input aliases.
pub fn normalize_target(raw: &str) -> Result<Status> {
    raw.parse::<Status>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue_in(status: Status) -> Issue {
        let mut issue = Issue::new("td-aaaaaa".to_string(), "A".to_string());
        issue.status = status;
        issue
    }

    #[test]
    fn test_table_entries() {
        use Status::*;
        assert!(is_valid_transition(Open, InProgress));
        assert!(is_valid_transition(Blocked, InProgress));
        assert!(is_valid_transition(Closed, Open));
        assert!(!is_valid_transition(Closed, InProgress));
        assert!(!is_valid_transition(Blocked, InReview));
        assert!(!is_valid_transition(Closed, Closed));
        assert!(!is_valid_transition(Blocked, Blocked));
    }

    #[test]
    fn test_self_transition_context() {
        let issue = issue_in(Status::Blocked);
        assert_eq!(
            validate(&issue, Status::Blocked, TransitionContext::Cli, false).unwrap(),
            Outcome::Unchanged { silent: false }
        );
        assert_eq!(
            validate(&issue, Status::Blocked, TransitionContext::Automated, false).unwrap(),
            Outcome::Unchanged { silent: true }
        );
    }

    #[test]
    fn test_restricted_edges_need_automation_or_force() {
        let open = issue_in(Status::Open);
        assert!(matches!(
            validate(&open, Status::InReview, TransitionContext::Cli, false),
            Err(Error::InvalidTransition(_))
        ));
        assert_eq!(
            validate(&open, Status::InReview, TransitionContext::Cli, true).unwrap(),
            Outcome::Apply(Status::InReview)
        );
        assert_eq!(
            validate(&open, Status::InReview, TransitionContext::Automated, false).unwrap(),
            Outcome::Apply(Status::InReview)
        );

        let review = issue_in(Status::InReview);
        assert!(validate(&review, Status::Open, TransitionContext::Cli, false).is_err());
        assert!(validate(&review, Status::Open, TransitionContext::Automated, false).is_ok());
    }

    #[test]
    fn test_force_does_not_bypass_table() {
        let closed = issue_in(Status::Closed);
        assert!(validate(&closed, Status::InReview, TransitionContext::Cli, true).is_err());
        assert!(validate(&closed, Status::InReview, TransitionContext::Automated, true).is_err());
    }

    #[test]
    fn test_normalize_target_aliases() {
        assert_eq!(normalize_target("review").unwrap(), Status::InReview);
        assert!(normalize_target("nope").is_err());
    }
}
