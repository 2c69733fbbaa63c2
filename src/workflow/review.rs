//! Review protocol: who may approve, self-close, or submit an issue.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::{Handoff, Issue};
use crate::storage::Storage;
use crate::{Error, Result};

/// How review submission treats a missing handoff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewMode {
    /// Insert a minimal handoff and warn.
    #[default]
    Auto,
    /// Refuse with HandoffRequired.
    Strict,
}

impl ReviewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewMode::Auto => "auto",
            ReviewMode::Strict => "strict",
        }
    }
}

impl fmt::Display for ReviewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReviewMode {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(ReviewMode::Auto),
            "strict" => Ok(ReviewMode::Strict),
            other => Err(Error::InvalidInput(format!(
                "review-mode must be auto or strict, got '{}'",
                other
            ))),
        }
    }
}

/// Whether `session` has touched `issue` in any role.
///
/// Creator and implementer fields count even when the ledger is empty.
/// A ledger read failure counts as involvement.
pub fn is_involved(storage: &Storage, issue: &Issue, session: &str) -> bool {
    if issue.creator_session.as_deref() == Some(session)
        || issue.implementer_session.as_deref() == Some(session)
    {
        return true;
    }
    ledger_says_involved(storage, issue, session)
}

fn ledger_says_involved(storage: &Storage, issue: &Issue, session: &str) -> bool {
    match storage.was_session_involved(&issue.id, session) {
        Ok(involved) => involved,
        Err(e) => {
            tracing::warn!(issue = %issue.id, error = %e, "session history unreadable; treating as involved");
            true
        }
    }
}

/// Gate for `approve`.
pub fn check_approve(storage: &Storage, issue: &Issue, session: &str) -> Result<()> {
    if issue.minor {
        return Ok(());
    }
    if is_involved(storage, issue, session) {
        return Err(Error::CannotSelfApprove(issue.id.clone()));
    }
    Ok(())
}

/// Verdict for a direct close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosePermission {
    Allowed,
    /// Needs a self-close exception reason.
    RequiresException,
}

/// Gate for `close`.
///
/// Allowed for minor issues, for uninvolved sessions, and for a creator
/// whose issue was implemented by someone else.
pub fn check_close(storage: &Storage, issue: &Issue, session: &str) -> ClosePermission {
    if issue.minor || !is_involved(storage, issue, session) {
        return ClosePermission::Allowed;
    }

    let only_creator = issue.creator_session.as_deref() == Some(session)
        && issue
            .implementer_session
            .as_deref()
            .is_some_and(|implementer| implementer != session)
        && !ledger_says_involved(storage, issue, session);

    if only_creator {
        ClosePermission::Allowed
    } else {
        ClosePermission::RequiresException
    }
}

/// Make sure `issue` has a handoff of record before it enters review.
///
/// Returns the synthesized handoff when one had to be created.
pub fn ensure_handoff(
    storage: &Storage,
    issue: &Issue,
    session: &str,
    mode: ReviewMode,
) -> Result<Option<Handoff>> {
    if storage.latest_handoff(&issue.id)?.is_some() {
        return Ok(None);
    }
    match mode {
        ReviewMode::Strict => Err(Error::HandoffRequired(format!(
            "{} has no handoff; run `td handoff {}` first",
            issue.id, issue.id
        ))),
        ReviewMode::Auto => {
            let handoff = storage
                .insert_handoff(&Handoff::auto_generated(&issue.id, session))
                .map_err(|e| Error::HandoffRequired(format!("{}: {}", issue.id, e)))?;
            Ok(Some(handoff))
        }
    }
}
