//! Status-changing verbs: start, unstart, review, approve, reject, close,
//! block, reopen.
//!
//! Each verb validates the transition, applies the review gate where one
//! exists, then writes the issue row, its action-log entry, session history,
//! and a session log entry in one transaction. Cascades run afterwards, each
//! in its own transaction; their failures surface as warnings.

use std::path::Path;

use super::{BulkReport, Context, ItemOutcome, run_bulk};
use crate::action_log::ActionKind;
use crate::models::{Issue, LogType, SessionAction, Status, ts};
use crate::security::{self, SecurityEvent};
use crate::storage::IssueFilter;
use crate::workflow::review::{self, ClosePermission};
use crate::workflow::transition::validate;
use crate::workflow::{
    Outcome, TransitionContext, cascade_down_review, cascade_up, record_issue_change,
    unblock_dependents,
};
use crate::{Error, Result, focus};

fn with_reason(base: &str, reason: &Option<String>) -> String {
    match reason {
        Some(r) => format!("{}: {}", base, r),
        None => base.to_string(),
    }
}

pub fn start(root: &Path, ids: Vec<String>, reason: Option<String>) -> Result<BulkReport> {
    let ctx = Context::open(root)?;
    let ids = ctx.ids_or_focus(ids)?;
    run_bulk(&ctx, "START", "start", &ids, |ctx, id| start_one(ctx, id, &reason))
}

fn start_one(ctx: &Context, id: &str, reason: &Option<String>) -> Result<ItemOutcome> {
    let issue = ctx.storage.get_live_issue(id)?;
    let item = match validate(&issue, Status::InProgress, TransitionContext::Cli, false)? {
        Outcome::Unchanged { .. } => {
            ItemOutcome::unchanged(ctx, id, issue.status, "start", "STARTED")
        }
        Outcome::Apply(status) => {
            let mut after = issue.clone();
            after.set_status(status, ts::now());
            after.implementer_session = Some(ctx.session.clone());

            ctx.storage.transaction(|s| {
                record_issue_change(s, &ctx.session, ActionKind::Start, &issue, &after)?;
                s.record_session_action(id, &ctx.session, SessionAction::Started)?;
                ctx.log(id, LogType::Progress, &with_reason("Started work", reason))?;
                Ok(())
            })?;
            ItemOutcome::done(ctx, id, status, "start", "STARTED")
        }
    };

    if let Err(e) = focus::set_focus(&ctx.root, id) {
        tracing::warn!(issue = %id, error = %e, "could not set focus");
    }
    Ok(item.with_reason(reason.clone()))
}

pub fn unstart(root: &Path, ids: Vec<String>, reason: Option<String>) -> Result<BulkReport> {
    let ctx = Context::open(root)?;
    let ids = ctx.ids_or_focus(ids)?;
    run_bulk(&ctx, "UNSTART", "unstart", &ids, |ctx, id| {
        unstart_one(ctx, id, &reason)
    })
}

fn unstart_one(ctx: &Context, id: &str, reason: &Option<String>) -> Result<ItemOutcome> {
    let issue = ctx.storage.get_live_issue(id)?;
    match issue.status {
        Status::Open => {
            return Ok(ItemOutcome::unchanged(ctx, id, issue.status, "unstart", "UNSTARTED"));
        }
        Status::InProgress => {}
        other => {
            return Err(Error::InvalidTransition(format!(
                "{} is {}; only in_progress issues can be unstarted",
                id, other
            )));
        }
    }

    let mut after = issue.clone();
    after.set_status(Status::Open, ts::now());
    after.implementer_session = None;

    ctx.storage.transaction(|s| {
        record_issue_change(s, &ctx.session, ActionKind::Unstart, &issue, &after)?;
        s.record_session_action(id, &ctx.session, SessionAction::Unstarted)?;
        ctx.log(id, LogType::Progress, &with_reason("Unstarted", reason))?;
        Ok(())
    })?;
    ctx.unfocus(id);

    Ok(ItemOutcome::done(ctx, id, Status::Open, "unstart", "UNSTARTED").with_reason(reason.clone()))
}

pub fn review(
    root: &Path,
    ids: Vec<String>,
    reason: Option<String>,
    minor: bool,
) -> Result<BulkReport> {
    let ctx = Context::open(root)?;
    let ids = ctx.ids_or_focus(ids)?;
    run_bulk(&ctx, "REVIEW", "review", &ids, |ctx, id| {
        review_one(ctx, id, &reason, minor)
    })
}

fn review_one(
    ctx: &Context,
    id: &str,
    reason: &Option<String>,
    minor: bool,
) -> Result<ItemOutcome> {
    let issue = ctx.storage.get_live_issue(id)?;

    // An open issue is implicitly started first: open -> in_progress -> in_review.
    let implicit_start = issue.status == Status::Open;
    let from = if implicit_start {
        let mut started = issue.clone();
        started.status = Status::InProgress;
        started
    } else {
        issue.clone()
    };

    let status = match validate(&from, Status::InReview, TransitionContext::Cli, false)? {
        Outcome::Unchanged { .. } => {
            if minor && !issue.minor {
                mark_minor(ctx, &issue)?;
            }
            return Ok(ItemOutcome::unchanged(ctx, id, issue.status, "review", "REVIEW REQUESTED"));
        }
        Outcome::Apply(status) => status,
    };

    let mut after = issue.clone();
    after.set_status(status, ts::now());
    if after.implementer_session.is_none() || implicit_start {
        after.implementer_session = Some(ctx.session.clone());
    }
    after.minor |= minor;

    let mode = ctx.config.review_mode();
    let synthesized = ctx.storage.transaction(|s| {
        let synthesized = review::ensure_handoff(s, &issue, &ctx.session, mode)?;
        if implicit_start {
            s.record_session_action(id, &ctx.session, SessionAction::Started)?;
        }
        record_issue_change(s, &ctx.session, ActionKind::Review, &issue, &after)?;
        ctx.log(id, LogType::Progress, &with_reason("Submitted for review", reason))?;
        Ok(synthesized)
    })?;
    ctx.unfocus(id);

    let mut item = ItemOutcome::done(ctx, id, status, "review", "REVIEW REQUESTED")
        .with_reason(reason.clone());
    if synthesized.is_some() {
        item.warnings.push(format!(
            "{} had no handoff; recorded a minimal one (use `td handoff` to add detail)",
            id
        ));
    }

    let mut events = cascade_down_review(&ctx.storage, &ctx.session, &after);
    events.extend(cascade_up(&ctx.storage, &ctx.session, &after, Status::InReview));
    Ok(item.with_events(events))
}

/// `--minor` on an issue already in review still sets the flag.
fn mark_minor(ctx: &Context, issue: &Issue) -> Result<()> {
    let mut after = issue.clone();
    after.minor = true;
    after.updated_at = ts::now();
    ctx.storage.transaction(|s| {
        record_issue_change(s, &ctx.session, ActionKind::Update, issue, &after)?;
        ctx.log(&issue.id, LogType::Progress, "Marked minor")?;
        Ok(())
    })
}

pub fn approve(
    root: &Path,
    ids: Vec<String>,
    all: bool,
    reason: Option<String>,
) -> Result<BulkReport> {
    let ctx = Context::open(root)?;
    let ids = if all {
        let filter = IssueFilter {
            statuses: vec![Status::InReview],
            ..Default::default()
        };
        ctx.storage
            .list_issues(&filter)?
            .into_iter()
            .map(|i| i.id)
            .collect()
    } else {
        ctx.ids_or_focus(ids)?
    };
    run_bulk(&ctx, "APPROVE", "approve", &ids, |ctx, id| {
        approve_one(ctx, id, &reason)
    })
}

fn approve_one(ctx: &Context, id: &str, reason: &Option<String>) -> Result<ItemOutcome> {
    let issue = ctx.storage.get_live_issue(id)?;
    match issue.status {
        Status::Closed => {
            return Ok(ItemOutcome::unchanged(ctx, id, issue.status, "approve", "APPROVED"));
        }
        Status::InReview => {}
        other => {
            return Err(Error::InvalidTransition(format!(
                "{} is {}; only in_review issues can be approved",
                id, other
            )));
        }
    }
    review::check_approve(&ctx.storage, &issue, &ctx.session)?;

    let mut after = issue.clone();
    after.set_status(Status::Closed, ts::now());
    after.reviewer_session = Some(ctx.session.clone());

    ctx.storage.transaction(|s| {
        record_issue_change(s, &ctx.session, ActionKind::Approve, &issue, &after)?;
        s.record_session_action(id, &ctx.session, SessionAction::Reviewed)?;
        ctx.log(id, LogType::Progress, &with_reason("Approved", reason))?;
        Ok(())
    })?;
    ctx.unfocus(id);

    let mut events = cascade_up(&ctx.storage, &ctx.session, &after, Status::Closed);
    events.extend(unblock_dependents(&ctx.storage, &ctx.session, id));
    Ok(ItemOutcome::done(ctx, id, Status::Closed, "approve", "APPROVED")
        .with_reason(reason.clone())
        .with_events(events))
}

pub fn reject(root: &Path, ids: Vec<String>, reason: Option<String>) -> Result<BulkReport> {
    let ctx = Context::open(root)?;
    let ids = ctx.ids_or_focus(ids)?;
    run_bulk(&ctx, "REJECT", "reject", &ids, |ctx, id| reject_one(ctx, id, &reason))
}

fn reject_one(ctx: &Context, id: &str, reason: &Option<String>) -> Result<ItemOutcome> {
    let issue = ctx.storage.get_live_issue(id)?;
    if issue.status != Status::InReview {
        return Err(Error::InvalidTransition(format!(
            "{} is {}; only in_review issues can be rejected",
            id, issue.status
        )));
    }

    let mut after = issue.clone();
    after.set_status(Status::InProgress, ts::now());

    ctx.storage.transaction(|s| {
        record_issue_change(s, &ctx.session, ActionKind::Reject, &issue, &after)?;
        ctx.log(id, LogType::Progress, &with_reason("Rejected", reason))?;
        Ok(())
    })?;

    Ok(ItemOutcome::done(ctx, id, Status::InProgress, "reject", "REJECTED")
        .with_reason(reason.clone()))
}

pub fn close(
    root: &Path,
    ids: Vec<String>,
    reason: Option<String>,
    exception: Option<String>,
) -> Result<BulkReport> {
    let ctx = Context::open(root)?;
    let ids = ctx.ids_or_focus(ids)?;
    let exception = exception
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());
    run_bulk(&ctx, "CLOSE", "close", &ids, |ctx, id| {
        close_one(ctx, id, &reason, &exception)
    })
}

fn close_one(
    ctx: &Context,
    id: &str,
    reason: &Option<String>,
    exception: &Option<String>,
) -> Result<ItemOutcome> {
    let issue = ctx.storage.get_live_issue(id)?;
    let status = match validate(&issue, Status::Closed, TransitionContext::Cli, false)? {
        Outcome::Unchanged { .. } => {
            return Ok(ItemOutcome::unchanged(ctx, id, issue.status, "close", "CLOSED"));
        }
        Outcome::Apply(status) => status,
    };

    let exception_used = match review::check_close(&ctx.storage, &issue, &ctx.session) {
        ClosePermission::Allowed => None,
        ClosePermission::RequiresException => match exception {
            Some(why) => Some(why.clone()),
            None => return Err(Error::CannotSelfClose(id.to_string())),
        },
    };

    let mut after = issue.clone();
    after.set_status(status, ts::now());

    ctx.storage.transaction(|s| {
        record_issue_change(s, &ctx.session, ActionKind::Close, &issue, &after)?;
        if let Some(ref why) = exception_used {
            ctx.log(id, LogType::Security, &format!("Self-close exception: {}", why))?;
        }
        ctx.log(id, LogType::Progress, &with_reason("Closed", reason))?;
        Ok(())
    })?;
    ctx.unfocus(id);

    let mut item = ItemOutcome::done(ctx, id, Status::Closed, "close", "CLOSED")
        .with_reason(reason.clone());
    if let Some(ref why) = exception_used {
        let event = SecurityEvent::self_close_exception(id, &ctx.session, why);
        if let Err(e) = security::record(&ctx.root, &event) {
            item.warnings
                .push(format!("could not record security event for {}: {}", id, e));
        }
        tracing::info!(issue = %id, session = %ctx.session, "self-close exception used");
    }

    let mut events = cascade_up(&ctx.storage, &ctx.session, &after, Status::Closed);
    events.extend(unblock_dependents(&ctx.storage, &ctx.session, id));
    Ok(item.with_events(events))
}

pub fn block(root: &Path, ids: Vec<String>, reason: Option<String>) -> Result<BulkReport> {
    let ctx = Context::open(root)?;
    let ids = ctx.ids_or_focus(ids)?;
    run_bulk(&ctx, "BLOCK", "block", &ids, |ctx, id| block_one(ctx, id, &reason))
}

fn block_one(ctx: &Context, id: &str, reason: &Option<String>) -> Result<ItemOutcome> {
    let issue = ctx.storage.get_live_issue(id)?;
    let status = match validate(&issue, Status::Blocked, TransitionContext::Cli, false)? {
        Outcome::Unchanged { .. } => {
            return Ok(ItemOutcome::unchanged(ctx, id, issue.status, "block", "BLOCKED"));
        }
        Outcome::Apply(status) => status,
    };

    let mut after = issue.clone();
    after.set_status(status, ts::now());

    ctx.storage.transaction(|s| {
        record_issue_change(s, &ctx.session, ActionKind::Block, &issue, &after)?;
        ctx.log(id, LogType::Blocker, &with_reason("Blocked", reason))?;
        Ok(())
    })?;
    ctx.unfocus(id);

    Ok(ItemOutcome::done(ctx, id, status, "block", "BLOCKED").with_reason(reason.clone()))
}

pub fn reopen(
    root: &Path,
    ids: Vec<String>,
    reason: Option<String>,
    force: bool,
) -> Result<BulkReport> {
    let ctx = Context::open(root)?;
    let ids = ctx.ids_or_focus(ids)?;
    run_bulk(&ctx, "REOPEN", "reopen", &ids, |ctx, id| {
        reopen_one(ctx, id, &reason, force)
    })
}

/// `closed -> open` is a reopen; `blocked -> open` is an unblock.
/// `in_review -> open` needs `force`.
fn reopen_one(
    ctx: &Context,
    id: &str,
    reason: &Option<String>,
    force: bool,
) -> Result<ItemOutcome> {
    let issue = ctx.storage.get_live_issue(id)?;
    let (kind, action, label, message) = match issue.status {
        Status::Open => {
            return Ok(ItemOutcome::unchanged(ctx, id, issue.status, "reopen", "REOPENED"));
        }
        Status::Closed => (ActionKind::Reopen, "reopen", "REOPENED", "Reopened"),
        Status::Blocked => (ActionKind::Unblock, "unblock", "UNBLOCKED", "Unblocked"),
        Status::InReview => (ActionKind::Reopen, "reopen", "REOPENED", "Reopened from review"),
        other => {
            return Err(Error::InvalidTransition(format!(
                "{} is {}; only closed or blocked issues can be reopened",
                id, other
            )));
        }
    };
    validate(&issue, Status::Open, TransitionContext::Cli, force)?;

    let after = reopened(&issue);

    ctx.storage.transaction(|s| {
        record_issue_change(s, &ctx.session, kind, &issue, &after)?;
        ctx.log(id, LogType::Progress, &with_reason(message, reason))?;
        Ok(())
    })?;

    Ok(ItemOutcome::done(ctx, id, Status::Open, action, label).with_reason(reason.clone()))
}

fn reopened(issue: &Issue) -> Issue {
    let mut after = issue.clone();
    after.set_status(Status::Open, ts::now());
    if issue.status == Status::Closed {
        after.reviewer_session = None;
    }
    after
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Output;
    use crate::session::SESSION_ENV;
    use crate::test_utils::TestEnv;
    use serial_test::serial;

    fn as_session(id: &str) {
        unsafe { std::env::set_var(SESSION_ENV, id) };
    }

    fn clear_session() {
        unsafe { std::env::remove_var(SESSION_ENV) };
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    #[serial]
    fn test_start_sets_implementer_and_focus() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        as_session("ses_impl");

        let report = start(env.path(), ids(&["td-aaaaaa"]), None).unwrap();
        clear_session();

        assert_eq!(report.to_human(), "STARTED td-aaaaaa");
        let issue = env.get("td-aaaaaa");
        assert_eq!(issue.status, Status::InProgress);
        assert_eq!(issue.implementer_session.as_deref(), Some("ses_impl"));
        assert_eq!(
            focus::get_focus(env.path()).unwrap().as_deref(),
            Some("td-aaaaaa")
        );
    }

    #[test]
    #[serial]
    fn test_review_open_issue_records_single_review_action() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        as_session("ses_impl");

        let report = review(env.path(), ids(&["td-aaaaaa"]), None, false).unwrap();
        clear_session();

        assert_eq!(report.processed(), 1);
        assert_eq!(report.warnings().len(), 1);
        let issue = env.get("td-aaaaaa");
        assert_eq!(issue.status, Status::InReview);
        let actions = env.storage.actions_for_entity("td-aaaaaa").unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action, ActionKind::Review);
        assert!(env.storage.latest_handoff("td-aaaaaa").unwrap().is_some());
    }

    #[test]
    #[serial]
    fn test_approve_denies_implementer() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        as_session("ses_impl");
        start(env.path(), ids(&["td-aaaaaa"]), None).unwrap();
        review(env.path(), ids(&["td-aaaaaa"]), None, false).unwrap();

        let err = approve(env.path(), ids(&["td-aaaaaa"]), false, None).unwrap_err();
        assert!(matches!(err, Error::CannotSelfApprove(_)));

        as_session("ses_rev");
        let report = approve(env.path(), Vec::new(), true, None).unwrap();
        clear_session();

        assert_eq!(report.processed(), 1);
        let issue = env.get("td-aaaaaa");
        assert_eq!(issue.status, Status::Closed);
        assert_eq!(issue.reviewer_session.as_deref(), Some("ses_rev"));
    }

    #[test]
    #[serial]
    fn test_close_requires_exception_for_implementer() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        as_session("ses_impl");
        start(env.path(), ids(&["td-aaaaaa"]), None).unwrap();

        let err = close(env.path(), ids(&["td-aaaaaa"]), None, None).unwrap_err();
        assert!(matches!(err, Error::CannotSelfClose(_)));

        close(
            env.path(),
            ids(&["td-aaaaaa"]),
            None,
            Some("hotfix".to_string()),
        )
        .unwrap();
        clear_session();

        assert_eq!(env.get("td-aaaaaa").status, Status::Closed);
        let events = security::read_events(env.path()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, "hotfix");
        let logs = env.storage.get_logs("td-aaaaaa", None).unwrap();
        assert!(logs.iter().any(|l| l.log_type == LogType::Security));
    }

    #[test]
    #[serial]
    fn test_block_twice_is_annotated_not_rewritten() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        as_session("ses_1");
        block(env.path(), ids(&["td-aaaaaa"]), Some("waiting".to_string())).unwrap();
        let report = block(env.path(), ids(&["td-aaaaaa"]), None).unwrap();
        clear_session();

        assert_eq!(report.to_human(), "BLOCKED td-aaaaaa (already blocked)");
        assert_eq!(env.storage.actions_for_entity("td-aaaaaa").unwrap().len(), 1);
        let logs = env.storage.get_logs("td-aaaaaa", None).unwrap();
        assert_eq!(logs[0].log_type, LogType::Blocker);
        assert_eq!(logs[0].message, "Blocked: waiting");
    }

    #[test]
    #[serial]
    fn test_reopen_blocked_is_unblock() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        as_session("ses_1");
        block(env.path(), ids(&["td-aaaaaa"]), None).unwrap();
        let report = reopen(env.path(), ids(&["td-aaaaaa"]), None, false).unwrap();
        clear_session();

        assert_eq!(report.to_human(), "UNBLOCKED td-aaaaaa");
        let actions = env.storage.actions_for_entity("td-aaaaaa").unwrap();
        assert_eq!(actions.last().unwrap().action, ActionKind::Unblock);
    }

    #[test]
    #[serial]
    fn test_reopen_in_review_needs_force() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        as_session("ses_impl");
        review(env.path(), ids(&["td-aaaaaa"]), None, false).unwrap();

        let err = reopen(env.path(), ids(&["td-aaaaaa"]), None, false).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
        assert_eq!(env.get("td-aaaaaa").status, Status::InReview);

        let report = reopen(env.path(), ids(&["td-aaaaaa"]), None, true).unwrap();
        clear_session();

        assert_eq!(report.to_human(), "REOPENED td-aaaaaa");
        assert_eq!(env.get("td-aaaaaa").status, Status::Open);
        let actions = env.storage.actions_for_entity("td-aaaaaa").unwrap();
        assert_eq!(actions.last().unwrap().action, ActionKind::Reopen);
    }

    #[test]
    #[serial]
    fn test_review_minor_on_issue_already_in_review() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        as_session("ses_impl");
        review(env.path(), ids(&["td-aaaaaa"]), None, false).unwrap();
        assert!(!env.get("td-aaaaaa").minor);

        let report = review(env.path(), ids(&["td-aaaaaa"]), None, true).unwrap();
        assert_eq!(report.to_human(), "REVIEW REQUESTED td-aaaaaa (already in_review)");
        assert!(env.get("td-aaaaaa").minor);

        // The flag is what lets the implementer approve.
        approve(env.path(), ids(&["td-aaaaaa"]), false, None).unwrap();
        clear_session();
        assert_eq!(env.get("td-aaaaaa").status, Status::Closed);
    }

    #[test]
    #[serial]
    fn test_rejecting_reviewer_can_approve_resubmission() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        as_session("ses_impl");
        start(env.path(), ids(&["td-aaaaaa"]), None).unwrap();
        review(env.path(), ids(&["td-aaaaaa"]), None, false).unwrap();

        as_session("ses_rev");
        reject(env.path(), ids(&["td-aaaaaa"]), Some("needs tests".to_string())).unwrap();
        assert!(!env.storage.was_session_involved("td-aaaaaa", "ses_rev").unwrap());

        as_session("ses_impl");
        review(env.path(), ids(&["td-aaaaaa"]), None, false).unwrap();

        as_session("ses_rev");
        approve(env.path(), ids(&["td-aaaaaa"]), false, None).unwrap();
        clear_session();

        let issue = env.get("td-aaaaaa");
        assert_eq!(issue.status, Status::Closed);
        assert_eq!(issue.reviewer_session.as_deref(), Some("ses_rev"));
    }

    #[test]
    #[serial]
    fn test_reject_in_progress_is_invalid() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        as_session("ses_1");
        start(env.path(), ids(&["td-aaaaaa"]), None).unwrap();
        let err = reject(env.path(), ids(&["td-aaaaaa"]), None).unwrap_err();
        clear_session();

        assert!(matches!(err, Error::InvalidTransition(_)));
        assert_eq!(env.get("td-aaaaaa").status, Status::InProgress);
    }

    #[test]
    #[serial]
    fn test_reject_from_open_is_invalid_in_bulk() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        env.issue("td-bbbbbb", "B");
        as_session("ses_1");
        let report = reject(env.path(), ids(&["td-aaaaaa", "td-bbbbbb"]), None).unwrap();
        clear_session();

        assert_eq!(report.all_skipped(), Some(2));
        assert_eq!(report.skipped(), 2);
    }
}
