//! td - a local task tracker for AI-assisted coding sessions.
//!
//! This library provides the core of the `td` CLI: issue storage, the status
//! workflow with its review protocol, parent/child and dependency cascades,
//! and a single-step undo engine backed by an append-only action log.

pub mod action_log;
pub mod cli;
pub mod commands;
pub mod config;
pub mod focus;
pub mod models;
pub mod security;
pub mod session;
pub mod storage;
pub mod undo;
pub mod workflow;


/// Library-level error type for td operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Not initialized: run `td init` first")]
    NotInitialized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Handoff required: {0}")]
    HandoffRequired(String),

    #[error("Cannot approve {0}: this session created, implemented, or previously worked on it")]
    CannotSelfApprove(String),

    #[error(
        "Cannot close {0}: this session was involved; pass --self-close-exception <reason> to override"
    )]
    CannotSelfClose(String),

    #[error("Cycle detected: {0}")]
    CycleDetected(String),

    #[error("Dependency already exists: {0}")]
    DependencyExists(String),

    #[error("No active session: {0}")]
    NoActiveSession(String),

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Undo not supported for {0}")]
    UndoNotSupported(String),

    #[error("No issues processed ({0} skipped)")]
    BulkFailed(usize),
}

impl Error {
    /// Stable machine-readable error code used in JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
            Error::Store(_) => "store_error",
            Error::NotInitialized => "not_initialized",
            Error::NotFound(_) => "not_found",
            Error::InvalidInput(_) => "invalid_input",
            Error::InvalidTransition(_) => "invalid_transition",
            Error::HandoffRequired(_) => "handoff_required",
            Error::CannotSelfApprove(_) => "cannot_self_approve",
            Error::CannotSelfClose(_) => "cannot_self_close",
            Error::CycleDetected(_) => "cycle_detected",
            Error::DependencyExists(_) => "dependency_exists",
            Error::NoActiveSession(_) => "no_active_session",
            Error::NothingToUndo => "nothing_to_undo",
            Error::UndoNotSupported(_) => "undo_not_supported",
            Error::BulkFailed(_) => "bulk_failed",
        }
    }
}

/// Result type alias for td operations.
pub type Result<T> = std::result::Result<T, Error>;
