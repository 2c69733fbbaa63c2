//! CLI argument definitions for td.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("TD_GIT_COMMIT"),
    " ",
    env!("TD_BUILD_TIMESTAMP"),
    ")"
);

/// td - a local task tracker with a review workflow for AI-assisted coding sessions.
///
/// Work an issue with `td start`, record state with `td handoff`, submit with
/// `td review`, and let a different session `td approve` it.
#[derive(Parser, Debug)]
#[command(name = "td")]
#[command(version = VERSION, about = "Local task tracker with a two-party review workflow", long_about = None)]
pub struct Cli {
    /// Emit one JSON object per line instead of human-readable text
    #[arg(long = "json", global = true)]
    pub json: bool,

    /// Run as if td was started in <path>. Can also be set via TD_WORK_DIR.
    #[arg(short = 'C', long = "work-dir", global = true, env = "TD_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Reason-bearing flags. All are aliases; the first non-empty one wins in the
/// order `--reason`, `--message`, `--comment`, `--note`, `--notes`.
#[derive(Args, Debug, Clone, Default)]
pub struct ReasonArgs {
    /// Why this transition is happening
    #[arg(long)]
    pub reason: Option<String>,

    /// Alias for --reason
    #[arg(short = 'm', long)]
    pub message: Option<String>,

    /// Alias for --reason
    #[arg(long)]
    pub comment: Option<String>,

    /// Alias for --reason
    #[arg(long)]
    pub note: Option<String>,

    /// Alias for --reason
    #[arg(long)]
    pub notes: Option<String>,
}

impl ReasonArgs {
    pub fn resolve(&self) -> Option<String> {
        [
            &self.reason,
            &self.message,
            &self.comment,
            &self.note,
            &self.notes,
        ]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(String::from)
    }
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the .todos/ directory and store in the current project
    Init,

    /// Create an issue
    Create {
        /// Issue title
        title: String,

        /// bug, feature, task, epic, chore (default from config)
        #[arg(short = 't', long = "type")]
        issue_type: Option<String>,

        /// P0 (highest) to P4 (default from config)
        #[arg(short = 'p', long)]
        priority: Option<String>,

        /// Story points: 1, 2, 3, 5, 8, 13, 21
        #[arg(long)]
        points: Option<u8>,

        /// Comma-separated labels
        #[arg(short = 'l', long, value_delimiter = ',')]
        labels: Vec<String>,

        #[arg(short = 'd', long)]
        description: Option<String>,

        /// Acceptance criteria
        #[arg(long)]
        acceptance: Option<String>,

        /// Parent issue (usually an epic)
        #[arg(long)]
        parent: Option<String>,

        #[arg(long)]
        sprint: Option<String>,

        /// Allow the implementer to review and close this issue
        #[arg(long)]
        minor: bool,
    },

    /// Show an issue with its handoff, dependencies, children, logs and files
    Show {
        /// Issue ID (e.g., td-a1b2c3)
        id: String,
    },

    /// List issues (closed and deleted hidden by default)
    List {
        /// Filter by status (repeatable or comma-separated)
        #[arg(short = 's', long, value_delimiter = ',')]
        status: Vec<String>,

        #[arg(short = 't', long = "type")]
        issue_type: Option<String>,

        #[arg(short = 'p', long)]
        priority: Option<String>,

        #[arg(short = 'l', long)]
        label: Option<String>,

        #[arg(long)]
        parent: Option<String>,

        /// Include closed issues
        #[arg(short = 'a', long)]
        all: bool,

        /// Show soft-deleted issues instead
        #[arg(long)]
        deleted: bool,
    },

    /// Update issue fields
    Update {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(short = 'd', long)]
        description: Option<String>,

        #[arg(long)]
        acceptance: Option<String>,

        #[arg(short = 't', long = "type")]
        issue_type: Option<String>,

        #[arg(short = 'p', long)]
        priority: Option<String>,

        #[arg(long)]
        points: Option<u8>,

        /// Replace labels (comma-separated; empty string clears)
        #[arg(short = 'l', long, value_delimiter = ',')]
        labels: Option<Vec<String>>,

        /// New parent ID (empty string clears)
        #[arg(long)]
        parent: Option<String>,

        #[arg(long)]
        sprint: Option<String>,

        #[arg(long, conflicts_with = "not_minor")]
        minor: bool,

        #[arg(long)]
        not_minor: bool,
    },

    /// Soft-delete issues
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Restore soft-deleted issues
    Restore {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Begin work (open/blocked -> in_progress)
    Start {
        /// Issue IDs (defaults to the focused issue)
        ids: Vec<String>,

        #[command(flatten)]
        reason: ReasonArgs,
    },

    /// Stop work and return to open
    #[command(visible_alias = "stop")]
    Unstart {
        ids: Vec<String>,

        #[command(flatten)]
        reason: ReasonArgs,
    },

    /// Record a handoff: what is done, what remains, decisions, uncertainties.
    ///
    /// Each value may be literal text, `@path` to read lines from a file, or
    /// `-` to read lines from stdin. With no list flags and piped stdin, the
    /// input is parsed as `done:`/`remaining:`/`decisions:`/`uncertain:` sections.
    Handoff {
        /// Issue ID (defaults to the focused issue)
        id: Option<String>,

        #[arg(long)]
        done: Vec<String>,

        #[arg(long)]
        remaining: Vec<String>,

        #[arg(long = "decision")]
        decisions: Vec<String>,

        #[arg(long)]
        uncertain: Vec<String>,

        /// Also record a progress note
        #[arg(long)]
        note: Option<String>,
    },

    /// Submit for review (in_progress -> in_review)
    #[command(visible_aliases = ["submit", "finish"])]
    Review {
        ids: Vec<String>,

        #[command(flatten)]
        reason: ReasonArgs,

        /// Mark as minor (self-reviewable)
        #[arg(long)]
        minor: bool,
    },

    /// Approve and close issues in review (must be a different session)
    Approve {
        ids: Vec<String>,

        /// Approve every issue currently in review
        #[arg(long, conflicts_with = "ids")]
        all: bool,

        #[command(flatten)]
        reason: ReasonArgs,
    },

    /// Send issues in review back to in_progress
    Reject {
        ids: Vec<String>,

        #[command(flatten)]
        reason: ReasonArgs,
    },

    /// Close issues directly
    #[command(visible_aliases = ["done", "complete"])]
    Close {
        ids: Vec<String>,

        #[command(flatten)]
        reason: ReasonArgs,

        /// Close an issue this session worked on; recorded in the security log
        #[arg(long, value_name = "REASON")]
        self_close_exception: Option<String>,
    },

    /// Mark issues blocked
    Block {
        ids: Vec<String>,

        #[command(flatten)]
        reason: ReasonArgs,
    },

    /// Reopen closed issues (or unblock blocked ones)
    Reopen {
        ids: Vec<String>,

        #[command(flatten)]
        reason: ReasonArgs,

        /// Also pull in_review issues back to open
        #[arg(long)]
        force: bool,
    },

    /// Dependency management
    Dep(DepArgs),

    /// Undo this session's last action
    Undo {
        /// List undoable actions instead
        #[arg(long)]
        list: bool,
    },

    /// Show this session's recent actions
    Last {
        #[arg(short = 'n', default_value_t = 10)]
        n: usize,
    },

    /// Board management
    Board {
        #[command(subcommand)]
        command: BoardCommands,
    },

    /// Work sessions for grouping progress logs
    Ws {
        #[command(subcommand)]
        command: WsCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Show or rotate the current session
    Session {
        /// Start a new session
        #[arg(long)]
        new: bool,

        /// Label the session
        #[arg(long)]
        name: Option<String>,
    },

    /// Set or show the focused issue
    Focus {
        id: Option<String>,
    },

    /// Clear the focused issue
    Unfocus,

    /// Add a progress log entry
    Log {
        message: String,

        /// Issue ID (defaults to the focused issue)
        #[arg(short = 'i', long)]
        issue: Option<String>,

        /// progress, blocker, decision, hypothesis, tried, result, orchestration
        #[arg(short = 't', long = "type", default_value = "progress")]
        log_type: String,
    },

    /// Comment on an issue
    Comment { id: String, text: String },

    /// Link files to an issue
    Link {
        id: String,

        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// implementation, test, reference, config
        #[arg(long, default_value = "implementation")]
        role: String,
    },

    /// Unlink a file from an issue
    Unlink { id: String, path: PathBuf },

    /// List linked files and whether they changed
    Files { id: String },
}

/// `dep <id>` lists; `dep add|rm` edits.
#[derive(Args, Debug)]
#[command(args_conflicts_with_subcommands = true)]
pub struct DepArgs {
    #[command(subcommand)]
    pub command: Option<DepCommands>,

    /// Issue whose dependencies to show
    pub id: Option<String>,

    /// Show issues blocked by this one instead
    #[arg(long)]
    pub blocking: bool,
}

#[derive(Subcommand, Debug)]
pub enum DepCommands {
    /// Make <id> depend on each <dep-id>
    Add {
        id: String,

        #[arg(required = true)]
        depends_on: Vec<String>,
    },

    /// Remove a dependency
    #[command(visible_alias = "remove")]
    Rm { id: String, depends_on: String },
}

#[derive(Subcommand, Debug)]
pub enum BoardCommands {
    Create {
        name: String,

        /// Stored query text
        #[arg(short = 'q', long, default_value = "")]
        query: String,
    },

    Update {
        /// Board name or ID
        board: String,

        #[arg(short = 'q', long)]
        query: Option<String>,

        #[arg(long)]
        rename: Option<String>,
    },

    Delete { board: String },

    List,

    Show { board: String },

    /// Place an issue at a position on a board
    Move {
        board: String,
        id: String,
        position: i64,
    },

    /// Remove an issue's position from a board
    Unposition { board: String, id: String },
}

#[derive(Subcommand, Debug)]
pub enum WsCommands {
    /// Start a named work session
    Start { name: String },

    /// End the active work session
    End,

    /// Show the active work session
    Current,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show a resolved value and its source
    Get { key: String },

    /// Set a value in the project config
    Set { key: String, value: String },

    /// Show all resolved values with their sources
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_reason_alias_order() {
        let cli = parse(&["td", "block", "td-aaaaaa", "--note", "n", "-m", "m"]);
        let Commands::Block { reason, .. } = cli.command else {
            panic!("expected block");
        };
        assert_eq!(reason.resolve().as_deref(), Some("m"));
    }

    #[test]
    fn test_reason_skips_blank() {
        let args = ReasonArgs {
            reason: Some("  ".to_string()),
            comment: Some("c".to_string()),
            ..ReasonArgs::default()
        };
        assert_eq!(args.resolve().as_deref(), Some("c"));
        assert_eq!(ReasonArgs::default().resolve(), None);
    }

    #[test]
    fn test_verb_aliases() {
        assert!(matches!(
            parse(&["td", "submit", "td-aaaaaa"]).command,
            Commands::Review { .. }
        ));
        assert!(matches!(
            parse(&["td", "done", "td-aaaaaa"]).command,
            Commands::Close { .. }
        ));
        assert!(matches!(
            parse(&["td", "stop", "td-aaaaaa"]).command,
            Commands::Unstart { .. }
        ));
    }

    #[test]
    fn test_dep_forms() {
        let Commands::Dep(args) = parse(&["td", "dep", "add", "td-bbbbbb", "td-aaaaaa"]).command
        else {
            panic!("expected dep");
        };
        assert!(matches!(args.command, Some(DepCommands::Add { .. })));

        let Commands::Dep(args) = parse(&["td", "dep", "td-bbbbbb", "--blocking"]).command else {
            panic!("expected dep");
        };
        assert_eq!(args.id.as_deref(), Some("td-bbbbbb"));
        assert!(args.blocking);
    }

    #[test]
    fn test_approve_all_conflicts_with_ids() {
        assert!(Cli::try_parse_from(["td", "approve", "--all", "td-aaaaaa"]).is_err());
    }

    #[test]
    fn test_reopen_force_flag() {
        let Commands::Reopen { force, .. } = parse(&["td", "reopen", "td-aaaaaa"]).command else {
            panic!("expected reopen");
        };
        assert!(!force);
        let Commands::Reopen { ids, force, .. } =
            parse(&["td", "reopen", "td-aaaaaa", "--force"]).command
        else {
            panic!("expected reopen");
        };
        assert!(force);
        assert_eq!(ids, vec!["td-aaaaaa".to_string()]);
    }

    #[test]
    fn test_labels_comma_separated() {
        let Commands::Create { labels, .. } =
            parse(&["td", "create", "T", "--labels", "a,b"]).command
        else {
            panic!("expected create");
        };
        assert_eq!(labels, vec!["a", "b"]);
    }
}
