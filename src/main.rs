//! td CLI - a local task tracker with a two-party review workflow.

use clap::Parser;
use std::env;
use std::path::{Path, PathBuf};
use std::process;
use td::cli::{BoardCommands, Cli, Commands, ConfigCommands, DepCommands, WsCommands};
use td::commands::handoff::HandoffArgs;
use td::commands::issue::{IssueChanges, ListArgs, NewIssue};
use td::commands::{self, Output};
use td::config::{ConfigOverrides, OutputFormat, resolve_config};
use td::storage::find_project_root;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Log filter for diagnostics on stderr (e.g. `TD_LOG=debug`).
const LOG_ENV: &str = "TD_LOG";

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let root = match resolve_root(cli.work_dir) {
        Ok(root) => root,
        Err(e) => fail(&e, !cli.json),
    };

    let human = if cli.json {
        false
    } else {
        match resolve_config(&root, &ConfigOverrides::new()) {
            Ok(config) => config.output_format() == OutputFormat::Human,
            Err(e) => fail(&e, true),
        }
    };

    if let Err(e) = run_command(cli.command, &root, human) {
        fail(&e, human);
    }
}

fn init_tracing() {
    let filter = env::var(LOG_ENV)
        .ok()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Project root: `-C/--work-dir` (or `TD_WORK_DIR`) > nearest `.todos/` ancestor > cwd.
///
/// An explicit path is used literally, without searching upward.
fn resolve_root(explicit: Option<PathBuf>) -> Result<PathBuf, td::Error> {
    match explicit {
        Some(path) => {
            if !path.is_dir() {
                return Err(td::Error::InvalidInput(format!(
                    "work dir does not exist: {}",
                    path.display()
                )));
            }
            Ok(path.canonicalize()?)
        }
        None => {
            let cwd = env::current_dir()?;
            Ok(find_project_root(&cwd).unwrap_or(cwd))
        }
    }
}

fn fail(err: &td::Error, human: bool) -> ! {
    if human {
        eprintln!("Error: {}", err);
    } else {
        let body = serde_json::json!({
            "error": err.to_string(),
            "error_code": err.code(),
        });
        eprintln!("{}", body);
    }
    process::exit(1);
}

fn output<T: Output>(result: &T, human: bool) -> Result<(), td::Error> {
    for warning in result.warnings() {
        eprintln!("Warning: {}", warning);
    }
    let text = if human {
        result.to_human()
    } else {
        result.to_json()
    };
    if !text.is_empty() {
        println!("{}", text);
    }
    match result.all_skipped() {
        Some(skipped) => Err(td::Error::BulkFailed(skipped)),
        None => Ok(()),
    }
}

fn run_command(command: Commands, root: &Path, human: bool) -> Result<(), td::Error> {
    match command {
        Commands::Init => output(&commands::init(root)?, human),

        Commands::Create {
            title,
            issue_type,
            priority,
            points,
            labels,
            description,
            acceptance,
            parent,
            sprint,
            minor,
        } => {
            let new = NewIssue {
                title,
                issue_type,
                priority,
                points,
                labels,
                description,
                acceptance,
                parent,
                sprint,
                minor,
            };
            output(&commands::issue::create(root, new)?, human)
        }

        Commands::Show { id } => output(&commands::issue::show(root, &id)?, human),

        Commands::List {
            status,
            issue_type,
            priority,
            label,
            parent,
            all,
            deleted,
        } => {
            let args = ListArgs {
                status,
                issue_type,
                priority,
                label,
                parent,
                all,
                deleted,
            };
            output(&commands::issue::list(root, args)?, human)
        }

        Commands::Update {
            id,
            title,
            description,
            acceptance,
            issue_type,
            priority,
            points,
            labels,
            parent,
            sprint,
            minor,
            not_minor,
        } => {
            let changes = IssueChanges {
                title,
                description,
                acceptance,
                issue_type,
                priority,
                points,
                labels,
                parent,
                sprint,
                minor: match (minor, not_minor) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
            };
            output(&commands::issue::update(root, &id, changes)?, human)
        }

        Commands::Delete { ids } => output(&commands::issue::delete(root, ids)?, human),
        Commands::Restore { ids } => output(&commands::issue::restore(root, ids)?, human),

        Commands::Start { ids, reason } => {
            output(&commands::workflow::start(root, ids, reason.resolve())?, human)
        }
        Commands::Unstart { ids, reason } => {
            output(&commands::workflow::unstart(root, ids, reason.resolve())?, human)
        }
        Commands::Review { ids, reason, minor } => output(
            &commands::workflow::review(root, ids, reason.resolve(), minor)?,
            human,
        ),
        Commands::Approve { ids, all, reason } => output(
            &commands::workflow::approve(root, ids, all, reason.resolve())?,
            human,
        ),
        Commands::Reject { ids, reason } => {
            output(&commands::workflow::reject(root, ids, reason.resolve())?, human)
        }
        Commands::Close {
            ids,
            reason,
            self_close_exception,
        } => output(
            &commands::workflow::close(root, ids, reason.resolve(), self_close_exception)?,
            human,
        ),
        Commands::Block { ids, reason } => {
            output(&commands::workflow::block(root, ids, reason.resolve())?, human)
        }
        Commands::Reopen { ids, reason, force } => output(
            &commands::workflow::reopen(root, ids, reason.resolve(), force)?,
            human,
        ),

        Commands::Handoff {
            id,
            done,
            remaining,
            decisions,
            uncertain,
            note,
        } => {
            let args = HandoffArgs {
                id,
                done,
                remaining,
                decisions,
                uncertain,
                note,
            };
            output(&commands::handoff::handoff(root, args)?, human)
        }

        Commands::Dep(dep) => match dep.command {
            Some(DepCommands::Add { id, depends_on }) => {
                output(&commands::dep::add(root, &id, &depends_on)?, human)
            }
            Some(DepCommands::Rm { id, depends_on }) => {
                output(&commands::dep::remove(root, &id, &depends_on)?, human)
            }
            None => {
                let id = dep.id.ok_or_else(|| {
                    td::Error::InvalidInput(
                        "usage: td dep <id> [--blocking] | td dep add|rm ...".to_string(),
                    )
                })?;
                output(&commands::dep::list(root, &id, dep.blocking)?, human)
            }
        },

        Commands::Undo { list } => {
            if list {
                output(&commands::undo::undo_list(root)?, human)
            } else {
                output(&commands::undo::undo(root)?, human)
            }
        }
        Commands::Last { n } => output(&commands::undo::last(root, n)?, human),

        Commands::Board { command } => match command {
            BoardCommands::Create { name, query } => {
                output(&commands::board::create(root, &name, &query)?, human)
            }
            BoardCommands::Update {
                board,
                query,
                rename,
            } => output(&commands::board::update(root, &board, query, rename)?, human),
            BoardCommands::Delete { board } => {
                output(&commands::board::delete(root, &board)?, human)
            }
            BoardCommands::List => output(&commands::board::list(root)?, human),
            BoardCommands::Show { board } => output(&commands::board::show(root, &board)?, human),
            BoardCommands::Move {
                board,
                id,
                position,
            } => output(
                &commands::board::move_issue(root, &board, &id, position)?,
                human,
            ),
            BoardCommands::Unposition { board, id } => {
                output(&commands::board::unposition(root, &board, &id)?, human)
            }
        },

        Commands::Ws { command } => match command {
            WsCommands::Start { name } => output(&commands::activity::ws_start(root, &name)?, human),
            WsCommands::End => output(&commands::activity::ws_end(root)?, human),
            WsCommands::Current => output(&commands::activity::ws_current(root)?, human),
        },

        Commands::Config { command } => match command {
            ConfigCommands::Get { key } => output(&commands::config::get(root, &key)?, human),
            ConfigCommands::Set { key, value } => {
                output(&commands::config::set(root, &key, &value)?, human)
            }
            ConfigCommands::List => output(&commands::config::list(root)?, human),
        },

        Commands::Session { new, name } => {
            output(&commands::activity::session_cmd(root, new, name)?, human)
        }
        Commands::Focus { id } => output(&commands::activity::focus_cmd(root, id)?, human),
        Commands::Unfocus => output(&commands::activity::unfocus(root)?, human),

        Commands::Log {
            message,
            issue,
            log_type,
        } => output(
            &commands::activity::log(root, &message, issue, &log_type)?,
            human,
        ),
        Commands::Comment { id, text } => {
            output(&commands::activity::comment(root, &id, &text)?, human)
        }

        Commands::Link { id, paths, role } => {
            output(&commands::link::link(root, &id, &paths, &role)?, human)
        }
        Commands::Unlink { id, path } => output(&commands::link::unlink(root, &id, &path)?, human),
        Commands::Files { id } => output(&commands::link::files(root, &id)?, human),
    }
}
