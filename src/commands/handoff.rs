//! `handoff` - record done / remaining / decisions / uncertain lists.
//!
//! Each list flag takes a literal item, `@path` to read items from a file,
//! or `-` to read items from stdin. With no list flags and piped stdin, the
//! input is parsed as a YAML-like document:
//!
//! ```text
//! done:
//!   - wired the parser
//! remaining:
//!   - error recovery
//! ```

use serde::Serialize;
use std::io::{IsTerminal, Read};
use std::path::Path;

use super::{Context, Output, json_line};
use crate::action_log::{ActionKind, EntityKind, NewAction};
use crate::models::{Handoff, LogType};
use crate::storage::validate_issue_id;
use crate::{Error, Result};

/// The four handoff lists before they are attached to an issue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandoffLists {
    pub done: Vec<String>,
    pub remaining: Vec<String>,
    pub decisions: Vec<String>,
    pub uncertain: Vec<String>,
}

impl HandoffLists {
    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
            && self.remaining.is_empty()
            && self.decisions.is_empty()
            && self.uncertain.is_empty()
    }

    fn section(&mut self, name: &str) -> Option<&mut Vec<String>> {
        match name.trim().to_lowercase().as_str() {
            "done" | "completed" => Some(&mut self.done),
            "remaining" | "todo" | "next" => Some(&mut self.remaining),
            "decisions" | "decision" => Some(&mut self.decisions),
            "uncertain" | "questions" | "open questions" => Some(&mut self.uncertain),
            _ => None,
        }
    }
}

/// Raw flag values, one `Vec` per list.
#[derive(Debug, Clone, Default)]
pub struct HandoffArgs {
    pub id: Option<String>,
    pub done: Vec<String>,
    pub remaining: Vec<String>,
    pub decisions: Vec<String>,
    pub uncertain: Vec<String>,
    pub note: Option<String>,
}

fn strip_bullet(line: &str) -> &str {
    let line = line.trim();
    line.strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .unwrap_or(line)
        .trim()
}

fn item_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(strip_bullet)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Parse a YAML-like handoff document.
///
/// A header line is `name:` with an optional inline item after the colon.
/// Bullet or plain lines belong to the most recent header; lines before any
/// header, and unknown headers, are ignored.
pub fn parse_handoff_text(text: &str) -> HandoffLists {
    let mut lists = HandoffLists::default();
    let mut current: Option<String> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let is_item = line.starts_with("- ") || line.starts_with("* ");
        if !is_item {
            if let Some((name, rest)) = line.split_once(':') {
                if lists.section(name).is_some() {
                    current = Some(name.to_string());
                    let rest = rest.trim();
                    if !rest.is_empty() {
                        if let Some(list) = lists.section(name) {
                            list.push(rest.to_string());
                        }
                    }
                    continue;
                }
            }
        }

        if let Some(ref name) = current {
            if let Some(list) = lists.section(name) {
                list.push(strip_bullet(line).to_string());
            }
        }
    }

    lists
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

/// Expand one flag value into items.
fn expand_value(value: &str, stdin: &mut Option<String>) -> Result<Vec<String>> {
    if value == "-" {
        if stdin.is_none() {
            *stdin = Some(read_stdin()?);
        }
        return Ok(item_lines(stdin.as_deref().unwrap_or_default()));
    }
    if let Some(path) = value.strip_prefix('@') {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidInput(format!("cannot read {}: {}", path, e)))?;
        return Ok(item_lines(&text));
    }
    let value = value.trim();
    if value.is_empty() {
        Ok(Vec::new())
    } else {
        Ok(vec![value.to_string()])
    }
}

fn expand_all(values: &[String], stdin: &mut Option<String>) -> Result<Vec<String>> {
    let mut items = Vec::new();
    for value in values {
        items.extend(expand_value(value, stdin)?);
    }
    Ok(items)
}

/// Build the lists from flags, falling back to piped stdin.
pub fn collect_lists(args: &HandoffArgs) -> Result<HandoffLists> {
    let mut stdin = None;
    let lists = HandoffLists {
        done: expand_all(&args.done, &mut stdin)?,
        remaining: expand_all(&args.remaining, &mut stdin)?,
        decisions: expand_all(&args.decisions, &mut stdin)?,
        uncertain: expand_all(&args.uncertain, &mut stdin)?,
    };
    let no_flags = args.done.is_empty()
        && args.remaining.is_empty()
        && args.decisions.is_empty()
        && args.uncertain.is_empty();
    if no_flags && !std::io::stdin().is_terminal() {
        return Ok(parse_handoff_text(&read_stdin()?));
    }
    Ok(lists)
}

#[derive(Serialize)]
pub struct HandoffRecorded {
    #[serde(flatten)]
    pub handoff: Handoff,
    pub action: &'static str,
}

impl Output for HandoffRecorded {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        format!(
            "HANDOFF {} ({})",
            self.handoff.issue_id,
            self.handoff.summary()
        )
    }
}

pub fn handoff(root: &Path, args: HandoffArgs) -> Result<HandoffRecorded> {
    let ctx = Context::open(root)?;
    let raw_id = ctx
        .ids_or_focus(args.id.clone().into_iter().collect())?
        .remove(0);
    let id = validate_issue_id(&raw_id)?;
    ctx.storage.get_live_issue(&id)?;

    let lists = collect_lists(&args)?;
    if lists.is_empty() {
        return Err(Error::InvalidInput(
            "handoff needs at least one item (--done, --remaining, --decision, --uncertain)"
                .to_string(),
        ));
    }
    record(&ctx, &id, lists, args.note.as_deref())
}

/// Insert the handoff and its action-log entry.
pub(crate) fn record(
    ctx: &Context,
    issue_id: &str,
    lists: HandoffLists,
    note: Option<&str>,
) -> Result<HandoffRecorded> {
    let mut handoff = Handoff::new(issue_id, &ctx.session);
    handoff.done = lists.done;
    handoff.remaining = lists.remaining;
    handoff.decisions = lists.decisions;
    handoff.uncertain = lists.uncertain;

    let handoff = ctx.storage.transaction(|s| {
        let stored = s.insert_handoff(&handoff)?;
        let entry = NewAction::new(
            &ctx.session,
            ActionKind::Handoff,
            EntityKind::Handoff,
            &stored.id.to_string(),
        )
        .with_new(Some(&stored))?;
        s.append_action(&entry)?;
        if let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) {
            ctx.log(issue_id, LogType::Progress, note)?;
        }
        Ok(stored)
    })?;

    Ok(HandoffRecorded {
        handoff,
        action: "handoff",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolvedConfig;
    use crate::storage::Storage;
    use crate::test_utils::TestEnv;
    use std::fs;

    #[test]
    fn test_parse_handoff_text_sections() {
        let text = "done:\n  - wired parser\n  - added tests\nremaining: error recovery\n\
                    decisions:\n  * kept sqlite\nuncertain:\n  perf on big stores\n";
        let lists = parse_handoff_text(text);
        assert_eq!(lists.done, vec!["wired parser", "added tests"]);
        assert_eq!(lists.remaining, vec!["error recovery"]);
        assert_eq!(lists.decisions, vec!["kept sqlite"]);
        assert_eq!(lists.uncertain, vec!["perf on big stores"]);
    }

    #[test]
    fn test_parse_ignores_preamble_and_unknown_headers() {
        let lists = parse_handoff_text("hello\nnotes:\n - x\ndone:\n - y\n");
        assert_eq!(lists.done, vec!["y"]);
        assert!(lists.remaining.is_empty());
    }

    #[test]
    fn test_expand_value_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("done.txt");
        fs::write(&path, "- one\n\n* two\nthree\n").unwrap();
        let mut stdin = None;
        let items = expand_value(&format!("@{}", path.display()), &mut stdin).unwrap();
        assert_eq!(items, vec!["one", "two", "three"]);
        assert!(expand_value("@/no/such/file", &mut stdin).is_err());
        assert_eq!(expand_value(" literal ", &mut stdin).unwrap(), vec!["literal"]);
    }

    #[test]
    fn test_record_appends_handoff_action() {
        let env = TestEnv::new();
        env.issue("td-aaaaaa", "A");
        let ctx = Context {
            root: env.path().to_path_buf(),
            storage: Storage::open(env.path()).unwrap(),
            session: "ses_1".to_string(),
            config: ResolvedConfig::default(),
        };
        let lists = HandoffLists {
            done: vec!["x".to_string()],
            ..Default::default()
        };

        let recorded = record(&ctx, "td-aaaaaa", lists, Some("wrapped up")).unwrap();
        assert!(recorded.handoff.id > 0);

        let entry = env.storage.last_undoable("ses_1").unwrap().unwrap();
        assert_eq!(entry.action, ActionKind::Handoff);
        assert_eq!(entry.entity_id, recorded.handoff.id.to_string());
        let logs = env.storage.get_logs("td-aaaaaa", None).unwrap();
        assert_eq!(logs[0].message, "wrapped up");
    }
}
