//! File links: `link`, `unlink`, `files`.
//!
//! Paths are stored relative to the project root when they live under it.
//! The SHA-256 of the file at link time is kept so `files` can report drift.

use serde::Serialize;
use std::path::{Path, PathBuf};

use super::{Context, Output, json_line};
use crate::action_log::{ActionKind, EntityKind, NewAction};
use crate::models::links::hash_file;
use crate::models::{FileLink, FileRole, ts};
use crate::storage::validate_issue_id;
use crate::{Error, Result};

/// Current state of a linked file relative to its recorded hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    Unchanged,
    Modified,
    Missing,
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileState::Unchanged => write!(f, "unchanged"),
            FileState::Modified => write!(f, "modified"),
            FileState::Missing => write!(f, "missing"),
        }
    }
}

/// Absolute path on disk and the string stored for it.
fn resolve_path(root: &Path, path: &Path) -> Result<(PathBuf, String)> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let stored = match absolute.strip_prefix(root) {
        Ok(rel) => rel.to_string_lossy().to_string(),
        Err(_) => absolute.to_string_lossy().to_string(),
    };
    if stored.is_empty() {
        return Err(Error::InvalidInput(format!(
            "cannot link the project root itself: {}",
            path.display()
        )));
    }
    Ok((absolute, stored))
}

fn on_disk(root: &Path, stored: &str) -> PathBuf {
    let path = Path::new(stored);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[derive(Serialize)]
pub struct Linked {
    pub links: Vec<FileLink>,
    pub session: String,
    #[serde(skip)]
    pub warnings: Vec<String>,
}

impl Output for Linked {
    fn to_json(&self) -> String {
        self.links
            .iter()
            .map(json_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn to_human(&self) -> String {
        self.links
            .iter()
            .map(|l| format!("LINKED {} {} ({})", l.issue_id, l.file_path, l.role))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn warnings(&self) -> Vec<String> {
        self.warnings.clone()
    }
}

pub fn link(root: &Path, id: &str, paths: &[PathBuf], role: &str) -> Result<Linked> {
    let ctx = Context::open(root)?;
    let id = validate_issue_id(id)?;
    ctx.storage.get_live_issue(&id)?;
    let role: FileRole = role.parse()?;

    let mut links = Vec::new();
    let mut warnings = Vec::new();
    for path in paths {
        let (absolute, stored) = resolve_path(&ctx.root, path)?;
        let content_hash = match hash_file(&absolute) {
            Ok(hash) => hash,
            Err(e) => {
                warnings.push(format!("{} is unreadable ({}); linked without a hash", stored, e));
                String::new()
            }
        };
        let link = FileLink {
            issue_id: id.clone(),
            file_path: stored,
            role,
            content_hash,
            linked_at: ts::now(),
        };

        ctx.storage.transaction(|s| {
            let previous = s.get_file_link(&id, &link.file_path)?;
            s.insert_file_link(&link)?;
            let entry = NewAction::new(
                &ctx.session,
                ActionKind::LinkFile,
                EntityKind::FileLink,
                &link.entity_id(),
            )
            .with_previous(previous.as_ref())?
            .with_new(Some(&link))?;
            s.append_action(&entry)?;
            Ok(())
        })?;
        links.push(link);
    }

    Ok(Linked {
        links,
        session: ctx.session,
        warnings,
    })
}

#[derive(Serialize)]
pub struct Unlinked {
    #[serde(flatten)]
    pub link: FileLink,
    pub session: String,
}

impl Output for Unlinked {
    fn to_json(&self) -> String {
        json_line(self)
    }

    fn to_human(&self) -> String {
        format!("UNLINKED {} {}", self.link.issue_id, self.link.file_path)
    }
}

pub fn unlink(root: &Path, id: &str, path: &Path) -> Result<Unlinked> {
    let ctx = Context::open(root)?;
    let id = validate_issue_id(id)?;
    let (_, stored) = resolve_path(&ctx.root, path)?;

    let link = ctx.storage.transaction(|s| {
        // Accept the path exactly as it was stored, too.
        let raw = path.to_string_lossy().to_string();
        let link = match s.get_file_link(&id, &stored)? {
            Some(link) => link,
            None => s
                .get_file_link(&id, &raw)?
                .ok_or_else(|| Error::NotFound(format!("{} is not linked to {}", stored, id)))?,
        };
        s.remove_file_link(&id, &link.file_path)?;
        let entry = NewAction::new(
            &ctx.session,
            ActionKind::UnlinkFile,
            EntityKind::FileLink,
            &link.entity_id(),
        )
        .with_previous(Some(&link))?;
        s.append_action(&entry)?;
        Ok(link)
    })?;

    Ok(Unlinked {
        link,
        session: ctx.session,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkedFile {
    #[serde(flatten)]
    pub link: FileLink,
    pub state: FileState,
}

#[derive(Serialize)]
pub struct FileList {
    pub issue_id: String,
    pub files: Vec<LinkedFile>,
}

impl Output for FileList {
    fn to_json(&self) -> String {
        self.files
            .iter()
            .map(json_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn to_human(&self) -> String {
        if self.files.is_empty() {
            return format!("No files linked to {}", self.issue_id);
        }
        self.files
            .iter()
            .map(|f| {
                format!(
                    "{:<14} {:<9} {}",
                    f.link.role.to_string(),
                    f.state.to_string(),
                    f.link.file_path
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn file_state(root: &Path, link: &FileLink) -> FileState {
    match hash_file(&on_disk(root, &link.file_path)) {
        Ok(hash) if hash == link.content_hash => FileState::Unchanged,
        Ok(_) => FileState::Modified,
        Err(_) => FileState::Missing,
    }
}

pub fn files(root: &Path, id: &str) -> Result<FileList> {
    let ctx = Context::open(root)?;
    let id = validate_issue_id(id)?;
    ctx.storage.get_issue(&id)?;

    let files = ctx
        .storage
        .file_links(&id)?
        .into_iter()
        .map(|link| LinkedFile {
            state: file_state(&ctx.root, &link),
            link,
        })
        .collect();

    Ok(FileList { issue_id: id, files })
}
