//! Focus and active work-session markers.
//!
//! Both are single-line files in `.todos/`, read lazily and written atomically.
//! They are hints: a missing or empty file simply means "none".

use std::fs;
use std::path::{Path, PathBuf};

use crate::Result;
use crate::storage::{MARKER_DIR, write_atomic};

const FOCUS_FILE: &str = "focus";
const WORK_SESSION_FILE: &str = "work_session";

fn marker(root: &Path, name: &str) -> PathBuf {
    root.join(MARKER_DIR).join(name)
}

fn read_marker(root: &Path, name: &str) -> Result<Option<String>> {
    let path = marker(root, name);
    if !path.exists() {
        return Ok(None);
    }
    let value = fs::read_to_string(path)?.trim().to_string();
    Ok((!value.is_empty()).then_some(value))
}

fn clear_marker(root: &Path, name: &str) -> Result<bool> {
    let path = marker(root, name);
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(path)?;
    Ok(true)
}

pub fn get_focus(root: &Path) -> Result<Option<String>> {
    read_marker(root, FOCUS_FILE)
}

pub fn set_focus(root: &Path, issue_id: &str) -> Result<()> {
    write_atomic(&marker(root, FOCUS_FILE), &format!("{}\n", issue_id))
}

/// Remove the focus marker. Returns whether one was set.
pub fn clear_focus(root: &Path) -> Result<bool> {
    clear_marker(root, FOCUS_FILE)
}

/// Clear focus if it points at `issue_id`.
///
/// Failures are logged, not returned; focus is never worth failing a command over.
pub fn clear_focus_if(root: &Path, issue_id: &str) -> bool {
    match get_focus(root) {
        Ok(Some(focused)) if focused == issue_id => match clear_focus(root) {
            Ok(cleared) => cleared,
            Err(e) => {
                tracing::warn!(error = %e, "could not clear focus");
                false
            }
        },
        Ok(_) => false,
        Err(e) => {
            tracing::warn!(error = %e, "could not read focus");
            false
        }
    }
}

pub fn get_work_session(root: &Path) -> Result<Option<String>> {
    read_marker(root, WORK_SESSION_FILE)
}

pub fn set_work_session(root: &Path, id: &str) -> Result<()> {
    write_atomic(&marker(root, WORK_SESSION_FILE), &format!("{}\n", id))
}

pub fn clear_work_session(root: &Path) -> Result<bool> {
    clear_marker(root, WORK_SESSION_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_focus_set_get_clear() {
        let dir = TempDir::new().unwrap();
        assert_eq!(get_focus(dir.path()).unwrap(), None);

        set_focus(dir.path(), "td-aaaaaa").unwrap();
        assert_eq!(get_focus(dir.path()).unwrap().as_deref(), Some("td-aaaaaa"));

        assert!(!clear_focus_if(dir.path(), "td-bbbbbb"));
        assert!(get_focus(dir.path()).unwrap().is_some());
        assert!(clear_focus_if(dir.path(), "td-aaaaaa"));
        assert_eq!(get_focus(dir.path()).unwrap(), None);
        assert!(!clear_focus(dir.path()).unwrap());
    }

    #[test]
    fn test_empty_marker_is_none() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(MARKER_DIR)).unwrap();
        fs::write(marker(dir.path(), WORK_SESSION_FILE), "  \n").unwrap();
        assert_eq!(get_work_session(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_work_session_marker() {
        let dir = TempDir::new().unwrap();
        set_work_session(dir.path(), "ws-abc123").unwrap();
        assert_eq!(
            get_work_session(dir.path()).unwrap().as_deref(),
            Some("ws-abc123")
        );
        assert!(clear_work_session(dir.path()).unwrap());
    }
}
