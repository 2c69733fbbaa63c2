//! Storage layer for td data.
//!
//! All state lives under a `.todos/` marker directory at the project root:
//! - `issues.db` - SQLite store (issues, dependencies, handoffs, logs,
//!   session history, action log, file links, boards)
//! - plain-text markers (focus, session, active work session), the security
//!   audit stream, and `config.kdl`
//!
//! Each command opens the store for its duration. Groupings that must be
//! atomic (a mutation plus its action-log entry) run inside [`Storage::transaction`].

pub mod activity;
pub mod boards;
pub mod deps;
pub mod ledger;
pub mod schema;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::models::{Issue, IssueType, Priority, Status, ts};
use crate::{Error, Result};

/// Name of the per-project marker directory.
pub const MARKER_DIR: &str = ".todos";

/// SQLite file inside the marker directory.
pub const DB_FILE: &str = "issues.db";

/// Issue ID prefix.
pub const ID_PREFIX: &str = "td";

/// Storage manager for a single project.
pub struct Storage {
    /// Project root (the directory containing `.todos/`)
    pub root: PathBuf,
    conn: Connection,
}

impl Storage {
    /// Open the existing store under `root`.
    pub fn open(root: &Path) -> Result<Self> {
        let db_path = root.join(MARKER_DIR).join(DB_FILE);
        if !db_path.exists() {
            return Err(Error::NotInitialized);
        }

        let conn = Connection::open(&db_path)?;
        schema::init_schema(&conn)?;
        tracing::debug!(path = %db_path.display(), "opened store");

        Ok(Self {
            root: root.to_path_buf(),
            conn,
        })
    }

    /// Initialize storage for a new project (idempotent).
    pub fn init(root: &Path) -> Result<Self> {
        let dir = root.join(MARKER_DIR);
        fs::create_dir_all(&dir)?;

        let conn = Connection::open(dir.join(DB_FILE))?;
        schema::init_schema(&conn)?;
        tracing::debug!(path = %dir.display(), "initialized store");

        Ok(Self {
            root: root.to_path_buf(),
            conn,
        })
    }

    /// Check if a store exists under `root`.
    pub fn exists(root: &Path) -> bool {
        root.join(MARKER_DIR).join(DB_FILE).exists()
    }

    /// The `.todos/` directory.
    pub fn dir(&self) -> PathBuf {
        self.root.join(MARKER_DIR)
    }

    /// Run `f` inside a single transaction; any error rolls back every write.
    ///
    /// Transactions do not nest: `f` must not call `transaction` again.
    pub fn transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    // === Issue Operations ===

    /// Insert a new issue row.
    pub fn insert_issue(&self, issue: &Issue) -> Result<()> {
        let existing = self.find_issue(&issue.id)?;
        if existing.is_some() {
            return Err(Error::InvalidInput(format!(
                "issue {} already exists",
                issue.id
            )));
        }

        self.conn.execute(
            r#"INSERT INTO issues (
                id, title, description, acceptance, type, priority, points, status,
                labels, parent_id, creator_session, implementer_session, reviewer_session,
                minor, sprint, created_at, updated_at, closed_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"#,
            params![
                issue.id,
                issue.title,
                issue.description,
                issue.acceptance,
                issue.issue_type.as_str(),
                issue.priority.as_str(),
                issue.points,
                issue.status.as_str(),
                serde_json::to_string(&issue.labels)?,
                issue.parent_id,
                issue.creator_session,
                issue.implementer_session,
                issue.reviewer_session,
                issue.minor,
                issue.sprint,
                ts::format(&issue.created_at),
                ts::format(&issue.updated_at),
                issue.closed_at.as_ref().map(ts::format),
                issue.deleted_at.as_ref().map(ts::format),
            ],
        )?;
        Ok(())
    }

    /// Overwrite every column of an existing issue.
    pub fn update_issue(&self, issue: &Issue) -> Result<()> {
        let changed = self.conn.execute(
            r#"UPDATE issues SET
                title = ?2, description = ?3, acceptance = ?4, type = ?5, priority = ?6,
                points = ?7, status = ?8, labels = ?9, parent_id = ?10,
                creator_session = ?11, implementer_session = ?12, reviewer_session = ?13,
                minor = ?14, sprint = ?15, created_at = ?16, updated_at = ?17,
                closed_at = ?18, deleted_at = ?19
            WHERE id = ?1"#,
            params![
                issue.id,
                issue.title,
                issue.description,
                issue.acceptance,
                issue.issue_type.as_str(),
                issue.priority.as_str(),
                issue.points,
                issue.status.as_str(),
                serde_json::to_string(&issue.labels)?,
                issue.parent_id,
                issue.creator_session,
                issue.implementer_session,
                issue.reviewer_session,
                issue.minor,
                issue.sprint,
                ts::format(&issue.created_at),
                ts::format(&issue.updated_at),
                issue.closed_at.as_ref().map(ts::format),
                issue.deleted_at.as_ref().map(ts::format),
            ],
        )?;

        if changed == 0 {
            return Err(Error::NotFound(format!("issue {}", issue.id)));
        }
        Ok(())
    }

    /// Get an issue by ID, including soft-deleted ones.
    pub fn get_issue(&self, id: &str) -> Result<Issue> {
        self.find_issue(id)?
            .ok_or_else(|| Error::NotFound(format!("issue {}", id)))
    }

    /// Get an issue that has not been soft-deleted.
    pub fn get_live_issue(&self, id: &str) -> Result<Issue> {
        let issue = self.get_issue(id)?;
        if issue.is_deleted() {
            return Err(Error::NotFound(format!("issue {} (deleted)", id)));
        }
        Ok(issue)
    }

    pub fn find_issue(&self, id: &str) -> Result<Option<Issue>> {
        let issue = self
            .conn
            .query_row(
                &format!("SELECT {} FROM issues WHERE id = ?1", ISSUE_COLUMNS),
                [id],
                issue_from_row,
            )
            .optional()?;
        Ok(issue)
    }

    /// List issues matching `filter`, ordered by priority then creation time.
    pub fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let mut sql = format!("SELECT {} FROM issues WHERE 1=1", ISSUE_COLUMNS);
        let mut values: Vec<String> = Vec::new();

        if filter.deleted_only {
            sql.push_str(" AND deleted_at IS NOT NULL");
        } else {
            sql.push_str(" AND deleted_at IS NULL");
        }

        if !filter.statuses.is_empty() {
            let placeholders = vec!["?"; filter.statuses.len()].join(", ");
            sql.push_str(&format!(" AND status IN ({})", placeholders));
            values.extend(filter.statuses.iter().map(|s| s.as_str().to_string()));
        } else if !filter.include_closed {
            sql.push_str(" AND status <> 'closed'");
        }
        if let Some(issue_type) = filter.issue_type {
            sql.push_str(" AND type = ?");
            values.push(issue_type.as_str().to_string());
        }
        if let Some(priority) = filter.priority {
            sql.push_str(" AND priority = ?");
            values.push(priority.as_str().to_string());
        }
        if let Some(ref parent) = filter.parent_id {
            sql.push_str(" AND parent_id = ?");
            values.push(parent.clone());
        }

        sql.push_str(" ORDER BY priority ASC, created_at ASC, id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let issues = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), issue_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let issues = match filter.label {
            Some(ref label) => issues
                .into_iter()
                .filter(|i| i.labels.iter().any(|l| l == label))
                .collect(),
            None => issues,
        };
        Ok(issues)
    }

    /// Direct children of `parent_id` that are not soft-deleted.
    pub fn get_children(&self, parent_id: &str) -> Result<Vec<Issue>> {
        self.list_issues(&IssueFilter {
            parent_id: Some(parent_id.to_string()),
            include_closed: true,
            ..IssueFilter::default()
        })
    }

    /// All transitive descendants of `id`, breadth-first.
    pub fn get_descendants(&self, id: &str) -> Result<Vec<Issue>> {
        let mut seen = std::collections::HashSet::new();
        seen.insert(id.to_string());
        let mut queue = std::collections::VecDeque::from([id.to_string()]);
        let mut descendants = Vec::new();

        while let Some(current) = queue.pop_front() {
            for child in self.get_children(&current)? {
                if seen.insert(child.id.clone()) {
                    queue.push_back(child.id.clone());
                    descendants.push(child);
                }
            }
        }
        Ok(descendants)
    }

    /// Whether setting `child`'s parent to `parent` would loop the hierarchy.
    pub fn would_create_parent_cycle(&self, child: &str, parent: &str) -> Result<bool> {
        let mut current = Some(parent.to_string());
        let mut seen = std::collections::HashSet::new();
        while let Some(id) = current {
            if id == child {
                return Ok(true);
            }
            if !seen.insert(id.clone()) {
                // Pre-existing loop that does not involve `child`.
                return Ok(false);
            }
            current = self.find_issue(&id)?.and_then(|i| i.parent_id);
        }
        Ok(false)
    }

    /// Generate an issue ID not yet present in the store.
    pub fn next_issue_id(&self, seed: &str) -> Result<String> {
        for attempt in 0..16u32 {
            let width = if attempt < 8 { 6 } else { 8 };
            let candidate = generate_id(&format!("{}:{}", seed, attempt), width);
            if self.find_issue(&candidate)?.is_none() {
                return Ok(candidate);
            }
        }
        Err(Error::InvalidInput(
            "could not generate a unique issue ID".to_string(),
        ))
    }
}

/// Filters for [`Storage::list_issues`].
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    /// Empty means "any status except closed" unless `include_closed` is set.
    pub statuses: Vec<Status>,
    pub issue_type: Option<IssueType>,
    pub priority: Option<Priority>,
    pub label: Option<String>,
    pub parent_id: Option<String>,
    pub include_closed: bool,
    pub deleted_only: bool,
}

const ISSUE_COLUMNS: &str = "id, title, description, acceptance, type, priority, points, status, \
    labels, parent_id, creator_session, implementer_session, reviewer_session, minor, sprint, \
    created_at, updated_at, closed_at, deleted_at";

fn issue_from_row(row: &Row) -> rusqlite::Result<Issue> {
    let labels: String = row.get(8)?;
    Ok(Issue {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        acceptance: row.get(3)?,
        issue_type: parse_column(row, 4)?,
        priority: parse_column(row, 5)?,
        points: row.get(6)?,
        status: parse_column(row, 7)?,
        labels: serde_json::from_str(&labels)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?,
        parent_id: row.get(9)?,
        creator_session: row.get(10)?,
        implementer_session: row.get(11)?,
        reviewer_session: row.get(12)?,
        minor: row.get(13)?,
        sprint: row.get(14)?,
        created_at: timestamp_column(row, 15)?,
        updated_at: timestamp_column(row, 16)?,
        closed_at: optional_timestamp_column(row, 17)?,
        deleted_at: optional_timestamp_column(row, 18)?,
    })
}

/// Parse a TEXT column through `FromStr`.
pub(crate) fn parse_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<chrono::DateTime<chrono::Utc>> {
    let raw: String = row.get(idx)?;
    ts::parse(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn optional_timestamp_column(
    row: &Row,
    idx: usize,
) -> rusqlite::Result<Option<chrono::DateTime<chrono::Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        ts::parse(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn json_list_column(row: &Row, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Replace `path` with `contents` via a temp file in the same directory.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::InvalidInput(format!("no parent directory for {}", path.display())))?;
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    std::io::Write::write_all(&mut tmp, contents.as_bytes())?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Find the project root by walking up from `start` looking for `.todos/`.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.join(MARKER_DIR).is_dir() {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

/// Generate an ID of the form `<prefix>-<width hex chars>`.
pub fn generate_id_with_prefix(prefix: &str, seed: &str, width: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(
        chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or(0)
            .to_le_bytes(),
    );
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    let hash_hex = format!("{:x}", hasher.finalize());
    format!("{}-{}", prefix, &hash_hex[..width])
}

/// Generate an issue ID (`td-` + `width` lowercase hex chars).
pub fn generate_id(seed: &str, width: usize) -> String {
    generate_id_with_prefix(ID_PREFIX, seed, width)
}

/// Normalize and validate a textual issue ID.
///
/// Trims whitespace and lowercases; the result must match `td-[0-9a-f]{6,8}`.
pub fn validate_issue_id(raw: &str) -> Result<String> {
    let id = raw.trim().to_lowercase();
    if id.is_empty() {
        return Err(Error::InvalidInput("issue ID is empty".to_string()));
    }

    let Some(suffix) = id.strip_prefix("td-") else {
        return Err(Error::InvalidInput(format!(
            "issue ID must start with 'td-', got: {}",
            raw.trim()
        )));
    };
    if !(6..=8).contains(&suffix.len()) || !suffix.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidInput(format!(
            "issue ID suffix must be 6-8 hex characters, got: {}",
            suffix
        )));
    }
    Ok(id)
}
