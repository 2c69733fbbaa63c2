//! SQLite schema and migrations.

use rusqlite::Connection;

use crate::Result;

/// Current schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 2;

/// Create all tables and indexes if they do not exist, then migrate.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS issues (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            acceptance TEXT NOT NULL DEFAULT '',
            type TEXT NOT NULL DEFAULT 'task',
            priority TEXT NOT NULL DEFAULT 'P2',
            points INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'open',
            labels TEXT NOT NULL DEFAULT '[]',
            parent_id TEXT,
            creator_session TEXT,
            implementer_session TEXT,
            reviewer_session TEXT,
            minor INTEGER NOT NULL DEFAULT 0,
            sprint TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            closed_at TEXT,
            deleted_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status);
        CREATE INDEX IF NOT EXISTS idx_issues_parent ON issues(parent_id);
        CREATE INDEX IF NOT EXISTS idx_issues_priority ON issues(priority);

        CREATE TABLE IF NOT EXISTS issue_dependencies (
            issue_id TEXT NOT NULL,
            depends_on_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (issue_id, depends_on_id),
            CHECK (issue_id <> depends_on_id)
        );

        CREATE INDEX IF NOT EXISTS idx_deps_target ON issue_dependencies(depends_on_id);

        CREATE TABLE IF NOT EXISTS handoffs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            issue_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            done TEXT NOT NULL DEFAULT '[]',
            remaining TEXT NOT NULL DEFAULT '[]',
            decisions TEXT NOT NULL DEFAULT '[]',
            uncertain TEXT NOT NULL DEFAULT '[]',
            timestamp TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_handoffs_issue ON handoffs(issue_id);

        CREATE TABLE IF NOT EXISTS logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            issue_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            work_session_id TEXT,
            log_type TEXT NOT NULL DEFAULT 'progress',
            message TEXT NOT NULL,
            timestamp TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_logs_issue ON logs(issue_id);

        CREATE TABLE IF NOT EXISTS comments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            issue_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            text TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_comments_issue ON comments(issue_id);

        CREATE TABLE IF NOT EXISTS work_sessions (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            session_id TEXT NOT NULL,
            started_at TEXT NOT NULL,
            ended_at TEXT
        );

        CREATE TABLE IF NOT EXISTS session_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            issue_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            action TEXT NOT NULL,
            timestamp TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_session_history_issue
            ON session_history(issue_id, session_id);

        CREATE TABLE IF NOT EXISTS action_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            session_id TEXT NOT NULL,
            action_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            previous_data TEXT,
            new_data TEXT,
            undone INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_action_log_session ON action_log(session_id, undone);

        CREATE TABLE IF NOT EXISTS file_links (
            issue_id TEXT NOT NULL,
            file_path TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'implementation',
            content_hash TEXT NOT NULL DEFAULT '',
            linked_at TEXT NOT NULL,
            PRIMARY KEY (issue_id, file_path)
        );

        CREATE TABLE IF NOT EXISTS boards (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            query TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS board_positions (
            board_id TEXT NOT NULL,
            issue_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            added_at TEXT NOT NULL,
            PRIMARY KEY (board_id, issue_id)
        );
        "#,
    )?;

    run_migrations(conn)?;
    Ok(())
}

/// Apply additive migrations to stores created by older versions.
fn run_migrations(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    // v2: compensating entries point at the action they undo.
    // SQLite has no ADD COLUMN IF NOT EXISTS, so check the table info first.
    if !has_column(conn, "action_log", "undo_of")? {
        conn.execute("ALTER TABLE action_log ADD COLUMN undo_of INTEGER", [])?;
    }

    conn.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let present: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info(?1) WHERE name = ?2",
        [table, column],
        |row| row.get(0),
    )?;
    Ok(present)
}
