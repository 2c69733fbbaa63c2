//! Boards, board positions and file links.

use rusqlite::{OptionalExtension, Row, params};

use super::{Storage, parse_column, timestamp_column};
use crate::models::{Board, BoardPosition, FileLink, ts};
use crate::{Error, Result};

fn board_from_row(row: &Row) -> rusqlite::Result<Board> {
    Ok(Board {
        id: row.get(0)?,
        name: row.get(1)?,
        query: row.get(2)?,
        created_at: timestamp_column(row, 3)?,
        updated_at: timestamp_column(row, 4)?,
    })
}

fn position_from_row(row: &Row) -> rusqlite::Result<BoardPosition> {
    Ok(BoardPosition {
        board_id: row.get(0)?,
        issue_id: row.get(1)?,
        position: row.get(2)?,
        added_at: timestamp_column(row, 3)?,
    })
}

fn link_from_row(row: &Row) -> rusqlite::Result<FileLink> {
    Ok(FileLink {
        issue_id: row.get(0)?,
        file_path: row.get(1)?,
        role: parse_column(row, 2)?,
        content_hash: row.get(3)?,
        linked_at: timestamp_column(row, 4)?,
    })
}

impl Storage {
    // === Boards ===

    pub fn insert_board(&self, board: &Board) -> Result<()> {
        if self.find_board(&board.name)?.is_some() {
            return Err(Error::InvalidInput(format!(
                "board '{}' already exists",
                board.name
            )));
        }
        self.conn().execute(
            "INSERT INTO boards (id, name, query, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                board.id,
                board.name,
                board.query,
                ts::format(&board.created_at),
                ts::format(&board.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn update_board(&self, board: &Board) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE boards SET name = ?2, query = ?3, created_at = ?4, updated_at = ?5 WHERE id = ?1",
            params![
                board.id,
                board.name,
                board.query,
                ts::format(&board.created_at),
                ts::format(&board.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("board {}", board.id)));
        }
        Ok(())
    }

    /// Delete a board and its positions.
    pub fn delete_board(&self, id: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM board_positions WHERE board_id = ?1", [id])?;
        let removed = self.conn().execute("DELETE FROM boards WHERE id = ?1", [id])?;
        if removed == 0 {
            return Err(Error::NotFound(format!("board {}", id)));
        }
        Ok(())
    }

    /// Look up a board by ID or name.
    pub fn find_board(&self, key: &str) -> Result<Option<Board>> {
        let board = self
            .conn()
            .query_row(
                "SELECT id, name, query, created_at, updated_at FROM boards WHERE id = ?1 OR name = ?1",
                [key],
                board_from_row,
            )
            .optional()?;
        Ok(board)
    }

    pub fn get_board(&self, key: &str) -> Result<Board> {
        self.find_board(key)?
            .ok_or_else(|| Error::NotFound(format!("board {}", key)))
    }

    pub fn list_boards(&self) -> Result<Vec<Board>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, query, created_at, updated_at FROM boards ORDER BY name ASC",
        )?;
        let boards = stmt
            .query_map([], board_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(boards)
    }

    // === Board Positions ===

    /// Insert or replace an issue's position on a board.
    pub fn set_board_position(&self, position: &BoardPosition) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO board_positions (board_id, issue_id, position, added_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                position.board_id,
                position.issue_id,
                position.position,
                ts::format(&position.added_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_board_position(
        &self,
        board_id: &str,
        issue_id: &str,
    ) -> Result<Option<BoardPosition>> {
        let position = self
            .conn()
            .query_row(
                "SELECT board_id, issue_id, position, added_at FROM board_positions
                 WHERE board_id = ?1 AND issue_id = ?2",
                params![board_id, issue_id],
                position_from_row,
            )
            .optional()?;
        Ok(position)
    }

    pub fn remove_board_position(&self, board_id: &str, issue_id: &str) -> Result<()> {
        let removed = self.conn().execute(
            "DELETE FROM board_positions WHERE board_id = ?1 AND issue_id = ?2",
            params![board_id, issue_id],
        )?;
        if removed == 0 {
            return Err(Error::NotFound(format!(
                "position of {} on board {}",
                issue_id, board_id
            )));
        }
        Ok(())
    }

    /// Positions on a board, ordered by position.
    pub fn board_positions(&self, board_id: &str) -> Result<Vec<BoardPosition>> {
        let mut stmt = self.conn().prepare(
            "SELECT board_id, issue_id, position, added_at FROM board_positions
             WHERE board_id = ?1 ORDER BY position ASC, issue_id ASC",
        )?;
        let positions = stmt
            .query_map([board_id], position_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(positions)
    }

    // === File Links ===

    pub fn insert_file_link(&self, link: &FileLink) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO file_links (issue_id, file_path, role, content_hash, linked_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                link.issue_id,
                link.file_path,
                link.role.as_str(),
                link.content_hash,
                ts::format(&link.linked_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_file_link(&self, issue_id: &str, file_path: &str) -> Result<Option<FileLink>> {
        let link = self
            .conn()
            .query_row(
                "SELECT issue_id, file_path, role, content_hash, linked_at FROM file_links
                 WHERE issue_id = ?1 AND file_path = ?2",
                params![issue_id, file_path],
                link_from_row,
            )
            .optional()?;
        Ok(link)
    }

    pub fn remove_file_link(&self, issue_id: &str, file_path: &str) -> Result<()> {
        let removed = self.conn().execute(
            "DELETE FROM file_links WHERE issue_id = ?1 AND file_path = ?2",
            params![issue_id, file_path],
        )?;
        if removed == 0 {
            return Err(Error::NotFound(format!(
                "link {} on {}",
                file_path, issue_id
            )));
        }
        Ok(())
    }

    pub fn file_links(&self, issue_id: &str) -> Result<Vec<FileLink>> {
        let mut stmt = self.conn().prepare(
            "SELECT issue_id, file_path, role, content_hash, linked_at FROM file_links
             WHERE issue_id = ?1 ORDER BY file_path ASC",
        )?;
        let links = stmt
            .query_map([issue_id], link_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(links)
    }
}
