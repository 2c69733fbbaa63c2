//! Dependency edges between issues.
//!
//! An edge `(issue, depends_on)` means `issue` is blocked by `depends_on`
//! until the latter closes. The graph is kept acyclic.

use rusqlite::params;
use std::collections::HashSet;

use super::Storage;
use crate::models::{Status, ts};
use crate::{Error, Result};

impl Storage {
    /// Add an edge. Both issues must exist; duplicates and cycles are rejected.
    pub fn add_dependency(&self, issue_id: &str, depends_on: &str) -> Result<()> {
        if issue_id == depends_on {
            return Err(Error::CycleDetected(format!(
                "{} cannot depend on itself",
                issue_id
            )));
        }
        self.get_live_issue(issue_id)?;
        self.get_live_issue(depends_on)?;

        if self.has_dependency(issue_id, depends_on)? {
            return Err(Error::DependencyExists(format!(
                "{} already depends on {}",
                issue_id, depends_on
            )));
        }
        if self.would_create_cycle(issue_id, depends_on)? {
            return Err(Error::CycleDetected(format!(
                "{} -> {} would create a cycle",
                issue_id, depends_on
            )));
        }

        self.conn().execute(
            "INSERT INTO issue_dependencies (issue_id, depends_on_id, created_at) VALUES (?1, ?2, ?3)",
            params![issue_id, depends_on, ts::format(&ts::now())],
        )?;
        Ok(())
    }

    /// Remove an edge; NotFound if it does not exist.
    pub fn remove_dependency(&self, issue_id: &str, depends_on: &str) -> Result<()> {
        let removed = self.conn().execute(
            "DELETE FROM issue_dependencies WHERE issue_id = ?1 AND depends_on_id = ?2",
            params![issue_id, depends_on],
        )?;
        if removed == 0 {
            return Err(Error::NotFound(format!(
                "dependency {} -> {}",
                issue_id, depends_on
            )));
        }
        Ok(())
    }

    pub fn has_dependency(&self, issue_id: &str, depends_on: &str) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM issue_dependencies WHERE issue_id = ?1 AND depends_on_id = ?2",
            params![issue_id, depends_on],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// IDs that `issue_id` depends on.
    pub fn get_dependencies(&self, issue_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT depends_on_id FROM issue_dependencies WHERE issue_id = ?1 ORDER BY depends_on_id",
        )?;
        let ids = stmt
            .query_map([issue_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// IDs that depend on `issue_id`.
    pub fn get_dependents(&self, issue_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT issue_id FROM issue_dependencies WHERE depends_on_id = ?1 ORDER BY issue_id",
        )?;
        let ids = stmt
            .query_map([issue_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Whether every dependency of `issue_id` is closed.
    ///
    /// Dependencies on missing or soft-deleted issues do not hold it back.
    pub fn all_dependencies_closed(&self, issue_id: &str) -> Result<bool> {
        for dep in self.get_dependencies(issue_id)? {
            match self.find_issue(&dep)? {
                Some(issue) if !issue.is_deleted() && issue.status != Status::Closed => {
                    return Ok(false);
                }
                _ => {}
            }
        }
        Ok(true)
    }

    /// Check if adding `issue_id -> depends_on` would create a cycle.
    ///
    /// True when `issue_id` is already reachable from `depends_on`.
    pub fn would_create_cycle(&self, issue_id: &str, depends_on: &str) -> Result<bool> {
        let mut visited = HashSet::new();
        let mut stack = vec![depends_on.to_string()];

        while let Some(current) = stack.pop() {
            if current == issue_id {
                return Ok(true);
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            for next in self.get_dependencies(&current)? {
                if !visited.contains(&next) {
                    stack.push(next);
                }
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use crate::Error;
    use crate::test_utils::TestEnv;

    fn env_with(ids: &[&str]) -> TestEnv {
        let env = TestEnv::new();
        for id in ids {
            env.issue(id, id);
        }
        env
    }

    #[test]
    fn test_add_and_query_dependency() {
        let env = env_with(&["td-aaaaaa", "td-bbbbbb"]);
        env.storage.add_dependency("td-bbbbbb", "td-aaaaaa").unwrap();

        assert_eq!(
            env.storage.get_dependencies("td-bbbbbb").unwrap(),
            vec!["td-aaaaaa"]
        );
        assert_eq!(
            env.storage.get_dependents("td-aaaaaa").unwrap(),
            vec!["td-bbbbbb"]
        );
    }

    #[test]
    fn test_duplicate_dependency_rejected() {
        let env = env_with(&["td-aaaaaa", "td-bbbbbb"]);
        env.storage.add_dependency("td-bbbbbb", "td-aaaaaa").unwrap();
        assert!(matches!(
            env.storage.add_dependency("td-bbbbbb", "td-aaaaaa"),
            Err(Error::DependencyExists(_))
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let env = env_with(&["td-aaaaaa", "td-bbbbbb", "td-cccccc"]);
        env.storage.add_dependency("td-bbbbbb", "td-aaaaaa").unwrap();
        env.storage.add_dependency("td-cccccc", "td-bbbbbb").unwrap();

        assert!(matches!(
            env.storage.add_dependency("td-aaaaaa", "td-cccccc"),
            Err(Error::CycleDetected(_))
        ));
        assert!(matches!(
            env.storage.add_dependency("td-aaaaaa", "td-aaaaaa"),
            Err(Error::CycleDetected(_))
        ));
    }

    #[test]
    fn test_missing_endpoint_is_not_found() {
        let env = env_with(&["td-aaaaaa"]);
        assert!(matches!(
            env.storage.add_dependency("td-aaaaaa", "td-ffffff"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_missing_dependency() {
        let env = env_with(&["td-aaaaaa", "td-bbbbbb"]);
        assert!(matches!(
            env.storage.remove_dependency("td-bbbbbb", "td-aaaaaa"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_all_dependencies_closed() {
        use crate::models::{Status, ts};

        let env = env_with(&["td-aaaaaa", "td-bbbbbb"]);
        env.storage.add_dependency("td-bbbbbb", "td-aaaaaa").unwrap();
        assert!(!env.storage.all_dependencies_closed("td-bbbbbb").unwrap());

        let mut dep = env.get("td-aaaaaa");
        dep.set_status(Status::Closed, ts::now());
        env.storage.update_issue(&dep).unwrap();
        assert!(env.storage.all_dependencies_closed("td-bbbbbb").unwrap());
    }
}
