//! File links: files associated with an issue, pinned by content hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use super::ts;
use crate::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRole {
    #[default]
    Implementation,
    Test,
    Reference,
    Config,
}

impl FileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileRole::Implementation => "implementation",
            FileRole::Test => "test",
            FileRole::Reference => "reference",
            FileRole::Config => "config",
        }
    }
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FileRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "implementation" | "impl" => Ok(FileRole::Implementation),
            "test" | "tests" => Ok(FileRole::Test),
            "reference" | "ref" => Ok(FileRole::Reference),
            "config" => Ok(FileRole::Config),
            other => Err(Error::InvalidInput(format!(
                "unknown file role '{}' (expected implementation, test, reference, config)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLink {
    pub issue_id: String,
    /// Path relative to the project root
    pub file_path: String,
    pub role: FileRole,
    /// SHA-256 of the file contents when linked (empty if unreadable)
    pub content_hash: String,
    #[serde(with = "ts")]
    pub linked_at: DateTime<Utc>,
}

impl FileLink {
    pub fn entity_id(&self) -> String {
        format!("{}:{}", self.issue_id, self.file_path)
    }
}

/// Hex SHA-256 of a file's contents.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}
