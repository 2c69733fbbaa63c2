//! KDL schema for config.kdl.
//!
//! ```kdl
//! output-format "human"   // or "json"
//! review-mode "auto"      // or "strict"
//! default-priority "P2"   // P0-P4 (a bare integer 0-4 is also accepted)
//! default-type "task"
//! ```

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::models::{IssueType, Priority};
use crate::storage::write_atomic;
use crate::workflow::ReviewMode;
use crate::{Error, Result};

/// Output format preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    /// One JSON object per line
    Json,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Every key config.kdl understands.
pub const CONFIG_KEYS: [&str; 4] = [
    "output-format",
    "review-mode",
    "default-priority",
    "default-type",
];

/// Preferences stored in a single config.kdl file. Unset keys are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TdConfig {
    pub output_format: Option<OutputFormat>,
    pub review_mode: Option<ReviewMode>,
    pub default_priority: Option<Priority>,
    pub default_type: Option<IssueType>,
}

fn first_string<'a>(doc: &'a KdlDocument, key: &str) -> Option<&'a str> {
    doc.get(key)
        .and_then(|node| node.entries().first())
        .and_then(|entry| entry.value().as_string())
}

fn string_node(key: &str, value: &str) -> KdlNode {
    let mut node = KdlNode::new(key);
    node.push(KdlEntry::new(KdlValue::String(value.to_string())));
    node
}

impl TdConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse config from a KDL document.
    ///
    /// Unknown keys are ignored; invalid values are dropped with a warning.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = Self::new();

        if let Some(s) = first_string(doc, "output-format") {
            config.output_format = OutputFormat::parse(s);
            if config.output_format.is_none() {
                tracing::warn!(value = s, "ignoring invalid output-format");
            }
        }

        if let Some(s) = first_string(doc, "review-mode") {
            config.review_mode = s
                .parse()
                .map_err(|e| tracing::warn!(error = %e, "ignoring invalid review-mode"))
                .ok();
        }

        if let Some(entry) = doc.get("default-priority").and_then(|n| n.entries().first()) {
            let parsed = match (entry.value().as_string(), entry.value().as_integer()) {
                (Some(s), _) => s.parse::<Priority>().ok(),
                (None, Some(i)) => i.to_string().parse::<Priority>().ok(),
                _ => None,
            };
            if parsed.is_none() {
                tracing::warn!("ignoring invalid default-priority");
            }
            config.default_priority = parsed;
        }

        if let Some(s) = first_string(doc, "default-type") {
            config.default_type = s
                .parse()
                .map_err(|e| tracing::warn!(error = %e, "ignoring invalid default-type"))
                .ok();
        }

        config
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();
        if let Some(format) = self.output_format {
            doc.nodes_mut().push(string_node("output-format", format.as_str()));
        }
        if let Some(mode) = self.review_mode {
            doc.nodes_mut().push(string_node("review-mode", mode.as_str()));
        }
        if let Some(priority) = self.default_priority {
            doc.nodes_mut()
                .push(string_node("default-priority", priority.as_str()));
        }
        if let Some(issue_type) = self.default_type {
            doc.nodes_mut()
                .push(string_node("default-type", issue_type.as_str()));
        }
        doc
    }

    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &TdConfig) {
        if other.output_format.is_some() {
            self.output_format = other.output_format;
        }
        if other.review_mode.is_some() {
            self.review_mode = other.review_mode;
        }
        if other.default_priority.is_some() {
            self.default_priority = other.default_priority;
        }
        if other.default_type.is_some() {
            self.default_type = other.default_type;
        }
    }

    /// Raw value of `key`, if set in this file.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = match key {
            "output-format" => self.output_format.map(|v| v.as_str().to_string()),
            "review-mode" => self.review_mode.map(|v| v.as_str().to_string()),
            "default-priority" => self.default_priority.map(|v| v.as_str().to_string()),
            "default-type" => self.default_type.map(|v| v.as_str().to_string()),
            other => return Err(unknown_key(other)),
        };
        Ok(value)
    }

    /// Validate and set `key`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "output-format" => {
                self.output_format = Some(OutputFormat::parse(value).ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "output-format must be human or json, got '{}'",
                        value
                    ))
                })?);
            }
            "review-mode" => self.review_mode = Some(value.parse()?),
            "default-priority" => self.default_priority = Some(value.parse()?),
            "default-type" => self.default_type = Some(value.parse()?),
            other => return Err(unknown_key(other)),
        }
        Ok(())
    }

    /// Load from `path`; a missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)?;
        let doc: KdlDocument = content.parse().map_err(|e| {
            Error::InvalidInput(format!("invalid KDL in {}: {}", path.display(), e))
        })?;
        Ok(Self::from_kdl(&doc))
    }

    /// Formatted KDL text.
    pub fn render(&self) -> String {
        let mut doc = self.to_kdl();
        doc.autoformat();
        doc.to_string()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.render())
    }
}

fn unknown_key(key: &str) -> Error {
    Error::InvalidInput(format!(
        "unknown config key '{}' (expected one of: {})",
        key,
        CONFIG_KEYS.join(", ")
    ))
}
