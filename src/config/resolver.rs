//! Precedence resolution for configuration.
//!
//! Highest to lowest:
//! 1. CLI flags (passed at runtime)
//! 2. Project config (`<root>/.todos/config.kdl`)
//! 3. System config (`<config_dir>/td/config.kdl`)
//! 4. Built-in defaults

use serde::Serialize;
use std::path::{Path, PathBuf};

use super::schema::{OutputFormat, TdConfig};
use crate::Result;
use crate::models::{IssueType, Priority};
use crate::storage::MARKER_DIR;
use crate::workflow::ReviewMode;

/// Overrides the directory holding the system config (mainly for tests).
pub const CONFIG_DIR_ENV: &str = "TD_CONFIG_DIR";

const CONFIG_FILE: &str = "config.kdl";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    #[serde(rename = "cli")]
    CliFlag,
    Project,
    System,
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::Project => write!(f, "project"),
            ValueSource::System => write!(f, "system"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, Serialize)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub output_format: Resolved<OutputFormat>,
    pub review_mode: Resolved<ReviewMode>,
    pub default_priority: Resolved<Priority>,
    pub default_type: Resolved<IssueType>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            output_format: Resolved::new(OutputFormat::Human, ValueSource::Default),
            review_mode: Resolved::new(ReviewMode::Auto, ValueSource::Default),
            default_priority: Resolved::new(Priority::P2, ValueSource::Default),
            default_type: Resolved::new(IssueType::Task, ValueSource::Default),
        }
    }
}

impl ResolvedConfig {
    pub fn output_format(&self) -> OutputFormat {
        self.output_format.value
    }

    pub fn review_mode(&self) -> ReviewMode {
        self.review_mode.value
    }

    pub fn default_priority(&self) -> Priority {
        self.default_priority.value
    }

    pub fn default_type(&self) -> IssueType {
        self.default_type.value
    }

    /// `(key, value, source)` for every key, in `CONFIG_KEYS` order.
    pub fn entries(&self) -> Vec<(&'static str, String, ValueSource)> {
        vec![
            (
                "output-format",
                self.output_format.value.as_str().to_string(),
                self.output_format.source,
            ),
            (
                "review-mode",
                self.review_mode.value.as_str().to_string(),
                self.review_mode.source,
            ),
            (
                "default-priority",
                self.default_priority.value.as_str().to_string(),
                self.default_priority.source,
            ),
            (
                "default-type",
                self.default_type.value.as_str().to_string(),
                self.default_type.source,
            ),
        ]
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub output_format: Option<OutputFormat>,
    pub review_mode: Option<ReviewMode>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }
}

/// `<root>/.todos/config.kdl`
pub fn project_config_path(root: &Path) -> PathBuf {
    root.join(MARKER_DIR).join(CONFIG_FILE)
}

/// `<config_dir>/td/config.kdl`, or `$TD_CONFIG_DIR/config.kdl` when set.
pub fn system_config_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir).join(CONFIG_FILE));
    }
    dirs::config_dir().map(|dir| dir.join("td").join(CONFIG_FILE))
}

fn pick<T: Copy>(
    cli: Option<T>,
    project: Option<T>,
    system: Option<T>,
    fallback: Resolved<T>,
) -> Resolved<T> {
    if let Some(value) = cli {
        Resolved::new(value, ValueSource::CliFlag)
    } else if let Some(value) = project {
        Resolved::new(value, ValueSource::Project)
    } else if let Some(value) = system {
        Resolved::new(value, ValueSource::System)
    } else {
        fallback
    }
}

/// Resolve from already-loaded layers.
pub fn resolve_layers(
    project: &TdConfig,
    system: &TdConfig,
    overrides: &ConfigOverrides,
) -> ResolvedConfig {
    let defaults = ResolvedConfig::default();
    ResolvedConfig {
        output_format: pick(
            overrides.output_format,
            project.output_format,
            system.output_format,
            defaults.output_format,
        ),
        review_mode: pick(
            overrides.review_mode,
            project.review_mode,
            system.review_mode,
            defaults.review_mode,
        ),
        default_priority: pick(
            None,
            project.default_priority,
            system.default_priority,
            defaults.default_priority,
        ),
        default_type: pick(
            None,
            project.default_type,
            system.default_type,
            defaults.default_type,
        ),
    }
}

/// Resolve configuration for the project at `root`.
pub fn resolve_config(root: &Path, overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let system = match system_config_path() {
        Some(path) => TdConfig::load(&path)?,
        None => TdConfig::new(),
    };
    let project = TdConfig::load(&project_config_path(root))?;
    Ok(resolve_layers(&project, &system, overrides))
}
