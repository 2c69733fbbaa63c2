//! Configuration for td.
//!
//! Preferences live in `config.kdl` files at two levels:
//! - System: `~/.config/td/config.kdl`
//! - Project: `<root>/.todos/config.kdl`
//!
//! Keys:
//! - `output-format` - "human" or "json"
//! - `review-mode` - "auto" (synthesize a missing handoff) or "strict"
//! - `default-priority` - priority for new issues (P0-P4)
//! - `default-type` - type for new issues
//!
//! ## Precedence
//!
//! CLI flag > project config > system config > defaults
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    CONFIG_DIR_ENV, ConfigOverrides, Resolved, ResolvedConfig, ValueSource, project_config_path,
    resolve_config, system_config_path,
};
pub use schema::{CONFIG_KEYS, OutputFormat, TdConfig};
