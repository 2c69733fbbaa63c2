//! `config get|set|list`.
//!
//! `set` writes the project file; the system file is edited by hand.

use serde::Serialize;
use std::path::Path;

use super::{Output, json_line};
use crate::config::{
    CONFIG_KEYS, ConfigOverrides, TdConfig, ValueSource, project_config_path, resolve_config,
};
use crate::storage::Storage;
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub source: ValueSource,
}

impl ConfigEntry {
    fn line(&self) -> String {
        format!("{} = {}  ({})", self.key, self.value, self.source)
    }
}

#[derive(Serialize)]
pub struct ConfigValues {
    pub entries: Vec<ConfigEntry>,
    #[serde(skip)]
    pub set: bool,
}

impl Output for ConfigValues {
    fn to_json(&self) -> String {
        self.entries
            .iter()
            .map(json_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn to_human(&self) -> String {
        if self.set {
            return self
                .entries
                .iter()
                .map(|e| format!("SET {} = {}", e.key, e.value))
                .collect::<Vec<_>>()
                .join("\n");
        }
        self.entries
            .iter()
            .map(ConfigEntry::line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn entries(root: &Path) -> Result<Vec<ConfigEntry>> {
    let resolved = resolve_config(root, &ConfigOverrides::new())?;
    Ok(resolved
        .entries()
        .into_iter()
        .map(|(key, value, source)| ConfigEntry {
            key: key.to_string(),
            value,
            source,
        })
        .collect())
}

fn check_key(key: &str) -> Result<()> {
    if CONFIG_KEYS.contains(&key) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "unknown config key '{}' (expected one of: {})",
            key,
            CONFIG_KEYS.join(", ")
        )))
    }
}

pub fn get(root: &Path, key: &str) -> Result<ConfigValues> {
    check_key(key)?;
    let entries = entries(root)?.into_iter().filter(|e| e.key == key).collect();
    Ok(ConfigValues {
        entries,
        set: false,
    })
}

pub fn list(root: &Path) -> Result<ConfigValues> {
    Ok(ConfigValues {
        entries: entries(root)?,
        set: false,
    })
}

pub fn set(root: &Path, key: &str, value: &str) -> Result<ConfigValues> {
    if !Storage::exists(root) {
        return Err(Error::NotInitialized);
    }
    let path = project_config_path(root);
    let mut config = TdConfig::load(&path)?;
    config.set(key, value.trim())?;
    config.save(&path)?;
    tracing::debug!(key, path = %path.display(), "config saved");

    let value = config.get(key)?.unwrap_or_default();
    Ok(ConfigValues {
        entries: vec![ConfigEntry {
            key: key.to_string(),
            value,
            source: ValueSource::Project,
        }],
        set: true,
    })
}
