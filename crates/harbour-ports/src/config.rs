use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::descriptor::DESCRIPTOR_FILE_NAME;

pub const DEFAULT_EXCLUSIONS: &[&str] = &["gamelist.xml", "gamelist.xml.old"];

fn default_ports_dir() -> PathBuf {
    PathBuf::from("ports")
}

fn default_exclusions() -> Vec<String> {
    DEFAULT_EXCLUSIONS.iter().map(|name| name.to_string()).collect()
}

fn default_descriptor_file_name() -> String {
    DESCRIPTOR_FILE_NAME.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// On-disk engine configuration. Every field is optional in the JSON file.
pub struct HarbourConfig {
    #[serde(default = "default_ports_dir")]
    pub ports_dir: PathBuf,
    /// Old porter name mapped to its canonical spelling.
    #[serde(default)]
    pub porter_fixups: BTreeMap<String, String>,
    /// Top-level names ignored by reconciliation.
    #[serde(default = "default_exclusions")]
    pub exclusions: Vec<String>,
    #[serde(default = "default_descriptor_file_name")]
    pub descriptor_file_name: String,
}

impl Default for HarbourConfig {
    fn default() -> Self {
        Self {
            ports_dir: default_ports_dir(),
            porter_fixups: BTreeMap::new(),
            exclusions: default_exclusions(),
            descriptor_file_name: default_descriptor_file_name(),
        }
    }
}

/// Loads a config file; a missing file yields defaults.
pub fn load_harbour_config(path: &Path) -> Result<HarbourConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file absent; using defaults");
        return Ok(HarbourConfig::default());
    }
    let payload = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read harbour config '{}'", path.display()))?;
    let value = serde_json::from_str::<serde_json::Value>(&payload)
        .with_context(|| format!("failed to parse harbour config '{}'", path.display()))?;
    if !value.is_object() {
        anyhow::bail!(
            "failed to parse harbour config '{}': expected JSON object",
            path.display()
        );
    }
    serde_json::from_value::<HarbourConfig>(value)
        .with_context(|| format!("invalid harbour config '{}'", path.display()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Everything an operation needs to know about the ports tree, passed explicitly.
pub struct PortsContext {
    pub ports_dir: PathBuf,
    pub porter_fixups: BTreeMap<String, String>,
    pub exclusions: Vec<String>,
    pub descriptor_file_name: String,
}

impl PortsContext {
    pub fn new(ports_dir: impl Into<PathBuf>) -> Self {
        Self::from_config(HarbourConfig {
            ports_dir: ports_dir.into(),
            ..HarbourConfig::default()
        })
    }

    pub fn from_config(config: HarbourConfig) -> Self {
        Self {
            ports_dir: config.ports_dir,
            porter_fixups: config.porter_fixups,
            exclusions: config.exclusions,
            descriptor_file_name: config.descriptor_file_name,
        }
    }

    pub fn with_porter_fixups(mut self, fixups: BTreeMap<String, String>) -> Self {
        self.porter_fixups = fixups;
        self
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.exclusions.iter().any(|excluded| excluded == name)
    }

    /// Suffix recognized for secondary descriptors, e.g. `.port.json`.
    pub fn descriptor_suffix(&self) -> String {
        format!(".{}", self.descriptor_file_name)
    }

    pub fn canonical_porter<'a>(&'a self, porter: &'a str) -> &'a str {
        self.porter_fixups
            .get(porter)
            .map(String::as_str)
            .unwrap_or(porter)
    }
}
