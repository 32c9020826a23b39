//! TOML configuration file used by the CLI.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::SyncConfig;

pub const DEFAULT_FLOW_NAME: &str = "triggerFlow";
pub const DEFAULT_WATERMARK_DIR: &str = ".crm-sync-watermarks";

/// Contents of `crm-sync.toml`.
///
/// ```toml
/// flowName = "triggerFlow"
///
/// [sync]
/// pollIntervalMs = 10000
///
/// [source]
/// path = "salesforce.jsonl"
///
/// [target]
/// path = "siebel.json"
///
/// [watermark]
/// dir = ".crm-sync-watermarks"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    #[serde(default = "default_flow_name")]
    pub flow_name: String,
    #[serde(default)]
    pub sync: SyncConfig,
    pub source: SourceSection,
    pub target: TargetSection,
    #[serde(default)]
    pub watermark: WatermarkSection,
}

/// JSONL file standing in for the source CRM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSection {
    pub path: PathBuf,
}

/// JSON file standing in for the target CRM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSection {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkSection {
    pub dir: PathBuf,
}

impl Default for WatermarkSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_WATERMARK_DIR),
        }
    }
}

fn default_flow_name() -> String {
    DEFAULT_FLOW_NAME.to_string()
}

impl FileConfig {
    /// Load and validate a config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse and validate config file contents.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: FileConfig = toml::from_str(content).context("Failed to parse TOML")?;
        if config.flow_name.trim().is_empty() {
            anyhow::bail!("flowName must not be empty");
        }
        config.sync.validate()?;
        Ok(config)
    }
}
