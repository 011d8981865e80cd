//! Configuration Management
//!
//! Handles persistent user settings for spectree.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Management-plane server URL
    #[serde(default)]
    pub management_endpoint: Option<String>,
    /// Default cluster API server URL
    #[serde(default)]
    pub kube_server: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Last expanded node
    #[serde(default)]
    pub last_node_id: Option<String>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("spectree").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Get effective management endpoint (CLI > config > default)
    pub fn effective_management_endpoint(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.management_endpoint.clone())
            .unwrap_or_else(|| DEFAULT_MANAGEMENT_ENDPOINT.to_string())
    }

    pub fn effective_timeout(&self, cli: Option<u64>) -> Duration {
        Duration::from_secs(cli.or(self.timeout_secs).unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Remember the last expanded node and save
    pub fn set_last_node(&mut self, node_id: &str) -> Result<()> {
        self.last_node_id = Some(node_id.to_string());
        self.save()
    }
}
