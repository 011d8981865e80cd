//! Catalog build configuration
//!
//! Per-service corrections applied on top of the spec documents: path and verb
//! overrides for provider quirks, extra readable paths, and api-version handling.

use super::document::Verb;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path as FsPath;

/// Override for one raw spec path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathOverride {
    /// Replacement path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Verb used for logical GET requests, e.g. POST for "list" actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get_verb: Option<Verb>,
    /// Use `path` for every operation, not just as the logical location
    #[serde(default)]
    pub rewrite_path: bool,
    /// Endpoint used for PUT requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put_path: Option<String>,
    /// Endpoint used for DELETE requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Keyed on the raw spec path
    #[serde(default)]
    pub overrides: HashMap<String, PathOverride>,
    /// Paths missing from the specs that should still be readable
    #[serde(default)]
    pub additional_get_paths: Vec<String>,
    /// Omit the api-version query parameter from generated templates
    #[serde(default)]
    pub suppress_api_version: bool,
}

impl CatalogConfig {
    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn load(path: &FsPath) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog config {}", path.display()))?;

        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config {}", path.display()))?,
            _ => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config {}", path.display()))?,
        };
        Ok(config)
    }

    pub fn override_for(&self, raw_path: &str) -> Option<&PathOverride> {
        self.overrides.get(raw_path)
    }

    /// Layer `other` on top of `self`; entries in `other` win
    pub fn merge(mut self, other: CatalogConfig) -> Self {
        self.overrides.extend(other.overrides);
        for path in other.additional_get_paths {
            if !self.additional_get_paths.contains(&path) {
                self.additional_get_paths.push(path);
            }
        }
        self.suppress_api_version |= other.suppress_api_version;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
overrides:
  /sites/{name}/config/appsettings/list:
    path: /sites/{name}/config/appsettings
    get_verb: POST
additional_get_paths:
  - /api/v1/namespaces/{namespace}/pods/{name}/log
suppress_api_version: true
"#;
        let config: CatalogConfig = serde_yaml::from_str(yaml).unwrap();
        let o = config
            .override_for("/sites/{name}/config/appsettings/list")
            .unwrap();
        assert_eq!(o.path.as_deref(), Some("/sites/{name}/config/appsettings"));
        assert_eq!(o.get_verb, Some(Verb::Post));
        assert!(!o.rewrite_path);
        assert_eq!(config.additional_get_paths.len(), 1);
        assert!(config.suppress_api_version);
    }

    #[test]
    fn test_merge_prefers_later_entries() {
        let mut base = CatalogConfig::default();
        base.overrides.insert(
            "/a".to_string(),
            PathOverride {
                path: Some("/b".to_string()),
                ..Default::default()
            },
        );
        base.additional_get_paths.push("/x".to_string());

        let mut extra = CatalogConfig::default();
        extra.overrides.insert(
            "/a".to_string(),
            PathOverride {
                path: Some("/c".to_string()),
                rewrite_path: true,
                ..Default::default()
            },
        );
        extra.additional_get_paths.push("/x".to_string());

        let merged = base.merge(extra);
        assert_eq!(merged.overrides["/a"].path.as_deref(), Some("/c"));
        assert_eq!(merged.additional_get_paths, vec!["/x".to_string()]);
    }
}
