//! Preset Registry - provider override tables
//!
//! Known provider quirks (list actions exposed as POST, inconsistent parameter
//! names across versions) are kept in embedded JSON files so they can be
//! extended without code changes.

use super::config::CatalogConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Embedded preset JSON files (compiled into the binary)
const PRESET_FILES: &[&str] = &[
    include_str!("../resources/arm.json"),
    include_str!("../resources/kubernetes.json"),
];

/// Root structure of resources/*.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PresetFile {
    #[serde(default)]
    pub presets: HashMap<String, CatalogConfig>,
}

static PRESETS: OnceLock<PresetFile> = OnceLock::new();

/// Get the preset registry (loads from embedded JSON on first access)
pub fn get_presets() -> &'static PresetFile {
    PRESETS.get_or_init(|| {
        let mut registry = PresetFile::default();
        for content in PRESET_FILES {
            let partial: PresetFile = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded preset JSON: {}", e));
            registry.presets.extend(partial.presets);
        }
        registry
    })
}

/// Get a preset by name
pub fn get_preset(name: &str) -> Option<CatalogConfig> {
    get_presets().presets.get(name).cloned()
}

/// Preset names (for CLI help and completion)
pub fn preset_names() -> Vec<&'static str> {
    let mut names: Vec<_> = get_presets().presets.keys().map(|s| s.as_str()).collect();
    names.sort_unstable();
    names
}
