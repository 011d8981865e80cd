//! Catalog compilation
//!
//! Compiles heterogeneous, version-skewed spec documents into one hierarchy of
//! navigable resource types.
//!
//! # Architecture
//!
//! - [`document`] - Copies paths, verbs and parameters out of spec documents
//! - [`versions`] - Picks which version of a service to load
//! - [`config`] - Overrides and extra paths applied during the build
//! - [`path`] - Per-document path records
//! - [`merge`] - Condensed-path merge and hierarchy assembly
//! - [`resource_type`] - Runtime resource types materialized from paths
//! - [`template`] - Endpoint template matching and building
//! - [`presets`] - Embedded provider override tables
//!
//! # Example
//!
//! ```ignore
//! use spectree::catalog::{CatalogBuilder, presets};
//!
//! let mut builder = CatalogBuilder::new("arm", presets::get_preset("arm").unwrap_or_default());
//! builder.add_service_dir(std::path::Path::new("specs/web/resource-manager"))?;
//! let catalog = builder.build()?;
//! catalog.save(std::path::Path::new("catalog.json"))?;
//! ```

pub mod config;
pub mod document;
pub mod merge;
pub mod path;
pub mod presets;
pub mod resource_type;
pub mod template;
pub mod versions;

pub use config::{CatalogConfig, PathOverride};
pub use document::{DocumentError, SpecDocument, Verb};
pub use path::{Path, PathOperation, PathOperations};
pub use resource_type::{resolve_resource_type, ResourceType, TypeMatch};
pub use template::{EndpointTemplate, TemplateError, TemplateValues};

use anyhow::Context;
use chrono::{DateTime, Utc};
use merge::PathMerger;
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(
        "Conflicting permission for {verb} on '{condensed_path}' between '{first_source}' and '{second_source}'"
    )]
    Conflict {
        condensed_path: String,
        verb: Verb,
        first_source: String,
        second_source: String,
    },

    #[error("Templates '{first}' and '{second}' are equally specific and match the same URLs")]
    AmbiguousTemplates { first: String, second: String },
}

/// A document that could not be loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDocument {
    pub source: String,
    pub reason: String,
}

/// The compiled catalog for one logical service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub service: String,
    pub generated_at: DateTime<Utc>,
    pub paths: Vec<Path>,
    pub resource_types: Vec<ResourceType>,
    #[serde(default)]
    pub skipped: Vec<SkippedDocument>,
}

impl Catalog {
    /// Load a catalog written by [`Catalog::save`]
    pub fn load(path: &FsPath) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse catalog {}", path.display()))
    }

    pub fn save(&self, path: &FsPath) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write catalog {}", path.display()))?;
        Ok(())
    }

    /// Every resource type, depth first
    pub fn all_resource_types(&self) -> Vec<&ResourceType> {
        self.resource_types.iter().flat_map(|t| t.flatten()).collect()
    }

    /// The most specific resource type whose endpoint matches `url`
    pub fn resource_type_for_url(&self, url: &str) -> TypeMatch<'_> {
        resolve_resource_type(&self.all_resource_types(), url)
    }
}

/// Builds a [`Catalog`] from spec documents, one document at a time
pub struct CatalogBuilder {
    service: String,
    config: CatalogConfig,
    merger: PathMerger,
    api_version: Option<String>,
    skipped: Vec<SkippedDocument>,
    documents: usize,
}

impl CatalogBuilder {
    pub fn new(service: &str, config: CatalogConfig) -> Self {
        Self {
            service: service.to_string(),
            config,
            merger: PathMerger::new(),
            api_version: None,
            skipped: Vec::new(),
            documents: 0,
        }
    }

    /// Merge one parsed document. A conflict with earlier documents is fatal.
    pub fn add_document(&mut self, doc: &SpecDocument) -> Result<(), CatalogError> {
        let paths = path::paths_from_document(doc, &self.config);
        tracing::info!(
            "Merging {} paths from {} (api-version {:?})",
            paths.len(),
            doc.source,
            doc.api_version
        );

        if self.api_version.is_none() {
            self.api_version = doc.api_version.clone();
        }
        self.documents += 1;
        self.merger.add_all(paths)
    }

    /// Load and merge a document from disk. Load failures are recorded and skipped.
    pub fn add_file(&mut self, path: &FsPath) -> Result<(), CatalogError> {
        match SpecDocument::from_path(path) {
            Ok(doc) => self.add_document(&doc),
            Err(e) => {
                tracing::warn!("Skipping document: {}", e);
                self.skipped.push(SkippedDocument {
                    source: path.display().to_string(),
                    reason: e.to_string(),
                });
                Ok(())
            }
        }
    }

    /// Load the preferred version of a service described by `<dir>/readme.md`.
    ///
    /// A missing readme, or one without versions, skips the service.
    pub fn add_service_dir(&mut self, dir: &FsPath) -> Result<(), CatalogError> {
        let readme_path = dir.join("readme.md");
        let readme = match std::fs::read_to_string(&readme_path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Error reading '{}': {}", readme_path.display(), e);
                return Ok(());
            }
        };

        let available = versions::versions_from_readme(&readme);
        let Some(version) = versions::pick_version(&available) else {
            tracing::warn!("No versions found in '{}'", readme_path.display());
            return Ok(());
        };

        tracing::info!(
            "Processing {} using {} ({} files)",
            dir.display(),
            version.name,
            version.files.len()
        );
        for file in &version.files {
            self.add_file(&dir.join(file))?;
        }
        Ok(())
    }

    pub fn skipped(&self) -> &[SkippedDocument] {
        &self.skipped
    }

    /// Fold in the additional GET paths, check for ambiguity and assemble the hierarchy
    pub fn build(mut self) -> Result<Catalog, CatalogError> {
        let extra = path::additional_get_paths(&self.config, self.api_version.as_deref());
        self.merger.add_all(extra)?;

        let path_count = self.merger.len();
        let paths = self.merger.finish()?;
        let resource_types: Vec<ResourceType> =
            paths.iter().filter_map(ResourceType::from_path).collect();

        tracing::info!(
            "Built catalog '{}': {} documents, {} paths, {} root types, {} skipped",
            self.service,
            self.documents,
            path_count,
            resource_types.len(),
            self.skipped.len()
        );

        Ok(Catalog {
            service: self.service,
            generated_at: Utc::now(),
            paths,
            resource_types,
            skipped: self.skipped,
        })
    }
}
