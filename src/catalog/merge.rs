//! Path merging and hierarchy assembly
//!
//! Paths are accumulated keyed by condensed path. Verbs asserted by more than
//! one document are reconciled under one policy: a config override always
//! wins (a verb is permitted if any source permits it); otherwise the sources
//! must agree, and the earliest-processed document keeps its endpoint details.

use super::document::Verb;
use super::path::{Path, PathOperation};
use super::CatalogError;
use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Accumulates paths from successive documents
#[derive(Debug, Default)]
pub struct PathMerger {
    paths: BTreeMap<String, Path>,
}

impl PathMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Add one path, reconciling it with any path sharing its condensed form
    pub fn add(&mut self, incoming: Path) -> Result<(), CatalogError> {
        let Some(existing) = self.paths.get_mut(&incoming.condensed_path) else {
            self.paths.insert(incoming.condensed_path.clone(), incoming);
            return Ok(());
        };

        let overridden = existing.overridden || incoming.overridden;
        for verb in Verb::ALL {
            let theirs = incoming.operations.get(verb);
            let ours = existing.operations.get_mut(verb);
            merge_operation(&existing.condensed_path, verb, ours, theirs, overridden)?;
        }
        existing.overridden = overridden;
        Ok(())
    }

    pub fn add_all(&mut self, paths: Vec<Path>) -> Result<(), CatalogError> {
        for path in paths {
            self.add(path)?;
        }
        Ok(())
    }

    /// Check for ambiguous templates, then assemble the hierarchy
    pub fn finish(self) -> Result<Vec<Path>, CatalogError> {
        let mut paths = self.paths;
        insert_intermediate_paths(&mut paths);
        detect_ambiguous_templates(&paths)?;
        Ok(assemble_hierarchy(paths))
    }
}

fn merge_operation(
    condensed_path: &str,
    verb: Verb,
    ours: &mut PathOperation,
    theirs: &PathOperation,
    overridden: bool,
) -> Result<(), CatalogError> {
    let (Some(first), Some(second)) = (&ours.asserted_by, &theirs.asserted_by) else {
        // At most one source spoke about this verb
        if ours.asserted_by.is_none() {
            *ours = theirs.clone();
        }
        return Ok(());
    };

    if ours.permitted == theirs.permitted {
        return Ok(());
    }

    if overridden {
        if !ours.permitted {
            *ours = theirs.clone();
        }
        return Ok(());
    }

    Err(CatalogError::Conflict {
        condensed_path: condensed_path.to_string(),
        verb,
        first_source: first.clone(),
        second_source: second.clone(),
    })
}

/// Key of the ancestor made of the first `segments` segments
fn condensed_prefix(condensed: &str, segments: usize) -> String {
    condensed.split('/').take(segments).collect::<Vec<_>>().join("/")
}

/// Fill gaps so that every path is exactly one segment below its parent.
///
/// Only paths with some existing ancestor get intermediates; the rest are roots.
fn insert_intermediate_paths(paths: &mut BTreeMap<String, Path>) {
    let mut synthetic: Vec<Path> = Vec::new();

    for path in paths.values() {
        let segments = path.endpoint.segment_count();
        let mut missing = Vec::new();
        let mut has_ancestor = false;

        for n in (2..segments).rev() {
            let key = condensed_prefix(&path.condensed_path, n);
            if paths.contains_key(&key) || synthetic.iter().any(|p| p.condensed_path == key) {
                has_ancestor = true;
                break;
            }
            missing.push(n);
        }

        if has_ancestor {
            for n in missing {
                synthetic.push(Path::new(path.endpoint.prefix(n)));
            }
        }
    }

    for path in synthetic {
        tracing::debug!("Inserting intermediate path {}", path.endpoint);
        paths.entry(path.condensed_path.clone()).or_insert(path);
    }
}

/// Two equally specific templates matching one URL cannot be told apart at runtime
fn detect_ambiguous_templates(paths: &BTreeMap<String, Path>) -> Result<(), CatalogError> {
    let mut by_length: BTreeMap<usize, Vec<&Path>> = BTreeMap::new();
    for path in paths.values() {
        by_length
            .entry(path.endpoint.segment_count())
            .or_default()
            .push(path);
    }

    for group in by_length.values() {
        for (i, a) in group.iter().enumerate() {
            for b in &group[i + 1..] {
                if a.endpoint.overlaps(&b.endpoint)
                    && a.endpoint.specificity_cmp(&b.endpoint) == std::cmp::Ordering::Equal
                {
                    return Err(CatalogError::AmbiguousTemplates {
                        first: a.endpoint.template_url().to_string(),
                        second: b.endpoint.template_url().to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Attach every path to the path one segment above it.
///
/// A literal final segment makes a Child (its URL is buildable from the parent's
/// values); a placeholder final segment makes a SubPath (only discoverable by
/// listing the parent).
fn assemble_hierarchy(mut paths: BTreeMap<String, Path>) -> Vec<Path> {
    let mut keys: Vec<(usize, String)> = paths
        .values()
        .map(|p| (p.endpoint.segment_count(), p.condensed_path.clone()))
        .collect();
    keys.sort_by(|a, b| Reverse(a.0).cmp(&Reverse(b.0)).then_with(|| b.1.cmp(&a.1)));

    for (segments, key) in keys {
        if segments < 3 {
            continue;
        }
        let parent_key = condensed_prefix(&key, segments - 1);
        if !paths.contains_key(&parent_key) {
            continue;
        }
        let Some(path) = paths.remove(&key) else {
            continue;
        };
        let Some(parent) = paths.get_mut(&parent_key) else {
            continue;
        };

        if path.endpoint.ends_with_placeholder() {
            parent.sub_paths.insert(0, path);
        } else {
            parent.children.insert(0, path);
        }
    }

    paths.into_values().collect()
}
