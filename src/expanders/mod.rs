//! Expander Dispatch
//!
//! An [`ExpanderRegistry`] holds an ordered list of independent expansion
//! strategies. Expanding a node asks every strategy whether it applies, runs
//! all that do, and concatenates their nodes in registration order. A failing
//! strategy loses its own nodes but never the others'.

pub mod json;
pub mod storage_blob;
pub mod swagger;

use crate::apiset::ApiSetError;
use storage_blob::StorageError;
use crate::context::RequestContext;
use crate::tree::{ResponseType, TreeNode};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ExpandError {
    #[error(transparent)]
    ApiSet(#[from] ApiSetError),

    #[error("No APISet registered with ID '{0}'")]
    UnknownApiSet(String),

    #[error("No resource type found for '{0}'")]
    NoResourceType(String),

    #[error("Resource types '{first}' and '{second}' both match '{url}'")]
    AmbiguousResourceType {
        url: String,
        first: String,
        second: String,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{expander} cannot expand '{id}'")]
    Unhandled { expander: String, id: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpanderResponse {
    pub response: String,
    pub response_type: ResponseType,
}

#[derive(Debug, Default)]
pub struct ExpanderResult {
    pub nodes: Vec<TreeNode>,
    pub response: Option<ExpanderResponse>,
    pub source_description: String,
    /// Whether `response` should be shown in preference to other expanders' responses
    pub is_primary_response: bool,
    /// Problems with single items that did not stop the expansion
    pub warnings: Vec<String>,
}

#[async_trait]
pub trait Expander: Send + Sync {
    fn name(&self) -> &str;

    /// Pure predicate; must not make requests
    fn does_expand(&self, node: &TreeNode) -> bool;

    async fn expand(
        &self,
        ctx: &RequestContext,
        node: &TreeNode,
    ) -> Result<ExpanderResult, ExpandError>;
}

/// Some expanders failed while others produced nodes
#[derive(Debug, Error)]
#[error("{} of {attempted} expanders failed: {}", .failures.len(), describe(.failures))]
pub struct PartialExpansionFailure {
    pub attempted: usize,
    /// Expander name and its error, in registration order
    pub failures: Vec<(String, ExpandError)>,
}

fn describe(failures: &[(String, ExpandError)]) -> String {
    failures
        .iter()
        .map(|(name, e)| format!("{}: {}", name, e))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Combined result of one dispatch
#[derive(Debug, Default)]
pub struct ExpansionOutcome {
    pub nodes: Vec<TreeNode>,
    pub response: Option<ExpanderResponse>,
    pub warnings: Vec<String>,
    pub failure: Option<PartialExpansionFailure>,
}

impl ExpansionOutcome {
    pub fn is_degraded(&self) -> bool {
        self.failure.is_some() || !self.warnings.is_empty()
    }
}

/// Ordered, explicitly constructed set of expanders
#[derive(Default, Clone)]
pub struct ExpanderRegistry {
    expanders: Vec<Arc<dyn Expander>>,
}

impl ExpanderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, expander: Arc<dyn Expander>) -> &mut Self {
        self.expanders.push(expander);
        self
    }

    pub fn len(&self) -> usize {
        self.expanders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expanders.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.expanders.iter().map(|e| e.name()).collect()
    }

    /// Run every applicable expander concurrently and combine their results
    pub async fn expand_node(&self, ctx: &RequestContext, node: &TreeNode) -> ExpansionOutcome {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("expand", %request_id, node = %node.id);

        async {
            let applicable: Vec<&Arc<dyn Expander>> =
                self.expanders.iter().filter(|e| e.does_expand(node)).collect();
            tracing::debug!(
                "Expanding {} with {:?}",
                node.expand_url,
                applicable.iter().map(|e| e.name()).collect::<Vec<_>>()
            );

            let results = join_all(applicable.iter().map(|e| e.expand(ctx, node))).await;

            let mut outcome = ExpansionOutcome::default();
            let mut primary: Option<ExpanderResponse> = None;
            let mut failures = Vec::new();

            for (expander, result) in applicable.iter().zip(results) {
                match result {
                    Ok(result) => {
                        tracing::debug!("{} returned {} nodes", expander.name(), result.nodes.len());
                        outcome.nodes.extend(result.nodes);
                        outcome.warnings.extend(result.warnings);
                        if let Some(response) = result.response {
                            if result.is_primary_response && primary.is_none() {
                                primary = Some(response);
                            } else if outcome.response.is_none() {
                                outcome.response = Some(response);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("Expander {} failed: {}", expander.name(), e);
                        failures.push((expander.name().to_string(), e));
                    }
                }
            }

            if primary.is_some() {
                outcome.response = primary;
            }
            if !failures.is_empty() {
                outcome.failure = Some(PartialExpansionFailure {
                    attempted: applicable.len(),
                    failures,
                });
            }
            outcome
        }
        .instrument(span)
        .await
    }
}
