//! Cluster APISet
//!
//! YAML backend for a Kubernetes-style API server. Items sit under `items`
//! with their own URL in `metadata.selfLink`; node IDs are prefixed with the
//! cluster ID so several clusters can share one tree.

use super::fanout::FanOutRule;
use super::{ApiSet, ApiSetError, CatalogBackend, Expansion, ResponseFormat};
use crate::catalog::{Catalog, ResourceType};
use crate::context::RequestContext;
use crate::http::HttpClient;
use crate::tree::TreeNode;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct KubernetesApiSet {
    cluster_id: String,
    backend: CatalogBackend,
    fan_out: Vec<FanOutRule>,
}

impl KubernetesApiSet {
    pub fn new(cluster_id: &str, http: HttpClient, catalog: Arc<Catalog>) -> Self {
        Self {
            cluster_id: cluster_id.to_string(),
            backend: CatalogBackend::new(http, ResponseFormat::YAML, catalog),
            fan_out: vec![FanOutRule::container_logs()],
        }
    }

    pub fn with_fan_out_rules(mut self, rules: Vec<FanOutRule>) -> Self {
        self.fan_out = rules;
        self
    }
}

#[async_trait]
impl ApiSet for KubernetesApiSet {
    fn id(&self) -> &str {
        &self.cluster_id
    }

    /// Cluster nodes are always created bound to their APISet
    fn applies_to_node(&self, _node: &TreeNode) -> bool {
        false
    }

    fn resource_types(&self) -> &[ResourceType] {
        &self.backend.catalog().resource_types
    }

    fn match_child_nodes_by_name(&self) -> bool {
        false
    }

    async fn expand_resource(
        &self,
        ctx: &RequestContext,
        node: &TreeNode,
        resource_type: &ResourceType,
    ) -> Result<Expansion, ApiSetError> {
        for rule in &self.fan_out {
            if let Some(chooser) = rule.evaluate(ctx, &self.backend, node, resource_type).await? {
                return Ok(Expansion::Ambiguous(chooser));
            }
        }

        let response = self
            .backend
            .expand(ctx, node, resource_type, &self.cluster_id)
            .await?;
        Ok(Expansion::Resolved(response))
    }

    async fn delete(&self, ctx: &RequestContext, node: &TreeNode) -> Result<bool, ApiSetError> {
        self.backend.delete(ctx, node).await
    }
}
