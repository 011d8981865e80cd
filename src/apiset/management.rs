//! Management-plane APISet
//!
//! JSON backend: listings put items under `value`, each item's `id` is its
//! own URL, and requests carry the catalog's `api-version` query parameter.

use super::{ApiSet, ApiSetError, CatalogBackend, Expansion, ResponseFormat};
use crate::catalog::{Catalog, ResourceType, TypeMatch};
use crate::context::RequestContext;
use crate::http::HttpClient;
use crate::tree::TreeNode;
use async_trait::async_trait;
use std::sync::Arc;

pub const MANAGEMENT_API_SET_ID: &str = "management";

#[derive(Debug, Clone)]
pub struct ManagementApiSet {
    id: String,
    backend: CatalogBackend,
}

impl ManagementApiSet {
    pub fn new(http: HttpClient, catalog: Arc<Catalog>) -> Self {
        Self {
            id: MANAGEMENT_API_SET_ID.to_string(),
            backend: CatalogBackend::new(http, ResponseFormat::JSON, catalog),
        }
    }
}

#[async_trait]
impl ApiSet for ManagementApiSet {
    fn id(&self) -> &str {
        &self.id
    }

    fn applies_to_node(&self, node: &TreeNode) -> bool {
        !node.expand_url.is_empty()
            && matches!(
                self.backend.catalog().resource_type_for_url(&node.expand_url),
                TypeMatch::Found(..)
            )
    }

    fn resource_types(&self) -> &[ResourceType] {
        &self.backend.catalog().resource_types
    }

    fn match_child_nodes_by_name(&self) -> bool {
        true
    }

    async fn expand_resource(
        &self,
        ctx: &RequestContext,
        node: &TreeNode,
        resource_type: &ResourceType,
    ) -> Result<Expansion, ApiSetError> {
        let response = self.backend.expand(ctx, node, resource_type, "").await?;
        Ok(Expansion::Resolved(response))
    }

    async fn delete(&self, ctx: &RequestContext, node: &TreeNode) -> Result<bool, ApiSetError> {
        self.backend.delete(ctx, node).await
    }
}
