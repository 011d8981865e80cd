//! Catalog-driven expander
//!
//! Routes a node to an [`ApiSet`] (by the node's binding, or by asking each
//! APISet whether it applies), then turns the resource type's Children and
//! the APISet's discovered SubResources into tree nodes.

use super::{ExpandError, Expander, ExpanderResponse, ExpanderResult};
use crate::apiset::{ApiSet, ExpandResponse, Expansion, SubResource};
use crate::catalog::{resolve_resource_type, ResourceType, TemplateError, TypeMatch};
use crate::context::RequestContext;
use crate::tree::{
    ResponseType, TreeNode, ITEM_TYPE_CHOICE, ITEM_TYPE_RESOURCE, ITEM_TYPE_SUB_RESOURCE,
    METADATA_SUPPRESS_SWAGGER_EXPAND,
};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct SwaggerExpander {
    api_sets: Vec<Arc<dyn ApiSet>>,
}

impl SwaggerExpander {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_api_set(&mut self, api_set: Arc<dyn ApiSet>) -> &mut Self {
        self.api_sets.push(api_set);
        self
    }

    pub fn api_set(&self, id: &str) -> Option<&Arc<dyn ApiSet>> {
        self.api_sets.iter().find(|a| a.id() == id)
    }

    fn api_set_for(&self, node: &TreeNode) -> Option<&Arc<dyn ApiSet>> {
        match &node.api_set_id {
            Some(id) => self.api_set(id),
            None => self.api_sets.iter().find(|a| a.applies_to_node(node)),
        }
    }

    /// Root nodes carry no binding; resolve their type from the URL and fill in
    /// any api-version the caller left out.
    fn resolve(
        &self,
        node: &TreeNode,
    ) -> Result<(Arc<dyn ApiSet>, Arc<ResourceType>, TreeNode), ExpandError> {
        let api_set = match (&node.api_set_id, self.api_set_for(node)) {
            (_, Some(api_set)) => Arc::clone(api_set),
            (Some(id), None) => return Err(ExpandError::UnknownApiSet(id.clone())),
            (None, None) => return Err(ExpandError::NoResourceType(node.expand_url.clone())),
        };

        if let Some(rt) = &node.resource_type {
            return Ok((api_set, Arc::clone(rt), node.clone()));
        }

        let candidates: Vec<&ResourceType> = api_set
            .resource_types()
            .iter()
            .flat_map(|t| t.flatten())
            .collect();
        let (rt, values) = match resolve_resource_type(&candidates, &node.expand_url) {
            TypeMatch::Found(rt, values) => (rt, values),
            TypeMatch::NotFound => return Err(ExpandError::NoResourceType(node.expand_url.clone())),
            TypeMatch::Ambiguous(a, b) => {
                return Err(ExpandError::AmbiguousResourceType {
                    url: node.expand_url.clone(),
                    first: a.endpoint.template_url().to_string(),
                    second: b.endpoint.template_url().to_string(),
                })
            }
        };

        let mut target = node.clone();
        if !target.expand_url.contains('?') {
            target.expand_url = rt
                .endpoint
                .build_url(&values)
                .map_err(crate::apiset::ApiSetError::from)?;
        }
        target.api_set_id = Some(api_set.id().to_string());
        let rt = Arc::new(rt.clone());
        Ok((api_set, rt, target))
    }

    fn child_nodes(
        &self,
        api_set: &dyn ApiSet,
        node: &TreeNode,
        resource_type: &ResourceType,
        warnings: &mut Vec<String>,
    ) -> Vec<TreeNode> {
        let mut nodes = Vec::new();
        for child in &resource_type.children {
            let built = child_url(
                api_set.match_child_nodes_by_name(),
                resource_type,
                &node.expand_url,
                child,
            );
            let (expand_url, delete_url) = match built {
                Ok(urls) => urls,
                Err(e) => {
                    tracing::warn!("Skipping child {} of {}: {}", child.display, node.id, e);
                    warnings.push(format!("{}: {}", child.display, e));
                    continue;
                }
            };

            nodes.push(TreeNode {
                parent_id: node.id.clone(),
                id: format!("{}/{}", node.id, child.display),
                name: child.display.clone(),
                display: child.display.clone(),
                expand_url,
                item_type: ITEM_TYPE_RESOURCE.to_string(),
                delete_url,
                type_name: child.endpoint.template_url().to_string(),
                api_set_id: Some(api_set.id().to_string()),
                resource_type: Some(Arc::new(child.clone())),
                ..Default::default()
            });
        }
        nodes
    }

    fn sub_resource_node(api_set: &dyn ApiSet, parent: &TreeNode, item: SubResource, item_type: &str) -> TreeNode {
        TreeNode {
            parent_id: parent.id.clone(),
            id: item.id,
            display: item.name.clone(),
            name: item.name,
            expand_url: item.expand_url,
            item_type: item_type.to_string(),
            delete_url: item.delete_url,
            type_name: item.resource_type.endpoint.template_url().to_string(),
            api_set_id: Some(api_set.id().to_string()),
            resource_type: Some(item.resource_type),
            ..Default::default()
        }
    }
}

/// Expand and delete URLs of a Child, built from the parent's URL.
///
/// By name: values captured with the parent's placeholder names. By position:
/// the parent URL is matched against the child's own template minus its last
/// segment, which tolerates placeholder names that differ between documents.
fn child_url(
    by_name: bool,
    parent: &ResourceType,
    parent_url: &str,
    child: &ResourceType,
) -> Result<(String, String), TemplateError> {
    let positional = || {
        let parent_template = child.endpoint.prefix(child.endpoint.segment_count() - 1);
        parent_template.match_url(parent_url).unwrap_or_default()
    };

    let mut values = if by_name {
        parent.endpoint.match_url(parent_url).unwrap_or_default()
    } else {
        positional()
    };

    let expand_url = match child.endpoint.build_url(&values) {
        Ok(url) => url,
        Err(TemplateError::MissingParameter { .. }) if by_name => {
            values = positional();
            child.endpoint.build_url(&values)?
        }
        Err(e) => return Err(e),
    };

    let delete_url = match &child.delete_endpoint {
        Some(endpoint) => endpoint.build_url(&values).unwrap_or_else(|e| {
            tracing::warn!("No delete URL for {}: {}", expand_url, e);
            String::new()
        }),
        None => String::new(),
    };
    Ok((expand_url, delete_url))
}

#[async_trait]
impl Expander for SwaggerExpander {
    fn name(&self) -> &str {
        "SwaggerExpander"
    }

    fn does_expand(&self, node: &TreeNode) -> bool {
        !node.metadata_flag(METADATA_SUPPRESS_SWAGGER_EXPAND) && self.api_set_for(node).is_some()
    }

    async fn expand(
        &self,
        ctx: &RequestContext,
        node: &TreeNode,
    ) -> Result<ExpanderResult, ExpandError> {
        let (api_set, resource_type, target) = self.resolve(node)?;
        let mut warnings = Vec::new();

        let expansion = if resource_type.is_readable() {
            api_set.expand_resource(ctx, &target, &resource_type).await?
        } else {
            Expansion::Resolved(ExpandResponse::default())
        };

        let mut result = ExpanderResult {
            source_description: format!("{} ({})", self.name(), api_set.id()),
            is_primary_response: true,
            ..Default::default()
        };

        match expansion {
            Expansion::Resolved(response) => {
                result.nodes = self.child_nodes(api_set.as_ref(), &target, &resource_type, &mut warnings);
                warnings.extend(response.item_errors.iter().map(|e| e.to_string()));
                result.nodes.extend(response.sub_resources.into_iter().map(|item| {
                    Self::sub_resource_node(api_set.as_ref(), &target, item, ITEM_TYPE_SUB_RESOURCE)
                }));
                if resource_type.is_readable() {
                    result.response = Some(ExpanderResponse {
                        response: response.response,
                        response_type: response.response_type,
                    });
                }
            }
            Expansion::Ambiguous(chooser) => {
                result.nodes = chooser
                    .candidates
                    .into_iter()
                    .map(|item| Self::sub_resource_node(api_set.as_ref(), &target, item, ITEM_TYPE_CHOICE))
                    .collect();
                result.response = Some(ExpanderResponse {
                    response: chooser.prompt,
                    response_type: ResponseType::Text,
                });
            }
        }

        result.warnings = warnings;
        Ok(result)
    }
}
