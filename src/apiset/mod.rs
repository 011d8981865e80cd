//! APISets - backend adapters
//!
//! An [`ApiSet`] expands and deletes resources for one service family. Each
//! backend owns a transport, a server URL and a [`ResponseFormat`] that says
//! how its payloads are parsed. The request and listing machinery shared by
//! every catalog-driven backend lives in [`CatalogBackend`].
//!
//! # Backends
//!
//! - [`management::ManagementApiSet`] - JSON management plane (`value[].id`)
//! - [`kubernetes::KubernetesApiSet`] - YAML cluster API (`items[].metadata.selfLink`)
//!
//! [`fanout`] holds the data-driven rules that turn one response into a chooser.

pub mod fanout;
pub mod kubernetes;
pub mod management;

use crate::catalog::{resolve_resource_type, Catalog, ResourceType, TemplateError, TypeMatch, Verb};
use crate::context::RequestContext;
use crate::http::{self, HttpClient, HttpResponse, RequestFailed};
use crate::tree::{ResponseType, TreeNode};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiSetError {
    #[error("No declared sub-resource type matches '{url}'")]
    SubResourceTypeNotFound { url: String },

    #[error("Sub-resource types '{first}' and '{second}' both match '{url}'")]
    AmbiguousSubResourceType {
        url: String,
        first: String,
        second: String,
    },

    #[error("Item {index} in the response from '{url}' has no self link")]
    MissingSelfLink { url: String, index: usize },

    #[error("URL '{url}' does not match template '{template}'")]
    TemplateMismatch { url: String, template: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    RequestFailed(#[from] RequestFailed),

    #[error("Failed to parse response from '{url}': {reason}")]
    InvalidResponse { url: String, reason: String },

    #[error("Resource type '{0}' has no read operation")]
    NotReadable(String),

    #[error("Item '{0}' cannot be deleted (no delete URL)")]
    NotDeletable(String),

    #[error("No {what} found in '{url}'")]
    NoCandidates { url: String, what: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl ApiSetError {
    /// Short message suitable for a status line
    pub fn user_message(&self) -> String {
        match self {
            ApiSetError::RequestFailed(e) => http::format_backend_error(e),
            other => other.to_string(),
        }
    }
}

/// A child discovered by an APISet
#[derive(Debug, Clone)]
pub struct SubResource {
    pub id: String,
    pub name: String,
    pub resource_type: Arc<ResourceType>,
    pub expand_url: String,
    /// Empty when no delete is offered
    pub delete_url: String,
}

#[derive(Debug, Default)]
pub struct ExpandResponse {
    /// Raw response body, kept for display and diagnostics
    pub response: String,
    pub response_type: ResponseType,
    pub sub_resources: Vec<SubResource>,
    /// Per-item failures; the resolved items are still in `sub_resources`
    pub item_errors: Vec<ApiSetError>,
}

/// The user must pick one candidate before the real request can be made
#[derive(Debug)]
pub struct AmbiguousExpansion {
    pub prompt: String,
    pub candidates: Vec<SubResource>,
}

#[derive(Debug)]
pub enum Expansion {
    Resolved(ExpandResponse),
    Ambiguous(AmbiguousExpansion),
}

impl Expansion {
    pub fn sub_resources(&self) -> &[SubResource] {
        match self {
            Expansion::Resolved(r) => &r.sub_resources,
            Expansion::Ambiguous(a) => &a.candidates,
        }
    }
}

#[async_trait]
pub trait ApiSet: Send + Sync {
    fn id(&self) -> &str;

    /// Cheap test used to route nodes that carry no APISet binding yet
    fn applies_to_node(&self, node: &TreeNode) -> bool;

    /// Root resource types
    fn resource_types(&self) -> &[ResourceType];

    /// Whether child URLs are built from parent values by placeholder name
    /// (otherwise by position)
    fn match_child_nodes_by_name(&self) -> bool;

    async fn expand_resource(
        &self,
        ctx: &RequestContext,
        node: &TreeNode,
        resource_type: &ResourceType,
    ) -> Result<Expansion, ApiSetError>;

    /// `Ok(true)` once deleted. Nodes without a delete URL fail without a request.
    async fn delete(&self, ctx: &RequestContext, node: &TreeNode) -> Result<bool, ApiSetError>;
}

/// How a backend's payloads are shaped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseFormat {
    pub response_type: ResponseType,
    pub accept: &'static str,
    /// Dot path of the item list in a listing
    pub items_path: &'static str,
    /// Dot path of an item's own URL
    pub self_link_path: &'static str,
    pub name_path: &'static str,
}

impl ResponseFormat {
    pub const JSON: ResponseFormat = ResponseFormat {
        response_type: ResponseType::Json,
        accept: http::ACCEPT_JSON,
        items_path: "value",
        self_link_path: "id",
        name_path: "name",
    };

    pub const YAML: ResponseFormat = ResponseFormat {
        response_type: ResponseType::Yaml,
        accept: http::ACCEPT_YAML,
        items_path: "items",
        self_link_path: "metadata.selfLink",
        name_path: "metadata.name",
    };

    pub fn parse(&self, body: &str) -> Result<Value, String> {
        match self.response_type {
            ResponseType::Yaml => serde_yaml::from_str(body).map_err(|e| e.to_string()),
            _ => serde_json::from_str(body).map_err(|e| e.to_string()),
        }
    }

    pub fn items<'a>(&self, document: &'a Value) -> Vec<&'a Value> {
        value_at(document, self.items_path)
            .and_then(Value::as_array)
            .map(|items| items.iter().collect())
            .unwrap_or_default()
    }
}

/// Look up a value by dot path; numeric parts index arrays
pub fn value_at<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, part| match part.parse::<usize>() {
        Ok(index) => current.get(index),
        Err(_) => current.get(part),
    })
}

pub fn string_at(value: &Value, path: &str) -> Option<String> {
    match value_at(value, path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn last_segment(url: &str) -> String {
    let path = url.split('?').next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_string()
}

/// Request and listing machinery shared by catalog-driven backends.
/// Immutable after construction.
#[derive(Debug, Clone)]
pub struct CatalogBackend {
    http: HttpClient,
    format: ResponseFormat,
    catalog: Arc<Catalog>,
}

impl CatalogBackend {
    pub fn new(http: HttpClient, format: ResponseFormat, catalog: Arc<Catalog>) -> Self {
        Self {
            http,
            format,
            catalog,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn format(&self) -> &ResponseFormat {
        &self.format
    }

    /// One request under the context's cancellation and timeout
    pub async fn fetch(
        &self,
        ctx: &RequestContext,
        verb: Verb,
        url: &str,
    ) -> Result<HttpResponse, ApiSetError> {
        ctx.run(async {
            self.http
                .send(verb.as_method(), url, self.format.accept)
                .await
                .map_err(ApiSetError::from)
        })
        .await
    }

    /// Request the node's URL and resolve any listed items against the declared sub-resource types.
    ///
    /// `id_prefix` is prepended to each item's self link to form its ID.
    pub async fn expand(
        &self,
        ctx: &RequestContext,
        node: &TreeNode,
        resource_type: &ResourceType,
        id_prefix: &str,
    ) -> Result<ExpandResponse, ApiSetError> {
        let Some(verb) = resource_type.verb else {
            return Err(ApiSetError::NotReadable(
                resource_type.endpoint.template_url().to_string(),
            ));
        };
        if resource_type.endpoint.match_url(&node.expand_url).is_none() {
            return Err(ApiSetError::TemplateMismatch {
                url: node.expand_url.clone(),
                template: resource_type.endpoint.template_url().to_string(),
            });
        }

        let response = self.fetch(ctx, verb, &node.expand_url).await?;

        if resource_type.sub_resources.is_empty() {
            let response_type = match ResponseType::from_content_type(&response.content_type) {
                ResponseType::None => self.format.response_type,
                other => other,
            };
            return Ok(ExpandResponse {
                response: response.body,
                response_type,
                ..Default::default()
            });
        }

        let (sub_resources, item_errors) =
            self.resolve_items(&node.expand_url, &response.body, resource_type, id_prefix)?;
        for error in &item_errors {
            tracing::warn!("Skipping item from {}: {}", node.expand_url, error);
        }

        Ok(ExpandResponse {
            response: response.body,
            response_type: self.format.response_type,
            sub_resources,
            item_errors,
        })
    }

    /// Parse a listing and resolve each item, in input order.
    /// Item failures are collected rather than aborting the listing.
    pub fn resolve_items(
        &self,
        url: &str,
        body: &str,
        resource_type: &ResourceType,
        id_prefix: &str,
    ) -> Result<(Vec<SubResource>, Vec<ApiSetError>), ApiSetError> {
        let document = self
            .format
            .parse(body)
            .map_err(|reason| ApiSetError::InvalidResponse {
                url: url.to_string(),
                reason,
            })?;

        let candidates: Vec<&ResourceType> = resource_type.sub_resources.iter().collect();
        let mut shared: HashMap<String, Arc<ResourceType>> = HashMap::new();
        let mut resolved = Vec::new();
        let mut errors = Vec::new();

        for (index, item) in self.format.items(&document).into_iter().enumerate() {
            let Some(self_link) = string_at(item, self.format.self_link_path) else {
                errors.push(ApiSetError::MissingSelfLink {
                    url: url.to_string(),
                    index,
                });
                continue;
            };

            let (sub_type, values) = match resolve_resource_type(&candidates, &self_link) {
                TypeMatch::Found(t, values) => (t, values),
                TypeMatch::NotFound => {
                    errors.push(ApiSetError::SubResourceTypeNotFound { url: self_link });
                    continue;
                }
                TypeMatch::Ambiguous(a, b) => {
                    errors.push(ApiSetError::AmbiguousSubResourceType {
                        url: self_link,
                        first: a.endpoint.template_url().to_string(),
                        second: b.endpoint.template_url().to_string(),
                    });
                    continue;
                }
            };

            let expand_url = match sub_type.endpoint.build_url(&values) {
                Ok(u) => u,
                Err(e) => {
                    errors.push(e.into());
                    continue;
                }
            };

            let delete_url = match &sub_type.delete_endpoint {
                Some(endpoint) => endpoint.build_url(&values).unwrap_or_else(|e| {
                    tracing::warn!("No delete offered for {}: {}", self_link, e);
                    String::new()
                }),
                None => String::new(),
            };

            let shared_type = shared
                .entry(sub_type.endpoint.template_url().to_string())
                .or_insert_with(|| Arc::new(sub_type.clone()))
                .clone();

            resolved.push(SubResource {
                id: format!("{}{}", id_prefix, self_link),
                name: string_at(item, self.format.name_path)
                    .unwrap_or_else(|| last_segment(&self_link)),
                resource_type: shared_type,
                expand_url,
                delete_url,
            });
        }

        Ok((resolved, errors))
    }

    pub async fn delete(&self, ctx: &RequestContext, node: &TreeNode) -> Result<bool, ApiSetError> {
        if node.delete_url.is_empty() {
            return Err(ApiSetError::NotDeletable(node.id.clone()));
        }

        self.fetch(ctx, Verb::Delete, &node.delete_url).await?;
        tracing::info!("Deleted {}", node.delete_url);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EndpointTemplate;
    use serde_json::json;

    fn resource_type(template: &str, subs: Vec<ResourceType>) -> ResourceType {
        ResourceType {
            display: last_segment(template),
            endpoint: EndpointTemplate::parse(template, None).unwrap(),
            verb: Some(Verb::Get),
            delete_endpoint: None,
            patch_endpoint: None,
            put_endpoint: None,
            children: Vec::new(),
            sub_resources: subs,
        }
    }

    fn backend(format: ResponseFormat) -> CatalogBackend {
        let catalog = Catalog {
            service: "test".to_string(),
            generated_at: chrono::Utc::now(),
            paths: Vec::new(),
            resource_types: Vec::new(),
            skipped: Vec::new(),
        };
        CatalogBackend::new(
            HttpClient::new("http://localhost").unwrap(),
            format,
            Arc::new(catalog),
        )
    }

    #[test]
    fn test_value_at() {
        let value = json!({ "spec": { "containers": [{ "name": "main" }] } });
        assert_eq!(string_at(&value, "spec.containers.0.name").as_deref(), Some("main"));
        assert!(value_at(&value, "spec.missing").is_none());
        assert_eq!(value_at(&value, ""), Some(&value));
    }

    #[test]
    fn test_resolve_items_keeps_order_and_reports_unmatched() {
        let mut site = resource_type("/sites/{name}", vec![]);
        site.delete_endpoint = Some(EndpointTemplate::parse("/sites/{name}", None).unwrap());
        let list = resource_type("/sites", vec![site]);

        let body = json!({
            "value": [
                { "id": "/sites/b", "name": "b" },
                { "id": "/other/x", "name": "x" },
                { "id": "/sites/a" },
                { "name": "no-link" }
            ]
        })
        .to_string();

        let (items, errors) = backend(ResponseFormat::JSON)
            .resolve_items("/sites", &body, &list, "")
            .unwrap();

        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(items[0].delete_url, "/sites/b");
        assert!(Arc::ptr_eq(&items[0].resource_type, &items[1].resource_type));

        assert_eq!(errors.len(), 2);
        assert!(matches!(&errors[0], ApiSetError::SubResourceTypeNotFound { url } if url == "/other/x"));
        assert!(matches!(errors[1], ApiSetError::MissingSelfLink { index: 3, .. }));
    }

    #[test]
    fn test_resolve_items_yaml() {
        let pod = resource_type("/api/v1/namespaces/{namespace}/pods/{name}", vec![]);
        let list = resource_type("/api/v1/namespaces/{namespace}/pods", vec![pod]);
        let body = "items:\n- metadata:\n    name: web\n    selfLink: /api/v1/namespaces/default/pods/web\n";

        let (items, errors) = backend(ResponseFormat::YAML)
            .resolve_items("/api/v1/namespaces/default/pods", body, &list, "cluster")
            .unwrap();
        assert!(errors.is_empty());
        assert_eq!(items[0].id, "cluster/api/v1/namespaces/default/pods/web");
        assert_eq!(items[0].expand_url, "/api/v1/namespaces/default/pods/web");
        assert_eq!(items[0].delete_url, "");
    }

    #[test]
    fn test_invalid_listing_is_an_error() {
        let list = resource_type("/sites", vec![resource_type("/sites/{name}", vec![])]);
        let err = backend(ResponseFormat::JSON)
            .resolve_items("/sites", "not json", &list, "")
            .unwrap_err();
        assert!(matches!(err, ApiSetError::InvalidResponse { .. }));
    }
}
