//! Storage blob expander
//!
//! Blob containers are listed through the storage data plane, not the
//! management API. A container node gains a "Blobs" child; expanding that
//! child looks up the account key and blob endpoint through the management
//! API and lists the container with a Shared Key signed request.

use super::{ExpandError, Expander, ExpanderResponse, ExpanderResult};
use crate::apiset::ApiSetError;
use crate::catalog::EndpointTemplate;
use crate::context::RequestContext;
use crate::http::{self, HttpClient, RequestFailed};
use crate::tree::{
    ResponseType, TreeNode, ITEM_TYPE_SUB_RESOURCE, METADATA_SUPPRESS_SWAGGER_EXPAND,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const CONTAINER_TEMPLATE: &str = "/subscriptions/{subscriptionId}/resourceGroups/{resourceGroupName}/providers/Microsoft.Storage/storageAccounts/{accountName}/blobServices/default/containers/{containerName}";

/// Namespace of nodes owned by this expander
pub const STORAGE_BLOB_NAMESPACE: &str = "storageBlob";
/// Metadata key holding the container URL on a "Blobs" node
pub const METADATA_CONTAINER_ID: &str = "ContainerID";

const STORAGE_API_VERSION: &str = "2019-06-01";
const BLOB_SERVICE_VERSION: &str = "2018-03-28";
const X_MS_DATE: &str = "x-ms-date";
const X_MS_VERSION: &str = "x-ms-version";
const SOURCE_DESCRIPTION: &str = "StorageBlobExpander request";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("'{0}' is not a blob container URL")]
    NotAContainer(String),

    #[error("No keys returned by {0}")]
    NoKeys(String),

    #[error("No blob endpoint for the storage account at {0}")]
    NoBlobEndpoint(String),

    #[error("Invalid storage account key: {0}")]
    InvalidKey(String),

    #[error("Cannot sign a request for account '{0}'")]
    Signing(String),
}

#[derive(Debug, Deserialize)]
struct ListKeysResponse {
    #[serde(default)]
    keys: Vec<AccountKey>,
}

#[derive(Debug, Deserialize)]
struct AccountKey {
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct AccountResponse {
    #[serde(default)]
    properties: AccountProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountProperties {
    #[serde(default)]
    primary_endpoints: PrimaryEndpoints,
}

#[derive(Debug, Default, Deserialize)]
struct PrimaryEndpoints {
    #[serde(default)]
    blob: Option<String>,
}

/// Storage account and container named by a container URL
#[derive(Debug, Clone, PartialEq, Eq)]
struct Container {
    /// Server-relative URL of the storage account
    account_url: String,
    account_name: String,
    container_name: String,
}

impl Container {
    fn parse(container_url: &str) -> Result<Self, StorageError> {
        let not_a_container = || StorageError::NotAContainer(container_url.to_string());

        let template = EndpointTemplate::parse(CONTAINER_TEMPLATE, None).map_err(|_| not_a_container())?;
        let values = template.match_url(container_url).ok_or_else(not_a_container)?;

        // Drop "/blobServices/default/containers/{containerName}"
        let account = template.prefix(template.segment_count() - 4);
        let account_url = account.build_url(&values).map_err(|_| not_a_container())?;

        let value = |name: &str| values.get(name).cloned().ok_or_else(not_a_container);
        Ok(Self {
            account_url,
            account_name: value("accountName")?,
            container_name: value("containerName")?,
        })
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// `x-ms-*` headers, sorted, one `name:value` per line
fn canonicalized_headers(headers: &HeaderMap) -> String {
    let mut ms: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (name, value) in headers {
        if name.as_str().starts_with("x-ms-") {
            ms.entry(name.as_str())
                .or_default()
                .push(value.to_str().unwrap_or_default());
        }
    }
    ms.iter()
        .map(|(name, values)| format!("{}:{}", name, values.join(",")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `/<account><path>` followed by the sorted query parameters
fn canonicalized_resource(url: &url::Url, account_name: &str) -> String {
    let mut resource = format!("/{}{}", account_name, url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in url.query_pairs() {
        params
            .entry(name.to_lowercase())
            .or_default()
            .push(value.into_owned());
    }
    for (name, mut values) in params {
        values.sort();
        resource.push_str(&format!("\n{}:{}", name, values.join(",")));
    }
    resource
}

/// Shared Key string-to-sign for the blob service
pub fn string_to_sign(method: &Method, headers: &HeaderMap, url: &url::Url, account_name: &str) -> String {
    let content_length = match header_value(headers, "content-length") {
        "0" => "",
        other => other,
    };
    let canonical_headers = canonicalized_headers(headers);
    let canonical_resource = canonicalized_resource(url, account_name);

    [
        method.as_str(),
        header_value(headers, "content-encoding"),
        header_value(headers, "content-language"),
        content_length,
        header_value(headers, "content-md5"),
        header_value(headers, "content-type"),
        // Date stays empty; x-ms-date is signed instead
        "",
        header_value(headers, "if-modified-since"),
        header_value(headers, "if-match"),
        header_value(headers, "if-none-match"),
        header_value(headers, "if-unmodified-since"),
        header_value(headers, "range"),
        canonical_headers.as_str(),
        canonical_resource.as_str(),
    ]
    .join("\n")
}

/// Base64 HMAC-SHA256 of `message` under the base64-encoded account key
pub fn sign(message: &str, account_key: &str) -> Result<String, StorageError> {
    let key = STANDARD
        .decode(account_key)
        .map_err(|e| StorageError::InvalidKey(e.to_string()))?;
    let mut mac = HmacSha256::new_from_slice(&key).map_err(|e| StorageError::InvalidKey(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Clone)]
pub struct StorageBlobExpander {
    management: HttpClient,
}

impl StorageBlobExpander {
    pub fn new(management: HttpClient) -> Self {
        Self { management }
    }

    fn is_container(node: &TreeNode) -> bool {
        node.namespace != STORAGE_BLOB_NAMESPACE
            && node.item_type == ITEM_TYPE_SUB_RESOURCE
            && node
                .resource_type
                .as_ref()
                .map(|rt| {
                    EndpointTemplate::parse(CONTAINER_TEMPLATE, None)
                        .map(|t| t.condensed() == rt.endpoint.condensed())
                        .unwrap_or(false)
                })
                .unwrap_or(false)
    }

    fn is_blob_listing(node: &TreeNode) -> bool {
        node.namespace == STORAGE_BLOB_NAMESPACE && node.item_type == ITEM_TYPE_SUB_RESOURCE
    }

    fn blobs_node(container: &TreeNode) -> TreeNode {
        let mut metadata = HashMap::new();
        metadata.insert(METADATA_CONTAINER_ID.to_string(), container.expand_url.clone());
        metadata.insert(METADATA_SUPPRESS_SWAGGER_EXPAND.to_string(), "true".to_string());

        TreeNode {
            parent_id: container.id.clone(),
            id: format!("{}/<blobs>", container.id),
            name: "Blobs".to_string(),
            display: "Blobs".to_string(),
            item_type: ITEM_TYPE_SUB_RESOURCE.to_string(),
            namespace: STORAGE_BLOB_NAMESPACE.to_string(),
            metadata,
            ..Default::default()
        }
    }

    async fn management_json<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        method: Method,
        url: &str,
    ) -> Result<T, ApiSetError> {
        let response = ctx
            .run(async move {
                self.management
                    .send(method, url, http::ACCEPT_JSON)
                    .await
                    .map_err(ApiSetError::from)
            })
            .await?;
        serde_json::from_str(&response.body).map_err(|e| ApiSetError::InvalidResponse {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    async fn account_key(&self, ctx: &RequestContext, container: &Container) -> Result<String, ExpandError> {
        let url = format!("{}/listKeys?api-version={}", container.account_url, STORAGE_API_VERSION);
        let response: ListKeysResponse = self.management_json(ctx, Method::POST, &url).await?;
        match response.keys.into_iter().next() {
            Some(key) => Ok(key.value),
            None => Err(StorageError::NoKeys(url).into()),
        }
    }

    async fn blob_endpoint(&self, ctx: &RequestContext, container: &Container) -> Result<String, ExpandError> {
        let url = format!("{}?api-version={}", container.account_url, STORAGE_API_VERSION);
        let response: AccountResponse = self.management_json(ctx, Method::GET, &url).await?;
        match response.properties.primary_endpoints.blob {
            Some(endpoint) if !endpoint.is_empty() => Ok(endpoint),
            _ => Err(StorageError::NoBlobEndpoint(container.account_url.clone()).into()),
        }
    }

    /// List the container's blobs. Returns the raw XML listing.
    async fn list_blobs(
        &self,
        ctx: &RequestContext,
        blob_endpoint: &str,
        container: &Container,
        account_key: &str,
    ) -> Result<String, ExpandError> {
        let url = format!(
            "{}/{}?restype=container&comp=list",
            blob_endpoint.trim_end_matches('/'),
            container.container_name
        );
        let failed = |status: Option<StatusCode>, reason: String| RequestFailed {
            method: Method::GET,
            url: url.clone(),
            status,
            reason,
        };

        let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let mut request = self
            .management
            .client()
            .get(&url)
            .header(X_MS_VERSION, BLOB_SERVICE_VERSION)
            .header(X_MS_DATE, date)
            .build()
            .map_err(|e| ApiSetError::from(failed(None, format!("failed to build request: {}", e))))?;

        let signature = sign(
            &string_to_sign(request.method(), request.headers(), request.url(), &container.account_name),
            account_key,
        )?;
        let authorization = HeaderValue::from_str(&format!("SharedKey {}:{}", container.account_name, signature))
            .map_err(|_| StorageError::Signing(container.account_name.clone()))?;
        request.headers_mut().insert(header::AUTHORIZATION, authorization);

        tracing::debug!("GET {}", url);
        let body = ctx
            .run(async {
                let response = self
                    .management
                    .client()
                    .execute(request)
                    .await
                    .map_err(|e| failed(None, format!("failed to send request: {}", e)))?;
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .map_err(|e| failed(Some(status), format!("failed to read response body: {}", e)))?;
                if !status.is_success() {
                    tracing::error!("Blob listing error: {} - {}", status, http::sanitize_for_log(&body));
                    return Err(failed(Some(status), format!("status {}", status)).into());
                }
                Ok::<_, ApiSetError>(body)
            })
            .await?;
        Ok(body)
    }

    async fn expand_blobs(&self, ctx: &RequestContext, node: &TreeNode) -> Result<ExpanderResult, ExpandError> {
        let container_url = node
            .metadata_value(METADATA_CONTAINER_ID)
            .ok_or_else(|| StorageError::NotAContainer(node.id.clone()))?;
        let container = Container::parse(container_url)?;

        let (account_key, blob_endpoint) = futures::try_join!(
            self.account_key(ctx, &container),
            self.blob_endpoint(ctx, &container)
        )?;
        let listing = self
            .list_blobs(ctx, &blob_endpoint, &container, &account_key)
            .await?;

        Ok(ExpanderResult {
            response: Some(ExpanderResponse {
                response: listing,
                response_type: ResponseType::Xml,
            }),
            source_description: SOURCE_DESCRIPTION.to_string(),
            is_primary_response: true,
            ..Default::default()
        })
    }
}

#[async_trait]
impl Expander for StorageBlobExpander {
    fn name(&self) -> &str {
        "StorageBlobExpander"
    }

    fn does_expand(&self, node: &TreeNode) -> bool {
        Self::is_container(node) || Self::is_blob_listing(node)
    }

    async fn expand(
        &self,
        ctx: &RequestContext,
        node: &TreeNode,
    ) -> Result<ExpanderResult, ExpandError> {
        if Self::is_container(node) {
            // The catalog expander supplies the container's own response
            return Ok(ExpanderResult {
                nodes: vec![Self::blobs_node(node)],
                source_description: SOURCE_DESCRIPTION.to_string(),
                ..Default::default()
            });
        }
        if Self::is_blob_listing(node) {
            return self.expand_blobs(ctx, node).await;
        }
        Err(ExpandError::Unhandled {
            expander: self.name().to_string(),
            id: node.id.clone(),
        })
    }
}
