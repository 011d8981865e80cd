//! HTTP transport shared by the APISet backends

use anyhow::Context;
use reqwest::{header, Client, Method, StatusCode};
use thiserror::Error;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

pub const ACCEPT_JSON: &str = "application/json";
pub const ACCEPT_YAML: &str = "application/yaml";

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// A transport or HTTP failure, with the URL it concerned
#[derive(Debug, Clone, Error)]
#[error("{method} {url} failed: {reason}")]
pub struct RequestFailed {
    pub method: Method,
    pub url: String,
    pub status: Option<StatusCode>,
    pub reason: String,
}

/// A successful response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub body: String,
}

/// HTTP client bound to one server. Immutable after construction.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

impl HttpClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        url::Url::parse(base_url).with_context(|| format!("Invalid server URL '{}'", base_url))?;

        let client = Client::builder()
            .user_agent(concat!("spectree/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Underlying client, for requests to other hosts that carry their own auth
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a server-relative path; absolute URLs pass through
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Issue one request. Non-2xx statuses are errors. Never retries.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        accept: &str,
    ) -> Result<HttpResponse, RequestFailed> {
        let url = self.url_for(path);
        tracing::debug!("{} {}", method, url);

        let failed = |status: Option<StatusCode>, reason: String| RequestFailed {
            method: method.clone(),
            url: url.clone(),
            status,
            reason,
        };

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(header::ACCEPT, accept);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if method == Method::POST {
            request = request.header(header::CONTENT_LENGTH, 0);
        }

        let response = request
            .send()
            .await
            .map_err(|e| failed(None, format!("failed to send request: {}", e)))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|e| failed(Some(status), format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            // Only log a sanitized, truncated body
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(failed(Some(status), format!("status {}", status)));
        }

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Format a backend failure for display.
/// Maps status codes to short messages and never echoes response bodies.
pub fn format_backend_error(error: &RequestFailed) -> String {
    let Some(status) = error.status else {
        return "Request failed. Check your network connection and try again.".to_string();
    };

    match status.as_u16() {
        400 => "Invalid request. Check your parameters.".to_string(),
        401 => "Authentication failed. Check your access token.".to_string(),
        403 => "Permission denied. Check your role assignments.".to_string(),
        404 => "Resource not found.".to_string(),
        405 => "Operation not supported for this resource.".to_string(),
        409 => "Resource conflict. The resource may already exist or be in use.".to_string(),
        429 => "Rate limit exceeded. Please try again later.".to_string(),
        500 | 502 | 503 | 504 => "Service temporarily unavailable. Please try again.".to_string(),
        code => format!("Request failed with status {}.", code),
    }
}
