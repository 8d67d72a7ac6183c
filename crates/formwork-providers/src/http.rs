// crates/formwork-providers/src/http.rs
// ============================================================================
// Module: HTTP Transport
// Description: Transport for remote conditions and HTTP validators.
// Purpose: Perform bounded requests with scheme and host policy.
// Dependencies: formwork-core, reqwest, serde, serde_json, url
// ============================================================================

//! ## Overview
//! [`ReqwestTransport`] turns a resolved [`HttpRequest`] into an outbound
//! request. It enforces scheme restrictions, an optional host allowlist,
//! disabled redirects and a response size limit so a misbehaving endpoint
//! degrades into a [`TransportError`] instead of unbounded work. JSON bodies
//! are decoded; any other body is returned as a JSON string.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use formwork_core::HttpMethod;
use formwork_core::HttpRequest;
use formwork_core::Transport;
use formwork_core::TransportError;
use reqwest::Client;
use reqwest::Method;
use reqwest::Response;
use reqwest::redirect::Policy;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Default response size limit in bytes.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Configuration for the HTTP transport.
///
/// # Invariants
/// - `allow_http = false` blocks cleartext `http://` URLs.
/// - `max_response_bytes` is a hard upper bound on response bodies.
/// - If `allowed_hosts` is set, only listed hosts are permitted.
/// - URLs with embedded credentials are rejected.
/// - `timeout_ms` applies to the full request lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpTransportConfig {
    /// Allow cleartext HTTP (disabled by default).
    pub allow_http: bool,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum response size allowed, in bytes.
    pub max_response_bytes: usize,
    /// Optional host allowlist.
    pub allowed_hosts: Option<BTreeSet<String>>,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            allow_http: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            allowed_hosts: None,
            user_agent: format!("formwork/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

// ============================================================================
// SECTION: Transport Implementation
// ============================================================================

/// HTTP transport backed by `reqwest`.
///
/// # Invariants
/// - Redirect responses are rejected rather than followed.
/// - Non-success statuses map to [`TransportError::Status`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    /// Transport configuration, including limits and policy.
    config: HttpTransportConfig,
    /// HTTP client used for outbound requests.
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Rejected`] when the HTTP client cannot be built.
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .redirect(Policy::none())
            .build()
            .map_err(|_| TransportError::Rejected("http client build failed".to_string()))?;
        Ok(Self {
            config,
            client,
        })
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &HttpTransportConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn perform_request(&self, request: &HttpRequest) -> Result<Value, TransportError> {
        let url = request_url(request, &self.config)?;
        let mut builder = self.client.request(method(request.method), url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let mut response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                TransportError::Network("http request timed out".to_string())
            } else {
                TransportError::Network("http request failed".to_string())
            }
        })?;
        let status = response.status();
        if status.is_redirection() {
            return Err(TransportError::Rejected("http redirect not allowed".to_string()));
        }
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        let body = read_response_limited(&mut response, self.config.max_response_bytes).await?;
        Ok(decode_body(&body))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps the core method onto the client's method type.
fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// Parses the request URL, checks policy and appends resolved query parameters.
fn request_url(request: &HttpRequest, config: &HttpTransportConfig) -> Result<Url, TransportError> {
    let mut url =
        Url::parse(&request.url).map_err(|_| TransportError::Rejected("invalid url".to_string()))?;
    validate_url(&url, config)?;
    if !request.query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in &request.query {
            pairs.append_pair(name, value);
        }
    }
    Ok(url)
}

/// Validates URL scheme, credentials and allowlist policy.
fn validate_url(url: &Url, config: &HttpTransportConfig) -> Result<(), TransportError> {
    match url.scheme() {
        "https" => {}
        "http" if config.allow_http => {}
        _ => return Err(TransportError::Rejected("unsupported url scheme".to_string())),
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(TransportError::Rejected("url credentials are not allowed".to_string()));
    }
    let host =
        url.host_str().ok_or_else(|| TransportError::Rejected("url host required".to_string()))?;
    if let Some(allowlist) = &config.allowed_hosts {
        let host = normalize_host_label(host);
        let allowed = allowlist.iter().any(|entry| normalize_host_label(entry) == host);
        if !allowed {
            return Err(TransportError::Rejected(format!("url host not allowed: {host}")));
        }
    }
    Ok(())
}

/// Normalizes host labels for allowlist comparisons.
fn normalize_host_label(host: &str) -> String {
    let trimmed = host.trim_end_matches('.');
    let trimmed =
        trimmed.strip_prefix('[').and_then(|inner| inner.strip_suffix(']')).unwrap_or(trimmed);
    trimmed.to_ascii_lowercase()
}

/// Reads the response body while enforcing a byte limit.
async fn read_response_limited(
    response: &mut Response,
    max_bytes: usize,
) -> Result<Vec<u8>, TransportError> {
    let max_bytes_u64 = u64::try_from(max_bytes).map_err(|_| {
        TransportError::InvalidResponse("response size limit exceeds u64".to_string())
    })?;
    if let Some(expected) = response.content_length()
        && expected > max_bytes_u64
    {
        return Err(TransportError::InvalidResponse("http response exceeds size limit".to_string()));
    }
    let mut buf = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|_| TransportError::InvalidResponse("failed to read response".to_string()))?
    {
        if buf.len().saturating_add(chunk.len()) > max_bytes {
            return Err(TransportError::InvalidResponse(
                "http response exceeds size limit".to_string(),
            ));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Decodes a JSON body, falling back to the body text as a JSON string.
fn decode_body(body: &[u8]) -> Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use std::collections::BTreeMap;
    use std::collections::BTreeSet;

    use formwork_core::HttpMethod;
    use formwork_core::HttpRequest;
    use serde_json::Value;
    use serde_json::json;

    use super::HttpTransportConfig;
    use super::decode_body;
    use super::request_url;

    /// Builds a GET request with one query parameter.
    fn request(url: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            query: BTreeMap::from([("q".to_string(), "a b".to_string())]),
            body: None,
            headers: BTreeMap::new(),
        }
    }

    #[test]
    fn query_parameters_are_encoded() {
        let config = HttpTransportConfig::default();
        let url = request_url(&request("https://api.example.test/v1?x=1"), &config).unwrap();
        assert_eq!(url.as_str(), "https://api.example.test/v1?x=1&q=a+b");
    }

    #[test]
    fn allowlist_matches_normalized_hosts() {
        let config = HttpTransportConfig {
            allowed_hosts: Some(BTreeSet::from(["API.example.test.".to_string()])),
            ..HttpTransportConfig::default()
        };
        assert!(request_url(&request("https://api.example.test/"), &config).is_ok());
        assert!(request_url(&request("https://other.example.test/"), &config).is_err());
    }

    #[test]
    fn non_json_bodies_become_strings() {
        assert_eq!(decode_body(br#"{"ok":true}"#), json!({"ok": true}));
        assert_eq!(decode_body(b"plain text"), Value::String("plain text".to_string()));
    }
}
