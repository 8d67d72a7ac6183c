// crates/formwork-core/src/transport.rs
// ============================================================================
// Module: Transport Interface
// Description: Injected network capability used by remote conditions.
// Purpose: Keep the core independent of any HTTP client.
// Dependencies: async-trait, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Remote conditions and HTTP validators describe requests declaratively with
//! a [`RequestSpec`]; parameter and body entries are expressions evaluated
//! against the field's context. The resolved [`HttpRequest`] is handed to an
//! injected [`Transport`]. Timeouts and host policy belong to the transport.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Request Types
// ============================================================================

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET request.
    #[default]
    Get,
    /// POST request.
    Post,
    /// PUT request.
    Put,
    /// PATCH request.
    Patch,
    /// DELETE request.
    Delete,
}

/// Declarative request description.
///
/// # Invariants
/// - `params` and `body` values are expressions evaluated per call.
/// - `headers` values are literal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSpec {
    /// Target URL.
    pub url: String,
    /// HTTP method.
    #[serde(default)]
    pub method: HttpMethod,
    /// Query parameters: name to expression.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    /// JSON body members: name to expression.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub body: BTreeMap<String, String>,
    /// Literal request headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl RequestSpec {
    /// Creates a GET request spec for a URL.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            params: BTreeMap::new(),
            body: BTreeMap::new(),
            headers: BTreeMap::new(),
        }
    }

    /// Adds a query parameter expression.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.params.insert(name.into(), expression.into());
        self
    }
}

/// Fully resolved request passed to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Target URL (without resolved query parameters).
    pub url: String,
    /// Resolved query parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,
    /// Resolved JSON body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Request headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

// ============================================================================
// SECTION: Transport
// ============================================================================

/// Errors reported by transports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Request was rejected before sending (policy, invalid URL).
    #[error("request rejected: {0}")]
    Rejected(String),
    /// Network failure or timeout.
    #[error("request failed: {0}")]
    Network(String),
    /// Non-success HTTP status.
    #[error("unexpected status {0}")]
    Status(u16),
    /// Response body could not be read.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Network capability injected into a form instance.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs a request and returns the decoded response body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on policy, network or decoding failure.
    async fn perform_request(&self, request: &HttpRequest) -> Result<Value, TransportError>;
}

/// Transport used when none is configured; every request fails.
pub struct UnavailableTransport;

#[async_trait]
impl Transport for UnavailableTransport {
    async fn perform_request(&self, request: &HttpRequest) -> Result<Value, TransportError> {
        Err(TransportError::Rejected(format!("no transport configured for {}", request.url)))
    }
}
