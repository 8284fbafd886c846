//! HTTP Client Abstraction
//!
//! TigerStyle: Abstract HTTP client trait so the engine never depends on a
//! concrete client.
//!
//! The behaviour engine issues a small set of requests against the
//! Registration API (POST `/resource`, DELETE `/resource/{type}/{id}`,
//! POST `/health/nodes/{id}`). This module provides the narrow contract it
//! is written against:
//! - Production use with reqwest (in coracle-tools)
//! - Scripted doubles in tests

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::constants::{HTTP_CLIENT_RESPONSE_BYTES_MAX, HTTP_CLIENT_TIMEOUT_MS_DEFAULT};

// =============================================================================
// HTTP Method
// =============================================================================

/// HTTP request method
///
/// Only the methods the Registration API requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Delete => write!(f, "DELETE"),
        }
    }
}

// =============================================================================
// HTTP Request
// =============================================================================

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Request URL
    pub url: String,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Request body (for POST)
    pub body: Option<String>,
    /// Request timeout
    pub timeout: Duration,
}

impl HttpRequest {
    /// Create a new GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Create a new POST request
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    /// Create a new DELETE request
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: Duration::from_millis(HTTP_CLIENT_TIMEOUT_MS_DEFAULT),
        }
    }

    /// Set a JSON body and the matching content type
    pub fn with_json_body(mut self, json: &Value) -> Self {
        self.body = Some(serde_json::to_string(json).unwrap_or_default());
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        self
    }

    /// Add a header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// =============================================================================
// HTTP Response
// =============================================================================

/// HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// Response body
    pub body: String,
}

impl HttpResponse {
    /// Create a new response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Check if status is success (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if status is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check if status is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Parse body as JSON
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

// =============================================================================
// HTTP Error
// =============================================================================

/// HTTP client errors
///
/// All variants represent transport-level failures; HTTP status codes are
/// carried in [`HttpResponse`] and classified by the caller.
#[derive(Debug, Clone)]
pub enum HttpError {
    /// Request timed out
    Timeout { timeout_ms: u64 },
    /// Connection failed
    ConnectionFailed { reason: String },
    /// Request failed
    RequestFailed { reason: String },
    /// Response exceeded the size limit
    ResponseTooLarge { size: u64, max: u64 },
    /// Invalid URL
    InvalidUrl { url: String },
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::Timeout { timeout_ms } => {
                write!(f, "HTTP request timed out after {}ms", timeout_ms)
            }
            HttpError::ConnectionFailed { reason } => {
                write!(f, "HTTP connection failed: {}", reason)
            }
            HttpError::RequestFailed { reason } => write!(f, "HTTP request failed: {}", reason),
            HttpError::ResponseTooLarge { size, max } => {
                write!(
                    f,
                    "HTTP response too large: {} bytes (max: {} bytes)",
                    size, max
                )
            }
            HttpError::InvalidUrl { url } => write!(f, "Invalid URL: {}", url),
        }
    }
}

impl std::error::Error for HttpError {}

/// HTTP client result type
pub type HttpResult<T> = Result<T, HttpError>;

// =============================================================================
// HTTP Client Trait
// =============================================================================

/// Abstract HTTP client trait
///
/// This trait allows swapping HTTP implementations for testing.
/// Production code uses ReqwestHttpClient (in coracle-tools),
/// tests use scripted doubles.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute an HTTP request
    async fn execute(&self, request: HttpRequest) -> HttpResult<HttpResponse>;

    /// Convenience method for POST with JSON body
    async fn post_json(&self, url: &str, body: &Value) -> HttpResult<HttpResponse> {
        self.execute(HttpRequest::post(url).with_json_body(body))
            .await
    }

    /// Convenience method for bodiless POST requests
    async fn post(&self, url: &str) -> HttpResult<HttpResponse> {
        self.execute(HttpRequest::post(url)).await
    }

    /// Convenience method for DELETE requests
    async fn delete(&self, url: &str) -> HttpResult<HttpResponse> {
        self.execute(HttpRequest::delete(url)).await
    }
}

// Compile-time assertion: responses must fit well inside memory
const _: () = {
    assert!(HTTP_CLIENT_RESPONSE_BYTES_MAX <= 100 * 1024 * 1024);
};
