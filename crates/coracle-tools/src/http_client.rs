//! Reqwest-backed HTTP client
//!
//! TigerStyle: Bounded timeouts and response sizes.

use async_trait::async_trait;
use coracle_core::http::{
    HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, HttpResult,
};
use coracle_core::constants::{HTTP_CLIENT_RESPONSE_BYTES_MAX, HTTP_CLIENT_TIMEOUT_MS_DEFAULT};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Production HTTP client using reqwest
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a new client with the default timeout
    pub fn new() -> HttpResult<Self> {
        Self::with_timeout(Duration::from_millis(HTTP_CLIENT_TIMEOUT_MS_DEFAULT))
    }

    /// Create a new client with a custom timeout
    pub fn with_timeout(timeout: Duration) -> HttpResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HttpError::RequestFailed {
                reason: e.to_string(),
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> HttpResult<HttpResponse> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
            HttpMethod::Delete => self.client.delete(&request.url),
        };

        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        builder = builder.timeout(request.timeout);

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout {
                    timeout_ms: request.timeout.as_millis() as u64,
                }
            } else if e.is_connect() {
                HttpError::ConnectionFailed {
                    reason: e.to_string(),
                }
            } else {
                HttpError::RequestFailed {
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();

        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(key.to_string(), value.to_string());
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| HttpError::RequestFailed {
                reason: e.to_string(),
            })?;

        if body.len() as u64 > HTTP_CLIENT_RESPONSE_BYTES_MAX {
            return Err(HttpError::ResponseTooLarge {
                size: body.len() as u64,
                max: HTTP_CLIENT_RESPONSE_BYTES_MAX,
            });
        }

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Create the default HTTP client for production use
pub fn default_http_client() -> HttpResult<Arc<dyn HttpClient>> {
    Ok(Arc::new(ReqwestHttpClient::new()?))
}
