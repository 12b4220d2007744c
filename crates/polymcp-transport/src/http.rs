//! Synchronous HTTP transport: the POST body is the request JSON, the
//! response body is the response JSON. One round-trip per call, no
//! correlation table involved.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use polymcp_core::protocol::{JsonRpcRequest, JsonRpcResponse};

use crate::{RequestTransport, Result, TransportError};

/// HTTP request-response transport.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    /// Build a transport for an `http://` endpoint. `https://` is refused:
    /// certificate validation is not supported here, and carrying a
    /// half-validated TLS stack would be worse than refusing outright.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        if url.starts_with("https://") {
            return Err(TransportError::Unsupported {
                message: "https:// is not supported; use http:// or terminate TLS upstream"
                    .to_string(),
            });
        }
        if !url.starts_with("http://") {
            return Err(TransportError::Connection {
                message: format!("not an HTTP URL: {url}"),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connection {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        debug!(url = %url, ?timeout, "HTTP transport ready");
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl RequestTransport for HttpTransport {
    async fn request(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        trace!(url = %self.url, method = %request.method, "HTTP round-trip");
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else if e.is_connect() {
                    TransportError::Connection {
                        message: format!("HTTP connect to {} failed: {e}", self.url),
                    }
                } else {
                    TransportError::Network {
                        message: format!("HTTP request to {} failed: {e}", self.url),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Network {
                message: format!("HTTP request to {} returned {status}", self.url),
            });
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network {
                    message: format!("HTTP body read from {} failed: {e}", self.url),
                }
            }
        })?;

        serde_json::from_slice(&body).map_err(|e| TransportError::Serialization {
            message: format!("failed to parse response JSON: {e}"),
        })
    }

    fn is_connected(&self) -> bool {
        // Connectionless: each round-trip stands alone.
        true
    }
}
