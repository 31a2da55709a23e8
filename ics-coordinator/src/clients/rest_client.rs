//! Outbound async REST client
//!
//! The callback engine only needs "send request, get body or error".
//! [`RestClient`] is that seam; [`HttpRestClient`] is the reqwest
//! implementation used in production.

use async_trait::async_trait;
use ics_common::config::{CallbackConfig, HttpProxyConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("ics-coordinator/", env!("CARGO_PKG_VERSION"));

/// Callback errors
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0}: {1}")]
    Status(u16, String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("No callback handler found for interface version {0}")]
    NoHandler(String),
}

#[async_trait]
pub trait RestClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<String, CallbackError>;

    async fn post(&self, url: &str, body: &str) -> Result<String, CallbackError>;

    async fn put(&self, url: &str, body: &str) -> Result<String, CallbackError>;

    async fn delete(&self, url: &str) -> Result<String, CallbackError>;
}

/// reqwest-backed client with timeouts and optional HTTP proxy
pub struct HttpRestClient {
    http_client: reqwest::Client,
    sequence: AtomicU64,
}

impl HttpRestClient {
    pub fn new(config: &CallbackConfig, proxy: Option<&HttpProxyConfig>) -> Result<Self, CallbackError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout());

        if let Some(proxy_url) = proxy.and_then(HttpProxyConfig::proxy_url) {
            tracing::info!(proxy = %proxy_url, "Http proxy is used for callbacks");
            let proxy = reqwest::Proxy::all(&proxy_url).map_err(|e| CallbackError::InvalidUrl(e.to_string()))?;
            builder = builder.proxy(proxy);
        } else {
            builder = builder.no_proxy();
        }

        let http_client = builder
            .build()
            .map_err(|e| CallbackError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            sequence: AtomicU64::new(0),
        })
    }

    /// Client with default timeouts and no proxy
    pub fn with_timeout(timeout: Duration) -> Result<Self, CallbackError> {
        let config = CallbackConfig {
            request_timeout_ms: timeout.as_millis() as u64,
            ..CallbackConfig::default()
        };
        Self::new(&config, None)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, CallbackError> {
        let request = request
            .build()
            .map_err(|e| CallbackError::InvalidUrl(e.to_string()))?;

        let trace_tag = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(trace_tag, method = %request.method(), url = %request.url(), "Sending callback");

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| CallbackError::Network(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            tracing::debug!(trace_tag, status = status.as_u16(), "Callback rejected");
            return Err(CallbackError::Status(status.as_u16(), body));
        }

        tracing::debug!(trace_tag, status = status.as_u16(), "Callback response received");
        Ok(body)
    }
}

#[async_trait]
impl RestClient for HttpRestClient {
    async fn get(&self, url: &str) -> Result<String, CallbackError> {
        self.send(self.http_client.get(url)).await
    }

    async fn post(&self, url: &str, body: &str) -> Result<String, CallbackError> {
        let request = self
            .http_client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string());
        self.send(request).await
    }

    async fn put(&self, url: &str, body: &str) -> Result<String, CallbackError> {
        let request = self
            .http_client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string());
        self.send(request).await
    }

    async fn delete(&self, url: &str) -> Result<String, CallbackError> {
        self.send(self.http_client.delete(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = HttpRestClient::new(&CallbackConfig::default(), None);
        assert!(client.is_ok());
    }

    #[test]
    fn test_client_with_proxy() {
        let proxy = HttpProxyConfig {
            host: "proxy.local".to_string(),
            port: 3128,
        };
        let client = HttpRestClient::new(&CallbackConfig::default(), Some(&proxy));
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_url_is_error() {
        let client = HttpRestClient::with_timeout(Duration::from_secs(1)).unwrap();
        let result = client.get("not a url").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let client = HttpRestClient::with_timeout(Duration::from_secs(2)).unwrap();
        // Port 9 (discard) is essentially never listening on localhost
        let result = client.post("http://127.0.0.1:9/jobs", "{}").await;
        assert!(matches!(result, Err(CallbackError::Network(_))));
    }
}
