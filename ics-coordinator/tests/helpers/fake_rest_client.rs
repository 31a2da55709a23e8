//! Recording REST client double
//!
//! Records every call and answers `Ok("")`, except for URLs starting with
//! a prefix registered through [`FakeRestClient::fail_urls`]. Calls to a
//! prefix registered through [`FakeRestClient::delay_urls`] are recorded
//! at once but answer only after the delay.

use async_trait::async_trait;
use ics_coordinator::clients::{CallbackError, RestClient};
use parking_lot::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub url: String,
    pub body: Option<String>,
}

impl RecordedCall {
    pub fn json(&self) -> serde_json::Value {
        self.body
            .as_deref()
            .and_then(|body| serde_json::from_str(body).ok())
            .unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Default)]
pub struct FakeRestClient {
    calls: Mutex<Vec<RecordedCall>>,
    failing_prefixes: Mutex<Vec<String>>,
    delayed_prefixes: Mutex<Vec<(String, Duration)>>,
}

impl FakeRestClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to a URL starting with `prefix` fail
    pub fn fail_urls(&self, prefix: &str) {
        self.failing_prefixes.lock().push(prefix.to_string());
    }

    /// Undo [`fail_urls`](Self::fail_urls) for `prefix`
    pub fn heal_urls(&self, prefix: &str) {
        self.failing_prefixes.lock().retain(|p| p != prefix);
    }

    /// Hold every answer to a URL starting with `prefix` for `delay`
    pub fn delay_urls(&self, prefix: &str, delay: Duration) {
        self.delayed_prefixes.lock().push((prefix.to_string(), delay));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, method: &str, url: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.method == method && call.url == url)
            .cloned()
            .collect()
    }

    pub fn count(&self, method: &str, url: &str) -> usize {
        self.calls_to(method, url).len()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    async fn record(&self, method: &'static str, url: &str, body: Option<&str>) -> Result<String, CallbackError> {
        self.calls.lock().push(RecordedCall {
            method,
            url: url.to_string(),
            body: body.map(str::to_string),
        });

        let delay = self
            .delayed_prefixes
            .lock()
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_prefixes.lock().iter().any(|prefix| url.starts_with(prefix)) {
            Err(CallbackError::Status(503, "unavailable".to_string()))
        } else {
            Ok(String::new())
        }
    }
}

#[async_trait]
impl RestClient for FakeRestClient {
    async fn get(&self, url: &str) -> Result<String, CallbackError> {
        self.record("GET", url, None).await
    }

    async fn post(&self, url: &str, body: &str) -> Result<String, CallbackError> {
        self.record("POST", url, Some(body)).await
    }

    async fn put(&self, url: &str, body: &str) -> Result<String, CallbackError> {
        self.record("PUT", url, Some(body)).await
    }

    async fn delete(&self, url: &str) -> Result<String, CallbackError> {
        self.record("DELETE", url, None).await
    }
}
