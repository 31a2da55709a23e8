//! Test Helper Utilities
//!
//! Shared utilities for testing ics-coordinator

#![allow(dead_code)]

pub mod fake_rest_client;

pub use fake_rest_client::{FakeRestClient, RecordedCall};

use ics_coordinator::clients::RestClient;
use ics_coordinator::repository::ProducerRegistrationInfo;
use ics_coordinator::service::{CoordinatorSettings, JobDefinition};
use ics_coordinator::InfoCoordinator;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A coordinator over a throwaway vardata directory, with fake clients
pub struct TestContext {
    pub coordinator: Arc<InfoCoordinator>,
    pub rest_client: Arc<FakeRestClient>,
    pub proxy_client: Arc<FakeRestClient>,
    pub vardata: TempDir,
}

pub fn test_settings() -> CoordinatorSettings {
    CoordinatorSettings {
        retry_base_delay: Duration::from_millis(1),
        dead_threshold: 3,
    }
}

impl TestContext {
    pub fn new() -> Self {
        let vardata = tempfile::tempdir().expect("Failed to create temp dir");
        let rest_client = Arc::new(FakeRestClient::new());
        let proxy_client = Arc::new(FakeRestClient::new());
        let coordinator = build_coordinator(&vardata, &rest_client, &proxy_client);
        Self {
            coordinator,
            rest_client,
            proxy_client,
            vardata,
        }
    }

    /// Simulate a process restart: fresh registries restored from the
    /// same vardata directory
    pub fn restart(&mut self) {
        self.coordinator = build_coordinator(&self.vardata, &self.rest_client, &self.proxy_client);
        self.coordinator
            .restore_from_disk()
            .expect("Failed to restore from disk");
    }
}

fn build_coordinator(
    vardata: &TempDir,
    rest_client: &Arc<FakeRestClient>,
    proxy_client: &Arc<FakeRestClient>,
) -> Arc<InfoCoordinator> {
    let rest_client: Arc<dyn RestClient> = rest_client.clone();
    let proxy_client: Arc<dyn RestClient> = proxy_client.clone();
    Arc::new(
        InfoCoordinator::new(vardata.path(), rest_client, proxy_client, test_settings())
            .expect("Failed to create coordinator"),
    )
}

pub fn weather_schema() -> Value {
    json!({
        "type": "object",
        "properties": {"city": {"type": "string"}},
        "required": ["city"]
    })
}

pub fn job_url(producer_id: &str) -> String {
    format!("http://{}/jobs", producer_id)
}

pub fn supervision_url(producer_id: &str) -> String {
    format!("http://{}/health", producer_id)
}

pub fn registration(producer_id: &str, type_ids: &[&str]) -> ProducerRegistrationInfo {
    ProducerRegistrationInfo {
        id: producer_id.to_string(),
        supported_type_ids: type_ids.iter().map(|t| t.to_string()).collect(),
        job_callback_url: job_url(producer_id),
        supervision_callback_url: supervision_url(producer_id),
    }
}

pub fn job_definition(type_id: &str, owner: &str) -> JobDefinition {
    JobDefinition {
        type_id: type_id.to_string(),
        owner: owner.to_string(),
        job_data: json!({"city": "Oslo"}),
        target_url: format!("http://{}/sink", owner),
        job_status_url: None,
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Give detached notification tasks a chance to run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
