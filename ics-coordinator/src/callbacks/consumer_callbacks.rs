//! Type status notifications for `version_1` consumers

use crate::clients::{CallbackError, RestClient};
use crate::repository::{ConsumerCallbackHandler, InfoType, SubscriptionInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub const API_VERSION: &str = "version_1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TypeStatus {
    Registered,
    Deregistered,
}

/// Body POSTed to a subscriber's callback URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerTypeRegistrationInfo {
    pub info_type_id: String,
    pub job_data_schema: Option<Value>,
    pub status: TypeStatus,
}

pub struct ConsumerCallbacks {
    rest_client: Arc<dyn RestClient>,
}

impl ConsumerCallbacks {
    pub fn new(rest_client: Arc<dyn RestClient>) -> Self {
        Self { rest_client }
    }

    async fn post(
        &self,
        info_type: &InfoType,
        subscription: &SubscriptionInfo,
        status: TypeStatus,
    ) -> Result<String, CallbackError> {
        let body = ConsumerTypeRegistrationInfo {
            info_type_id: info_type.id.clone(),
            job_data_schema: info_type.job_data_schema.clone(),
            status,
        };
        let body = serde_json::to_string(&body).map_err(|e| CallbackError::Network(e.to_string()))?;
        self.rest_client.post(&subscription.callback_url, &body).await
    }
}

#[async_trait]
impl ConsumerCallbackHandler for ConsumerCallbacks {
    async fn notify_type_registered(
        &self,
        info_type: &InfoType,
        subscription: &SubscriptionInfo,
    ) -> Result<String, CallbackError> {
        self.post(info_type, subscription, TypeStatus::Registered).await
    }

    async fn notify_type_removed(
        &self,
        info_type: &InfoType,
        subscription: &SubscriptionInfo,
    ) -> Result<String, CallbackError> {
        self.post(info_type, subscription, TypeStatus::Deregistered).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_status_body() {
        let body = serde_json::to_value(ConsumerTypeRegistrationInfo {
            info_type_id: "weather".to_string(),
            job_data_schema: Some(json!({"type": "object"})),
            status: TypeStatus::Deregistered,
        })
        .unwrap();

        assert_eq!(
            body,
            json!({
                "info_type_id": "weather",
                "job_data_schema": {"type": "object"},
                "status": "DEREGISTERED"
            })
        );
    }
}
