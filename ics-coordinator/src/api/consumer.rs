//! Consumer API (`/data-consumer/v1`)
//!
//! Consumers browse types, manage their information jobs and subscribe to
//! type availability changes.

use super::producer::created_or_ok;
use crate::callbacks::JobStatusValue;
use crate::service::JobDefinition;
use crate::{ApiResult, AppState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const API_ROOT: &str = "/data-consumer/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConsumerTypeStatus {
    Enabled,
    Disabled,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConsumerInfoTypeInfo {
    pub job_data_schema: Option<Value>,
    pub type_status: ConsumerTypeStatus,
    pub no_of_producers: usize,
}

/// Job definition as sent and returned by consumers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsumerJobInfo {
    #[serde(default)]
    pub info_type_id: String,
    #[serde(default)]
    pub job_owner: String,
    #[serde(default)]
    pub job_definition: Value,
    #[serde(default)]
    pub job_result_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_notification_uri: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConsumerJobStatus {
    pub info_job_status: JobStatusValue,
    pub producers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsumerTypeSubscriptionInfo {
    #[serde(default)]
    pub status_result_uri: String,
    #[serde(default)]
    pub owner: String,
}

#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    #[serde(rename = "infoTypeId")]
    pub info_type_id: Option<String>,
    pub owner: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PutJobQuery {
    #[serde(rename = "typeCheck", default)]
    pub type_check: bool,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionListQuery {
    pub owner: Option<String>,
}

/// GET /info-types
pub async fn list_info_types(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.coordinator.type_ids())
}

/// GET /info-types/:id
pub async fn get_info_type(
    State(state): State<AppState>,
    Path(type_id): Path<String>,
) -> ApiResult<Json<ConsumerInfoTypeInfo>> {
    let info = state.coordinator.consumer_type_info(&type_id)?;
    Ok(Json(ConsumerInfoTypeInfo {
        job_data_schema: info.job_data_schema,
        type_status: if info.available {
            ConsumerTypeStatus::Enabled
        } else {
            ConsumerTypeStatus::Disabled
        },
        no_of_producers: info.no_of_producers,
    }))
}

/// GET /info-jobs?infoTypeId=&owner=
pub async fn list_jobs(State(state): State<AppState>, Query(query): Query<JobListQuery>) -> Json<Vec<String>> {
    Json(
        state
            .coordinator
            .job_ids(query.info_type_id.as_deref(), query.owner.as_deref()),
    )
}

/// GET /info-jobs/:id
pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Json<ConsumerJobInfo>> {
    let job = state.coordinator.get_job(&job_id)?;
    Ok(Json(ConsumerJobInfo {
        info_type_id: job.type_id.clone(),
        job_owner: job.owner.clone(),
        job_definition: job.job_data.clone(),
        job_result_uri: job.target_url.clone(),
        status_notification_uri: job.job_status_url.clone(),
    }))
}

/// GET /info-jobs/:id/status
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ConsumerJobStatus>> {
    let report = state.coordinator.job_status(&job_id)?;
    Ok(Json(ConsumerJobStatus {
        info_job_status: report.enabled.into(),
        producers: report.producers,
    }))
}

/// PUT /info-jobs/:id?typeCheck=
///
/// Answers once every producer of the type has been offered the job.
pub async fn put_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<PutJobQuery>,
    Json(body): Json<ConsumerJobInfo>,
) -> ApiResult<StatusCode> {
    let definition = JobDefinition {
        type_id: body.info_type_id,
        owner: body.job_owner,
        job_data: body.job_definition,
        target_url: body.job_result_uri,
        job_status_url: body.status_notification_uri,
    };
    let outcome = state.coordinator.put_job(&job_id, definition, query.type_check).await?;
    Ok(created_or_ok(outcome))
}

/// DELETE /info-jobs/:id
pub async fn delete_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<StatusCode> {
    state.coordinator.delete_job(&job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /info-type-subscription?owner=
pub async fn list_subscriptions(
    State(state): State<AppState>,
    Query(query): Query<SubscriptionListQuery>,
) -> Json<Vec<String>> {
    Json(state.coordinator.subscription_ids(query.owner.as_deref()))
}

/// GET /info-type-subscription/:id
pub async fn get_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
) -> ApiResult<Json<ConsumerTypeSubscriptionInfo>> {
    let subscription = state.coordinator.get_subscription(&subscription_id)?;
    Ok(Json(ConsumerTypeSubscriptionInfo {
        status_result_uri: subscription.callback_url.clone(),
        owner: subscription.owner.clone(),
    }))
}

/// PUT /info-type-subscription/:id
pub async fn put_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
    Json(body): Json<ConsumerTypeSubscriptionInfo>,
) -> ApiResult<StatusCode> {
    let outcome = state
        .coordinator
        .put_subscription(&subscription_id, &body.status_result_uri, &body.owner)?;
    Ok(created_or_ok(outcome))
}

/// DELETE /info-type-subscription/:id
pub async fn delete_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.coordinator.delete_subscription(&subscription_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Build consumer API routes
pub fn consumer_routes() -> Router<AppState> {
    Router::new().nest(
        API_ROOT,
        Router::new()
            .route("/info-types", get(list_info_types))
            .route("/info-types/:id", get(get_info_type))
            .route("/info-jobs", get(list_jobs))
            .route("/info-jobs/:id", get(get_job).put(put_job).delete(delete_job))
            .route("/info-jobs/:id/status", get(get_job_status))
            .route("/info-type-subscription", get(list_subscriptions))
            .route(
                "/info-type-subscription/:id",
                get(get_subscription).put(put_subscription).delete(delete_subscription),
            ),
    )
}
