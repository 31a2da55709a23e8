//! Producer API (`/data-producer/v1`)
//!
//! Producers register the types they can supply and themselves.

use crate::callbacks::ProducerJobInfo;
use crate::repository::ProducerRegistrationInfo;
use crate::service::PutOutcome;
use crate::{ApiResult, AppState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const API_ROOT: &str = "/data-producer/v1";

/// Type definition as registered by a producer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProducerInfoTypeInfo {
    #[serde(default)]
    pub info_job_data_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_type_information: Option<Value>,
}

/// Producer registration body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProducerInfo {
    #[serde(default)]
    pub supported_info_types: Vec<String>,
    #[serde(default)]
    pub info_job_callback_url: String,
    #[serde(default)]
    pub info_producer_supervision_callback_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationalState {
    Enabled,
    Disabled,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProducerStatusInfo {
    pub operational_state: OperationalState,
}

#[derive(Debug, Deserialize)]
pub struct ProducerListQuery {
    #[serde(rename = "infoTypeId")]
    pub info_type_id: Option<String>,
}

pub(crate) fn created_or_ok(outcome: PutOutcome) -> StatusCode {
    match outcome {
        PutOutcome::Created => StatusCode::CREATED,
        PutOutcome::Updated => StatusCode::OK,
    }
}

/// GET /info-types
pub async fn list_info_types(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.coordinator.type_ids())
}

/// GET /info-types/:id
pub async fn get_info_type(
    State(state): State<AppState>,
    Path(type_id): Path<String>,
) -> ApiResult<Json<ProducerInfoTypeInfo>> {
    let info_type = state.coordinator.get_type(&type_id)?;
    Ok(Json(ProducerInfoTypeInfo {
        info_job_data_schema: info_type.job_data_schema.clone(),
        info_type_information: info_type.type_specific_info.clone(),
    }))
}

/// PUT /info-types/:id
///
/// 201 for a new type, 200 for a replaced one, 400 without a schema.
pub async fn put_info_type(
    State(state): State<AppState>,
    Path(type_id): Path<String>,
    Json(body): Json<ProducerInfoTypeInfo>,
) -> ApiResult<StatusCode> {
    let outcome = state
        .coordinator
        .put_type(&type_id, body.info_job_data_schema, body.info_type_information)?;
    Ok(created_or_ok(outcome))
}

/// DELETE /info-types/:id
///
/// 409 while any producer still supports the type.
pub async fn delete_info_type(State(state): State<AppState>, Path(type_id): Path<String>) -> ApiResult<StatusCode> {
    state.coordinator.delete_type(&type_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /info-producers?infoTypeId=
pub async fn list_producers(
    State(state): State<AppState>,
    Query(query): Query<ProducerListQuery>,
) -> Json<Vec<String>> {
    Json(state.coordinator.producer_ids(query.info_type_id.as_deref()))
}

/// GET /info-producers/:id
pub async fn get_producer(
    State(state): State<AppState>,
    Path(producer_id): Path<String>,
) -> ApiResult<Json<ProducerInfo>> {
    let producer = state.coordinator.get_producer(&producer_id)?;
    Ok(Json(ProducerInfo {
        supported_info_types: producer.type_ids(),
        info_job_callback_url: producer.job_callback_url().to_string(),
        info_producer_supervision_callback_url: producer.supervision_callback_url().to_string(),
    }))
}

/// PUT /info-producers/:id
pub async fn put_producer(
    State(state): State<AppState>,
    Path(producer_id): Path<String>,
    Json(body): Json<ProducerInfo>,
) -> ApiResult<StatusCode> {
    let outcome = state.coordinator.put_producer(ProducerRegistrationInfo {
        id: producer_id,
        supported_type_ids: body.supported_info_types,
        job_callback_url: body.info_job_callback_url,
        supervision_callback_url: body.info_producer_supervision_callback_url,
    })?;
    Ok(created_or_ok(outcome))
}

/// DELETE /info-producers/:id
pub async fn delete_producer(State(state): State<AppState>, Path(producer_id): Path<String>) -> ApiResult<StatusCode> {
    state.coordinator.delete_producer(&producer_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /info-producers/:id/status
pub async fn get_producer_status(
    State(state): State<AppState>,
    Path(producer_id): Path<String>,
) -> ApiResult<Json<ProducerStatusInfo>> {
    let operational_state = if state.coordinator.producer_status(&producer_id)? {
        OperationalState::Enabled
    } else {
        OperationalState::Disabled
    };
    Ok(Json(ProducerStatusInfo { operational_state }))
}

/// GET /info-producers/:id/info-jobs
pub async fn get_producer_jobs(
    State(state): State<AppState>,
    Path(producer_id): Path<String>,
) -> ApiResult<Json<Vec<ProducerJobInfo>>> {
    Ok(Json(state.coordinator.producer_jobs(&producer_id)?))
}

/// Build producer API routes
pub fn producer_routes() -> Router<AppState> {
    Router::new().nest(
        API_ROOT,
        Router::new()
            .route("/info-types", get(list_info_types))
            .route(
                "/info-types/:id",
                get(get_info_type).put(put_info_type).delete(delete_info_type),
            )
            .route("/info-producers", get(list_producers))
            .route(
                "/info-producers/:id",
                get(get_producer).put(put_producer).delete(delete_producer),
            )
            .route("/info-producers/:id/status", get(get_producer_status))
            .route("/info-producers/:id/info-jobs", get(get_producer_jobs)),
    )
}
