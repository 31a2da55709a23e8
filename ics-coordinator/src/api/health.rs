//! Service status endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::AppState;

/// Status response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusInfo {
    /// Always "hunky dory" while the service answers
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub no_of_producers: usize,
    pub no_of_types: usize,
    pub no_of_jobs: usize,
}

/// GET /status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusInfo> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let coordinator = &state.coordinator;

    Json(StatusInfo {
        status: "hunky dory".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        no_of_producers: coordinator.producers().len(),
        no_of_types: coordinator.types().len(),
        no_of_jobs: coordinator.jobs().len(),
    })
}

/// Build status routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/status", get(get_status))
}
