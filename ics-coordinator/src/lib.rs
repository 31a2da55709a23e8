//! ics-coordinator library interface
//!
//! Registry of information types, producers, jobs and type subscriptions,
//! plus the callback engine that keeps producers and consumers in sync.
//! Exposed as a library for integration testing.

pub mod api;
pub mod callbacks;
pub mod clients;
pub mod error;
pub mod repository;
pub mod service;
pub mod tasks;
pub mod validation;

pub use crate::error::{ApiError, ApiResult};
pub use crate::service::InfoCoordinator;

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<InfoCoordinator>,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(coordinator: Arc<InfoCoordinator>) -> Self {
        Self {
            coordinator,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::producer_routes())
        .merge(api::consumer_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
