//! HTTP API handlers

pub mod consumer;
pub mod health;
pub mod producer;

pub use consumer::consumer_routes;
pub use health::health_routes;
pub use producer::producer_routes;
