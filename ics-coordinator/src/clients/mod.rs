//! Outbound HTTP clients

pub mod rest_client;

pub use rest_client::{CallbackError, HttpRestClient, RestClient};
