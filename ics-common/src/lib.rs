//! # ICS Common Library
//!
//! Shared code for the information coordinator service:
//! - Common error type
//! - Bootstrap configuration loading and vardata resolution
//! - Logging initialisation

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
