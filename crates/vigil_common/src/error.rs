//! Error types for Vigil.
//!
//! Caller misuse (unknown service, bad window, bad status) surfaces as a
//! typed rejection with a readable reason. Missing data never lands
//! here: an empty window or absent history is a valid result, not an
//! error.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum VigilError {
    #[error("Service not found: {0}")]
    ServiceNotFound(Uuid),

    #[error("Service is disabled or deleted: {0}")]
    ServiceUnavailable(Uuid),

    #[error("Model binding not found: {0}")]
    BindingNotFound(Uuid),

    #[error("Invalid time window: start {start} must be before end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Invalid training status: {0}")]
    InvalidStatus(String),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
