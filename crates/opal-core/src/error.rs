//! Error types for opal-core.

use thiserror::Error;

/// Result type alias for opal-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while validating or building requests.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A required field was missing or empty after trimming.
    #[error("{field} is required and cannot be empty")]
    MissingField { field: &'static str },

    /// A numeric ID was zero or negative.
    #[error("{field} must be a positive integer")]
    InvalidId { field: &'static str },

    /// A date string was not in YYYY-MM-DD form.
    #[error("{field} must be in YYYY-MM-DD format")]
    InvalidDate { field: &'static str },

    /// A value was outside its allowed set or range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
