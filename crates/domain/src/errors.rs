//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Tandem
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum TandemError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    /// The provider grant is revoked or unusable; the user must re-authorize.
    /// Retrying will not help, callers must surface this distinctly.
    #[error("Reauthorization required: {0}")]
    ReauthRequired(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Tandem operations
pub type Result<T> = std::result::Result<T, TandemError>;
