use thiserror::Error;

use qskipper_shared::{ImageError, NormalizeError};
use qskipper_store::StoreError;

/// Errors surfaced by the gateway and the services built on it.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Rejected before any network call (unresolved restaurant, bad URL,
    /// missing fields).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    /// HTTP 401. The session has already been invalidated when this is seen.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    /// The session actor has shut down.
    #[error("Session store is not running")]
    Session,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Image(#[from] ImageError),
}

impl ApiError {
    /// Errors that no alternate submission strategy can fix.
    pub fn stops_fallback(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized | ApiError::InvalidInput(_) | ApiError::NotFound(_)
        )
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_builder() {
            ApiError::InvalidInput(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

impl From<NormalizeError> for ApiError {
    fn from(e: NormalizeError) -> Self {
        ApiError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
