//! Error types for Pairlink

use thiserror::Error;

/// Main error type for Pairlink operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed JSON or a missing required field. Always local, never
    /// retried; the transport may drop the connection.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid token, role already connected, or content before auth.
    /// Terminal for the connection that caused it.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Unknown or expired pairing id / shortcode. Returned to the
    /// caller as-is, no retry.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal only. A pairing-confirmation timeout is surfaced to
    /// callers as `NotFound`, never as this variant.
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using Pairlink's Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error must terminate the connection it occurred on.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::Auth(_))
    }
}
