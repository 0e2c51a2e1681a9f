//! Error types for the Gatehouse service.

use thiserror::Error;

use crate::session::SessionError;

/// Main error type for Gatehouse operations.
#[derive(Error, Debug)]
pub enum GatehouseError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session codec errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for GatehouseError {
    fn from(err: ::config::ConfigError) -> Self {
        GatehouseError::Config(err.to_string())
    }
}

/// Result type alias for Gatehouse operations.
pub type Result<T> = std::result::Result<T, GatehouseError>;

/// Why a request was refused admission.
///
/// Every variant is a per-request outcome, never a process fault. `InvalidToken`
/// and `Expired` render identically to the client but are kept apart so logs can
/// tell tampering from ordinary session aging.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("rate limit exceeded")]
    RateLimitExceeded {
        /// Milliseconds until a slot frees up in the window
        retry_after_ms: u64,
    },

    #[error("no session token presented")]
    MissingSession,

    #[error("session token is invalid")]
    InvalidToken,

    #[error("session token has expired")]
    Expired,

    #[error("insufficient role for this route")]
    InsufficientRole,
}

impl AdmissionError {
    /// Stable machine-readable label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AdmissionError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            AdmissionError::MissingSession => "missing_session",
            AdmissionError::InvalidToken => "invalid_token",
            AdmissionError::Expired => "expired",
            AdmissionError::InsufficientRole => "insufficient_role",
        }
    }

    /// Whether the failure means the caller is not authenticated.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            AdmissionError::MissingSession | AdmissionError::InvalidToken | AdmissionError::Expired
        )
    }
}

impl From<SessionError> for AdmissionError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Expired { .. } => AdmissionError::Expired,
            _ => AdmissionError::InvalidToken,
        }
    }
}
