//! Error types for the Dynamo replica

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Dynamo error types
#[derive(Debug, Error)]
pub enum Error {
    /// Node is inside its crash window
    #[error("server {0} is currently offline")]
    Unavailable(String),

    /// Crash requested while a crash window is still active
    #[error("server {0} is already crashed")]
    AlreadyCrashed(String),

    /// Candidate context is strictly behind a stored version
    #[error("stale write for key {key}: context is behind a stored version")]
    StaleWrite { key: String },

    /// Candidate carries no causal information the store lacks
    #[error("duplicate write for key {key}")]
    DuplicateWrite { key: String },

    /// Crash window ends beyond what the clock can represent
    #[error("crash duration {0:?} is out of range")]
    InvalidDuration(std::time::Duration),

    /// Configuration could not be used
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether the error is a store-level rejection (the node answered)
    /// rather than the node refusing service.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::StaleWrite { .. } | Error::DuplicateWrite { .. })
    }
}
