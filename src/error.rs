//! Error types
//!
//! Every failure the registration core can surface. The retry supervisor
//! turns all of these into status transitions, so callers outside the crate
//! mostly see them through `StreamManager::stop` and `StreamManager::remove_stream`.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for target registration operations
#[derive(Debug, Error)]
pub enum Error {
    /// The conduit did not supply any local address to register
    #[error("no address available on the conduit")]
    NoAddress,

    /// Every identifier of the stream is already in use
    #[error("no identifier available ({in_use} in use, max {max_targets})")]
    IdentifierExhausted { in_use: usize, max_targets: u32 },

    /// A call to the target registry failed
    #[error("target registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// The operation was cancelled on purpose
    #[error("operation cancelled")]
    Cancelled,

    /// The operation did not complete within the configured bound
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Several independent operations failed
    #[error("{} operations failed: {}", .0.len(), join(.0))]
    Multiple(Vec<Error>),
}

impl Error {
    /// Create a registry error from anything printable
    pub fn registry(reason: impl std::fmt::Display) -> Self {
        Error::RegistryUnavailable(reason.to_string())
    }

    /// Whether this error is the result of a deliberate cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

fn join(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
