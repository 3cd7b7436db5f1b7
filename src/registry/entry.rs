//! Status entry types
//!
//! This module defines the externally visible status of a stream.

use crate::stream::StreamIdentity;

/// Externally visible status of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamStatus {
    /// Stream is not part of the configuration (or not known yet)
    Undefined,
    /// First open attempt in flight, never succeeded yet
    Pending,
    /// Last open attempt succeeded
    Open,
    /// Last open attempt failed or the conduit is down
    Unavailable,
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StreamStatus::Undefined => "UNDEFINED",
            StreamStatus::Pending => "PENDING",
            StreamStatus::Open => "OPEN",
            StreamStatus::Unavailable => "UNAVAILABLE",
        };
        f.write_str(name)
    }
}

/// Status of a single stream in the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Stream identity
    pub stream: StreamIdentity,
    /// Last known status
    pub status: StreamStatus,
}

impl StatusEntry {
    /// Create a new entry
    pub fn new(stream: StreamIdentity, status: StreamStatus) -> Self {
        Self { stream, status }
    }
}
