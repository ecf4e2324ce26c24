//! Error types for TabletIO
//!
//! This module defines the common error types used throughout the system.

use crate::types::TableNameError;
use thiserror::Error;

/// Common result type for TabletIO operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for TabletIO
#[derive(Debug, Error)]
pub enum Error {
    // Region/table errors
    #[error("region not found: {0}")]
    RegionNotFound(String),

    #[error("region {region} is not open on replica {replica_id}")]
    ReplicaNotOpen { region: String, replica_id: u32 },

    #[error("invalid table name: {0}")]
    InvalidTableName(#[from] TableNameError),

    // Network/RPC errors
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("request timeout")]
    Timeout,

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this is a retryable error
    ///
    /// Retryable errors are transient: the same request may succeed against
    /// the same replica once it catches up or the network recovers.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::ServiceUnavailable(_)
                | Self::ConnectionFailed(_)
                | Self::ReplicaNotOpen { .. }
        )
    }
}
