//! Error types for the replication sink

/// Errors raised when constructing a replication sink
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("region {0} is not the primary replica")]
    NotPrimary(String),

    #[error("replication factor must be greater than 1, got {0}")]
    InvalidReplicationFactor(u32),
}
