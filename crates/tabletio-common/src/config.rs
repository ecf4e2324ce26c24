//! Configuration types for TabletIO
//!
//! This module defines configuration structures used across components.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for TabletIO
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Node configuration
    pub node: NodeConfig,
    /// Replication sink configuration
    pub replication: ReplicationSinkConfig,
}

/// Node identity configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name (human-readable identifier)
    pub name: String,
    /// Data directory for metadata and state
    pub data_dir: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "tabletio-node".to_string(),
            data_dir: PathBuf::from("/var/lib/tabletio"),
        }
    }
}

/// Configuration for the per-region replication sink
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicationSinkConfig {
    /// Maximum bytes of edits queued before the sink drops the backlog
    /// and falls back to flush-based catch-up (default: 10 MiB)
    pub max_pending_bytes: u64,
    /// Retry budget handed to the replica RPC client per call
    pub retries: u32,
    /// Per-attempt RPC timeout in milliseconds
    pub rpc_timeout_ms: u64,
    /// Overall per-replica operation timeout in milliseconds,
    /// covering all retry attempts
    pub operation_timeout_ms: u64,
}

impl ReplicationSinkConfig {
    /// Per-attempt RPC timeout
    #[must_use]
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// Overall per-replica operation timeout
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

impl Default for ReplicationSinkConfig {
    fn default() -> Self {
        Self {
            max_pending_bytes: 10 * 1024 * 1024, // 10 MiB
            retries: 3,
            rpc_timeout_ms: 200,
            operation_timeout_ms: 1000,
        }
    }
}
