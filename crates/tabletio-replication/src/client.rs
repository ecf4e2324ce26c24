//! Replica replication client interface
//!
//! The sink ships batches over an RPC transport it does not own. Transport,
//! serialization, and retry/backoff policy all live behind this trait; the
//! sink only sees one async call per replica per batch and a result on the
//! other end.

use async_trait::async_trait;
use std::time::Duration;
use tabletio_common::{RegionDescriptor, Result};
use tabletio_wal::{WalEdit, WalKey};

/// One WAL entry as shipped to a replica
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicationEntry {
    /// Key of the edit
    pub key: WalKey,
    /// The edit itself
    pub edit: WalEdit,
}

/// Client used to replicate a batch of WAL entries to one replica
///
/// Implementations enforce `retries`, the per-attempt `rpc_timeout`, and
/// the overall `operation_timeout`; the sink never retries on its own. A
/// timeout surfaces through the same error channel as any other failure.
#[async_trait]
pub trait ReplicaReplicationClient: Send + Sync {
    /// Apply `entries`, in order, to the given replica
    async fn replicate(
        &self,
        replica: &RegionDescriptor,
        entries: &[ReplicationEntry],
        retries: u32,
        rpc_timeout: Duration,
        operation_timeout: Duration,
    ) -> Result<()>;
}
