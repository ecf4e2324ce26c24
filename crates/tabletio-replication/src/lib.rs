//! TabletIO Replication - write propagation to read replicas
//!
//! The replication sink forwards committed WAL edits from the primary copy
//! of a region to its read-only secondary replicas. Replication is
//! asynchronous and best-effort: the write path never waits on a replica,
//! a slow or dead replica never blocks the primary, and lost history is
//! recovered through the region's durability flush rather than through
//! the sink itself.

pub mod client;
pub mod error;
pub mod guard;
pub mod sink;
pub mod stats;

pub use client::{ReplicaReplicationClient, ReplicationEntry};
pub use error::SinkError;
pub use guard::RpcGuard;
pub use sink::RegionReplicationSink;
pub use stats::{SinkStats, SinkStatsSnapshot};
