//! Sink statistics
//!
//! Lightweight atomic counters maintained by the replication sink, exposed
//! as point-in-time snapshots for operators and tests.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by one replication sink
#[derive(Debug, Default)]
pub struct SinkStats {
    batches_sent: AtomicU64,
    entries_sent: AtomicU64,
    entries_dropped: AtomicU64,
    replica_failures: AtomicU64,
    flush_requests: AtomicU64,
    recoveries: AtomicU64,
}

impl SinkStats {
    pub(crate) fn record_batch(&self, entries: usize) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.entries_sent.fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self, entries: usize) {
        self.entries_dropped.fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_replica_failures(&self, count: usize) {
        self.replica_failures.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_flush_request(&self) {
        self.flush_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recovery(&self) {
        self.recoveries.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time snapshot of all counters
    #[must_use]
    pub fn snapshot(&self) -> SinkStatsSnapshot {
        SinkStatsSnapshot {
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            entries_sent: self.entries_sent.load(Ordering::Relaxed),
            entries_dropped: self.entries_dropped.load(Ordering::Relaxed),
            replica_failures: self.replica_failures.load(Ordering::Relaxed),
            flush_requests: self.flush_requests.load(Ordering::Relaxed),
            recoveries: self.recoveries.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`SinkStats`] counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SinkStatsSnapshot {
    /// Batches handed to the fan-out
    pub batches_sent: u64,
    /// Entries contained in those batches
    pub entries_sent: u64,
    /// Entries discarded without being offered to any replica
    /// (all-replicas-failed gate, overflow, or stop)
    pub entries_dropped: u64,
    /// Per-replica failed calls observed across all batches
    pub replica_failures: u64,
    /// Flushes requested from the owning region
    pub flush_requests: u64,
    /// Flush-recovery events that cleared the failed-replica set
    pub recoveries: u64,
}
