//! Per-region replication sink
//!
//! One sink exists per primary region instance. The post-append write path
//! hands it committed WAL edits via [`RegionReplicationSink::add`]; the sink
//! queues them and ships them to every secondary replica in batches, one
//! batch in flight at a time, so each replica observes edits in append
//! order. Replica failures are tracked, never surfaced to the write path,
//! and healed through the region's flush cycle: a flush commit covering
//! every column family makes the queued history redundant (replicas catch
//! up from store files), so it clears both the backlog and the
//! failed-replica set.
//!
//! `add` must run inside a tokio runtime; dispatch is spawned onto it.

use crate::client::{ReplicaReplicationClient, ReplicationEntry};
use crate::error::SinkError;
use crate::guard::RpcGuard;
use crate::stats::{SinkStats, SinkStatsSnapshot};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tabletio_common::config::ReplicationSinkConfig;
use tabletio_common::{RegionDescriptor, Result, TableSchema};
use tabletio_wal::{FlushAction, WalEdit, WalKey};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// One queued edit plus the guard over its borrowed request memory
struct SinkEntry {
    key: WalKey,
    edit: WalEdit,
    // released (dropped) exactly once, after the batch containing this
    // entry resolves or the entry is discarded
    _guard: Option<RpcGuard>,
}

impl SinkEntry {
    fn estimated_size(&self) -> u64 {
        self.key.estimated_size() + self.edit.estimated_size()
    }
}

/// Mutable sink state, all under one lock
struct SinkState {
    entries: VecDeque<SinkEntry>,
    pending_bytes: u64,
    /// Secondary replicas we failed to replicate to; cleared by flush recovery
    failed_replicas: HashSet<u32>,
    sending: bool,
    stopping: bool,
    stopped: bool,
}

struct SinkInner {
    primary: RegionDescriptor,
    schema: TableSchema,
    config: ReplicationSinkConfig,
    flush_requester: Box<dyn Fn() + Send + Sync>,
    client: Arc<dyn ReplicaReplicationClient>,
    state: Mutex<SinkState>,
    stopped_notify: Notify,
    stats: SinkStats,
}

/// Replication sink for one primary region
///
/// Cheaply cloneable handle; all clones share the same state.
#[derive(Clone)]
pub struct RegionReplicationSink {
    inner: Arc<SinkInner>,
}

impl std::fmt::Debug for RegionReplicationSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionReplicationSink")
            .field("primary", &self.inner.primary)
            .finish_non_exhaustive()
    }
}

impl RegionReplicationSink {
    /// Create a sink for the given primary region
    ///
    /// Fails when `primary` is not the primary replica or when the table is
    /// not replicated at all.
    pub fn new(
        config: ReplicationSinkConfig,
        primary: RegionDescriptor,
        schema: TableSchema,
        flush_requester: impl Fn() + Send + Sync + 'static,
        client: Arc<dyn ReplicaReplicationClient>,
    ) -> std::result::Result<Self, SinkError> {
        if !primary.is_primary() {
            return Err(SinkError::NotPrimary(primary.encoded_name()));
        }
        if schema.replication_factor() <= 1 {
            return Err(SinkError::InvalidReplicationFactor(
                schema.replication_factor(),
            ));
        }
        Ok(Self {
            inner: Arc::new(SinkInner {
                primary,
                schema,
                config,
                flush_requester: Box::new(flush_requester),
                client,
                state: Mutex::new(SinkState {
                    entries: VecDeque::new(),
                    pending_bytes: 0,
                    failed_replicas: HashSet::new(),
                    sending: false,
                    stopping: false,
                    stopped: false,
                }),
                stopped_notify: Notify::new(),
                stats: SinkStats::default(),
            }),
        })
    }

    /// Add a committed edit to the replication queue
    ///
    /// Never blocks on replication. The `guard`, when present, transfers
    /// ownership of the edit's borrowed request memory into the sink; it is
    /// released exactly once, whatever the batch outcome. Edits added after
    /// [`stop`](Self::stop) are dropped.
    pub fn add(&self, key: WalKey, edit: WalEdit, guard: Option<RpcGuard>) {
        let inner = &self.inner;
        if !inner.schema.has_region_memstore_replication() && !edit.is_meta_edit() {
            // only meta edits ride the sink when memstore replication is off
            return;
        }
        let mut request_flush = false;
        {
            let mut state = inner.state.lock();
            if state.stopping {
                inner.stats.record_dropped(1);
                return;
            }
            if edit.is_meta_edit() {
                for desc in edit.flush_descriptors() {
                    if desc.action == FlushAction::Commit
                        && desc.covers_all_families(&inner.schema)
                    {
                        debug!(
                            "Got a full flush commit for {}, clearing {} failed replicas and {} pending entries",
                            inner.primary,
                            state.failed_replicas.len(),
                            state.entries.len()
                        );
                        let cleared = state.entries.len();
                        state.entries.clear();
                        state.pending_bytes = 0;
                        state.failed_replicas.clear();
                        if cleared > 0 {
                            inner.stats.record_dropped(cleared);
                        }
                        inner.stats.record_recovery();
                    }
                }
            }
            let size = key.estimated_size() + edit.estimated_size();
            state.pending_bytes += size;
            state.entries.push_back(SinkEntry {
                key,
                edit,
                _guard: guard,
            });
            if !state.sending {
                self.send_locked(&mut state);
            } else if state.pending_bytes > inner.config.max_pending_bytes {
                // the bound caps the backlog accumulating behind an
                // in-flight batch; an entry that dispatches immediately is
                // never backlog
                warn!(
                    "Replication backlog for {} exceeds {} bytes, dropping {} pending entries and requesting a flush",
                    inner.primary,
                    inner.config.max_pending_bytes,
                    state.entries.len()
                );
                let dropped = state.entries.len();
                state.entries.clear();
                state.pending_bytes = 0;
                inner.stats.record_dropped(dropped);
                let mut grew = false;
                for replica_id in 1..inner.schema.replication_factor() {
                    grew |= state.failed_replicas.insert(replica_id);
                }
                request_flush = grew;
            }
        }
        if request_flush {
            inner.stats.record_flush_request();
            (inner.flush_requester)();
        }
    }

    /// Stop the sink
    ///
    /// Called when the owning region closes. Entries still queued are
    /// abandoned; an in-flight batch is allowed to resolve first.
    pub fn stop(&self) {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        state.stopping = true;
        let abandoned = state.entries.len();
        state.entries.clear();
        state.pending_bytes = 0;
        if abandoned > 0 {
            inner.stats.record_dropped(abandoned);
        }
        if !state.sending {
            state.stopped = true;
            inner.stopped_notify.notify_waiters();
        }
    }

    /// Wait until the sink has fully stopped
    ///
    /// After this returns, no further replicate calls will be issued by
    /// this sink instance. Intended for the region-close path, never for a
    /// write-path task.
    pub async fn wait_until_stopped(&self) {
        loop {
            let notified = self.inner.stopped_notify.notified();
            if self.inner.state.lock().stopped {
                return;
            }
            notified.await;
        }
    }

    /// Whether the stop protocol has completed
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.state.lock().stopped
    }

    /// Secondary replicas currently considered failed, in ascending order
    #[must_use]
    pub fn failed_replicas(&self) -> Vec<u32> {
        let state = self.inner.state.lock();
        let mut failed: Vec<u32> = state.failed_replicas.iter().copied().collect();
        failed.sort_unstable();
        failed
    }

    /// Snapshot of the sink's counters
    #[must_use]
    pub fn stats(&self) -> SinkStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Drain the queue into one batch and fan it out
    ///
    /// Caller holds the state lock. The whole queue becomes one batch so the
    /// per-batch order matches append order and later adds start a fresh,
    /// strictly later batch.
    fn send_locked(&self, state: &mut SinkState) {
        if state.entries.is_empty() {
            return;
        }
        let batch: Vec<SinkEntry> = state.entries.drain(..).collect();
        state.pending_bytes = 0;

        let secondaries = self.inner.schema.replication_factor() as usize - 1;
        if secondaries <= state.failed_replicas.len() {
            // no replica is live; the batch is dropped and its guards
            // release here rather than after a send that cannot happen
            debug!(
                "All secondary replicas of {} have failed, dropping a batch of {} entries",
                self.inner.primary,
                batch.len()
            );
            self.inner.stats.record_dropped(batch.len());
            return;
        }

        state.sending = true;
        self.inner.stats.record_batch(batch.len());
        let wire: Arc<Vec<ReplicationEntry>> = Arc::new(
            batch
                .iter()
                .map(|entry| ReplicationEntry {
                    key: entry.key.clone(),
                    edit: entry.edit.clone(),
                })
                .collect(),
        );
        let sink = self.clone();
        tokio::spawn(async move {
            sink.fan_out(batch, wire).await;
        });
    }

    /// Ship one batch to every secondary replica and resolve it
    ///
    /// Every ordinal is attempted, including currently-failed replicas: the
    /// failed set gates whole batches, not individual replicas, so a replica
    /// that comes back starts catching up before the flush lands.
    async fn fan_out(&self, sent: Vec<SinkEntry>, wire: Arc<Vec<ReplicationEntry>>) {
        let inner = &self.inner;
        let retries = inner.config.retries;
        let rpc_timeout = inner.config.rpc_timeout();
        let operation_timeout = inner.config.operation_timeout();

        let calls = (1..inner.schema.replication_factor()).map(|replica_id| {
            let replica = inner.primary.as_replica(replica_id);
            let wire = Arc::clone(&wire);
            let client = Arc::clone(&inner.client);
            async move {
                let result = client
                    .replicate(&replica, &wire, retries, rpc_timeout, operation_timeout)
                    .await;
                (replica_id, result)
            }
        });
        let results = futures::future::join_all(calls).await;
        self.on_complete(sent, results);
    }

    /// Resolve one batch: release guards, record failures, chain the next
    fn on_complete(&self, sent: Vec<SinkEntry>, results: Vec<(u32, Result<()>)>) {
        let inner = &self.inner;
        // the single release point for the batch's borrowed request memory,
        // reached whatever the per-replica outcomes
        drop(sent);

        let mut failed = Vec::new();
        for (replica_id, result) in results {
            if let Err(e) = result {
                warn!(
                    "Failed to replicate to secondary replica {} for {}, waiting for a flush to recover: {}",
                    replica_id, inner.primary, e
                );
                failed.push(replica_id);
            }
        }
        if !failed.is_empty() {
            inner.stats.record_replica_failures(failed.len());
        }

        let mut request_flush = false;
        {
            let mut state = inner.state.lock();
            for replica_id in failed {
                request_flush |= state.failed_replicas.insert(replica_id);
            }
            state.sending = false;
            if state.stopping {
                state.stopped = true;
                inner.stopped_notify.notify_waiters();
            } else if !state.entries.is_empty() {
                self.send_locked(&mut state);
            }
        }
        if request_flush {
            inner.stats.record_flush_request();
            (inner.flush_requester)();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tabletio_common::{Error, TableName};
    use tabletio_wal::{Cell, FlushDescriptor, StoreFlush};
    use tokio::sync::Semaphore;

    /// Mock replica client: records calls, fails configured replicas, and
    /// can hold calls open behind a semaphore to control batch timing.
    #[derive(Default)]
    struct MockClient {
        fail: Mutex<HashSet<u32>>,
        calls: Mutex<Vec<(u32, Vec<u64>)>>,
        gate: Mutex<Option<Arc<Semaphore>>>,
        open_batches: Mutex<HashMap<u64, usize>>,
        overlap: AtomicBool,
    }

    impl MockClient {
        fn fail_replica(&self, replica_id: u32) {
            self.fail.lock().insert(replica_id);
        }

        fn heal_replica(&self, replica_id: u32) {
            self.fail.lock().remove(&replica_id);
        }

        fn hold_calls(&self) -> Arc<Semaphore> {
            let sem = Arc::new(Semaphore::new(0));
            *self.gate.lock() = Some(Arc::clone(&sem));
            sem
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }

        /// Entries observed by one replica, concatenated across batches
        fn observed(&self, replica_id: u32) -> Vec<u64> {
            self.calls
                .lock()
                .iter()
                .filter(|(id, _)| *id == replica_id)
                .flat_map(|(_, seqs)| seqs.iter().copied())
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl ReplicaReplicationClient for MockClient {
        async fn replicate(
            &self,
            replica: &RegionDescriptor,
            entries: &[ReplicationEntry],
            _retries: u32,
            _rpc_timeout: Duration,
            _operation_timeout: Duration,
        ) -> Result<()> {
            let batch_key = entries[0].key.sequence_id;
            {
                let mut open = self.open_batches.lock();
                if !open.is_empty() && !open.contains_key(&batch_key) {
                    self.overlap.store(true, Ordering::SeqCst);
                }
                *open.entry(batch_key).or_insert(0) += 1;
            }

            let gate = self.gate.lock().clone();
            if let Some(sem) = gate {
                sem.acquire().await.expect("gate closed").forget();
            }

            self.calls.lock().push((
                replica.replica_id(),
                entries.iter().map(|e| e.key.sequence_id).collect(),
            ));

            {
                let mut open = self.open_batches.lock();
                let outstanding = open.get_mut(&batch_key).expect("batch not open");
                *outstanding -= 1;
                if *outstanding == 0 {
                    open.remove(&batch_key);
                }
            }

            if self.fail.lock().contains(&replica.replica_id()) {
                return Err(Error::ConnectionFailed(format!(
                    "replica {} unreachable",
                    replica.replica_id()
                )));
            }
            Ok(())
        }
    }

    fn primary() -> RegionDescriptor {
        RegionDescriptor::new(
            TableName::new_unchecked("orders"),
            Bytes::from_static(b"a"),
            Bytes::from_static(b"m"),
        )
    }

    fn schema(replication_factor: u32) -> TableSchema {
        TableSchema::new(
            TableName::new_unchecked("orders"),
            replication_factor,
            ["info", "audit"],
        )
    }

    fn data_edit(seq: u64) -> (WalKey, WalEdit) {
        let key = WalKey::new("orders.r1.0", TableName::new_unchecked("orders"), seq, seq);
        let edit = WalEdit::new(vec![Cell::put("info", &b"qty"[..], seq, &b"3"[..])]);
        (key, edit)
    }

    fn flush_commit_edit(seq: u64, families: &[&str]) -> (WalKey, WalEdit) {
        let desc = FlushDescriptor {
            action: FlushAction::Commit,
            encoded_region_name: "orders.r1.0".to_string(),
            flush_sequence_number: seq,
            store_flushes: families
                .iter()
                .map(|f| StoreFlush {
                    family: (*f).to_string(),
                    flush_output: vec![format!("{f}/file-{seq}")],
                })
                .collect(),
        };
        let key = WalKey::new("orders.r1.0", TableName::new_unchecked("orders"), seq, seq);
        (key, WalEdit::flush_marker(&desc, seq).unwrap())
    }

    fn counting_guard(counter: &Arc<AtomicUsize>) -> Option<RpcGuard> {
        let counter = Arc::clone(counter);
        Some(RpcGuard::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
    }

    struct Fixture {
        sink: RegionReplicationSink,
        client: Arc<MockClient>,
        flush_requests: Arc<AtomicUsize>,
    }

    fn fixture(replication_factor: u32) -> Fixture {
        fixture_with_config(replication_factor, ReplicationSinkConfig::default())
    }

    fn fixture_with_config(replication_factor: u32, config: ReplicationSinkConfig) -> Fixture {
        let client = Arc::new(MockClient::default());
        let flush_requests = Arc::new(AtomicUsize::new(0));
        let flush_counter = Arc::clone(&flush_requests);
        let sink = RegionReplicationSink::new(
            config,
            primary(),
            schema(replication_factor),
            move || {
                flush_counter.fetch_add(1, Ordering::SeqCst);
            },
            Arc::clone(&client) as Arc<dyn ReplicaReplicationClient>,
        )
        .unwrap();
        Fixture {
            sink,
            client,
            flush_requests,
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached within timeout");
    }

    #[test]
    fn test_construction_requires_primary() {
        let client = Arc::new(MockClient::default());
        let not_primary = primary().as_replica(1);
        let err = RegionReplicationSink::new(
            ReplicationSinkConfig::default(),
            not_primary,
            schema(3),
            || {},
            client,
        )
        .unwrap_err();
        assert!(matches!(err, SinkError::NotPrimary(_)));
    }

    #[test]
    fn test_construction_requires_replication() {
        let client = Arc::new(MockClient::default());
        let err = RegionReplicationSink::new(
            ReplicationSinkConfig::default(),
            primary(),
            schema(1),
            || {},
            client,
        )
        .unwrap_err();
        assert!(matches!(err, SinkError::InvalidReplicationFactor(1)));
    }

    #[tokio::test]
    async fn test_batch_reaches_every_secondary_in_order() {
        let f = fixture(3);
        let (key, edit) = data_edit(1);
        f.sink.add(key, edit, None);
        let (key, edit) = data_edit(2);
        f.sink.add(key, edit, None);
        let (key, edit) = data_edit(3);
        f.sink.add(key, edit, None);

        wait_until(|| f.client.observed(1).len() == 3 && f.client.observed(2).len() == 3).await;
        assert_eq!(f.client.observed(1), vec![1, 2, 3]);
        assert_eq!(f.client.observed(2), vec![1, 2, 3]);
        assert!(!f.client.overlap.load(Ordering::SeqCst));
        assert!(f.sink.failed_replicas().is_empty());
        assert_eq!(f.flush_requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_chained_batches_preserve_order() {
        let f = fixture(3);
        let gate = f.client.hold_calls();

        let (key, edit) = data_edit(1);
        f.sink.add(key, edit, None);
        // first batch is in flight and held; these two join a later batch
        let (key, edit) = data_edit(2);
        f.sink.add(key, edit, None);
        let (key, edit) = data_edit(3);
        f.sink.add(key, edit, None);

        gate.add_permits(2);
        wait_until(|| f.client.call_count() == 2).await;
        gate.add_permits(2);
        wait_until(|| f.client.call_count() == 4).await;

        assert_eq!(f.client.observed(1), vec![1, 2, 3]);
        assert_eq!(f.client.observed(2), vec![1, 2, 3]);
        assert!(!f.client.overlap.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_at_most_one_batch_in_flight_under_concurrency() {
        let f = fixture(3);
        let mut producers = Vec::new();
        for p in 0..3u64 {
            let sink = f.sink.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..100u64 {
                    let (key, edit) = data_edit(p * 100 + i + 1);
                    sink.add(key, edit, None);
                    tokio::task::yield_now().await;
                }
            }));
        }
        for p in producers {
            p.await.unwrap();
        }

        wait_until(|| f.client.observed(1).len() == 300 && f.client.observed(2).len() == 300).await;
        assert!(!f.client.overlap.load(Ordering::SeqCst));
        // both replicas observe the same global order
        assert_eq!(f.client.observed(1), f.client.observed(2));
    }

    #[tokio::test]
    async fn test_failed_replica_recorded_and_flush_requested_once() {
        let f = fixture(3);
        f.client.fail_replica(2);
        let released = Arc::new(AtomicUsize::new(0));

        for seq in 1..=3 {
            let (key, edit) = data_edit(seq);
            f.sink.add(key, edit, counting_guard(&released));
        }

        wait_until(|| f.client.observed(1).len() == 3).await;
        wait_until(|| released.load(Ordering::SeqCst) == 3).await;

        assert_eq!(f.sink.failed_replicas(), vec![2]);
        // replica 2 failed in both batches, but only the first failure is new
        assert_eq!(f.flush_requests.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_replica_still_receives_batches() {
        let f = fixture(3);
        f.client.fail_replica(2);

        let (key, edit) = data_edit(1);
        f.sink.add(key, edit, None);
        wait_until(|| f.sink.failed_replicas() == vec![2]).await;

        let (key, edit) = data_edit(2);
        f.sink.add(key, edit, None);
        wait_until(|| f.client.observed(1) == vec![1, 2]).await;

        // the failed set gates batches, it does not filter ordinals
        wait_until(|| f.client.observed(2) == vec![1, 2]).await;
    }

    #[tokio::test]
    async fn test_all_replicas_failed_discards_batch_and_releases_guards() {
        let f = fixture(3);
        f.client.fail_replica(1);
        f.client.fail_replica(2);
        let released = Arc::new(AtomicUsize::new(0));

        let (key, edit) = data_edit(1);
        f.sink.add(key, edit, counting_guard(&released));
        wait_until(|| f.sink.failed_replicas() == vec![1, 2]).await;
        wait_until(|| released.load(Ordering::SeqCst) == 1).await;
        let calls_after_first = f.client.call_count();
        assert_eq!(f.flush_requests.load(Ordering::SeqCst), 1);

        // with every secondary failed the next batch is dropped outright:
        // no calls are issued and the guard is handed back immediately
        let (key, edit) = data_edit(2);
        f.sink.add(key, edit, counting_guard(&released));
        wait_until(|| released.load(Ordering::SeqCst) == 2).await;
        assert_eq!(f.client.call_count(), calls_after_first);
        assert!(f.sink.stats().entries_dropped >= 1);
    }

    #[tokio::test]
    async fn test_flush_commit_clears_backlog_and_failed_replicas() {
        let f = fixture(3);
        f.client.fail_replica(1);
        f.client.fail_replica(2);
        let released = Arc::new(AtomicUsize::new(0));

        let (key, edit) = data_edit(1);
        f.sink.add(key, edit, None);
        wait_until(|| f.sink.failed_replicas() == vec![1, 2]).await;

        // queued behind nothing; dropped by the all-failed gate
        let (key, edit) = data_edit(2);
        f.sink.add(key, edit, counting_guard(&released));
        wait_until(|| released.load(Ordering::SeqCst) == 1).await;

        f.client.heal_replica(1);
        f.client.heal_replica(2);

        let (key, edit) = flush_commit_edit(3, &["info", "audit"]);
        f.sink.add(key, edit, None);

        assert!(f.sink.failed_replicas().is_empty());
        // the marker itself is replicated so secondaries observe the flush
        // (entry 1 was offered to both replicas before they failed)
        wait_until(|| f.client.observed(1) == vec![1, 3] && f.client.observed(2) == vec![1, 3])
            .await;
        assert_eq!(f.sink.stats().recoveries, 1);

        let (key, edit) = data_edit(4);
        f.sink.add(key, edit, None);
        wait_until(|| f.client.observed(1) == vec![1, 3, 4]).await;
    }

    #[tokio::test]
    async fn test_partial_or_start_flush_does_not_recover() {
        let f = fixture(3);
        f.client.fail_replica(2);

        let (key, edit) = data_edit(1);
        f.sink.add(key, edit, None);
        wait_until(|| f.sink.failed_replicas() == vec![2]).await;

        // covers only one of two families
        let (key, edit) = flush_commit_edit(2, &["info"]);
        f.sink.add(key, edit, None);
        assert_eq!(f.sink.failed_replicas(), vec![2]);

        // full coverage but not a commit
        let desc = FlushDescriptor {
            action: FlushAction::Start,
            encoded_region_name: "orders.r1.0".to_string(),
            flush_sequence_number: 3,
            store_flushes: ["info", "audit"]
                .iter()
                .map(|family| StoreFlush {
                    family: (*family).to_string(),
                    flush_output: Vec::new(),
                })
                .collect(),
        };
        let key = WalKey::new("orders.r1.0", TableName::new_unchecked("orders"), 3, 3);
        f.sink.add(key, WalEdit::flush_marker(&desc, 3).unwrap(), None);
        assert_eq!(f.sink.failed_replicas(), vec![2]);
        assert_eq!(f.sink.stats().recoveries, 0);
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_batch() {
        let f = fixture(3);
        let gate = f.client.hold_calls();

        let (key, edit) = data_edit(1);
        f.sink.add(key, edit, None);
        f.sink.stop();
        assert!(!f.sink.is_stopped());

        // the in-flight batch has not resolved, so the waiter must not return
        let waited = tokio::time::timeout(Duration::from_millis(50), f.sink.wait_until_stopped())
            .await;
        assert!(waited.is_err());

        gate.add_permits(2);
        tokio::time::timeout(Duration::from_secs(2), f.sink.wait_until_stopped())
            .await
            .expect("sink did not stop after the batch resolved");
        assert!(f.sink.is_stopped());
    }

    #[tokio::test]
    async fn test_add_after_stop_is_dropped() {
        let f = fixture(3);
        f.sink.stop();
        tokio::time::timeout(Duration::from_secs(2), f.sink.wait_until_stopped())
            .await
            .unwrap();

        let released = Arc::new(AtomicUsize::new(0));
        let (key, edit) = data_edit(1);
        f.sink.add(key, edit, counting_guard(&released));

        assert_eq!(f.client.call_count(), 0);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_abandons_queued_entries() {
        let f = fixture(3);
        let gate = f.client.hold_calls();
        let released = Arc::new(AtomicUsize::new(0));

        let (key, edit) = data_edit(1);
        f.sink.add(key, edit, None);
        // queued behind the held batch
        let (key, edit) = data_edit(2);
        f.sink.add(key, edit, counting_guard(&released));

        f.sink.stop();
        assert_eq!(released.load(Ordering::SeqCst), 1);

        gate.add_permits(2);
        tokio::time::timeout(Duration::from_secs(2), f.sink.wait_until_stopped())
            .await
            .unwrap();
        // the abandoned entry was never offered to a replica
        assert_eq!(f.client.observed(1), vec![1]);
        assert_eq!(f.client.observed(2), vec![1]);
    }

    #[tokio::test]
    async fn test_overflow_drops_backlog_and_requests_flush() {
        let config = ReplicationSinkConfig {
            max_pending_bytes: 1,
            ..ReplicationSinkConfig::default()
        };
        let f = fixture_with_config(3, config);
        let gate = f.client.hold_calls();
        let released = Arc::new(AtomicUsize::new(0));

        // the first add dispatches immediately, so the bound is not checked
        // against it; the backlog that accumulates behind it overflows
        let (key, edit) = data_edit(1);
        f.sink.add(key, edit, None);
        let (key, edit) = data_edit(2);
        f.sink.add(key, edit, counting_guard(&released));

        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(f.sink.failed_replicas(), vec![1, 2]);
        assert_eq!(f.flush_requests.load(Ordering::SeqCst), 1);

        gate.add_permits(2);
        wait_until(|| f.client.call_count() == 2).await;
        // nothing left to chain after the overflow drop
        assert_eq!(f.client.observed(1), vec![1]);
        assert_eq!(f.client.observed(2), vec![1]);
    }

    #[tokio::test]
    async fn test_memstore_replication_disabled_skips_data_edits() {
        let client = Arc::new(MockClient::default());
        let sink = RegionReplicationSink::new(
            ReplicationSinkConfig::default(),
            primary(),
            schema(3).without_memstore_replication(),
            || {},
            Arc::clone(&client) as Arc<dyn ReplicaReplicationClient>,
        )
        .unwrap();

        let (key, edit) = data_edit(1);
        sink.add(key, edit, None);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(client.call_count(), 0);

        // meta edits still ride the sink
        let (key, edit) = flush_commit_edit(2, &["info", "audit"]);
        sink.add(key, edit, None);
        wait_until(|| client.observed(1) == vec![2] && client.observed(2) == vec![2]).await;
    }
}
