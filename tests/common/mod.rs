//! Shared test utilities for integration and property tests.
//!
//! This module provides:
//! - A programmable in-process upstream oplog (`MockUpstream`)
//! - A recording replica-set state machine (`MockReplicaSet`)
//! - Entry builders and a pipeline harness

pub mod mock_replset;
pub mod mock_upstream;

pub use mock_replset::*;
pub use mock_upstream::*;

use oplog_sync::{
    Gtid, GtidManager, MemoryGtidManager, MemoryOplog, OplogEntry, OplogStore, ReplicaSet,
    ReplicationPipeline, SyncConfig,
};
use serde_json::json;
use std::future::Future;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One entry of a deterministic chain: `gtid (1, seq)`, `ts = ts0 + seq*10`,
/// `h = hash_seed + seq`.
pub fn chain_entry(seq: u64, ts: u64, h: u64) -> OplogEntry {
    OplogEntry::new(Gtid::new(1, seq), ts, h, json!({ "op": "n", "seq": seq }))
}

/// A run of chain entries.
pub fn chain(seqs: RangeInclusive<u64>, ts0: u64, hash_seed: u64) -> Vec<OplogEntry> {
    seqs.map(|s| chain_entry(s, ts0 + s * 10, hash_seed + s))
        .collect()
}

/// Everything a pipeline test needs, wired to one upstream ("peer-1").
pub struct Harness {
    pub pipeline: ReplicationPipeline,
    pub replset: Arc<MockReplicaSet>,
    pub gtids: Arc<MemoryGtidManager>,
    pub store: Arc<MemoryOplog>,
    pub upstream: MockUpstream,
}

/// Build a harness: the upstream serves `upstream_log`, the local node
/// starts with `local_log` (GTID bookkeeping seeded from its last entry).
pub async fn harness(upstream_log: Vec<OplogEntry>, local_log: Vec<OplogEntry>) -> Harness {
    harness_with(SyncConfig::for_testing(), upstream_log, local_log).await
}

pub async fn harness_with(
    config: SyncConfig,
    upstream_log: Vec<OplogEntry>,
    local_log: Vec<OplogEntry>,
) -> Harness {
    let gtids = Arc::new(match local_log.last() {
        Some(last) => MemoryGtidManager::seeded(last.gtid, last.ts, last.h),
        None => MemoryGtidManager::new(),
    });
    let store = Arc::new(MemoryOplog::seeded(local_log).await);
    let upstream = MockUpstream::new("peer-1", upstream_log);
    let connector = Arc::new(MockConnector::single(upstream.clone()));
    let replset = Arc::new(MockReplicaSet::new(vec!["peer-1"]));

    let pipeline = ReplicationPipeline::new(
        config,
        Arc::clone(&replset) as Arc<dyn ReplicaSet>,
        Arc::clone(&gtids) as Arc<dyn GtidManager>,
        Arc::clone(&store) as Arc<dyn OplogStore>,
        connector,
    );

    Harness {
        pipeline,
        replset,
        gtids,
        store,
        upstream,
    }
}

/// Poll `f` until it returns true or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut f: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if f().await {
            return true;
        }
        if Instant::now() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
