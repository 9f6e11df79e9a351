// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local oplog store contract, plus an in-memory implementation for
//! testing and standalone mode.
//!
//! The storage engine owns transactions: every trait operation wraps its own
//! serializable transaction and commits before returning. The pipeline's
//! durability-ordering invariant (an entry is in the local oplog before it is
//! enqueued for apply) follows from calling [`OplogStore::replicate_to_oplog`]
//! before the queue push, nothing more.

use crate::entry::OplogEntry;
use crate::error::SyncError;
use crate::gtid::Gtid;
use crate::remote::BoxFuture;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// The local durable state the pipeline reads and writes.
pub trait OplogStore: Send + Sync {
    /// Append a replicated entry to the local oplog (serializable, no-sync
    /// commit: durability is bounded by the primary's ack policy).
    fn replicate_to_oplog(&self, entry: &OplogEntry) -> BoxFuture<'_, ()>;

    /// Apply a transaction to local state under its own transaction.
    fn apply_from_oplog(&self, entry: &OplogEntry) -> BoxFuture<'_, ()>;

    /// Undo a transaction's payload and remove its oplog entry.
    fn rollback_from_oplog(&self, entry: &OplogEntry) -> BoxFuture<'_, ()>;

    /// The newest entry in the local oplog, if any.
    fn last_entry(&self) -> BoxFuture<'_, Option<OplogEntry>>;

    /// Point lookup by GTID.
    fn find_by_gtid(&self, gtid: Gtid) -> BoxFuture<'_, Option<OplogEntry>>;

    /// Bump and return the rollback id, invalidating resumable client
    /// cursors created before it.
    fn next_rollback_id(&self) -> u64;

    /// Invalidate all client cursors.
    fn invalidate_cursors(&self) -> BoxFuture<'_, ()>;

    /// Abort all live multi-statement transactions.
    fn abort_live_transactions(&self) -> BoxFuture<'_, ()>;
}

#[derive(Debug, Default)]
struct MemoryOplogState {
    /// The oplog itself, in GTID order.
    log: Vec<OplogEntry>,
    /// GTIDs in the order they were applied.
    applied: Vec<Gtid>,
    /// GTIDs in the order they were undone.
    rolled_back: Vec<Gtid>,
}

/// In-memory [`OplogStore`] for testing and standalone mode.
///
/// Records apply and undo order for assertions, and can inject apply
/// failures and delays to exercise the pipeline's retry and flow-control
/// paths.
#[derive(Debug, Default)]
pub struct MemoryOplog {
    state: Mutex<MemoryOplogState>,
    rollback_id: AtomicU64,
    cursor_invalidations: AtomicU64,
    txn_aborts: AtomicU64,
    /// Fail this many applies before succeeding again.
    fail_applies: AtomicUsize,
    /// Artificial per-apply delay, in microseconds.
    apply_delay_us: AtomicU64,
}

impl MemoryOplog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing oplog (entries must be in GTID order).
    pub async fn seeded(entries: Vec<OplogEntry>) -> Self {
        let store = Self::new();
        store.state.lock().await.log = entries;
        store
    }

    /// Make the next `n` applies fail.
    pub fn fail_next_applies(&self, n: usize) {
        self.fail_applies.store(n, Ordering::SeqCst);
    }

    /// Slow every apply down, to exercise flow control.
    pub fn set_apply_delay(&self, delay: Duration) {
        self.apply_delay_us
            .store(delay.as_micros() as u64, Ordering::SeqCst);
    }

    /// The oplog contents, in order.
    pub async fn log(&self) -> Vec<OplogEntry> {
        self.state.lock().await.log.clone()
    }

    /// GTIDs in apply order.
    pub async fn applied(&self) -> Vec<Gtid> {
        self.state.lock().await.applied.clone()
    }

    /// GTIDs in undo order.
    pub async fn rolled_back(&self) -> Vec<Gtid> {
        self.state.lock().await.rolled_back.clone()
    }

    pub fn rollback_id(&self) -> u64 {
        self.rollback_id.load(Ordering::SeqCst)
    }

    pub fn cursor_invalidations(&self) -> u64 {
        self.cursor_invalidations.load(Ordering::SeqCst)
    }

    pub fn txn_aborts(&self) -> u64 {
        self.txn_aborts.load(Ordering::SeqCst)
    }
}

impl OplogStore for MemoryOplog {
    fn replicate_to_oplog(&self, entry: &OplogEntry) -> BoxFuture<'_, ()> {
        let entry = entry.clone();
        Box::pin(async move {
            let mut st = self.state.lock().await;
            if let Some(last) = st.log.last() {
                if entry.gtid <= last.gtid {
                    return Err(SyncError::Storage(format!(
                        "out-of-order oplog write: {} after {}",
                        entry.gtid, last.gtid
                    )));
                }
            }
            st.log.push(entry);
            Ok(())
        })
    }

    fn apply_from_oplog(&self, entry: &OplogEntry) -> BoxFuture<'_, ()> {
        let entry = entry.clone();
        Box::pin(async move {
            let delay = self.apply_delay_us.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_micros(delay)).await;
            }

            let remaining = self.fail_applies.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_applies.store(remaining - 1, Ordering::SeqCst);
                return Err(SyncError::Apply(format!(
                    "injected apply failure for {}",
                    entry.gtid
                )));
            }

            let mut st = self.state.lock().await;
            if st.applied.contains(&entry.gtid) {
                return Err(SyncError::Apply(format!(
                    "{} applied twice",
                    entry.gtid
                )));
            }
            st.applied.push(entry.gtid);
            Ok(())
        })
    }

    fn rollback_from_oplog(&self, entry: &OplogEntry) -> BoxFuture<'_, ()> {
        let gtid = entry.gtid;
        Box::pin(async move {
            let mut st = self.state.lock().await;
            let last_gtid = st.log.last().map(|e| e.gtid);
            if last_gtid != Some(gtid) {
                let found = last_gtid.map(|g| g.to_string());
                return Err(SyncError::Storage(format!(
                    "rollback_from_oplog expected last entry {gtid}, found {found:?}"
                )));
            }
            st.log.pop();
            st.applied.retain(|g| *g != gtid);
            st.rolled_back.push(gtid);
            Ok(())
        })
    }

    fn last_entry(&self) -> BoxFuture<'_, Option<OplogEntry>> {
        Box::pin(async move { Ok(self.state.lock().await.log.last().cloned()) })
    }

    fn find_by_gtid(&self, gtid: Gtid) -> BoxFuture<'_, Option<OplogEntry>> {
        Box::pin(async move {
            let st = self.state.lock().await;
            Ok(st.log.iter().find(|e| e.gtid == gtid).cloned())
        })
    }

    fn next_rollback_id(&self) -> u64 {
        self.rollback_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn invalidate_cursors(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.cursor_invalidations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn abort_live_transactions(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.txn_aborts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}
