// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Oplog rollback.
//!
//! Invoked by the producer when the upstream's hash chain disagrees with
//! ours at the live position. The coordinator walks the upstream oplog
//! backwards to the newest entry both sides agree on (the common ancestor),
//! quiesces the applier, re-points the GTID bookkeeping at the ancestor,
//! and undoes every local entry newer than it, newest first.
//!
//! The ancestor scan is bounded: a remote entry more than the rollback
//! window (default 30 minutes) older than the divergence point aborts the
//! attempt. Exceeding the window, failing to find an ancestor, and any
//! error after the undo phase has started are all fatal to the replica set.
//! The caller is responsible for that transition.

use crate::config::RollbackConfig;
use crate::entry::OplogEntry;
use crate::error::{Result, SyncError};
use crate::gtid::{Gtid, GtidManager};
use crate::metrics;
use crate::queue::OpQueue;
use crate::remote::UpstreamOplog;
use crate::replset::ReplicaSet;
use crate::store::OplogStore;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(super) struct RollbackCoordinator {
    config: RollbackConfig,
    queue: Arc<OpQueue>,
    gtids: Arc<dyn GtidManager>,
    store: Arc<dyn OplogStore>,
    replset: Arc<dyn ReplicaSet>,
}

impl RollbackCoordinator {
    pub(super) fn new(
        config: RollbackConfig,
        queue: Arc<OpQueue>,
        gtids: Arc<dyn GtidManager>,
        store: Arc<dyn OplogStore>,
        replset: Arc<dyn ReplicaSet>,
    ) -> Self {
        Self {
            config,
            queue,
            gtids,
            store,
            replset,
        }
    }

    /// Run a rollback against `upstream`.
    ///
    /// `trigger_ts` is the timestamp of the remote entry that revealed the
    /// divergence; `None` when the remote query came back empty, in which
    /// case our own live timestamp bounds the window.
    ///
    /// Every error out of here is fatal: [`SyncError::RollbackHorizon`],
    /// [`SyncError::NoCommonAncestor`], or [`SyncError::Rollback`].
    pub(super) async fn run(
        &self,
        upstream: &dyn UpstreamOplog,
        trigger_ts: Option<u64>,
    ) -> Result<()> {
        metrics::record_rollback_started();

        let (our_last, our_last_ts, _) = self.gtids.live_info();
        let horizon_ts = trigger_ts.unwrap_or(our_last_ts);

        // resumable client cursors from before this point must not survive
        let rollback_id = self.store.next_rollback_id();
        info!(
            ours = %our_last,
            rollback_id,
            host = %upstream.host(),
            "searching upstream backwards for a common ancestor"
        );

        let ancestor = self
            .find_common_ancestor(upstream, our_last, horizon_ts)
            .await?;
        info!(ancestor = %ancestor.gtid, "found id to rollback to");

        // Quiesce: the producer is the caller, so nothing new reaches the
        // queue; wait for the applier to finish what is already there.
        if !self.queue.is_empty() {
            info!("waiting for applier to finish work before rollback");
            self.queue.drain_wait().await;
        }
        super::verify_settled(&self.queue, self.gtids.as_ref())
            .map_err(|e| SyncError::Rollback(e.to_string()))?;

        let undone = self
            .undo_to(&ancestor)
            .await
            .map_err(|e| match e {
                fatal @ SyncError::Rollback(_) => fatal,
                other => SyncError::Rollback(other.to_string()),
            })?;

        metrics::record_rollback_completed(undone);
        info!(
            ancestor = %ancestor.gtid,
            undone,
            "rollback complete"
        );
        Ok(())
    }

    /// Walk the upstream oplog backwards from `from` until a remote entry
    /// matches a local one on (GTID, ts, hash).
    async fn find_common_ancestor(
        &self,
        upstream: &dyn UpstreamOplog,
        from: Gtid,
        horizon_ts: u64,
    ) -> Result<OplogEntry> {
        let horizon = self.config.horizon_duration();
        let horizon_ms = horizon.as_millis() as u64;

        let mut scan = upstream
            .rollback_scan(from)
            .await
            .map_err(|e| SyncError::Rollback(format!("opening rollback cursor: {e}")))?;

        loop {
            let remote = scan
                .next_entry()
                .await
                .map_err(|e| SyncError::Rollback(format!("reading rollback cursor: {e}")))?;
            let Some(remote) = remote else {
                return Err(SyncError::NoCommonAncestor { from });
            };

            if remote.ts.saturating_add(horizon_ms) < horizon_ts {
                warn!(
                    remote_gtid = %remote.gtid,
                    remote_ts = remote.ts,
                    horizon_ts,
                    "rollback window exceeded"
                );
                return Err(SyncError::RollbackHorizon {
                    remote_ts: remote.ts,
                    horizon_ts,
                    horizon_secs: horizon.as_secs(),
                });
            }

            let local = self
                .store
                .find_by_gtid(remote.gtid)
                .await
                .map_err(|e| SyncError::Rollback(format!("local ancestor lookup: {e}")))?;
            if let Some(local) = local {
                if local.ts == remote.ts && local.h == remote.h {
                    return Ok(local);
                }
            }
        }
    }

    /// The mutating phase: re-point bookkeeping at the ancestor and undo
    /// local entries newer than it, newest first.
    async fn undo_to(&self, ancestor: &OplogEntry) -> Result<u64> {
        // no client may observe state between the two chains
        self.store.invalidate_cursors().await?;
        self.store.abort_live_transactions().await?;
        self.replset.enter_rollback();

        self.gtids.reset_to(ancestor.gtid, ancestor.ts, ancestor.h);
        self.replset.force_update_repl_info();

        let mut undone = 0u64;
        loop {
            let Some(last) = self.store.last_entry().await? else {
                break;
            };
            match last.gtid.cmp(&ancestor.gtid) {
                Ordering::Greater => {
                    self.store.rollback_from_oplog(&last).await?;
                    undone += 1;
                }
                Ordering::Equal => break,
                Ordering::Less => {
                    debug_assert!(false, "rolled back past the ancestor");
                    return Err(SyncError::Rollback(format!(
                        "local oplog ended at {} below the rollback point {}",
                        last.gtid, ancestor.gtid
                    )));
                }
            }
        }

        // only a clean undo leaves the ROLLBACK state; on error the replica
        // set stays there until the caller goes fatal
        self.replset.leave_rollback();
        Ok(undone)
    }
}
