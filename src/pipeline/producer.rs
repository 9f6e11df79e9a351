// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The producer worker.
//!
//! Owns the connection to the current sync target. Each produce pass picks
//! a target, verifies the hash chain agrees at our live position (running a
//! rollback when it does not), then streams entries: write to the local
//! oplog, advance GTID bookkeeping, enqueue for the applier.
//!
//! The worker lives for the whole process. Pause requests are honored at
//! every suspension point (the pause gate, the slave-delay sleep, batch
//! boundaries), so `stop_op_sync` never waits more than about a second plus
//! one in-flight network read.
//!
//! Failure policy: uncaught errors become the replica-set health message and
//! cost a 10 s sleep before the loop resumes; fatal errors (a failed
//! rollback, an exceeded rollback window) additionally take the replica set
//! to FATAL, after which every pass short-circuits.

use crate::config::RetryConfig;
use crate::control::{Gate, SyncControl};
use crate::error::{Result, SyncError};
use crate::gtid::GtidManager;
use crate::metrics;
use crate::queue::OpQueue;
use crate::remote::{TailCursor, UpstreamOplog};
use crate::replset::ReplicaSet;
use crate::store::OplogStore;
use crate::target::SyncTargetSelector;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn, Instrument};

use super::rollback::RollbackCoordinator;

pub(super) struct Producer {
    pub(super) retry: RetryConfig,
    pub(super) control: Arc<SyncControl>,
    pub(super) queue: Arc<OpQueue>,
    pub(super) replset: Arc<dyn ReplicaSet>,
    pub(super) gtids: Arc<dyn GtidManager>,
    pub(super) store: Arc<dyn OplogStore>,
    pub(super) selector: SyncTargetSelector,
    pub(super) rollback: RollbackCoordinator,
    pub(super) current_target: Arc<Mutex<Option<String>>>,
    pub(super) wait_time_ms: Arc<AtomicU64>,
}

impl Producer {
    pub(super) async fn run(self) {
        let span = tracing::info_span!("producer");
        async move {
            info!("producer started");
            let mut time_to_sleep = Duration::ZERO;

            loop {
                if !time_to_sleep.is_zero() {
                    // mark ourselves paused for the duration so lifecycle
                    // callers are not left waiting on a backoff
                    self.control.mark_paused();
                    self.sleep_interruptible(time_to_sleep).await;
                    time_to_sleep = Duration::ZERO;
                }
                if self.control.exit_requested() {
                    break;
                }

                match self.control.gate().await {
                    Gate::Exit => break,
                    Gate::Run => {}
                }
                if self.control.exit_requested() {
                    break;
                }
                metrics::set_pipeline_state("running");

                let state = self.replset.state();
                if state.is_fatal() || state.is_startup() {
                    time_to_sleep = self.retry.not_secondary();
                    continue;
                }

                time_to_sleep = match self.produce().await {
                    Ok(sleep) => sleep,
                    Err(e) if e.is_fatal() => {
                        error!(error = %e, "rollback failed, going fatal");
                        self.replset.set_health_message(e.to_string());
                        self.replset.fatal();
                        self.retry.divergence()
                    }
                    Err(e) => {
                        warn!(error = %e, "error in producer");
                        metrics::record_producer_error();
                        self.replset
                            .set_health_message(format!("error in producer: {e}"));
                        self.retry.producer_error()
                    }
                };
            }

            self.control.mark_paused();
            metrics::set_pipeline_state("exited");
            info!("producer stopped");
        }
        .instrument(span)
        .await
    }

    /// One produce pass. Returns how long to sleep before the next pass.
    async fn produce(&self) -> Result<Duration> {
        // a one-member set that could become primary has nothing to pull;
        // nudge the membership component in case it needs to step back up
        if self.replset.single_primary_member() {
            self.replset.request_state_check();
            return Ok(self.retry.single_node());
        }

        let Some(upstream) = self.selector.pick_target().await else {
            self.set_target(None);
            return Ok(self.retry.no_target());
        };
        let host = upstream.host().to_string();
        self.set_target(Some(host.clone()));

        let last_live = self.gtids.live_state();
        let mut cursor = upstream.tail_from(last_live).await?;
        if !cursor.is_open() {
            // target cut the connection between vetting and the query
            return Ok(Duration::ZERO);
        }

        if self
            .divergence_check(upstream.as_ref(), cursor.as_mut())
            .await?
        {
            // rollback ran; restart selection from the reset position
            return Ok(self.retry.divergence());
        }

        self.stream_entries(&host, cursor.as_mut()).await
    }

    /// The fetch loop: stream entries until pause, target loss, or cursor
    /// loss. Returns the sleep for the next pass (zero = retry immediately).
    async fn stream_entries(
        &self,
        host: &str,
        cursor: &mut dyn TailCursor,
    ) -> Result<Duration> {
        while !self.control.exit_requested() {
            while !self.control.exit_requested() {
                if !self.control.should_run() {
                    return Ok(Duration::ZERO);
                }

                if !cursor.more_in_current_batch() {
                    // batch boundary: honor an operator's force-sync request
                    if self.replset.got_force_sync() {
                        return Ok(Duration::ZERO);
                    }

                    debug_assert!(!self.replset.is_primary(), "a primary must never pull");

                    if !self.replset.target_healthy(host) {
                        return Ok(Duration::ZERO);
                    }

                    cursor.more().await?;
                }

                if !cursor.more().await? {
                    break;
                }
                let Some(entry) = cursor.next_entry() else {
                    break;
                };

                debug!(gtid = %entry.gtid, host = %host, "replicating");

                let delay = self.replset.slave_delay();
                if !delay.is_zero() {
                    self.handle_slave_delay(entry.ts, delay).await;
                    if !self.control.should_run() {
                        break;
                    }
                }

                let timer = Instant::now();
                self.store.replicate_to_oplog(&entry).await?;
                self.gtids.note_gtid_added(entry.gtid, entry.ts, entry.h);
                let elapsed = timer.elapsed();
                self.wait_time_ms
                    .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
                metrics::record_produce_latency(elapsed);
                metrics::record_entry_replicated(host);

                // blocks at the high watermark until the applier drains
                self.queue.push(entry).await;
                metrics::set_queue_depth(self.queue.len());
            }

            if !self.replset.target_healthy(host) {
                return Ok(Duration::ZERO);
            }

            cursor.tail_check().await?;
            if !cursor.is_open() {
                debug!(host = %host, "end of sync pass");
                return Ok(Duration::ZERO);
            }
            // the cursor is tailable: loop back for more
        }
        Ok(Duration::ZERO)
    }

    /// Read the first remote entry at our live position and compare it with
    /// our chain. Runs a rollback (and returns `true`) on any disagreement,
    /// including an empty result.
    async fn divergence_check(
        &self,
        upstream: &dyn UpstreamOplog,
        cursor: &mut dyn TailCursor,
    ) -> Result<bool> {
        if !cursor.more().await? {
            // nothing at or after our position: the remote oplog does not
            // contain our chain, which is divergence like any other
            warn!(
                host = %upstream.host(),
                "empty query result from upstream oplog, attempting rollback"
            );
            self.rollback.run(upstream, None).await?;
            return Ok(true);
        }

        let Some(first) = cursor.next_entry() else {
            return Err(SyncError::Internal(
                "cursor reported entries but yielded none".to_string(),
            ));
        };

        if !self.gtids.rollback_needed(first.gtid, first.ts, first.h) {
            debug!(gtid = %first.gtid, "upstream agrees with our chain");
            return Ok(false);
        }

        warn!(
            ours = %self.gtids.live_state(),
            remote = %first.gtid,
            "divergence detected, attempting rollback"
        );
        self.rollback.run(upstream, Some(first.ts)).await?;
        Ok(true)
    }

    /// Sleep until `ts + delay` has passed, re-checking the pause flag every
    /// second so a long slave delay never wedges `stop_op_sync`.
    async fn handle_slave_delay(&self, ts: u64, delay: Duration) {
        let apply_at = ts.saturating_add(delay.as_millis() as u64);
        loop {
            let now = now_millis();
            if now >= apply_at {
                break;
            }
            let remaining = Duration::from_millis(apply_at - now);
            tokio::time::sleep(remaining.min(Duration::from_secs(1))).await;
            if !self.control.should_run() || self.control.exit_requested() {
                break;
            }
        }
    }

    /// Sleep in one-second slices, bailing early on shutdown.
    async fn sleep_interruptible(&self, total: Duration) {
        let deadline = Instant::now() + total;
        loop {
            if self.control.exit_requested() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            let remaining = deadline - now;
            tokio::time::sleep(remaining.min(Duration::from_secs(1))).await;
        }
    }

    fn set_target(&self, host: Option<String>) {
        let mut guard = match self.current_target.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = host;
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
