// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The replication pipeline coordinator.
//!
//! Ties together the two long-lived workers:
//! - the producer, which tails a chosen upstream's oplog, writes each
//!   entry to the local oplog, and enqueues it, and
//! - the applier, which drains the queue and applies each transaction to
//!   local state in order,
//!
//! plus the rollback path the producer invokes when it detects divergence.
//!
//! # Lifecycle
//!
//! ```text
//!            start()            start_op_sync()
//! Created ──────────► Paused ◄───────────────► Running
//!                        │      stop_op_sync()    │
//!                        └────────► shutdown() ◄──┘
//! ```
//!
//! `stop_op_sync` pauses the producer, waits for the applier to drain the
//! queue, and verifies the pipeline is settled; `start_op_sync` is the
//! reverse handshake. `shutdown` terminates the producer first (so nothing
//! new is enqueued), then the applier once the queue has drained.
//!
//! One pipeline instance is created at server startup and passed by
//! reference to collaborators; tests inject a fresh instance per case.

mod applier;
mod producer;
mod rollback;

use crate::config::SyncConfig;
use crate::control::SyncControl;
use crate::error::{Result, SyncError};
use crate::gtid::GtidManager;
use crate::queue::OpQueue;
use crate::remote::UpstreamConnector;
use crate::replset::ReplicaSet;
use crate::store::OplogStore;
use crate::target::SyncTargetSelector;
use applier::Applier;
use producer::Producer;
use rollback::RollbackCoordinator;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Pipeline throughput counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineCounters {
    /// Accumulated time the producer spent writing and enqueueing entries.
    pub wait_time_ms: i64,
    /// Entries currently queued for apply.
    pub num_elems: u32,
}

/// The secondary-side replication pipeline.
pub struct ReplicationPipeline {
    config: SyncConfig,
    control: Arc<SyncControl>,
    queue: Arc<OpQueue>,
    gtids: Arc<dyn GtidManager>,
    current_target: Arc<Mutex<Option<String>>>,
    wait_time_ms: Arc<AtomicU64>,
    started: AtomicBool,
    producer_handle: Option<JoinHandle<()>>,
    applier_handle: Option<JoinHandle<()>>,
    // held for worker construction at start()
    replset: Arc<dyn ReplicaSet>,
    store: Arc<dyn OplogStore>,
    connector: Arc<dyn UpstreamConnector>,
}

impl ReplicationPipeline {
    pub fn new(
        config: SyncConfig,
        replset: Arc<dyn ReplicaSet>,
        gtids: Arc<dyn GtidManager>,
        store: Arc<dyn OplogStore>,
        connector: Arc<dyn UpstreamConnector>,
    ) -> Self {
        let queue = Arc::new(OpQueue::new(
            config.queue.high_watermark,
            config.queue.low_watermark,
        ));
        Self {
            config,
            control: Arc::new(SyncControl::new()),
            queue,
            gtids,
            current_target: Arc::new(Mutex::new(None)),
            wait_time_ms: Arc::new(AtomicU64::new(0)),
            started: AtomicBool::new(false),
            producer_handle: None,
            applier_handle: None,
            replset,
            store,
            connector,
        }
    }

    /// Spawn both workers. The producer starts paused; call
    /// [`start_op_sync`](Self::start_op_sync) to begin pulling.
    pub fn start(&mut self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SyncError::InvalidState {
                expected: "not started".to_string(),
                actual: "started".to_string(),
            });
        }

        let selector = SyncTargetSelector::new(
            Arc::clone(&self.replset),
            Arc::clone(&self.connector),
            Arc::clone(&self.gtids),
            self.config.target.clone(),
        );
        let rollback = RollbackCoordinator::new(
            self.config.rollback.clone(),
            Arc::clone(&self.queue),
            Arc::clone(&self.gtids),
            Arc::clone(&self.store),
            Arc::clone(&self.replset),
        );
        let producer = Producer {
            retry: self.config.retry.clone(),
            control: Arc::clone(&self.control),
            queue: Arc::clone(&self.queue),
            replset: Arc::clone(&self.replset),
            gtids: Arc::clone(&self.gtids),
            store: Arc::clone(&self.store),
            selector,
            rollback,
            current_target: Arc::clone(&self.current_target),
            wait_time_ms: Arc::clone(&self.wait_time_ms),
        };
        let applier = Applier {
            retry: self.config.retry.clone(),
            queue: Arc::clone(&self.queue),
            gtids: Arc::clone(&self.gtids),
            store: Arc::clone(&self.store),
            replset: Arc::clone(&self.replset),
        };

        self.producer_handle = Some(tokio::spawn(producer.run()));
        self.applier_handle = Some(tokio::spawn(applier.run()));
        info!("replication pipeline started (paused)");
        Ok(())
    }

    /// Resume pulling. Blocks until the producer reports it is running.
    pub async fn start_op_sync(&self) -> Result<()> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(SyncError::InvalidState {
                expected: "started".to_string(),
                actual: "not started".to_string(),
            });
        }
        self.verify_settled()?;
        self.control.resume();
        self.control.wait_running().await;
        Ok(())
    }

    /// Pause pulling and wait until the pipeline is settled: producer
    /// paused, queue empty, applier idle.
    pub async fn stop_op_sync(&self) -> Result<()> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(SyncError::InvalidState {
                expected: "started".to_string(),
                actual: "not started".to_string(),
            });
        }
        self.control.pause();
        self.control.wait_paused().await;
        self.queue.drain_wait().await;
        self.verify_settled()
    }

    /// Terminate both workers. Producer first, so nothing new is enqueued;
    /// the applier drains what is left and exits.
    pub async fn shutdown(&mut self) {
        info!("shutting down replication pipeline");
        self.control.request_exit();

        if let Some(handle) = self.producer_handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "producer task panicked during shutdown");
            }
        }

        // producer is gone; release the applier once the queue drains
        self.queue.shutdown();
        if let Some(handle) = self.applier_handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "applier task panicked during shutdown");
            }
        }
        info!("replication pipeline shut down");
    }

    /// Structured throughput counters.
    pub fn counters(&self) -> PipelineCounters {
        PipelineCounters {
            wait_time_ms: self.wait_time_ms.load(Ordering::Relaxed) as i64,
            num_elems: self.queue.len() as u32,
        }
    }

    /// The largest queue depth observed since startup.
    ///
    /// The flow-control contract bounds this by the high watermark.
    pub fn max_queue_depth(&self) -> usize {
        self.queue.max_observed()
    }

    /// The upstream currently synced from, if any.
    pub fn sync_target(&self) -> Option<String> {
        match self.current_target.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Sanity-check the quiescence invariants.
    fn verify_settled(&self) -> Result<()> {
        verify_settled(&self.queue, self.gtids.as_ref())
    }
}

/// Assert the pipeline is settled: queue empty, live == unapplied on both
/// the last and min side of the GTID bookkeeping.
pub(crate) fn verify_settled(queue: &OpQueue, gtids: &dyn GtidManager) -> Result<()> {
    if !queue.is_empty() {
        return Err(SyncError::InvalidState {
            expected: "empty queue".to_string(),
            actual: format!("{} queued entries", queue.len()),
        });
    }
    let (last_live, last_unapplied) = gtids.live_gtids();
    if last_live != last_unapplied {
        return Err(SyncError::InvalidState {
            expected: format!("last_unapplied == last_live ({last_live})"),
            actual: format!("last_unapplied {last_unapplied}"),
        });
    }
    let (min_live, min_unapplied) = gtids.min_gtids();
    if min_live != min_unapplied {
        return Err(SyncError::InvalidState {
            expected: format!("min_unapplied == min_live ({min_live})"),
            actual: format!("min_unapplied {min_unapplied}"),
        });
    }
    info!(
        last_live = %last_live,
        last_unapplied = %last_unapplied,
        min_live = %min_live,
        min_unapplied = %min_unapplied,
        "pipeline settled"
    );
    Ok(())
}
