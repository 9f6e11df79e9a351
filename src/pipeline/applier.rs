//! The applier worker.
//!
//! Drains the queue in FIFO order, which by construction is GTID order.
//! For every entry: `note_applying` → apply under the store's own
//! transaction → `note_applied` → remove from the queue. The entry stays
//! queued while it is being applied, so a drained queue means a fully
//! settled applier.
//!
//! Apply failures are retried in place after a short sleep; the entry is
//! never skipped. There is deliberately no dead-letter path: a transaction
//! that cannot be applied is a system-level problem that surfaces as a
//! persistent health message, not something to route around.

use crate::config::RetryConfig;
use crate::gtid::GtidManager;
use crate::metrics;
use crate::queue::OpQueue;
use crate::replset::ReplicaSet;
use crate::store::OplogStore;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

pub(super) struct Applier {
    pub(super) retry: RetryConfig,
    pub(super) queue: Arc<OpQueue>,
    pub(super) gtids: Arc<dyn GtidManager>,
    pub(super) store: Arc<dyn OplogStore>,
    pub(super) replset: Arc<dyn ReplicaSet>,
}

impl Applier {
    pub(super) async fn run(self) {
        let span = tracing::info_span!("applier");
        async move {
            info!("applier started");

            // None means shutdown was requested and the queue is drained
            while let Some(entry) = self.queue.wait_front().await {
                self.gtids.note_applying(entry.gtid);

                match self.store.apply_from_oplog(&entry).await {
                    Ok(()) => {
                        self.gtids.note_applied(entry.gtid);
                        self.queue.pop_front();
                        metrics::record_entry_applied();
                        metrics::set_queue_depth(self.queue.len());
                    }
                    Err(e) => {
                        warn!(gtid = %entry.gtid, error = %e, "failed to apply, will retry");
                        self.replset
                            .set_health_message(format!("error applying {}: {e}", entry.gtid));
                        metrics::record_apply_retry();

                        tokio::time::sleep(self.retry.apply_error()).await;
                        // an explicit shutdown outranks the retry loop; the
                        // entry is abandoned and surfaced via the health
                        // message above
                        if self.queue.is_shutdown() {
                            warn!(gtid = %entry.gtid, "shutdown requested, abandoning retry");
                            break;
                        }
                    }
                }
            }

            info!("applier stopped");
        }
        .instrument(span)
        .await
    }
}
