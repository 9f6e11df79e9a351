//! # Oplog Sync
//!
//! The secondary-side replication core of a replicated document database:
//! continuously pulls oplog entries from a chosen upstream member, applies
//! them locally in commit order, detects divergence, and rolls the local
//! oplog back to a common ancestor when divergence is found.
//!
//! ## Architecture
//!
//! Two long-lived workers bridged by a bounded queue:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         ReplicationPipeline                          │
//! │                                                                      │
//! │  upstream oplog ──► Producer ──► OpQueue ──► Applier ──► local state │
//! │  (TailCursor)          │       (20k / 10k)      │                    │
//! │        ▲               │                        │                    │
//! │        │               ▼                        ▼                    │
//! │  SyncTargetSelector  local oplog          GtidManager                │
//! │  (veto / staleness)  (OplogStore)         (bookkeeping)              │
//! │                        ▲                                             │
//! │                        └── RollbackCoordinator (divergence path)     │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The producer writes each fetched entry to the local oplog under the
//! store's serializable transaction *before* enqueueing it, so the queue
//! only ever holds durable entries. The applier drains the queue in FIFO
//! (= GTID) order. When the upstream's hash chain disagrees with ours at
//! the reconnect point, the producer quiesces the applier and undoes local
//! entries back to the newest point both sides share.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use oplog_sync::{ReplicationPipeline, SyncConfig, MemoryGtidManager, MemoryOplog};
//! use std::sync::Arc;
//!
//! # async fn example(replset: Arc<dyn oplog_sync::ReplicaSet>,
//! #                  connector: Arc<dyn oplog_sync::UpstreamConnector>) {
//! let mut pipeline = ReplicationPipeline::new(
//!     SyncConfig::default(),
//!     replset,
//!     Arc::new(MemoryGtidManager::new()),
//!     Arc::new(MemoryOplog::new()),
//!     connector,
//! );
//! pipeline.start().expect("workers spawn once");
//! pipeline.start_op_sync().await.expect("settled");
//! // ... replicating ...
//! pipeline.shutdown().await;
//! # }
//! ```

pub mod config;
pub mod control;
pub mod entry;
pub mod error;
pub mod gtid;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod remote;
pub mod replset;
pub mod store;
pub mod target;

// Re-exports for convenience
pub use config::{QueueConfig, RetryConfig, RollbackConfig, SyncConfig, TargetConfig};
pub use entry::OplogEntry;
pub use error::{Result, SyncError};
pub use gtid::{Gtid, GtidManager, MemoryGtidManager};
pub use pipeline::{PipelineCounters, ReplicationPipeline};
pub use queue::OpQueue;
pub use remote::{BoxFuture, ReverseCursor, TailCursor, UpstreamConnector, UpstreamOplog};
pub use replset::{MemberState, ReplicaSet};
pub use store::{MemoryOplog, OplogStore};
pub use target::SyncTargetSelector;
