// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the replication core.
//!
//! Errors are categorized by behaviour, not by origin: what the pipeline
//! does next depends only on the class.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Fatal | Description |
//! |------------|-----------|-------|-------------|
//! | `Network` | Yes | No | Connect failure, cursor lost, broken read |
//! | `Storage` | No | No | Local oplog store operation failed |
//! | `Apply` | In place | No | Applying a transaction failed; retried without advancing |
//! | `RollbackHorizon` | No | Yes | Divergence older than the rollback window |
//! | `NoCommonAncestor` | No | Yes | Reverse scan exhausted without a match |
//! | `Rollback` | No | Yes | Failure while a rollback was in progress |
//! | `InvalidState` | No | No | Lifecycle operation in the wrong state |
//! | `Shutdown` | No | No | Operation interrupted by shutdown |
//! | `Internal` | No | No | Broken invariant; needs investigation |
//!
//! Fatal errors take the replica set to the FATAL state; the producer keeps
//! looping but short-circuits until an operator intervenes. Retryable errors
//! cost a sleep and a new sync-target selection. Nothing is silently
//! swallowed: each class maps to a distinct health message.

use crate::gtid::Gtid;
use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while syncing from an upstream.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Transient network or target failure.
    ///
    /// Connect refused, tailing cursor lost, read interrupted. The producer
    /// closes the reader and goes back to target selection.
    #[error("network error ({operation}): {message}")]
    Network { operation: String, message: String },

    /// A local oplog store operation failed.
    ///
    /// Not retryable by the pipeline; surfaces as a producer health message.
    #[error("oplog store error: {0}")]
    Storage(String),

    /// Applying a transaction to local state failed.
    ///
    /// The applier logs it, sleeps, and retries the same entry. The entry is
    /// never discarded.
    #[error("apply error: {0}")]
    Apply(String),

    /// The divergence point is older than the rollback window.
    ///
    /// Rollback refuses to undo more than the window's worth of entries;
    /// the node needs a full resync.
    #[error(
        "rollback window exceeded: remote entry at ts {remote_ts} is more than \
         {horizon_secs}s older than the divergence point at ts {horizon_ts}"
    )]
    RollbackHorizon {
        remote_ts: u64,
        horizon_ts: u64,
        horizon_secs: u64,
    },

    /// The reverse scan ran out of remote entries without finding a common
    /// ancestor.
    #[error("could not find id to rollback to (scanned back from {from})")]
    NoCommonAncestor { from: Gtid },

    /// Something failed while a rollback was already in progress.
    ///
    /// Durable state may sit between the old and new chain; the replica set
    /// must go fatal.
    #[error("rollback failed: {0}")]
    Rollback(String),

    /// Lifecycle operation attempted in the wrong state.
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Shutdown requested while the operation was blocked.
    #[error("shutdown in progress")]
    Shutdown,

    /// Broken invariant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Create a network error.
    pub fn network(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Should the producer retry after a new target selection?
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Apply(_))
    }

    /// Does this error take the replica set to the FATAL state?
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::RollbackHorizon { .. } | Self::NoCommonAncestor { .. } | Self::Rollback(_)
        )
    }
}
