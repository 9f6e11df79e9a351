// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Upstream oplog contracts.
//!
//! The core never talks to the wire directly; the node's client layer
//! provides implementations of these traits. Tests use in-process mocks.
//!
//! A connection is bound to one sync target and is replaced wholesale on
//! target switch, stale detection, or disconnect. A [`TailCursor`] follows
//! the upstream oplog forward with tail semantics (after reaching the end it
//! waits for new entries instead of closing); a [`ReverseCursor`] walks it
//! backwards for the rollback ancestor scan.
//!
//! # Cursor protocol
//!
//! The producer drives a tail cursor the way the original client cursor API
//! shapes it:
//!
//! ```text
//! loop {
//!     if !cursor.more_in_current_batch() { /* boundary checks */ cursor.more().await?; }
//!     if !cursor.more().await? { break }      // nothing even after a fetch
//!     let entry = cursor.next_entry();        // owned copy
//! }
//! cursor.tail_check().await?;                 // reopen if lost at the tail
//! ```
//!
//! `more()` with a non-empty batch returns `true` without touching the
//! network; with an empty batch it fetches (possibly blocking up to the
//! implementation's read timeout) and reports whether anything arrived.

use crate::entry::OplogEntry;
use crate::error::Result;
use crate::gtid::Gtid;
use std::future::Future;
use std::pin::Pin;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Dials replica-set members.
pub trait UpstreamConnector: Send + Sync {
    /// Connect to a member and hand back its oplog client.
    ///
    /// A failed connect is a [`crate::error::SyncError::Network`]; the
    /// selector vetoes the member and moves on.
    fn connect(&self, host: &str) -> BoxFuture<'_, Box<dyn UpstreamOplog>>;
}

/// One upstream member's oplog.
pub trait UpstreamOplog: Send + Sync {
    /// The member this client is bound to.
    fn host(&self) -> &str;

    /// The oldest entry in the upstream oplog, if any.
    ///
    /// Used by the staleness probe: if our live GTID is below this entry's
    /// GTID, the upstream has already trimmed the range we would need.
    fn oldest_entry(&self) -> BoxFuture<'_, Option<OplogEntry>>;

    /// Open a tailing cursor over entries with GTID >= `from`.
    fn tail_from(&self, from: Gtid) -> BoxFuture<'_, Box<dyn TailCursor>>;

    /// Open a reverse cursor starting at `from`, newest first.
    ///
    /// Yields entries with GTID <= `from` in descending order; the rollback
    /// ancestor scan walks it until a match.
    fn rollback_scan(&self, from: Gtid) -> BoxFuture<'_, Box<dyn ReverseCursor>>;
}

/// A forward, tailing cursor over an upstream oplog.
pub trait TailCursor: Send {
    /// False once the upstream dropped the cursor (step-down, disconnect).
    fn is_open(&self) -> bool;

    /// Are there entries buffered locally?
    fn more_in_current_batch(&self) -> bool;

    /// Ensure entries are available, fetching a batch if needed.
    ///
    /// May block up to the implementation's read timeout when tailing at the
    /// end of the oplog. Returns `false` if nothing is available even after
    /// the fetch.
    fn more(&mut self) -> BoxFuture<'_, bool>;

    /// Take the next buffered entry as an owned copy.
    fn next_entry(&mut self) -> Option<OplogEntry>;

    /// Reopen the cursor if it was lost at the tail.
    ///
    /// After this returns, [`TailCursor::is_open`] reports whether the
    /// cursor could be re-established.
    fn tail_check(&mut self) -> BoxFuture<'_, ()>;
}

/// A backwards cursor over an upstream oplog.
pub trait ReverseCursor: Send {
    /// The next entry going backwards, or `None` when exhausted.
    fn next_entry(&mut self) -> BoxFuture<'_, Option<OplogEntry>>;
}
