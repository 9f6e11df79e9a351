// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Globally totally ordered transaction identifiers (GTIDs) and the
//! bookkeeping contract the pipeline drives.
//!
//! A GTID is a `(epoch, seq)` pair compared lexicographically: the epoch
//! increments when a new primary takes over, the sequence within an epoch.
//! The sentinel [`Gtid::INITIAL`] compares less than every real GTID and is
//! the only value for which [`Gtid::is_initial`] holds.
//!
//! All ordering decisions in the crate go through [`Ord`]; nothing else
//! reads the two components.
//!
//! # Bookkeeping
//!
//! The [`GtidManager`] trait is the contract with the node's durable GTID
//! checkpoint. The producer advances the "live" side (written to the local
//! oplog), the applier advances the "applied" side. After quiescence the two
//! sides must agree; [`crate::pipeline::ReplicationPipeline`] verifies that
//! at every stop/start boundary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Mutex;

/// A globally totally ordered transaction identifier.
///
/// Ordering is lexicographic on `(epoch, seq)`, which the derived `Ord`
/// implements exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Gtid {
    /// Primary epoch: bumped on every primary change.
    pub epoch: u64,
    /// Sequence within the epoch.
    pub seq: u64,
}

impl Gtid {
    /// The initial sentinel: less than any real GTID.
    pub const INITIAL: Gtid = Gtid { epoch: 0, seq: 0 };

    pub fn new(epoch: u64, seq: u64) -> Self {
        Self { epoch, seq }
    }

    /// True only for the sentinel.
    pub fn is_initial(&self) -> bool {
        *self == Self::INITIAL
    }

    /// The successor within the same epoch.
    pub fn next(&self) -> Gtid {
        Gtid {
            epoch: self.epoch,
            seq: self.seq + 1,
        }
    }
}

impl std::fmt::Display for Gtid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.epoch, self.seq)
    }
}

impl Default for Gtid {
    fn default() -> Self {
        Gtid::INITIAL
    }
}

/// Durable GTID bookkeeping driven by the pipeline.
///
/// Implementations do their own internal locking; every method is callable
/// from both workers. The pipeline guarantees single-producer/single-consumer
/// call patterns: `note_gtid_added` only from the producer, `note_applying`/
/// `note_applied` only from the applier.
///
/// Invariant after quiescence: `live_gtids()` returns an equal pair and
/// `min_gtids()` returns an equal pair.
pub trait GtidManager: Send + Sync {
    /// A new entry was written to the local oplog.
    fn note_gtid_added(&self, gtid: Gtid, ts: u64, hash: u64);

    /// The applier is about to apply `gtid`.
    fn note_applying(&self, gtid: Gtid);

    /// The applier finished applying `gtid`.
    fn note_applied(&self, gtid: Gtid);

    /// Highest GTID produced so far.
    fn live_state(&self) -> Gtid;

    /// Highest produced GTID with its timestamp and chained hash.
    fn live_info(&self) -> (Gtid, u64, u64);

    /// `(last_live, last_unapplied)`.
    fn live_gtids(&self) -> (Gtid, Gtid);

    /// `(min_live, min_unapplied)`: lowest in-flight on each side.
    fn min_gtids(&self) -> (Gtid, Gtid);

    /// Does the remote entry at our reconnect point disagree with our chain?
    ///
    /// The remote entry queried at `live_state()` must be exactly our own
    /// last entry: same GTID, same timestamp, same chained hash. A single
    /// mismatch means divergence; the only correct response is rollback.
    fn rollback_needed(&self, gtid: Gtid, ts: u64, hash: u64) -> bool;

    /// Reset all bookkeeping to a known point (rollback ancestor or initial
    /// sync result).
    fn reset_to(&self, gtid: Gtid, ts: u64, hash: u64);
}

#[derive(Debug, Default)]
struct MemoryGtidState {
    last_live: Gtid,
    last_live_ts: u64,
    last_live_hash: u64,
    last_unapplied: Gtid,
    /// Produced but not yet applied.
    pending: BTreeSet<Gtid>,
    /// Handed to the applier but not yet applied.
    applying: BTreeSet<Gtid>,
}

/// In-memory [`GtidManager`] for testing and standalone mode.
///
/// Production deployments persist this state alongside the oplog; this
/// implementation keeps the same observable contract without durability.
#[derive(Debug, Default)]
pub struct MemoryGtidManager {
    state: Mutex<MemoryGtidState>,
}

impl MemoryGtidManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known position, as a node that already has an oplog would.
    pub fn seeded(gtid: Gtid, ts: u64, hash: u64) -> Self {
        let mgr = Self::new();
        mgr.reset_to(gtid, ts, hash);
        mgr
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryGtidState> {
        // Mutex poisoning only happens if a holder panicked; state is a
        // plain value so it is still coherent.
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl GtidManager for MemoryGtidManager {
    fn note_gtid_added(&self, gtid: Gtid, ts: u64, hash: u64) {
        let mut st = self.lock();
        debug_assert!(gtid > st.last_live, "GTIDs must be produced in order");
        st.last_live = gtid;
        st.last_live_ts = ts;
        st.last_live_hash = hash;
        st.pending.insert(gtid);
    }

    fn note_applying(&self, gtid: Gtid) {
        let mut st = self.lock();
        st.applying.insert(gtid);
    }

    fn note_applied(&self, gtid: Gtid) {
        let mut st = self.lock();
        st.applying.remove(&gtid);
        st.pending.remove(&gtid);
        if gtid > st.last_unapplied {
            st.last_unapplied = gtid;
        }
    }

    fn live_state(&self) -> Gtid {
        self.lock().last_live
    }

    fn live_info(&self) -> (Gtid, u64, u64) {
        let st = self.lock();
        (st.last_live, st.last_live_ts, st.last_live_hash)
    }

    fn live_gtids(&self) -> (Gtid, Gtid) {
        let st = self.lock();
        (st.last_live, st.last_unapplied)
    }

    fn min_gtids(&self) -> (Gtid, Gtid) {
        let st = self.lock();
        let idle = st.last_live.next();
        let min_live = st.pending.first().copied().unwrap_or(idle);
        let min_unapplied = st.applying.first().copied().unwrap_or_else(|| {
            // nothing handed to the applier: the lowest unapplied is the
            // lowest still pending, or the idle slot
            st.pending.first().copied().unwrap_or(idle)
        });
        (min_live, min_unapplied)
    }

    fn rollback_needed(&self, gtid: Gtid, ts: u64, hash: u64) -> bool {
        let st = self.lock();
        if st.last_live.is_initial() {
            // fresh node: nothing to diverge from
            return false;
        }
        !(gtid == st.last_live && ts == st.last_live_ts && hash == st.last_live_hash)
    }

    fn reset_to(&self, gtid: Gtid, ts: u64, hash: u64) {
        let mut st = self.lock();
        st.last_live = gtid;
        st.last_live_ts = ts;
        st.last_live_hash = hash;
        st.last_unapplied = gtid;
        st.pending.clear();
        st.applying.clear();
    }
}
