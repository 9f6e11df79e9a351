// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Oplog entries: the records the pipeline moves.
//!
//! An entry is immutable once fetched. Ordering between entries is GTID
//! ordering; for two entries emitted by the same primary, GTID order implies
//! timestamp order (the upstream guarantees this, we only rely on it).

use crate::gtid::Gtid;
use serde::{Deserialize, Serialize};

/// One committed transaction, as it appears in an oplog.
///
/// `hash` is a chained 64-bit hash over all prior entries, declared by the
/// upstream. The pipeline compares hashes to detect divergence but never
/// computes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OplogEntry {
    /// The entry's GTID (stored as `_id` upstream).
    #[serde(rename = "_id")]
    pub gtid: Gtid,
    /// Commit timestamp, milliseconds since the epoch.
    pub ts: u64,
    /// Chained hash of all prior entries.
    pub h: u64,
    /// Opaque description of the transaction to apply.
    pub payload: serde_json::Value,
}

impl OplogEntry {
    pub fn new(gtid: Gtid, ts: u64, h: u64, payload: serde_json::Value) -> Self {
        Self {
            gtid,
            ts,
            h,
            payload,
        }
    }

    /// Entry with an empty payload, enough for bookkeeping-only paths.
    pub fn bare(gtid: Gtid, ts: u64, h: u64) -> Self {
        Self::new(gtid, ts, h, serde_json::Value::Null)
    }
}
