// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The bounded queue between the producer and the applier.
//!
//! Single producer, single consumer. Insertion order is the application
//! order; the queue is a cooperation point, not a correctness boundary.
//!
//! # Flow control
//!
//! Two watermarks bound the queue: when a push brings the size to the high
//! watermark, the producer blocks until the applier drains the queue down to
//! the low watermark. Defaults are 20 000 / 10 000; both are configurable
//! through [`crate::config::QueueConfig`].
//!
//! # Applier protocol
//!
//! The applier snapshots the front entry ([`OpQueue::wait_front`]), applies
//! it, and only then removes it ([`OpQueue::pop_front`]). An entry therefore
//! counts against the queue size until it has been fully applied, which is
//! what rollback's quiesce step relies on.
//!
//! All waits are predicate re-tests over a broadcast size channel, so a
//! single channel serves the non-empty, drained-to-low, and empty conditions.

use crate::entry::OplogEntry;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueState {
    len: usize,
    shutdown: bool,
}

/// Bounded SPSC queue of oplog entries.
pub struct OpQueue {
    entries: Mutex<VecDeque<OplogEntry>>,
    state_tx: watch::Sender<QueueState>,
    high_watermark: usize,
    low_watermark: usize,
    /// Largest size ever observed, for flow-control assertions.
    max_observed: AtomicUsize,
}

impl OpQueue {
    /// Create a queue with the given watermarks.
    ///
    /// `high` must be greater than `low`; both must be non-zero.
    pub fn new(high: usize, low: usize) -> Self {
        assert!(high > low && low > 0, "watermarks must satisfy high > low > 0");
        let (state_tx, _) = watch::channel(QueueState {
            len: 0,
            shutdown: false,
        });
        Self {
            entries: Mutex::new(VecDeque::new()),
            state_tx,
            high_watermark: high,
            low_watermark: low,
            max_observed: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<OplogEntry>> {
        match self.entries.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn publish_len(&self, len: usize) {
        self.state_tx.send_modify(|st| st.len = len);
    }

    /// Append an entry, blocking while the queue sits at the high watermark.
    ///
    /// Returns once the entry is enqueued and the queue is below the high
    /// watermark again (or shutdown was requested). Only the producer calls
    /// this.
    pub async fn push(&self, entry: OplogEntry) {
        let len = {
            let mut q = self.lock();
            q.push_back(entry);
            q.len()
        };
        self.max_observed.fetch_max(len, Ordering::Relaxed);
        self.publish_len(len);

        if len >= self.high_watermark {
            let low = self.low_watermark;
            let mut rx = self.state_tx.subscribe();
            // the sender lives in self, so the channel cannot close under us
            let _ = rx.wait_for(|st| st.len <= low || st.shutdown).await;
        }
    }

    /// Wait for a front entry and return a snapshot of it.
    ///
    /// Returns `None` once shutdown was requested and the queue is empty.
    /// The entry stays queued until [`OpQueue::pop_front`].
    pub async fn wait_front(&self) -> Option<OplogEntry> {
        let mut rx = self.state_tx.subscribe();
        let _ = rx.wait_for(|st| st.len > 0 || st.shutdown).await;
        self.lock().front().cloned()
    }

    /// Remove the front entry. Called by the applier after a successful apply.
    pub fn pop_front(&self) {
        let len = {
            let mut q = self.lock();
            debug_assert!(!q.is_empty(), "pop_front on an empty queue");
            q.pop_front();
            q.len()
        };
        // crossing down to the low watermark wakes a blocked producer;
        // reaching zero wakes drain waiters. Both ride the same channel.
        self.publish_len(len);
    }

    /// Current size.
    pub fn len(&self) -> usize {
        self.state_tx.borrow().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until the queue is empty.
    pub async fn drain_wait(&self) {
        let mut rx = self.state_tx.subscribe();
        let _ = rx.wait_for(|st| st.len == 0).await;
    }

    /// Release every waiter; `wait_front` returns `None` once drained.
    pub fn shutdown(&self) {
        self.state_tx.send_modify(|st| st.shutdown = true);
    }

    pub fn is_shutdown(&self) -> bool {
        self.state_tx.borrow().shutdown
    }

    /// Largest size the queue ever reached.
    pub fn max_observed(&self) -> usize {
        self.max_observed.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for OpQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpQueue")
            .field("len", &self.len())
            .field("high_watermark", &self.high_watermark)
            .field("low_watermark", &self.low_watermark)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtid::Gtid;
    use std::sync::Arc;
    use std::time::Duration;

    fn entry(seq: u64) -> OplogEntry {
        OplogEntry::bare(Gtid::new(1, seq), seq * 10, seq)
    }

    #[tokio::test]
    async fn test_push_then_front_then_pop() {
        let q = OpQueue::new(10, 5);
        q.push(entry(1)).await;
        q.push(entry(2)).await;
        assert_eq!(q.len(), 2);

        let front = q.wait_front().await.unwrap();
        assert_eq!(front.gtid, Gtid::new(1, 1));
        // snapshot does not remove
        assert_eq!(q.len(), 2);

        q.pop_front();
        assert_eq!(q.len(), 1);
        let front = q.wait_front().await.unwrap();
        assert_eq!(front.gtid, Gtid::new(1, 2));
    }

    #[tokio::test]
    async fn test_wait_front_blocks_until_push() {
        let q = Arc::new(OpQueue::new(10, 5));

        let waiter = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.wait_front().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        q.push(entry(7)).await;
        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.gtid, Gtid::new(1, 7));
    }

    #[tokio::test]
    async fn test_push_blocks_at_high_watermark() {
        let q = Arc::new(OpQueue::new(4, 2));
        for seq in 1..=3 {
            q.push(entry(seq)).await;
        }

        // the fourth push reaches the high watermark and must block
        let producer = {
            let q = Arc::clone(&q);
            tokio::spawn(async move {
                q.push(entry(4)).await;
                q.push(entry(5)).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());
        assert_eq!(q.len(), 4);

        // draining to 3 is not enough
        q.pop_front();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        // draining to the low watermark releases the producer
        q.pop_front();
        producer.await.unwrap();
        assert_eq!(q.len(), 3);
        assert_eq!(q.max_observed(), 4);
    }

    #[tokio::test]
    async fn test_wait_front_returns_none_on_shutdown_when_empty() {
        let q = Arc::new(OpQueue::new(10, 5));
        let waiter = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.wait_front().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        q.shutdown();
        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_still_drains_remaining_entries() {
        let q = OpQueue::new(10, 5);
        q.push(entry(1)).await;
        q.shutdown();

        // remaining work is still handed out
        let front = q.wait_front().await.unwrap();
        assert_eq!(front.gtid, Gtid::new(1, 1));
        q.pop_front();

        assert!(q.wait_front().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_releases_blocked_push() {
        let q = Arc::new(OpQueue::new(2, 1));
        q.push(entry(1)).await;

        let producer = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.push(entry(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!producer.is_finished());

        q.shutdown();
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn test_drain_wait() {
        let q = Arc::new(OpQueue::new(10, 5));
        q.push(entry(1)).await;
        q.push(entry(2)).await;

        let drainer = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.drain_wait().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!drainer.is_finished());

        q.pop_front();
        q.pop_front();
        drainer.await.unwrap();
        assert!(q.is_empty());
    }

    #[test]
    #[should_panic(expected = "watermarks")]
    fn test_invalid_watermarks_rejected() {
        let _ = OpQueue::new(5, 5);
    }
}
