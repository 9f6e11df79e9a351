//! Programmable in-process upstream for pipeline tests.
//!
//! `MockUpstream` serves a vector of oplog entries through the real cursor
//! contracts: a batch-oriented tailing cursor (short poll at the tail
//! instead of a blocking read) and a reverse cursor for the rollback scan.
//! Cursors can be dropped mid-stream to simulate a step-down.

use oplog_sync::remote::{
    BoxFuture, ReverseCursor, TailCursor, UpstreamConnector, UpstreamOplog,
};
use oplog_sync::{Gtid, OplogEntry, SyncError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

const TAIL_POLL: Duration = Duration::from_millis(10);
const BATCH_SIZE: usize = 100;

struct UpstreamInner {
    host: String,
    log: RwLock<Vec<OplogEntry>>,
    /// When false, every open cursor reports itself lost.
    cursors_alive: AtomicBool,
}

/// A mock upstream member serving a programmable oplog.
#[derive(Clone)]
pub struct MockUpstream(Arc<UpstreamInner>);

impl MockUpstream {
    pub fn new(host: &str, log: Vec<OplogEntry>) -> Self {
        Self(Arc::new(UpstreamInner {
            host: host.to_string(),
            log: RwLock::new(log),
            cursors_alive: AtomicBool::new(true),
        }))
    }

    /// Append entries to the upstream oplog (visible to open cursors).
    #[allow(dead_code)]
    pub fn append(&self, entries: Vec<OplogEntry>) {
        self.0.log.write().unwrap().extend(entries);
    }

    /// Drop every open cursor, as a step-down would.
    #[allow(dead_code)]
    pub fn drop_cursors(&self) {
        self.0.cursors_alive.store(false, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn revive(&self) {
        self.0.cursors_alive.store(true, Ordering::SeqCst);
    }
}

impl UpstreamOplog for MockUpstream {
    fn host(&self) -> &str {
        &self.0.host
    }

    fn oldest_entry(&self) -> BoxFuture<'_, Option<OplogEntry>> {
        Box::pin(async move { Ok(self.0.log.read().unwrap().first().cloned()) })
    }

    fn tail_from(&self, from: Gtid) -> BoxFuture<'_, Box<dyn TailCursor>> {
        let inner = Arc::clone(&self.0);
        Box::pin(async move {
            Ok(Box::new(MockTailCursor {
                inner,
                pos: from,
                batch: VecDeque::new(),
                open: true,
            }) as Box<dyn TailCursor>)
        })
    }

    fn rollback_scan(&self, from: Gtid) -> BoxFuture<'_, Box<dyn ReverseCursor>> {
        let inner = Arc::clone(&self.0);
        Box::pin(async move {
            // snapshot, newest first, starting at `from`
            let mut entries: Vec<OplogEntry> = inner
                .log
                .read()
                .unwrap()
                .iter()
                .filter(|e| e.gtid <= from)
                .cloned()
                .collect();
            entries.reverse();
            Ok(Box::new(MockReverseCursor {
                entries: entries.into(),
            }) as Box<dyn ReverseCursor>)
        })
    }
}

struct MockTailCursor {
    inner: Arc<UpstreamInner>,
    /// Lowest GTID not yet fetched.
    pos: Gtid,
    batch: VecDeque<OplogEntry>,
    open: bool,
}

impl MockTailCursor {
    fn fetch_batch(&mut self) -> bool {
        let log = self.inner.log.read().unwrap();
        let fresh: Vec<OplogEntry> = log
            .iter()
            .filter(|e| e.gtid >= self.pos)
            .take(BATCH_SIZE)
            .cloned()
            .collect();
        drop(log);

        if let Some(last) = fresh.last() {
            self.pos = last.gtid.next();
            self.batch.extend(fresh);
            true
        } else {
            false
        }
    }
}

impl TailCursor for MockTailCursor {
    fn is_open(&self) -> bool {
        self.open && self.inner.cursors_alive.load(Ordering::SeqCst)
    }

    fn more_in_current_batch(&self) -> bool {
        !self.batch.is_empty()
    }

    fn more(&mut self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            if !self.inner.cursors_alive.load(Ordering::SeqCst) {
                self.open = false;
                return Ok(false);
            }
            if !self.batch.is_empty() {
                return Ok(true);
            }
            if self.fetch_batch() {
                return Ok(true);
            }
            // at the tail: wait briefly for new entries, like a blocking read
            tokio::time::sleep(TAIL_POLL).await;
            Ok(self.fetch_batch())
        })
    }

    fn next_entry(&mut self) -> Option<OplogEntry> {
        self.batch.pop_front()
    }

    fn tail_check(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if !self.inner.cursors_alive.load(Ordering::SeqCst) {
                self.open = false;
            }
            Ok(())
        })
    }
}

struct MockReverseCursor {
    entries: VecDeque<OplogEntry>,
}

impl ReverseCursor for MockReverseCursor {
    fn next_entry(&mut self) -> BoxFuture<'_, Option<OplogEntry>> {
        Box::pin(async move { Ok(self.entries.pop_front()) })
    }
}

/// Connector mapping hosts to mock upstreams, with injectable failures.
pub struct MockConnector {
    upstreams: HashMap<String, MockUpstream>,
    refuse: Mutex<HashSet<String>>,
}

impl MockConnector {
    pub fn new(upstreams: Vec<MockUpstream>) -> Self {
        Self {
            upstreams: upstreams
                .into_iter()
                .map(|u| (u.host().to_string(), u))
                .collect(),
            refuse: Mutex::new(HashSet::new()),
        }
    }

    pub fn single(upstream: MockUpstream) -> Self {
        Self::new(vec![upstream])
    }

    /// Make connects to `host` fail until revived.
    #[allow(dead_code)]
    pub fn refuse(&self, host: &str) {
        self.refuse.lock().unwrap().insert(host.to_string());
    }

    #[allow(dead_code)]
    pub fn accept(&self, host: &str) {
        self.refuse.lock().unwrap().remove(host);
    }
}

impl UpstreamConnector for MockConnector {
    fn connect(&self, host: &str) -> BoxFuture<'_, Box<dyn UpstreamOplog>> {
        let host = host.to_string();
        Box::pin(async move {
            if self.refuse.lock().unwrap().contains(&host) {
                return Err(SyncError::network("connect", format!("{host} refused")));
            }
            match self.upstreams.get(&host) {
                Some(upstream) => Ok(Box::new(upstream.clone()) as Box<dyn UpstreamOplog>),
                None => Err(SyncError::network("connect", format!("{host} unknown"))),
            }
        })
    }
}
