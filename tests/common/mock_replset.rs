//! Recording replica-set mock.
//!
//! Implements the full [`ReplicaSet`] contract with in-memory state and
//! records every terminal transition, veto, and health message so tests can
//! assert on what the pipeline did.

use oplog_sync::{Gtid, MemberState, ReplicaSet};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct MockReplicaSet {
    state: Mutex<MemberState>,
    candidates: Mutex<Vec<String>>,
    vetoes: Mutex<HashMap<String, (Instant, Duration)>>,
    unhealthy: Mutex<Vec<String>>,
    slave_delay: Mutex<Duration>,
    single_node: AtomicBool,
    force_sync: AtomicBool,
    state_checks: AtomicU64,
    repl_info_flushes: AtomicU64,
    stale_events: Mutex<Vec<(String, Gtid)>>,
    health_messages: Mutex<Vec<String>>,
    rollback_transitions: Mutex<Vec<&'static str>>,
}

impl MockReplicaSet {
    pub fn new(candidates: Vec<&str>) -> Self {
        Self {
            state: Mutex::new(MemberState::Secondary),
            candidates: Mutex::new(candidates.into_iter().map(String::from).collect()),
            vetoes: Mutex::new(HashMap::new()),
            unhealthy: Mutex::new(Vec::new()),
            slave_delay: Mutex::new(Duration::ZERO),
            single_node: AtomicBool::new(false),
            force_sync: AtomicBool::new(false),
            state_checks: AtomicU64::new(0),
            repl_info_flushes: AtomicU64::new(0),
            stale_events: Mutex::new(Vec::new()),
            health_messages: Mutex::new(Vec::new()),
            rollback_transitions: Mutex::new(Vec::new()),
        }
    }

    // ─── test knobs ──────────────────────────────────────────────────────

    #[allow(dead_code)]
    pub fn set_state(&self, state: MemberState) {
        *self.state.lock().unwrap() = state;
    }

    #[allow(dead_code)]
    pub fn set_slave_delay(&self, delay: Duration) {
        *self.slave_delay.lock().unwrap() = delay;
    }

    #[allow(dead_code)]
    pub fn set_single_node(&self, single: bool) {
        self.single_node.store(single, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn set_force_sync(&self, force: bool) {
        self.force_sync.store(force, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn mark_unhealthy(&self, host: &str) {
        self.unhealthy.lock().unwrap().push(host.to_string());
    }

    // ─── recorded observations ───────────────────────────────────────────

    /// The duration of the most recent veto against `host`.
    #[allow(dead_code)]
    pub fn veto_duration(&self, host: &str) -> Option<Duration> {
        self.vetoes.lock().unwrap().get(host).map(|(_, d)| *d)
    }

    #[allow(dead_code)]
    pub fn stale_events(&self) -> Vec<(String, Gtid)> {
        self.stale_events.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn health_messages(&self) -> Vec<String> {
        self.health_messages.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn rollback_transitions(&self) -> Vec<&'static str> {
        self.rollback_transitions.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn state_checks(&self) -> u64 {
        self.state_checks.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn repl_info_flushes(&self) -> u64 {
        self.repl_info_flushes.load(Ordering::SeqCst)
    }
}

impl ReplicaSet for MockReplicaSet {
    fn state(&self) -> MemberState {
        *self.state.lock().unwrap()
    }

    fn single_primary_member(&self) -> bool {
        self.single_node.load(Ordering::SeqCst)
    }

    fn request_state_check(&self) {
        self.state_checks.fetch_add(1, Ordering::SeqCst);
    }

    fn slave_delay(&self) -> Duration {
        *self.slave_delay.lock().unwrap()
    }

    fn next_sync_candidate(&self) -> Option<String> {
        let vetoes = self.vetoes.lock().unwrap();
        let now = Instant::now();
        self.candidates
            .lock()
            .unwrap()
            .iter()
            .find(|host| match vetoes.get(*host) {
                Some((since, duration)) => now.duration_since(*since) >= *duration,
                None => true,
            })
            .cloned()
    }

    fn target_healthy(&self, host: &str) -> bool {
        !self.unhealthy.lock().unwrap().iter().any(|h| h == host)
    }

    fn veto(&self, host: &str, duration: Duration) {
        self.vetoes
            .lock()
            .unwrap()
            .insert(host.to_string(), (Instant::now(), duration));
    }

    fn go_stale(&self, host: &str, remote_oldest: Gtid) {
        self.stale_events
            .lock()
            .unwrap()
            .push((host.to_string(), remote_oldest));
        *self.state.lock().unwrap() = MemberState::Stale;
    }

    fn enter_rollback(&self) {
        self.rollback_transitions.lock().unwrap().push("enter");
        *self.state.lock().unwrap() = MemberState::Rollback;
    }

    fn leave_rollback(&self) {
        self.rollback_transitions.lock().unwrap().push("leave");
        *self.state.lock().unwrap() = MemberState::Secondary;
    }

    fn fatal(&self) {
        *self.state.lock().unwrap() = MemberState::Fatal;
    }

    fn got_force_sync(&self) -> bool {
        self.force_sync.load(Ordering::SeqCst)
    }

    fn force_update_repl_info(&self) {
        self.repl_info_flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn set_health_message(&self, msg: String) {
        self.health_messages.lock().unwrap().push(msg);
    }
}
