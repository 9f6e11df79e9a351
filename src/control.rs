//! Lifecycle flags for the producer worker.
//!
//! Three flags, all broadcast: `should_run` (callers ask the producer to
//! run or pause), `running` (the producer mirrors what it is actually
//! doing), and `should_exit` (shutdown; monotone, set once and never
//! cleared). Every waiter re-tests its predicate on each broadcast, so the
//! handful of historical condition variables collapse into watch channels.
//!
//! The producer's contract: it checks `should_run` at every suspension
//! point and must not stall more than about a second after a pause request,
//! except for a network read already in progress.

use tokio::sync::watch;

/// Outcome of the producer's pause gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Cleared to run a produce pass.
    Run,
    /// Shutdown was requested; the worker should terminate.
    Exit,
}

/// Shared lifecycle flags between the producer and lifecycle callers.
#[derive(Debug)]
pub struct SyncControl {
    should_run: watch::Sender<bool>,
    running: watch::Sender<bool>,
    should_exit: watch::Sender<bool>,
}

impl Default for SyncControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncControl {
    /// Flags start paused: the producer idles until `resume()`.
    pub fn new() -> Self {
        let (should_run, _) = watch::channel(false);
        let (running, _) = watch::channel(false);
        let (should_exit, _) = watch::channel(false);
        Self {
            should_run,
            running,
            should_exit,
        }
    }

    /// Is the producer currently asked to run?
    pub fn should_run(&self) -> bool {
        *self.should_run.borrow()
    }

    /// Has shutdown been requested?
    ///
    /// Safe to read without further synchronization because the flag is
    /// monotone: it goes false→true exactly once.
    pub fn exit_requested(&self) -> bool {
        *self.should_exit.borrow()
    }

    /// Is the producer actually running (its own report)?
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Caller side
    // ─────────────────────────────────────────────────────────────────────

    /// Ask the producer to pause.
    pub fn pause(&self) {
        self.should_run.send_replace(false);
    }

    /// Ask the producer to run.
    pub fn resume(&self) {
        self.should_run.send_replace(true);
    }

    /// Request shutdown. Also clears `should_run` so a paused producer
    /// wakes straight into its exit path.
    pub fn request_exit(&self) {
        self.should_exit.send_replace(true);
        self.should_run.send_replace(false);
    }

    /// Wait until the producer reports it has paused.
    pub async fn wait_paused(&self) {
        let mut rx = self.running.subscribe();
        let _ = rx.wait_for(|running| !running).await;
    }

    /// Wait until the producer reports it is running.
    pub async fn wait_running(&self) {
        let mut rx = self.running.subscribe();
        let _ = rx.wait_for(|running| *running).await;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Producer side
    // ─────────────────────────────────────────────────────────────────────

    /// Mark the producer as not running (pause or inter-pass sleep).
    pub fn mark_paused(&self) {
        self.running.send_replace(false);
    }

    /// Block until cleared to run, mirroring state into `running`.
    pub async fn gate(&self) -> Gate {
        self.running.send_replace(false);

        if self.exit_requested() {
            return Gate::Exit;
        }

        let mut run_rx = self.should_run.subscribe();
        let mut exit_rx = self.should_exit.subscribe();
        tokio::select! {
            _ = run_rx.wait_for(|v| *v) => {}
            _ = exit_rx.wait_for(|v| *v) => {}
        }

        if self.exit_requested() {
            return Gate::Exit;
        }

        self.running.send_replace(true);
        Gate::Run
    }
}
