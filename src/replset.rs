//! Replica-set state contract.
//!
//! The membership/heartbeat subsystem is opaque to the core; this is the
//! slice of it the pipeline consumes. The core treats [`ReplicaSet::fatal`]
//! and [`ReplicaSet::go_stale`] as terminal.
//!
//! # Member States
//!
//! ```text
//!                     sync running
//! Startup ──────► Secondary ◄──────► Rollback
//!                     │ │
//!        (stale) ◄────┘ └────► Fatal
//! ```
//!
//! `Primary` appears here only so the producer can assert it never pulls
//! while primary; promotion and demotion are outside the core.

use crate::gtid::Gtid;
use std::time::Duration;

/// Replica-set member state as the core observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberState {
    /// Node is still initializing; the producer backs off.
    Startup,
    /// Normal pulling state.
    Secondary,
    /// This node is primary; the producer must not pull.
    Primary,
    /// A rollback is being performed.
    Rollback,
    /// Behind every candidate's oldest entry; needs operator resync.
    Stale,
    /// Unrecoverable; the producer short-circuits until restart.
    Fatal,
}

impl MemberState {
    pub fn is_fatal(&self) -> bool {
        *self == MemberState::Fatal
    }

    pub fn is_startup(&self) -> bool {
        *self == MemberState::Startup
    }
}

impl std::fmt::Display for MemberState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MemberState::Startup => "Startup",
            MemberState::Secondary => "Secondary",
            MemberState::Primary => "Primary",
            MemberState::Rollback => "Rollback",
            MemberState::Stale => "Stale",
            MemberState::Fatal => "Fatal",
        };
        write!(f, "{s}")
    }
}

/// The replica-set operations the pipeline drives.
///
/// Implementations manage their own synchronization; every method may be
/// called from either worker or from lifecycle callers.
pub trait ReplicaSet: Send + Sync {
    /// Current member state.
    fn state(&self) -> MemberState;

    fn is_primary(&self) -> bool {
        self.state() == MemberState::Primary
    }

    /// Is this a one-member set whose member could become primary?
    ///
    /// In that configuration there are no heartbeat threads and nothing to
    /// sync; the producer asks for a state re-check instead.
    fn single_primary_member(&self) -> bool;

    /// Ask the membership component to re-evaluate state.
    fn request_state_check(&self);

    /// Operator-configured lag between upstream commit and local apply.
    fn slave_delay(&self) -> Duration;

    /// The next candidate to sync from, best first, honoring active vetoes.
    ///
    /// Returns `None` when every member is excluded.
    fn next_sync_candidate(&self) -> Option<String>;

    /// Is the member still connected and readable per heartbeat info?
    fn target_healthy(&self, host: &str) -> bool;

    /// Exclude a member from selection for `duration`.
    fn veto(&self, host: &str, duration: Duration);

    /// This node is behind `host`'s oldest entry `remote_oldest`; transition
    /// to the stale state. Terminal until an operator resyncs.
    fn go_stale(&self, host: &str, remote_oldest: Gtid);

    /// Enter the ROLLBACK state.
    fn enter_rollback(&self);

    /// Leave the ROLLBACK state (back to secondary).
    fn leave_rollback(&self);

    /// Transition to the FATAL state. Terminal.
    fn fatal(&self);

    /// Did an operator request syncing from a specific target?
    ///
    /// When set, the producer abandons the current pass so selection can
    /// honor the request.
    fn got_force_sync(&self) -> bool;

    /// Force the replication-info writer to flush its view of our position.
    fn force_update_repl_info(&self);

    /// Record a human-readable health message for heartbeats/status.
    fn set_health_message(&self, msg: String);
}
