//! Configuration for the replication core.
//!
//! All knobs come with the hard-coded defaults the pipeline historically
//! shipped with; deployments rarely need to touch anything except possibly
//! the queue watermarks. Configuration can be constructed programmatically
//! or deserialized from YAML/JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use oplog_sync::config::SyncConfig;
//!
//! let config = SyncConfig::default();
//! assert_eq!(config.queue.high_watermark, 20_000);
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! SyncConfig
//! ├── queue: QueueConfig        # flow-control watermarks
//! ├── target: TargetConfig      # sync-target vetting
//! ├── rollback: RollbackConfig  # rollback window
//! └── retry: RetryConfig        # producer/applier sleep ladder
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config passed to `ReplicationPipeline::new()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub rollback: RollbackConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Shrunken timings and watermarks so tests finish in milliseconds.
    pub fn for_testing() -> Self {
        Self {
            queue: QueueConfig {
                high_watermark: 200,
                low_watermark: 100,
            },
            target: TargetConfig::default(),
            rollback: RollbackConfig::default(),
            retry: RetryConfig {
                no_target_ms: 10,
                single_node_ms: 10,
                not_secondary_ms: 10,
                divergence_ms: 10,
                producer_error_ms: 20,
                apply_error_ms: 10,
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// QueueConfig: flow control
// ═══════════════════════════════════════════════════════════════════════════════

/// Watermarks for the producer/applier queue.
///
/// When a push brings the queue to `high_watermark` entries the producer
/// blocks; it resumes once the applier has drained the queue down to
/// `low_watermark`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_high_watermark")]
    pub high_watermark: usize,

    #[serde(default = "default_low_watermark")]
    pub low_watermark: usize,
}

fn default_high_watermark() -> usize {
    20_000
}

fn default_low_watermark() -> usize {
    10_000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            high_watermark: 20_000,
            low_watermark: 10_000,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TargetConfig: sync-target vetting
// ═══════════════════════════════════════════════════════════════════════════════

/// Sync-target selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// How long a candidate is excluded after a failed connect.
    /// Duration string (e.g. "10s").
    #[serde(default = "default_connect_veto")]
    pub connect_veto: String,

    /// How long a candidate is excluded after a staleness probe showed we
    /// are behind its oldest entry.
    #[serde(default = "default_stale_veto")]
    pub stale_veto: String,
}

fn default_connect_veto() -> String {
    "10s".to_string()
}

fn default_stale_veto() -> String {
    "10m".to_string()
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            connect_veto: default_connect_veto(),
            stale_veto: default_stale_veto(),
        }
    }
}

impl TargetConfig {
    pub fn connect_veto_duration(&self) -> Duration {
        humantime::parse_duration(&self.connect_veto).unwrap_or(Duration::from_secs(10))
    }

    pub fn stale_veto_duration(&self) -> Duration {
        humantime::parse_duration(&self.stale_veto).unwrap_or(Duration::from_secs(600))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RollbackConfig: rollback window
// ═══════════════════════════════════════════════════════════════════════════════

/// Rollback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackConfig {
    /// How far back (in upstream-oplog time) the ancestor scan may reach
    /// before giving up. Duration string (e.g. "30m").
    #[serde(default = "default_horizon")]
    pub horizon: String,
}

fn default_horizon() -> String {
    "30m".to_string()
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            horizon: default_horizon(),
        }
    }
}

impl RollbackConfig {
    pub fn horizon_duration(&self) -> Duration {
        humantime::parse_duration(&self.horizon).unwrap_or(Duration::from_secs(1_800))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RetryConfig: the sleep ladder
// ═══════════════════════════════════════════════════════════════════════════════

/// Sleep durations for the producer and applier retry paths.
///
/// Milliseconds rather than duration strings: these are pipeline-internal
/// pacing values, and tests shrink them wholesale via
/// [`SyncConfig::for_testing`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// No sync target available.
    #[serde(default = "default_no_target_ms")]
    pub no_target_ms: u64,

    /// Single-member set with nothing to sync.
    #[serde(default = "default_single_node_ms")]
    pub single_node_ms: u64,

    /// Replica-set state fatal or still starting up.
    #[serde(default = "default_not_secondary_ms")]
    pub not_secondary_ms: u64,

    /// After a rollback pass, before re-selecting a target.
    #[serde(default = "default_divergence_ms")]
    pub divergence_ms: u64,

    /// After an uncaught producer error.
    #[serde(default = "default_producer_error_ms")]
    pub producer_error_ms: u64,

    /// Between retries of a failing apply.
    #[serde(default = "default_apply_error_ms")]
    pub apply_error_ms: u64,
}

fn default_no_target_ms() -> u64 {
    1_000
}

fn default_single_node_ms() -> u64 {
    1_000
}

fn default_not_secondary_ms() -> u64 {
    5_000
}

fn default_divergence_ms() -> u64 {
    2_000
}

fn default_producer_error_ms() -> u64 {
    10_000
}

fn default_apply_error_ms() -> u64 {
    2_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            no_target_ms: 1_000,
            single_node_ms: 1_000,
            not_secondary_ms: 5_000,
            divergence_ms: 2_000,
            producer_error_ms: 10_000,
            apply_error_ms: 2_000,
        }
    }
}

impl RetryConfig {
    pub fn no_target(&self) -> Duration {
        Duration::from_millis(self.no_target_ms)
    }

    pub fn single_node(&self) -> Duration {
        Duration::from_millis(self.single_node_ms)
    }

    pub fn not_secondary(&self) -> Duration {
        Duration::from_millis(self.not_secondary_ms)
    }

    pub fn divergence(&self) -> Duration {
        Duration::from_millis(self.divergence_ms)
    }

    pub fn producer_error(&self) -> Duration {
        Duration::from_millis(self.producer_error_ms)
    }

    pub fn apply_error(&self) -> Duration {
        Duration::from_millis(self.apply_error_ms)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
