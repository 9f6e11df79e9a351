//! Sync-target selection.
//!
//! Walks the replica set's candidates in preference order, vets each one
//! (connectivity, then a staleness probe against the candidate's oldest
//! oplog entry), and hands back the first acceptable upstream. Unusable
//! candidates are vetoed so the next selection round skips them; a
//! stale-only outcome transitions the local node to the stale state.

use crate::config::TargetConfig;
use crate::gtid::{Gtid, GtidManager};
use crate::metrics;
use crate::remote::{UpstreamConnector, UpstreamOplog};
use crate::replset::ReplicaSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Picks and vets an upstream member to sync from.
pub struct SyncTargetSelector {
    replset: Arc<dyn ReplicaSet>,
    connector: Arc<dyn UpstreamConnector>,
    gtids: Arc<dyn GtidManager>,
    config: TargetConfig,
}

impl SyncTargetSelector {
    pub fn new(
        replset: Arc<dyn ReplicaSet>,
        connector: Arc<dyn UpstreamConnector>,
        gtids: Arc<dyn GtidManager>,
        config: TargetConfig,
    ) -> Self {
        Self {
            replset,
            connector,
            gtids,
            config,
        }
    }

    /// Pick a sync target, or `None` if no member is usable right now.
    ///
    /// The caller sleeps a second and retries on `None`. If the only viable
    /// candidates had already trimmed past our position, the local node is
    /// signalled stale before returning.
    pub async fn pick_target(&self) -> Option<Box<dyn UpstreamOplog>> {
        let mut stale_candidate: Option<(String, Gtid)> = None;

        while let Some(host) = self.replset.next_sync_candidate() {
            let upstream = match self.connector.connect(&host).await {
                Ok(upstream) => upstream,
                Err(e) => {
                    debug!(host = %host, error = %e, "cannot connect to candidate");
                    metrics::record_target_veto(&host, "connect");
                    self.replset
                        .veto(&host, self.config.connect_veto_duration());
                    continue;
                }
            };

            match self.stale_relative_to(upstream.as_ref()).await {
                StaleProbe::Stale(remote_oldest) => {
                    warn!(
                        host = %host,
                        remote_oldest = %remote_oldest,
                        our_live = %self.gtids.live_state(),
                        "candidate has trimmed past our position"
                    );
                    metrics::record_target_veto(&host, "stale");
                    self.replset.veto(&host, self.config.stale_veto_duration());
                    stale_candidate = Some((host, remote_oldest));
                    continue;
                }
                StaleProbe::ProbeFailed(msg) => {
                    debug!(host = %host, error = %msg, "staleness probe failed");
                    metrics::record_target_veto(&host, "probe");
                    self.replset
                        .veto(&host, self.config.connect_veto_duration());
                    continue;
                }
                StaleProbe::Fresh => {}
            }

            info!(host = %host, "syncing from");
            metrics::record_target_selected(&host);
            return Some(upstream);
        }

        if let Some((host, remote_oldest)) = stale_candidate {
            // every usable member has trimmed past us; only a resync helps
            metrics::record_went_stale();
            self.replset.go_stale(&host, remote_oldest);
        }

        None
    }

    /// Compare our live GTID with the candidate's oldest entry.
    async fn stale_relative_to(&self, upstream: &dyn UpstreamOplog) -> StaleProbe {
        let oldest = match upstream.oldest_entry().await {
            Ok(oldest) => oldest,
            Err(e) => return StaleProbe::ProbeFailed(e.to_string()),
        };
        match oldest {
            Some(entry) if self.gtids.live_state() < entry.gtid => StaleProbe::Stale(entry.gtid),
            _ => StaleProbe::Fresh,
        }
    }
}

enum StaleProbe {
    Fresh,
    Stale(Gtid),
    ProbeFailed(String),
}
