use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::db::{models::PeerRegistration, Database};
use crate::error::{PresenceError, PresenceResult};
use crate::metrics::{MetricEvent, MetricsCollector};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "roomsense::registry";

use crate::log_info;

/// Proxy-side table of peer sites. Liveness is enforced only by [`sweep`];
/// [`list`] returns every row regardless of age.
///
/// [`sweep`]: FederationRegistry::sweep
/// [`list`]: FederationRegistry::list
#[derive(Clone)]
pub struct FederationRegistry {
    db: Database,
    expiry: Duration,
    metrics: MetricsCollector,
}

impl FederationRegistry {
    pub fn new(db: Database, expiry: Duration, metrics: MetricsCollector) -> Self {
        Self {
            db,
            expiry,
            metrics,
        }
    }

    pub async fn register(
        &self,
        scheme: &str,
        host: &str,
        port: u16,
        at: DateTime<Utc>,
    ) -> PresenceResult<PeerRegistration> {
        let scheme = scheme.trim().to_ascii_lowercase();
        let host = host.trim();
        if scheme != "http" && scheme != "https" {
            return Err(PresenceError::validation(format!(
                "unsupported scheme '{scheme}'"
            )));
        }
        if host.is_empty() || host.contains('/') {
            return Err(PresenceError::validation(format!("invalid host '{host}'")));
        }
        if port == 0 {
            return Err(PresenceError::validation("port must be non-zero"));
        }

        let peer = self.db.upsert_peer(&scheme, host, port, at).await?;
        self.metrics.record(MetricEvent::PeerRegistered).await;
        log_info!("registered peer {}", peer.base_url());
        Ok(peer)
    }

    pub async fn list(&self) -> Result<Vec<PeerRegistration>> {
        self.db.list_peers().await
    }

    /// Drops every peer not refreshed within the expiry window ending at `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let removed = self.db.delete_peers_older_than(now - self.expiry).await?;
        if !removed.is_empty() {
            self.metrics
                .record_many(MetricEvent::PeerSwept, removed.len() as u64)
                .await;
            log_info!("swept {} expired peers: {}", removed.len(), removed.join(", "));
        }
        Ok(removed)
    }
}
