use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::federation::FederationRegistry;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "roomsense::sweep";

use crate::{log_error, log_info};

/// Periodic expiry of stale peer registrations.
pub struct RegistrySweeper {
    registry: FederationRegistry,
    interval: std::time::Duration,
}

impl RegistrySweeper {
    pub fn new(registry: FederationRegistry, interval: std::time::Duration) -> Self {
        Self { registry, interval }
    }

    pub async fn run(self, cancel_token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.registry.sweep(Utc::now()).await {
                        log_error!("registry sweep failed: {err:?}");
                    }
                }
                _ = cancel_token.cancelled() => {
                    log_info!("registry sweep shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::background::BackgroundTask;
    use crate::db::connection::test_support::temp_database;
    use crate::metrics::MetricsCollector;

    #[tokio::test]
    async fn first_tick_sweeps_expired_peers() {
        let (_dir, db) = temp_database();
        let registry = FederationRegistry::new(db, Duration::hours(24), MetricsCollector::new());
        registry
            .register("http", "gone.example", 80, Utc::now() - Duration::hours(30))
            .await
            .unwrap();
        registry
            .register("http", "alive.example", 80, Utc::now())
            .await
            .unwrap();

        let mut task = BackgroundTask::new("registry sweep");
        let sweeper = RegistrySweeper::new(registry.clone(), std::time::Duration::from_secs(3600));
        task.start(move |cancel| sweeper.run(cancel)).unwrap();

        let mut remaining = Vec::new();
        for _ in 0..50 {
            remaining = registry.list().await.unwrap();
            if remaining.len() == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        task.stop().await.unwrap();

        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].host, "alive.example");
    }
}
