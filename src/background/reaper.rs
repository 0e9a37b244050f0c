use chrono::{DateTime, Duration, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::db::Database;
use crate::metrics::{MetricEvent, MetricsCollector};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "roomsense::reaper";

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub stale: usize,
    pub closed: usize,
    pub failed: usize,
}

/// Closes open sessions nobody has confirmed for longer than the inactivity
/// threshold. A reaped session ends at `last_seen + threshold`.
#[derive(Clone)]
pub struct SessionReaper {
    db: Database,
    inactivity: Duration,
    interval: std::time::Duration,
    metrics: MetricsCollector,
}

impl SessionReaper {
    pub fn new(
        db: Database,
        inactivity: Duration,
        interval: std::time::Duration,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            db,
            inactivity,
            interval,
            metrics,
        }
    }

    /// One pass. Each session is closed independently; a failure is logged
    /// and retried on the next pass.
    pub async fn reap(&self, now: DateTime<Utc>) -> ReapReport {
        let cutoff = now - self.inactivity;
        let stale = match self.db.stale_open_sessions(cutoff).await {
            Ok(sessions) => sessions,
            Err(err) => {
                log_error!("failed to list stale sessions: {err:?}");
                return ReapReport {
                    failed: 1,
                    ..ReapReport::default()
                };
            }
        };

        let mut report = ReapReport {
            stale: stale.len(),
            ..ReapReport::default()
        };

        for session in stale {
            let end_time = session.last_seen + self.inactivity;
            match self
                .db
                .close_stale_session(session.session_id, end_time, cutoff)
                .await
            {
                Ok(true) => {
                    report.closed += 1;
                    log_info!(
                        "reaped session {} of user {} (last seen {})",
                        session.session_id,
                        session.user_id,
                        session.last_seen
                    );
                }
                Ok(false) => {}
                Err(err) => {
                    report.failed += 1;
                    log_warn!(
                        "could not reap session {} of user {}: {err:?}",
                        session.session_id,
                        session.user_id
                    );
                }
            }
        }

        if report.closed > 0 {
            self.metrics
                .record_many(MetricEvent::SessionReaped, report.closed as u64)
                .await;
        }
        report
    }

    pub async fn run(self, cancel_token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.reap(Utc::now()).await;
                }
                _ = cancel_token.cancelled() => {
                    log_info!("session reaper shutting down");
                    break;
                }
            }
        }
    }
}
