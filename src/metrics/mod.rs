mod types;

pub use types::{BandCounts, DecisionRecord, MetricEvent, MetricsSnapshot};

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::presence::PresenceBand;

const MAX_RECENT_DECISIONS: usize = 20;

/// Per-instance counters. Cloning shares the same state, so one collector is
/// created in `run()` and handed to every component that reports.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

#[derive(Default)]
struct MetricsState {
    snapshot: MetricsSnapshot,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, event: MetricEvent) {
        self.record_many(event, 1).await;
    }

    pub async fn record_many(&self, event: MetricEvent, count: u64) {
        let mut state = self.inner.lock().await;
        let counters = &mut state.snapshot;
        let slot = match event {
            MetricEvent::Submission => &mut counters.submissions,
            MetricEvent::PeerQueried => &mut counters.peer_queries,
            MetricEvent::PeerFailed => &mut counters.peer_failures,
            MetricEvent::SessionOpened => &mut counters.sessions_opened,
            MetricEvent::SessionClosed => &mut counters.sessions_closed,
            MetricEvent::SessionReaped => &mut counters.sessions_reaped,
            MetricEvent::PeerRegistered => &mut counters.peers_registered,
            MetricEvent::PeerSwept => &mut counters.peers_swept,
        };
        *slot += count;
    }

    pub async fn record_decision(&self, decision: DecisionRecord) {
        let mut state = self.inner.lock().await;
        let counters = &mut state.snapshot;

        match decision.band {
            PresenceBand::Absent => counters.decisions.absent += 1,
            PresenceBand::Ambiguous => counters.decisions.ambiguous += 1,
            PresenceBand::Present => counters.decisions.present += 1,
        }

        counters.recent_decisions.push(decision);
        if counters.recent_decisions.len() > MAX_RECENT_DECISIONS {
            counters.recent_decisions.remove(0);
        }
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().await.snapshot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn decision(band: PresenceBand) -> DecisionRecord {
        DecisionRecord {
            timestamp: Utc::now(),
            band,
            estimation_confidence: 50,
            inquiry_confidence: None,
            present: false,
            room_id: None,
        }
    }

    #[tokio::test]
    async fn clones_share_counters() {
        let metrics = MetricsCollector::new();
        let handle = metrics.clone();

        handle.record(MetricEvent::Submission).await;
        handle.record_many(MetricEvent::PeerFailed, 2).await;
        metrics.record_decision(decision(PresenceBand::Ambiguous)).await;

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.submissions, 1);
        assert_eq!(snapshot.peer_failures, 2);
        assert_eq!(snapshot.decisions.ambiguous, 1);
        assert_eq!(handle.snapshot().await.peer_failures, 2);
    }

    #[tokio::test]
    async fn keeps_only_recent_decisions() {
        let metrics = MetricsCollector::new();
        for _ in 0..(MAX_RECENT_DECISIONS + 5) {
            metrics.record_decision(decision(PresenceBand::Present)).await;
        }
        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.recent_decisions.len(), MAX_RECENT_DECISIONS);
        assert_eq!(snapshot.decisions.present, (MAX_RECENT_DECISIONS + 5) as u64);
    }
}
