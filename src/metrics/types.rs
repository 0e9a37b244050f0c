use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::presence::PresenceBand;

/// Everything the service counts. Components report through
/// [`super::MetricsCollector::record`] rather than touching counters directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricEvent {
    Submission,
    PeerQueried,
    PeerFailed,
    SessionOpened,
    SessionClosed,
    SessionReaped,
    PeerRegistered,
    PeerSwept,
}

/// One arbitration outcome, kept in a short ring for the metrics endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub timestamp: DateTime<Utc>,
    pub band: PresenceBand,
    pub estimation_confidence: u8,
    pub inquiry_confidence: Option<u8>,
    pub present: bool,
    pub room_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BandCounts {
    pub absent: u64,
    pub ambiguous: u64,
    pub present: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub submissions: u64,
    pub decisions: BandCounts,
    pub peer_queries: u64,
    pub peer_failures: u64,
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub sessions_reaped: u64,
    pub peers_registered: u64,
    pub peers_swept: u64,
    pub recent_decisions: Vec<DecisionRecord>,
}
