use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::archive::SampleKind;
use crate::config::Role;
use crate::db::models::SessionChange;
use crate::presence::{PresenceBand, PresenceOutcome, Verdict};

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub message: String,
    pub state: Verdict,
    pub band: PresenceBand,
    pub room_id: Option<i64>,
    pub estimation_confidence: u8,
    pub inquiry_confidence: Option<u8>,
    pub session_id: Option<i64>,
}

impl From<PresenceOutcome> for SubmitResponse {
    fn from(outcome: PresenceOutcome) -> Self {
        let message = match (&outcome.verdict, &outcome.change) {
            (Verdict::Present, Some(SessionChange::Opened { .. })) => "presence session started",
            (Verdict::Present, Some(SessionChange::Moved { .. })) => "moved to another room",
            (Verdict::Present, Some(SessionChange::Superseded { .. })) => {
                "out-of-date submission ignored"
            }
            (Verdict::Present, _) => "presence confirmed",
            (Verdict::Absent, _) if outcome.closed_session_id.is_some() => {
                "presence session ended"
            }
            (Verdict::Absent, _) => "not present",
        };

        Self {
            message: message.to_string(),
            state: outcome.verdict,
            band: outcome.band,
            room_id: outcome.room_id,
            estimation_confidence: outcome.estimation_confidence.value(),
            inquiry_confidence: outcome.inquiry_confidence.map(|c| c.value()),
            session_id: outcome
                .change
                .map(|change| change.session_id())
                .or(outcome.closed_session_id),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FingerprintResponse {
    pub message: String,
    pub sample: SampleKind,
    pub room_id: i64,
}

/// `?date=YYYY-MM-DD`; absent means one month back.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub role: Role,
    pub database: &'static str,
    pub timestamp: DateTime<Utc>,
}
