use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{models::SessionChange, Database};
use crate::error::{PresenceError, PresenceResult};
use crate::metrics::{DecisionRecord, MetricEvent, MetricsCollector};
use crate::models::{ConfidenceScore, SignalPayload};

use super::arbiter::{ConfidenceArbiter, InquirySource, PresenceBand, Verdict};
use super::catalogue::BeaconCatalogue;
use super::estimation::EstimationSource;
use super::resolver::resolve_room;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "roomsense::presence";

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Serialize)]
pub struct PresenceOutcome {
    pub band: PresenceBand,
    pub verdict: Verdict,
    pub room_id: Option<i64>,
    pub estimation_confidence: ConfidenceScore,
    pub inquiry_confidence: Option<ConfidenceScore>,
    /// What happened to the open session on a present verdict.
    pub change: Option<SessionChange>,
    /// Session closed by an absent verdict, if one was open.
    pub closed_session_id: Option<i64>,
}

/// Estimation, arbitration, room resolution and the session write for one
/// submission.
pub struct PresenceService {
    db: Database,
    catalogue: Arc<BeaconCatalogue>,
    estimator: Arc<dyn EstimationSource>,
    peers: Arc<dyn InquirySource>,
    arbiter: ConfidenceArbiter,
    metrics: MetricsCollector,
}

impl PresenceService {
    pub fn new(
        db: Database,
        catalogue: Arc<BeaconCatalogue>,
        estimator: Arc<dyn EstimationSource>,
        peers: Arc<dyn InquirySource>,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            db,
            catalogue,
            estimator,
            peers,
            arbiter: ConfidenceArbiter::new(),
            metrics,
        }
    }

    pub fn catalogue(&self) -> &BeaconCatalogue {
        &self.catalogue
    }

    /// Confidence this site reports to peers asking about `payload`.
    pub async fn estimate(&self, payload: &SignalPayload) -> PresenceResult<ConfidenceScore> {
        self.estimator.estimate(payload).await
    }

    pub async fn submit(
        &self,
        user_id: i64,
        payload: &SignalPayload,
        at: DateTime<Utc>,
    ) -> PresenceResult<PresenceOutcome> {
        if payload.is_empty() {
            return Err(PresenceError::validation("submission contains no signal rows"));
        }
        self.metrics.record(MetricEvent::Submission).await;

        let estimation = self.estimator.estimate(payload).await?;
        let decision = self
            .arbiter
            .decide(estimation, payload, self.peers.as_ref())
            .await?;

        let mut outcome = PresenceOutcome {
            band: decision.band,
            verdict: decision.verdict,
            room_id: None,
            estimation_confidence: estimation,
            inquiry_confidence: decision.inquiry,
            change: None,
            closed_session_id: None,
        };

        match decision.verdict {
            Verdict::Present => {
                let room_id = match resolve_room(
                    &self.catalogue,
                    &payload.ble_readings(),
                    &payload.wifi_readings(),
                ) {
                    Ok(room_id) => room_id,
                    Err(err) => {
                        log_warn!(
                            "user {} judged present at {} but no room matched",
                            user_id,
                            estimation
                        );
                        self.record(&outcome, at).await;
                        return Err(err);
                    }
                };

                let change = self.db.upsert_presence(user_id, room_id, at).await?;
                match change {
                    SessionChange::Opened { .. } => {
                        self.metrics.record(MetricEvent::SessionOpened).await;
                    }
                    SessionChange::Moved { .. } => {
                        self.metrics.record(MetricEvent::SessionClosed).await;
                        self.metrics.record(MetricEvent::SessionOpened).await;
                    }
                    SessionChange::Refreshed { .. } | SessionChange::Superseded { .. } => {}
                }
                outcome.room_id = Some(room_id);
                outcome.change = Some(change);
            }
            Verdict::Absent => {
                let closed = self.db.close_presence(user_id, at).await?;
                if closed.is_some() {
                    self.metrics.record(MetricEvent::SessionClosed).await;
                }
                outcome.closed_session_id = closed;
            }
        }

        log_info!(
            "user {} {:?} (band {:?}, estimation {}, inquiry {:?}, room {:?})",
            user_id,
            outcome.verdict,
            outcome.band,
            estimation,
            outcome.inquiry_confidence.map(|c| c.value()),
            outcome.room_id
        );
        self.record(&outcome, at).await;
        Ok(outcome)
    }

    async fn record(&self, outcome: &PresenceOutcome, at: DateTime<Utc>) {
        self.metrics
            .record_decision(DecisionRecord {
                timestamp: at,
                band: outcome.band,
                estimation_confidence: outcome.estimation_confidence.value(),
                inquiry_confidence: outcome.inquiry_confidence.map(|c| c.value()),
                present: outcome.verdict == Verdict::Present,
                room_id: outcome.room_id,
            })
            .await;
    }
}
