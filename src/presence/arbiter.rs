//! Decision policy over the estimation confidence.
//!
//! | estimation   | band      | action                                   |
//! |--------------|-----------|------------------------------------------|
//! | `< 20`       | Absent    | close the open session                   |
//! | `20..=70`    | Ambiguous | ask federated peers, compare, then decide |
//! | `> 70`       | Present   | resolve the room and upsert              |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PresenceResult;
use crate::models::{ConfidenceScore, SignalPayload};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "roomsense::arbiter";

use crate::log_debug;

/// Lowest estimation that is not outright absent.
pub const AMBIGUOUS_FLOOR: u8 = 20;
/// Highest estimation that still needs a peer opinion.
pub const AMBIGUOUS_CEILING: u8 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceBand {
    Absent,
    Ambiguous,
    Present,
}

impl PresenceBand {
    pub fn of(estimation: ConfidenceScore) -> Self {
        match estimation.value() {
            value if value < AMBIGUOUS_FLOOR => PresenceBand::Absent,
            value if value <= AMBIGUOUS_CEILING => PresenceBand::Ambiguous,
            _ => PresenceBand::Present,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Present,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub band: PresenceBand,
    pub verdict: Verdict,
    pub estimation: ConfidenceScore,
    /// Set only when peers were consulted and at least one was queried.
    pub inquiry: Option<ConfidenceScore>,
}

/// Where ambiguous submissions get a second opinion.
#[async_trait]
pub trait InquirySource: Send + Sync {
    /// Best confidence among federated peers, or `None` when no peer could
    /// be asked at all.
    async fn inquire(
        &self,
        payload: &SignalPayload,
        estimation: ConfidenceScore,
    ) -> PresenceResult<Option<ConfidenceScore>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceArbiter;

impl ConfidenceArbiter {
    pub fn new() -> Self {
        Self
    }

    /// Ambiguous outcome: local estimation must be at least as confident as
    /// the best peer. No peer data counts as a peer confidence of zero.
    pub fn settle(&self, estimation: ConfidenceScore, inquiry: Option<ConfidenceScore>) -> Verdict {
        if estimation >= inquiry.unwrap_or(ConfidenceScore::ZERO) {
            Verdict::Present
        } else {
            Verdict::Absent
        }
    }

    /// Bands the estimation and, only for the ambiguous band, consults
    /// `peers`. Inquiry failures propagate.
    pub async fn decide(
        &self,
        estimation: ConfidenceScore,
        payload: &SignalPayload,
        peers: &dyn InquirySource,
    ) -> PresenceResult<Decision> {
        let band = PresenceBand::of(estimation);
        let (verdict, inquiry) = match band {
            PresenceBand::Absent => (Verdict::Absent, None),
            PresenceBand::Present => (Verdict::Present, None),
            PresenceBand::Ambiguous => {
                let inquiry = peers.inquire(payload, estimation).await?;
                let verdict = self.settle(estimation, inquiry);
                log_debug!(
                    "ambiguous estimation {} vs peers {:?} -> {:?}",
                    estimation,
                    inquiry.map(|c| c.value()),
                    verdict
                );
                (verdict, inquiry)
            }
        };

        Ok(Decision {
            band,
            verdict,
            estimation,
            inquiry,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::PresenceError;

    struct CountingPeers {
        answer: Option<ConfidenceScore>,
        calls: AtomicUsize,
    }

    impl CountingPeers {
        fn answering(answer: Option<u8>) -> Self {
            Self {
                answer: answer.map(ConfidenceScore::from),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl InquirySource for CountingPeers {
        async fn inquire(
            &self,
            _payload: &SignalPayload,
            _estimation: ConfidenceScore,
        ) -> PresenceResult<Option<ConfidenceScore>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer)
        }
    }

    struct FailingPeers;

    #[async_trait]
    impl InquirySource for FailingPeers {
        async fn inquire(
            &self,
            _payload: &SignalPayload,
            _estimation: ConfidenceScore,
        ) -> PresenceResult<Option<ConfidenceScore>> {
            Err(PresenceError::upstream("inquiry", "proxy unreachable"))
        }
    }

    #[test]
    fn band_edges() {
        let band = |v: u8| PresenceBand::of(ConfidenceScore::from(v));
        assert_eq!(band(19), PresenceBand::Absent);
        assert_eq!(band(20), PresenceBand::Ambiguous);
        assert_eq!(band(70), PresenceBand::Ambiguous);
        assert_eq!(band(71), PresenceBand::Present);
        assert_eq!(band(0), PresenceBand::Absent);
        assert_eq!(band(100), PresenceBand::Present);
    }

    #[tokio::test]
    async fn clear_bands_never_ask_peers() {
        let peers = CountingPeers::answering(Some(99));
        let arbiter = ConfidenceArbiter::new();
        let payload = SignalPayload::default();

        let absent = arbiter.decide(ConfidenceScore::new(19), &payload, &peers).await.unwrap();
        assert_eq!(absent.verdict, Verdict::Absent);
        let present = arbiter.decide(ConfidenceScore::new(71), &payload, &peers).await.unwrap();
        assert_eq!(present.verdict, Verdict::Present);
        assert_eq!(present.inquiry, None);

        assert_eq!(peers.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ambiguous_compares_with_peers() {
        let arbiter = ConfidenceArbiter::new();
        let payload = SignalPayload::default();

        let weaker_peer = CountingPeers::answering(Some(40));
        let decision = arbiter.decide(ConfidenceScore::new(50), &payload, &weaker_peer).await.unwrap();
        assert_eq!(decision.verdict, Verdict::Present);
        assert_eq!(decision.inquiry, Some(ConfidenceScore::new(40)));

        let equal_peer = CountingPeers::answering(Some(20));
        let decision = arbiter.decide(ConfidenceScore::new(20), &payload, &equal_peer).await.unwrap();
        assert_eq!(decision.verdict, Verdict::Present);

        let stronger_peer = CountingPeers::answering(Some(85));
        let decision = arbiter.decide(ConfidenceScore::new(70), &payload, &stronger_peer).await.unwrap();
        assert_eq!(decision.band, PresenceBand::Ambiguous);
        assert_eq!(decision.verdict, Verdict::Absent);
        assert_eq!(stronger_peer.calls.load(Ordering::SeqCst), 1);

        let nobody = CountingPeers::answering(None);
        let decision = arbiter.decide(ConfidenceScore::new(30), &payload, &nobody).await.unwrap();
        assert_eq!(decision.verdict, Verdict::Present);
    }

    #[tokio::test]
    async fn inquiry_failure_propagates() {
        let err = ConfidenceArbiter::new()
            .decide(ConfidenceScore::new(50), &SignalPayload::default(), &FailingPeers)
            .await
            .unwrap_err();
        assert!(matches!(err, PresenceError::Upstream { .. }));
    }
}
