//! Concurrent inquiry of every registered peer.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::db::models::PeerRegistration;
use crate::metrics::{MetricEvent, MetricsCollector};
use crate::models::ConfidenceScore;

use super::protocol::InquiryRequest;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "roomsense::fanout";

use crate::{log_debug, log_warn};

/// One call to one peer. Implementations need not enforce a timeout; the
/// fan-out wraps every call in its own.
#[async_trait]
pub trait PeerClient: Send + Sync {
    async fn query(
        &self,
        peer: &PeerRegistration,
        request: &InquiryRequest,
    ) -> Result<ConfidenceScore>;
}

/// How this site is registered, so it can skip itself when fanning out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum PeerConsensus {
    /// There was nobody to ask.
    NoPeers,
    /// Highest confidence across all queried peers. Failed or timed-out
    /// peers count as zero.
    Best {
        confidence: ConfidenceScore,
        queried: usize,
        failed: usize,
    },
}

impl PeerConsensus {
    pub fn confidence(&self) -> Option<ConfidenceScore> {
        match self {
            PeerConsensus::NoPeers => None,
            PeerConsensus::Best { confidence, .. } => Some(*confidence),
        }
    }

    pub fn queried(&self) -> usize {
        match self {
            PeerConsensus::NoPeers => 0,
            PeerConsensus::Best { queried, .. } => *queried,
        }
    }
}

#[derive(Clone)]
pub struct InquiryFanOut {
    client: Arc<dyn PeerClient>,
    per_call_timeout: Duration,
    own_identity: Option<PeerIdentity>,
    metrics: MetricsCollector,
}

impl InquiryFanOut {
    pub fn new(
        client: Arc<dyn PeerClient>,
        per_call_timeout: Duration,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            client,
            per_call_timeout,
            own_identity: None,
            metrics,
        }
    }

    pub fn excluding(mut self, identity: PeerIdentity) -> Self {
        self.own_identity = Some(identity);
        self
    }

    /// Queries every peer in parallel and waits for all of them. Each call is
    /// bounded by the per-call timeout, so every spawned task finishes.
    pub async fn fan_out(
        &self,
        peers: Vec<PeerRegistration>,
        request: InquiryRequest,
    ) -> PeerConsensus {
        let peers: Vec<PeerRegistration> = peers
            .into_iter()
            .filter(|peer| !self.is_self(peer))
            .collect();
        if peers.is_empty() {
            return PeerConsensus::NoPeers;
        }

        let queried = peers.len();
        let request = Arc::new(request);
        // Sized to the peer count so no task ever waits on send.
        let (tx, mut rx) = mpsc::channel(queried);

        for peer in peers {
            let tx = tx.clone();
            let client = Arc::clone(&self.client);
            let request = Arc::clone(&request);
            let timeout = self.per_call_timeout;

            tokio::spawn(async move {
                let outcome = match tokio::time::timeout(timeout, client.query(&peer, &request)).await
                {
                    Ok(Ok(confidence)) => Ok(confidence),
                    Ok(Err(err)) => Err(format!("{err:#}")),
                    Err(_) => Err(format!("timed out after {}s", timeout.as_secs_f32())),
                };
                let _ = tx.send((peer.base_url(), outcome)).await;
            });
        }
        drop(tx);

        let mut best = ConfidenceScore::ZERO;
        let mut failed = 0;
        let mut reported = 0;
        while let Some((peer, outcome)) = rx.recv().await {
            reported += 1;
            match outcome {
                Ok(confidence) => {
                    log_debug!("peer {} answered {}", peer, confidence);
                    best = best.max(confidence);
                }
                Err(reason) => {
                    failed += 1;
                    log_warn!("peer {} counted as 0: {}", peer, reason);
                }
            }
        }
        // A task that panicked never reports back.
        failed += queried - reported;

        self.metrics
            .record_many(MetricEvent::PeerQueried, queried as u64)
            .await;
        if failed > 0 {
            self.metrics
                .record_many(MetricEvent::PeerFailed, failed as u64)
                .await;
        }

        PeerConsensus::Best {
            confidence: best,
            queried,
            failed,
        }
    }

    fn is_self(&self, peer: &PeerRegistration) -> bool {
        self.own_identity
            .as_ref()
            .is_some_and(|me| peer.same_site(&me.scheme, &me.host, me.port))
    }
}
