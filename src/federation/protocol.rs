//! JSON bodies exchanged between sites.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PresenceResult;
use crate::models::{ConfidenceScore, SignalPayload};

/// Body of both the proxy's `/api/inquiry` and a manager's `/api/signals/server`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InquiryRequest {
    pub wifi_data: String,
    pub ble_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_confidence: Option<u8>,
}

impl InquiryRequest {
    pub fn from_payload(
        payload: &SignalPayload,
        presence_confidence: Option<ConfidenceScore>,
    ) -> PresenceResult<Self> {
        Ok(Self {
            wifi_data: payload.wifi_csv()?,
            ble_data: payload.ble_csv()?,
            presence_confidence: presence_confidence.map(ConfidenceScore::value),
        })
    }

    pub fn payload(&self) -> PresenceResult<SignalPayload> {
        SignalPayload::from_csv(&self.wifi_data, &self.ble_data)
    }
}

/// A manager's answer to a peer inquiry. Both key names carry the same value
/// so older and newer callers can read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeerAnswer {
    pub server_confidence: u8,
    pub percentage_processed: u8,
}

impl From<ConfidenceScore> for PeerAnswer {
    fn from(score: ConfidenceScore) -> Self {
        Self {
            server_confidence: score.value(),
            percentage_processed: score.value(),
        }
    }
}

/// The proxy's answer to `/api/inquiry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InquiryReply {
    /// False when no peer was available to ask.
    pub success: bool,
    pub server_confidence: u8,
    pub percentage_processed: u8,
    pub peers_queried: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(alias = "api_endpoint")]
    pub host: String,
    #[serde(alias = "port_number")]
    pub port: u16,
}

fn default_scheme() -> String {
    "http".to_string()
}

/// Reads a confidence from a peer's JSON answer, accepting either
/// `server_confidence` or `percentage_processed`. An explicit
/// `"success": false` is treated as a failed answer.
pub fn parse_peer_confidence(body: &Value) -> Result<ConfidenceScore, String> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        return Err("peer reported failure".to_string());
    }
    let value = body
        .get("server_confidence")
        .or_else(|| body.get("percentage_processed"))
        .ok_or_else(|| "answer has no confidence field".to_string())?;
    ConfidenceScore::from_json(value)
}
