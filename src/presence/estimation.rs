//! Sources of the estimation confidence for a submission.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, StatusCode};
use serde_json::Value;

use crate::error::{PresenceError, PresenceResult};
use crate::models::{ConfidenceScore, SignalPayload};

use super::catalogue::BeaconCatalogue;
use super::classifier::classify;

const SERVICE: &str = "estimation";

#[async_trait]
pub trait EstimationSource: Send + Sync {
    async fn estimate(&self, payload: &SignalPayload) -> PresenceResult<ConfidenceScore>;
}

/// Classifier-derived confidence against the local catalogue.
pub struct LocalEstimator {
    catalogue: Arc<BeaconCatalogue>,
}

impl LocalEstimator {
    pub fn new(catalogue: Arc<BeaconCatalogue>) -> Self {
        Self { catalogue }
    }
}

#[async_trait]
impl EstimationSource for LocalEstimator {
    async fn estimate(&self, payload: &SignalPayload) -> PresenceResult<ConfidenceScore> {
        Ok(classify(&self.catalogue, &payload.all_readings()).confidence())
    }
}

/// External estimation server. Receives BLE then WiFi rows as one CSV file
/// and answers `{"predicted_percentage": 85}` or `{"predicted_percentage": "85.00%"}`.
pub struct RemoteEstimator {
    client: Client,
    url: String,
}

impl RemoteEstimator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl EstimationSource for RemoteEstimator {
    async fn estimate(&self, payload: &SignalPayload) -> PresenceResult<ConfidenceScore> {
        let csv = payload.combined_csv()?;
        let part = multipart::Part::text(csv)
            .file_name("signals.csv")
            .mime_str("text/csv")
            .map_err(|err| PresenceError::upstream(SERVICE, err.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| PresenceError::upstream(SERVICE, err.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(PresenceError::upstream(
                SERVICE,
                format!("{} answered {status}", self.url),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| PresenceError::upstream(SERVICE, format!("undecodable body: {err}")))?;
        parse_estimation(&body)
    }
}

fn parse_estimation(body: &Value) -> PresenceResult<ConfidenceScore> {
    let value = body
        .get("predicted_percentage")
        .ok_or_else(|| PresenceError::upstream(SERVICE, "missing predicted_percentage"))?;
    ConfidenceScore::from_json(value).map_err(|message| PresenceError::upstream(SERVICE, message))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::{extract::Multipart, http::StatusCode as AxumStatus, routing::post, Json, Router};
    use serde_json::json;

    use super::*;
    use crate::db::models::BeaconProfile;
    use crate::models::SignalKind;

    fn payload() -> SignalPayload {
        SignalPayload::from_csv("lab,AA:BB,-50\n", "1,UUID-A,-60\n").unwrap()
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/predict")
    }

    #[tokio::test]
    async fn local_estimator_uses_classifier() {
        let catalogue = Arc::new(BeaconCatalogue::from_profiles([BeaconProfile {
            kind: SignalKind::Ble,
            identifier: "UUID-A".into(),
            rssi_threshold: -70,
            room_id: 5,
        }]));
        let score = LocalEstimator::new(catalogue).estimate(&payload()).await.unwrap();
        assert_eq!(score, ConfidenceScore::MAX);
    }

    #[tokio::test]
    async fn remote_estimator_posts_combined_csv() {
        let seen = Arc::new(Mutex::new(String::new()));
        let captured = Arc::clone(&seen);
        let router = Router::new().route(
            "/predict",
            post(move |mut form: Multipart| {
                let captured = Arc::clone(&captured);
                async move {
                    while let Some(field) = form.next_field().await.unwrap() {
                        if field.name() == Some("file") {
                            let text = field.text().await.unwrap();
                            *captured.lock().unwrap() = text;
                        }
                    }
                    Json(json!({ "predicted_percentage": "84.60%" }))
                }
            }),
        );
        let url = serve(router).await;

        let estimator = RemoteEstimator::new(url, Duration::from_secs(5)).unwrap();
        let score = estimator.estimate(&payload()).await.unwrap();

        assert_eq!(score.value(), 85);
        assert_eq!(*seen.lock().unwrap(), "1,UUID-A,-60\nlab,AA:BB,-50\n");
    }

    #[tokio::test]
    async fn remote_failure_is_upstream_error() {
        let router = Router::new().route("/predict", post(|| async { AxumStatus::BAD_GATEWAY }));
        let url = serve(router).await;

        let estimator = RemoteEstimator::new(url, Duration::from_secs(5)).unwrap();
        let err = estimator.estimate(&payload()).await.unwrap_err();
        assert!(matches!(err, PresenceError::Upstream { service: "estimation", .. }));
    }

    #[test]
    fn parses_numeric_estimation() {
        assert_eq!(parse_estimation(&json!({"predicted_percentage": 42})).unwrap().value(), 42);
        assert!(parse_estimation(&json!({"percentage": 42})).is_err());
    }
}
