//! reqwest-backed implementations of the federation seams.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::db::models::PeerRegistration;
use crate::error::{PresenceError, PresenceResult};
use crate::models::{ConfidenceScore, SignalPayload};
use crate::presence::InquirySource;

use super::fanout::PeerClient;
use super::protocol::{parse_peer_confidence, InquiryReply, InquiryRequest, RegistrationRequest};
use super::registration::Registrar;

/// Path on a manager that answers peer inquiries.
pub const PEER_INQUIRY_PATH: &str = "/api/signals/server";

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build HTTP client")
}

/// Proxy to manager: asks one peer site for its confidence.
pub struct HttpPeerClient {
    client: Client,
}

impl HttpPeerClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn query(
        &self,
        peer: &PeerRegistration,
        request: &InquiryRequest,
    ) -> Result<ConfidenceScore> {
        let url = format!("{}{}", peer.base_url(), PEER_INQUIRY_PATH);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;

        let status = response.status();
        if status != StatusCode::OK {
            bail!("{url} answered {status}");
        }
        let body: Value = response
            .json()
            .await
            .with_context(|| format!("undecodable answer from {url}"))?;
        parse_peer_confidence(&body).map_err(anyhow::Error::msg)
    }
}

/// Manager to proxy: forwards ambiguous submissions to the proxy's inquiry
/// endpoint.
pub struct ProxyInquiryClient {
    client: Client,
    url: String,
}

impl ProxyInquiryClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl InquirySource for ProxyInquiryClient {
    async fn inquire(
        &self,
        payload: &SignalPayload,
        estimation: ConfidenceScore,
    ) -> PresenceResult<Option<ConfidenceScore>> {
        const SERVICE: &str = "inquiry";

        let request = InquiryRequest::from_payload(payload, Some(estimation))?;
        let response = self
            .client
            .post(&self.url)
            .json(&request)
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

        let reply: InquiryReply = response
            .json()
            .await
            .map_err(|err| PresenceError::upstream(SERVICE, format!("undecodable reply: {err}")))?;
        if !reply.success {
            return Ok(None);
        }
        Ok(Some(ConfidenceScore::from(reply.server_confidence)))
    }
}

/// Manager to proxy: `POST /api/register`.
pub struct HttpRegistrar {
    client: Client,
    url: String,
}

impl HttpRegistrar {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Registrar for HttpRegistrar {
    async fn register(&self, request: &RegistrationRequest) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("POST {}", self.url))?;
        let status = response.status();
        if !status.is_success() {
            bail!("{} answered {status}", self.url);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::{http::StatusCode as AxumStatus, routing::post, Json, Router};
    use chrono::Utc;
    use serde_json::json;

    use super::*;

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn peer_at(addr: SocketAddr) -> PeerRegistration {
        PeerRegistration {
            scheme: "http".into(),
            host: addr.ip().to_string(),
            port: addr.port(),
            last_updated: Utc::now(),
        }
    }

    fn request() -> InquiryRequest {
        InquiryRequest {
            wifi_data: "lab,AA:BB,-50\n".into(),
            ble_data: String::new(),
            presence_confidence: Some(40),
        }
    }

    #[tokio::test]
    async fn peer_client_reads_legacy_key() {
        let router = Router::new().route(
            PEER_INQUIRY_PATH,
            post(|Json(body): Json<InquiryRequest>| async move {
                assert_eq!(body.presence_confidence, Some(40));
                Json(json!({ "percentage_processed": "72%" }))
            }),
        );
        let addr = serve(router).await;

        let client = HttpPeerClient::new(Duration::from_secs(5)).unwrap();
        let score = client.query(&peer_at(addr), &request()).await.unwrap();
        assert_eq!(score.value(), 72);
    }

    #[tokio::test]
    async fn peer_client_rejects_error_status() {
        let router = Router::new().route(
            PEER_INQUIRY_PATH,
            post(|| async { AxumStatus::INTERNAL_SERVER_ERROR }),
        );
        let addr = serve(router).await;

        let client = HttpPeerClient::new(Duration::from_secs(5)).unwrap();
        assert!(client.query(&peer_at(addr), &request()).await.is_err());
    }

    #[tokio::test]
    async fn proxy_client_maps_unsuccessful_reply_to_no_data() {
        let router = Router::new().route(
            "/api/inquiry",
            post(|| async {
                Json(json!({
                    "success": false,
                    "server_confidence": 0,
                    "percentage_processed": 0,
                    "peers_queried": 0
                }))
            }),
        );
        let addr = serve(router).await;

        let client =
            ProxyInquiryClient::new(format!("http://{addr}/api/inquiry"), Duration::from_secs(5))
                .unwrap();
        let payload = SignalPayload::from_csv("lab,AA:BB,-50\n", "").unwrap();
        let answer = client
            .inquire(&payload, ConfidenceScore::new(50))
            .await
            .unwrap();
        assert_eq!(answer, None);
    }

    #[tokio::test]
    async fn registrar_surfaces_refusals() {
        let router = Router::new().route("/api/register", post(|| async { AxumStatus::BAD_REQUEST }));
        let addr = serve(router).await;

        let registrar =
            HttpRegistrar::new(format!("http://{addr}/api/register"), Duration::from_secs(5))
                .unwrap();
        let request = RegistrationRequest {
            scheme: "http".into(),
            host: "site-a.example".into(),
            port: 8080,
        };
        assert!(registrar.register(&request).await.is_err());
    }
}
