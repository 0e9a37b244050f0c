use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};
use base64::Engine;
use chrono::{Duration, NaiveDate, Utc};

use crate::db::models::{
    AllUsersPresenceDay, PeerRegistration, RoomOccupants, UserPresenceDay,
};
use crate::error::{PresenceError, PresenceResult};
use crate::federation::{InquiryReply, InquiryRequest, PeerAnswer, RegistrationRequest};
use crate::metrics::MetricsSnapshot;
use crate::models::SignalPayload;

use super::dto::{FingerprintResponse, HealthResponse, HistoryQuery, SubmitResponse};
use super::error::{ApiError, ApiResult};
use super::state::{ManagerState, ProxyState, SiteState};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "roomsense::api";

use crate::{log_error, log_info};

const DEFAULT_HISTORY_DAYS: i64 = 30;

/// Multipart fields shared by submissions and fingerprint uploads.
#[derive(Debug, Default)]
struct ScanForm {
    wifi: Option<String>,
    ble: Option<String>,
    room_id: Option<String>,
}

async fn read_scan_form(multipart: &mut Multipart) -> PresenceResult<ScanForm> {
    let mut form = ScanForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| PresenceError::validation(format!("malformed multipart body: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let slot = match name.as_str() {
            "wifi_data" => &mut form.wifi,
            "ble_data" => &mut form.ble,
            "room_id" => &mut form.room_id,
            _ => continue,
        };
        let text = field
            .text()
            .await
            .map_err(|err| PresenceError::validation(format!("unreadable {name}: {err}")))?;
        *slot = Some(text);
    }
    Ok(form)
}

/// Both files must be sent. One of them may be empty, since a phone without
/// BLE or WiFi scanning still produces a useful scan; both empty is rejected.
fn require_scan(wifi: Option<String>, ble: Option<String>) -> PresenceResult<(String, String)> {
    let wifi = wifi.ok_or_else(|| PresenceError::validation("missing wifi_data file"))?;
    let ble = ble.ok_or_else(|| PresenceError::validation("missing ble_data file"))?;
    if wifi.trim().is_empty() && ble.trim().is_empty() {
        return Err(PresenceError::validation("wifi_data and ble_data are both empty"));
    }
    Ok((wifi, ble))
}

/// `POST /api/signals/submit`: multipart `wifi_data` and `ble_data` CSV files
/// from the basic-auth user.
pub async fn submit_signals(
    State(state): State<ManagerState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<Json<SubmitResponse>> {
    let username = basic_auth_username(&headers)?;
    let form = read_scan_form(&mut multipart).await?;
    let (wifi, ble) = require_scan(form.wifi, form.ble)?;

    let user_id = state
        .db
        .find_user_id(&username)
        .await?
        .ok_or_else(|| ApiError::Unauthorized(format!("unknown user '{username}'")))?;

    let at = Utc::now();
    state.archive.store_submission(&username, at, &wifi, &ble).await?;

    let payload = SignalPayload::from_csv(&wifi, &ble)?;
    let outcome = state.presence.submit(user_id, &payload, at).await?;
    Ok(Json(outcome.into()))
}

/// `POST /api/fingerprint/collect`: a labelled training scan. `room_id` 0
/// marks a scan taken outside every room.
pub async fn collect_fingerprint(
    State(state): State<ManagerState>,
    mut multipart: Multipart,
) -> ApiResult<Json<FingerprintResponse>> {
    let form = read_scan_form(&mut multipart).await?;
    let raw_room = form
        .room_id
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| PresenceError::validation("missing room_id"))?;
    let room_id: i64 = raw_room.parse().map_err(|_| {
        PresenceError::validation(format!("room_id '{raw_room}' is not an integer"))
    })?;
    let (wifi, ble) = require_scan(form.wifi, form.ble)?;
    SignalPayload::from_csv(&wifi, &ble)?;

    let (sample, _) = state
        .archive
        .store_fingerprint(room_id, Utc::now(), &wifi, &ble)
        .await?;
    log_info!("stored {sample:?} fingerprint for room {room_id}");
    Ok(Json(FingerprintResponse {
        message: "fingerprint sample stored".to_string(),
        sample,
        room_id,
    }))
}

/// `POST /api/signals/server`: this site's confidence for a peer's readings.
pub async fn answer_peer_inquiry(
    State(state): State<ManagerState>,
    Json(request): Json<InquiryRequest>,
) -> ApiResult<Json<PeerAnswer>> {
    let payload = request.payload()?;
    let confidence = state.presence.estimate(&payload).await?;
    Ok(Json(confidence.into()))
}

/// `POST /api/inquiry`: fan the readings out to every registered peer.
pub async fn fan_out_inquiry(
    State(state): State<ProxyState>,
    Json(request): Json<InquiryRequest>,
) -> ApiResult<Json<InquiryReply>> {
    // Reject garbage before bothering peers with it.
    request.payload()?;

    let peers = state.registry.list().await?;
    let consensus = state.fan_out.fan_out(peers, request).await;
    let confidence = consensus.confidence().map(|c| c.value());

    Ok(Json(InquiryReply {
        success: confidence.is_some(),
        server_confidence: confidence.unwrap_or(0),
        percentage_processed: confidence.unwrap_or(0),
        peers_queried: consensus.queried(),
    }))
}

pub async fn register_peer(
    State(state): State<ProxyState>,
    Json(request): Json<RegistrationRequest>,
) -> ApiResult<Json<PeerRegistration>> {
    let peer = state
        .registry
        .register(&request.scheme, &request.host, request.port, Utc::now())
        .await?;
    Ok(Json(peer))
}

pub async fn list_peers(State(state): State<ProxyState>) -> ApiResult<Json<Vec<PeerRegistration>>> {
    Ok(Json(state.registry.list().await?))
}

pub async fn presence_history(
    State(state): State<ManagerState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<AllUsersPresenceDay>>> {
    let since = history_start(query.date.as_deref())?;
    Ok(Json(state.db.presence_history_since(since).await?))
}

pub async fn user_presence_history(
    State(state): State<ManagerState>,
    Path(username): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<UserPresenceDay>>> {
    let since = history_start(query.date.as_deref())?;
    let user_id = state
        .db
        .find_user_id(&username)
        .await?
        .ok_or_else(|| PresenceError::user_not_found(&username))?;
    Ok(Json(state.db.user_presence_history_since(user_id, since).await?))
}

pub async fn current_occupants(
    State(state): State<ManagerState>,
) -> ApiResult<Json<Vec<RoomOccupants>>> {
    Ok(Json(state.db.current_occupants().await?))
}

pub async fn health<S: SiteState>(State(state): State<S>) -> (StatusCode, Json<HealthResponse>) {
    let (status, code, database) = match state.db().ping().await {
        Ok(()) => ("ok", StatusCode::OK, "ok"),
        Err(err) => {
            log_error!("database health check failed: {err:?}");
            ("degraded", StatusCode::SERVICE_UNAVAILABLE, "unreachable")
        }
    };
    (
        code,
        Json(HealthResponse {
            status,
            role: state.role(),
            database,
            timestamp: Utc::now(),
        }),
    )
}

pub async fn metrics<S: SiteState>(State(state): State<S>) -> Json<MetricsSnapshot> {
    Json(state.metrics().snapshot().await)
}

fn history_start(date: Option<&str>) -> Result<chrono::DateTime<Utc>, PresenceError> {
    match date.map(str::trim).filter(|raw| !raw.is_empty()) {
        None => Ok(Utc::now() - Duration::days(DEFAULT_HISTORY_DAYS)),
        Some(raw) => {
            let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                PresenceError::validation(format!("date '{raw}' is not YYYY-MM-DD"))
            })?;
            day.and_hms_opt(0, 0, 0)
                .map(|midnight| midnight.and_utc())
                .ok_or_else(|| PresenceError::validation(format!("date '{raw}' has no midnight")))
        }
    }
}

/// Username from `Authorization: Basic ...`. The password is not checked
/// here; authentication happens in front of the service.
fn basic_auth_username(headers: &HeaderMap) -> ApiResult<String> {
    let unauthorized = |reason: &str| ApiError::Unauthorized(reason.to_string());

    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized("missing basic auth credentials"))?
        .to_str()
        .map_err(|_| unauthorized("authorization header is not ASCII"))?;
    let encoded = value
        .strip_prefix("Basic ")
        .ok_or_else(|| unauthorized("authorization is not basic auth"))?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| unauthorized("basic auth credentials are not base64"))?;
    let credentials =
        String::from_utf8(decoded).map_err(|_| unauthorized("basic auth is not UTF-8"))?;

    let username = credentials
        .split_once(':')
        .map_or(credentials.as_str(), |(user, _)| user)
        .trim();
    if username.is_empty() {
        return Err(unauthorized("empty basic auth username"));
    }
    Ok(username.to_string())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn reads_basic_auth_username() {
        // alice:secret
        let headers = headers_with("Basic YWxpY2U6c2VjcmV0");
        assert_eq!(basic_auth_username(&headers).unwrap(), "alice");

        assert!(basic_auth_username(&HeaderMap::new()).is_err());
        assert!(basic_auth_username(&headers_with("Bearer abc")).is_err());
        assert!(basic_auth_username(&headers_with("Basic !!!")).is_err());
    }

    #[test]
    fn scan_needs_both_files_but_only_one_with_rows() {
        let ble_only = require_scan(Some(String::new()), Some("1,UUID-A,-60\n".into())).unwrap();
        assert_eq!(ble_only.1, "1,UUID-A,-60\n");
        assert!(require_scan(Some("lab,AA:BB,-50\n".into()), Some(" ".into())).is_ok());

        assert!(matches!(
            require_scan(Some(" \n".into()), Some(String::new())),
            Err(PresenceError::Validation(_))
        ));
        assert!(require_scan(None, Some("1,UUID-A,-60\n".into())).is_err());
        assert!(require_scan(Some("lab,AA:BB,-50\n".into()), None).is_err());
    }

    #[test]
    fn history_start_parses_dates() {
        let since = history_start(Some("2026-10-01")).unwrap();
        assert_eq!(since.to_rfc3339(), "2026-10-01T00:00:00+00:00");
        assert!(matches!(
            history_start(Some("01/10/2026")),
            Err(PresenceError::Validation(_))
        ));

        let default = history_start(None).unwrap();
        assert!(Utc::now() - default >= Duration::days(DEFAULT_HISTORY_DAYS));
    }
}
