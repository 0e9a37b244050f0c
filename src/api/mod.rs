//! HTTP surface.
//!
//! Every route is an [`Endpoint`] variant. Each role's router folds over all
//! variants and mounts the ones that role serves:
//!
//! | endpoint              | role    | route                                          |
//! |-----------------------|---------|------------------------------------------------|
//! | `Submit`              | manager | `POST /api/signals/submit`                     |
//! | `Server`              | manager | `POST /api/signals/server`                     |
//! | `FingerprintCollect`  | manager | `POST /api/fingerprint/collect`                |
//! | `PresenceHistory`     | manager | `GET /api/presence_history`                    |
//! | `UserPresenceHistory` | manager | `GET /api/users/:user_id/presence_history`     |
//! | `CurrentOccupants`    | manager | `GET /api/current_occupants`                   |
//! | `Inquiry`             | proxy   | `POST /api/inquiry`                            |
//! | `Register`            | proxy   | `GET`/`POST /api/register`                     |
//! | `Health`              | both    | `GET /`                                        |
//! | `Metrics`             | both    | `GET /api/metrics`                             |

pub mod dto;
pub mod error;
pub mod handlers;
pub mod state;

use std::time::Instant;

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

pub use error::{ApiError, ApiResult};
pub use state::{AppState, ManagerState, ProxyState, SiteState};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "roomsense::http";

use crate::log_info;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Submit,
    Server,
    FingerprintCollect,
    Inquiry,
    Register,
    PresenceHistory,
    UserPresenceHistory,
    CurrentOccupants,
    Health,
    Metrics,
}

impl Endpoint {
    pub const ALL: [Endpoint; 10] = [
        Endpoint::Submit,
        Endpoint::Server,
        Endpoint::FingerprintCollect,
        Endpoint::Inquiry,
        Endpoint::Register,
        Endpoint::PresenceHistory,
        Endpoint::UserPresenceHistory,
        Endpoint::CurrentOccupants,
        Endpoint::Health,
        Endpoint::Metrics,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Submit => "/api/signals/submit",
            Endpoint::Server => "/api/signals/server",
            Endpoint::FingerprintCollect => "/api/fingerprint/collect",
            Endpoint::Inquiry => "/api/inquiry",
            Endpoint::Register => "/api/register",
            Endpoint::PresenceHistory => "/api/presence_history",
            Endpoint::UserPresenceHistory => "/api/users/:user_id/presence_history",
            Endpoint::CurrentOccupants => "/api/current_occupants",
            Endpoint::Health => "/",
            Endpoint::Metrics => "/api/metrics",
        }
    }

    fn mount_manager(self, router: Router<ManagerState>) -> Router<ManagerState> {
        let path = self.path();
        match self {
            Endpoint::Submit => router.route(path, post(handlers::submit_signals)),
            Endpoint::Server => router.route(path, post(handlers::answer_peer_inquiry)),
            Endpoint::FingerprintCollect => {
                router.route(path, post(handlers::collect_fingerprint))
            }
            Endpoint::PresenceHistory => router.route(path, get(handlers::presence_history)),
            Endpoint::UserPresenceHistory => {
                router.route(path, get(handlers::user_presence_history))
            }
            Endpoint::CurrentOccupants => router.route(path, get(handlers::current_occupants)),
            Endpoint::Health => router.route(path, get(handlers::health::<ManagerState>)),
            Endpoint::Metrics => router.route(path, get(handlers::metrics::<ManagerState>)),
            // Federation routes live on the proxy.
            Endpoint::Inquiry | Endpoint::Register => router,
        }
    }

    fn mount_proxy(self, router: Router<ProxyState>) -> Router<ProxyState> {
        let path = self.path();
        match self {
            Endpoint::Inquiry => router.route(path, post(handlers::fan_out_inquiry)),
            Endpoint::Register => router.route(
                path,
                get(handlers::list_peers).post(handlers::register_peer),
            ),
            Endpoint::Health => router.route(path, get(handlers::health::<ProxyState>)),
            Endpoint::Metrics => router.route(path, get(handlers::metrics::<ProxyState>)),
            Endpoint::Submit
            | Endpoint::Server
            | Endpoint::FingerprintCollect
            | Endpoint::PresenceHistory
            | Endpoint::UserPresenceHistory
            | Endpoint::CurrentOccupants => router,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let router = match state {
        AppState::Manager(state) => Endpoint::ALL
            .into_iter()
            .fold(Router::new(), |router, endpoint| endpoint.mount_manager(router))
            .with_state(state),
        AppState::Proxy(state) => Endpoint::ALL
            .into_iter()
            .fold(Router::new(), |router, endpoint| endpoint.mount_proxy(router))
            .with_state(state),
    };
    router.layer(middleware::from_fn(tag_request))
}

/// Gives every request an id, echoes it in `x-request-id` and logs the outcome.
async fn tag_request(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let mut response = next.run(request).await;

    log_info!(
        "[{}] {} {} -> {} in {}ms",
        request_id,
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn every_endpoint_has_its_own_path() {
        let paths: HashSet<_> = Endpoint::ALL.iter().map(|e| e.path()).collect();
        assert_eq!(paths.len(), Endpoint::ALL.len());
        assert!(Endpoint::ALL
            .iter()
            .all(|e| e.path().starts_with("/api/") || *e == Endpoint::Health));
    }
}
