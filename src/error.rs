//! Domain error taxonomy shared by the request path and background loops.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PresenceError {
    /// Malformed input from the caller. Never retried.
    #[error("invalid input: {0}")]
    Validation(String),

    /// An estimation, inquiry or registration peer failed or answered badly.
    #[error("upstream {service} failed: {message}")]
    Upstream { service: &'static str, message: String },

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// No BLE beacon or WiFi access point in the submission maps to a room.
    #[error("no room could be resolved from the submitted signals")]
    RoomUndetermined,

    #[error("persistence failure: {0:#}")]
    Persistence(#[source] anyhow::Error),
}

impl PresenceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            message: message.into(),
        }
    }

    pub fn user_not_found(username: &str) -> Self {
        Self::NotFound {
            resource: "user",
            id: username.to_string(),
        }
    }
}

impl From<anyhow::Error> for PresenceError {
    fn from(err: anyhow::Error) -> Self {
        Self::Persistence(err)
    }
}

pub type PresenceResult<T> = Result<T, PresenceError>;
