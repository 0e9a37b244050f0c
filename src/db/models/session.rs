//! Presence session rows and the history views built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stay of one user in one room. Closed rows are never modified again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceSession {
    pub session_id: i64,
    pub user_id: i64,
    pub room_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_seen: DateTime<Utc>,
}

impl PresenceSession {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

/// What an upsert did to the user's open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "change")]
pub enum SessionChange {
    Opened { session_id: i64 },
    Refreshed { session_id: i64 },
    Moved { closed_session_id: i64, session_id: i64 },
    /// The submission predates the open session's `last_seen` in another
    /// room. Nothing was written.
    Superseded { session_id: i64 },
}

impl SessionChange {
    pub fn session_id(&self) -> i64 {
        match *self {
            SessionChange::Opened { session_id }
            | SessionChange::Refreshed { session_id }
            | SessionChange::Moved { session_id, .. }
            | SessionChange::Superseded { session_id } => session_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserPresenceDay {
    pub date: String,
    pub sessions: Vec<PresenceSession>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserPresenceDetail {
    pub user_id: i64,
    pub sessions: Vec<PresenceSession>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllUsersPresenceDay {
    pub date: String,
    pub users: Vec<UserPresenceDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentOccupant {
    pub user_id: String,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomOccupants {
    pub room_id: i64,
    pub room_name: String,
    pub occupants: Vec<CurrentOccupant>,
}
