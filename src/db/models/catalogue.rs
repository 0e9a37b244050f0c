//! Catalogue rows: which identifiers belong to which room, and how strong a
//! reading must be before it counts as "in the room".

use serde::{Deserialize, Serialize};

use crate::models::SignalKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconProfile {
    pub kind: SignalKind,
    /// Service UUID for BLE, BSSID for WiFi. Matched case-insensitively.
    pub identifier: String,
    pub rssi_threshold: i32,
    pub room_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub room_id: i64,
    pub room_name: String,
}
