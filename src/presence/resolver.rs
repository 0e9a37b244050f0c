use crate::error::{PresenceError, PresenceResult};
use crate::models::SignalReading;

use super::catalogue::BeaconCatalogue;

/// First catalogue hit among the BLE readings, else among the WiFi readings.
/// Signal strength plays no part here.
pub fn resolve_room(
    catalogue: &BeaconCatalogue,
    ble: &[SignalReading],
    wifi: &[SignalReading],
) -> PresenceResult<i64> {
    ble.iter()
        .chain(wifi.iter())
        .find_map(|reading| {
            catalogue
                .lookup(reading.kind, &reading.identifier)
                .first()
                .map(|entry| entry.room_id)
        })
        .ok_or(PresenceError::RoomUndetermined)
}
