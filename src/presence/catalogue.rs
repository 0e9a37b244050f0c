use std::collections::HashMap;

use anyhow::Result;

use crate::db::{models::BeaconProfile, Database};
use crate::models::SignalKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogueEntry {
    pub rssi_threshold: i32,
    pub room_id: i64,
}

/// Read-only map from `(kind, identifier)` to its thresholds and rooms, in
/// catalogue order. Built once at startup and shared behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct BeaconCatalogue {
    entries: HashMap<(SignalKind, String), Vec<CatalogueEntry>>,
}

impl BeaconCatalogue {
    pub fn from_profiles(profiles: impl IntoIterator<Item = BeaconProfile>) -> Self {
        let mut entries: HashMap<(SignalKind, String), Vec<CatalogueEntry>> = HashMap::new();
        for profile in profiles {
            let identifier = normalize(&profile.identifier);
            if identifier.is_empty() {
                continue;
            }
            entries
                .entry((profile.kind, identifier))
                .or_default()
                .push(CatalogueEntry {
                    rssi_threshold: profile.rssi_threshold,
                    room_id: profile.room_id,
                });
        }
        Self { entries }
    }

    pub async fn load(db: &Database) -> Result<Self> {
        Ok(Self::from_profiles(db.load_beacon_profiles().await?))
    }

    /// Entries for `identifier`, matched case-insensitively. Empty when unknown.
    pub fn lookup(&self, kind: SignalKind, identifier: &str) -> &[CatalogueEntry] {
        self.entries
            .get(&(kind, normalize(identifier)))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of distinct identifiers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize(identifier: &str) -> String {
    identifier.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case_and_keeps_order() {
        let catalogue = BeaconCatalogue::from_profiles([
            BeaconProfile {
                kind: SignalKind::Ble,
                identifier: "uuid-a".into(),
                rssi_threshold: -70,
                room_id: 5,
            },
            BeaconProfile {
                kind: SignalKind::Ble,
                identifier: "UUID-A".into(),
                rssi_threshold: -60,
                room_id: 6,
            },
        ]);

        let entries = catalogue.lookup(SignalKind::Ble, " Uuid-A ");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].room_id, 5);
        assert_eq!(entries[1].rssi_threshold, -60);
        assert!(catalogue.lookup(SignalKind::Wifi, "UUID-A").is_empty());
        assert_eq!(catalogue.len(), 1);
    }
}
