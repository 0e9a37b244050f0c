use serde::Serialize;

use crate::models::{ConfidenceScore, SignalKind, SignalReading};

use super::catalogue::BeaconCatalogue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrength {
    Strong,
    Weak,
}

/// One reading compared against one catalogue threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalMatch {
    pub kind: SignalKind,
    pub identifier: String,
    pub rssi: i32,
    pub room_id: i64,
    pub strength: MatchStrength,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub any_strong: bool,
    pub any_weak: bool,
    /// Room of the strongest strong match. Ties keep the earlier match.
    pub best_room_id: Option<i64>,
    pub strong_count: usize,
    pub weak_count: usize,
    /// Number of reading/threshold comparisons made.
    pub total_candidates: usize,
    pub matches: Vec<SignalMatch>,
}

impl Classification {
    /// Share of strong comparisons as a percentage. With no strong match the
    /// share of weak ("heard") comparisons is used instead, halved.
    pub fn confidence(&self) -> ConfidenceScore {
        if self.total_candidates == 0 {
            return ConfidenceScore::ZERO;
        }
        let total = self.total_candidates as f64;
        if self.any_strong {
            ConfidenceScore::clamped(100.0 * self.strong_count as f64 / total)
        } else {
            ConfidenceScore::clamped(100.0 * self.weak_count as f64 / total / 2.0)
        }
    }
}

/// Compares every known reading with every threshold registered for it.
/// Unknown identifiers are skipped.
pub fn classify(catalogue: &BeaconCatalogue, readings: &[SignalReading]) -> Classification {
    let mut result = Classification::default();
    let mut best_rssi: Option<i32> = None;

    for reading in readings {
        for entry in catalogue.lookup(reading.kind, &reading.identifier) {
            result.total_candidates += 1;

            let strength = if reading.rssi > entry.rssi_threshold {
                result.strong_count += 1;
                if best_rssi.map_or(true, |best| reading.rssi > best) {
                    best_rssi = Some(reading.rssi);
                    result.best_room_id = Some(entry.room_id);
                }
                MatchStrength::Strong
            } else {
                result.weak_count += 1;
                MatchStrength::Weak
            };

            result.matches.push(SignalMatch {
                kind: reading.kind,
                identifier: reading.identifier.clone(),
                rssi: reading.rssi,
                room_id: entry.room_id,
                strength,
            });
        }
    }

    result.any_strong = result.strong_count > 0;
    result.any_weak = result.weak_count > 0;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::BeaconProfile;

    fn catalogue() -> BeaconCatalogue {
        BeaconCatalogue::from_profiles([
            BeaconProfile {
                kind: SignalKind::Ble,
                identifier: "UUID-A".into(),
                rssi_threshold: -70,
                room_id: 5,
            },
            BeaconProfile {
                kind: SignalKind::Ble,
                identifier: "UUID-B".into(),
                rssi_threshold: -70,
                room_id: 6,
            },
            BeaconProfile {
                kind: SignalKind::Wifi,
                identifier: "AA:BB".into(),
                rssi_threshold: -80,
                room_id: 7,
            },
        ])
    }

    fn ble(identifier: &str, rssi: i32) -> SignalReading {
        SignalReading {
            kind: SignalKind::Ble,
            identifier: identifier.into(),
            rssi,
        }
    }

    #[test]
    fn threshold_itself_is_weak() {
        let at_threshold = classify(&catalogue(), &[ble("UUID-A", -70)]);
        assert!(!at_threshold.any_strong);
        assert!(at_threshold.any_weak);
        assert_eq!(at_threshold.best_room_id, None);

        let above = classify(&catalogue(), &[ble("UUID-A", -69)]);
        assert!(above.any_strong);
        assert_eq!(above.best_room_id, Some(5));
    }

    #[test]
    fn unknown_identifiers_are_ignored() {
        let result = classify(&catalogue(), &[ble("UUID-Z", -30), ble("uuid-a", -50)]);
        assert_eq!(result.total_candidates, 1);
        assert!(result.matches.iter().all(|m| m.identifier != "UUID-Z"));
    }

    #[test]
    fn highest_rssi_wins_and_ties_keep_first() {
        let result = classify(
            &catalogue(),
            &[ble("UUID-A", -65), ble("UUID-B", -50), ble("UUID-A", -50)],
        );
        assert_eq!(result.strong_count, 3);
        assert_eq!(result.best_room_id, Some(6));
    }

    #[test]
    fn confidence_scalar() {
        assert_eq!(classify(&catalogue(), &[]).confidence(), ConfidenceScore::ZERO);

        let mixed = classify(&catalogue(), &[ble("UUID-A", -60), ble("UUID-B", -90)]);
        assert_eq!(mixed.confidence().value(), 50);

        let strong = classify(&catalogue(), &[ble("UUID-A", -60)]);
        assert_eq!(strong.confidence().value(), 100);

        let weak_only = classify(&catalogue(), &[ble("UUID-A", -90)]);
        assert_eq!(weak_only.confidence().value(), 50);
    }
}
