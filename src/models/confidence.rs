use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Probability (0..=100) that the subject is present in the resolved room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfidenceScore(u8);

impl ConfidenceScore {
    pub const ZERO: ConfidenceScore = ConfidenceScore(0);
    pub const MAX: ConfidenceScore = ConfidenceScore(100);

    pub fn new(value: u8) -> Self {
        Self(value.min(100))
    }

    /// Rounds and clamps a value from an untrusted source. NaN becomes zero.
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            return Self::ZERO;
        }
        Self(value.round().clamp(0.0, 100.0) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Accepts `85`, `85.4`, `"85"` and `"85.40%"`.
    pub fn from_json(value: &Value) -> Result<Self, String> {
        match value {
            Value::Number(number) => number
                .as_f64()
                .map(Self::clamped)
                .ok_or_else(|| format!("unrepresentable confidence {number}")),
            Value::String(text) => {
                let trimmed = text.trim().trim_end_matches('%').trim();
                trimmed
                    .parse::<f64>()
                    .map(Self::clamped)
                    .map_err(|_| format!("confidence '{text}' is not a percentage"))
            }
            other => Err(format!("confidence has unexpected type: {other}")),
        }
    }
}

impl From<u8> for ConfidenceScore {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for ConfidenceScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clamps_out_of_range_peer_values() {
        assert_eq!(ConfidenceScore::clamped(-12.0), ConfidenceScore::ZERO);
        assert_eq!(ConfidenceScore::clamped(250.0), ConfidenceScore::MAX);
        assert_eq!(ConfidenceScore::clamped(f64::NAN), ConfidenceScore::ZERO);
        assert_eq!(ConfidenceScore::clamped(70.5).value(), 71);
        assert_eq!(ConfidenceScore::new(140).value(), 100);
    }

    #[test]
    fn parses_numeric_and_percent_forms() {
        assert_eq!(ConfidenceScore::from_json(&json!(85)).unwrap().value(), 85);
        assert_eq!(ConfidenceScore::from_json(&json!(84.6)).unwrap().value(), 85);
        assert_eq!(ConfidenceScore::from_json(&json!("85.40%")).unwrap().value(), 85);
        assert_eq!(ConfidenceScore::from_json(&json!(" 20 % ")).unwrap().value(), 20);
        assert!(ConfidenceScore::from_json(&json!("high")).is_err());
        assert!(ConfidenceScore::from_json(&json!(null)).is_err());
    }
}
