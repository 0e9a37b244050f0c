pub mod confidence;
pub mod signal;

pub use confidence::ConfidenceScore;
pub use signal::{SignalKind, SignalPayload, SignalReading};
