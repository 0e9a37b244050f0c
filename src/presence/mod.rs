//! Turning one signal submission into a presence decision.

pub mod arbiter;
pub mod catalogue;
pub mod classifier;
pub mod estimation;
pub mod pipeline;
pub mod resolver;

pub use arbiter::{ConfidenceArbiter, Decision, InquirySource, PresenceBand, Verdict};
pub use catalogue::{BeaconCatalogue, CatalogueEntry};
pub use classifier::{classify, Classification, MatchStrength, SignalMatch};
pub use estimation::{EstimationSource, LocalEstimator, RemoteEstimator};
pub use pipeline::{PresenceOutcome, PresenceService};
pub use resolver::resolve_room;
