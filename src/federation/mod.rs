//! Cross-site federation: the proxy's peer registry, inquiry fan-out, and the
//! HTTP clients managers use to talk to the proxy.

pub mod client;
pub mod fanout;
pub mod protocol;
pub mod registration;
pub mod registry;

pub use client::{HttpPeerClient, HttpRegistrar, ProxyInquiryClient};
pub use fanout::{InquiryFanOut, PeerClient, PeerConsensus, PeerIdentity};
pub use protocol::{InquiryReply, InquiryRequest, PeerAnswer, RegistrationRequest};
pub use registration::{register_until_accepted, Registrar};
pub use registry::FederationRegistry;
