use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A federated site known to the proxy. Unique on `(scheme, host)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRegistration {
    pub scheme: String,
    #[serde(rename = "api_endpoint")]
    pub host: String,
    #[serde(rename = "port_number")]
    pub port: u16,
    pub last_updated: DateTime<Utc>,
}

impl PeerRegistration {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    pub fn same_site(&self, scheme: &str, host: &str, port: u16) -> bool {
        self.scheme.eq_ignore_ascii_case(scheme)
            && self.host.eq_ignore_ascii_case(host)
            && self.port == port
    }
}
