use std::sync::Arc;

use crate::archive::UploadArchive;
use crate::config::Role;
use crate::db::Database;
use crate::federation::{FederationRegistry, InquiryFanOut};
use crate::metrics::MetricsCollector;
use crate::presence::PresenceService;

/// What the handlers mounted on both roles need.
pub trait SiteState: Clone + Send + Sync + 'static {
    fn role(&self) -> Role;
    fn db(&self) -> &Database;
    fn metrics(&self) -> &MetricsCollector;
}

#[derive(Clone)]
pub struct ManagerState {
    pub db: Database,
    pub metrics: MetricsCollector,
    pub presence: Arc<PresenceService>,
    pub archive: UploadArchive,
}

#[derive(Clone)]
pub struct ProxyState {
    pub db: Database,
    pub metrics: MetricsCollector,
    pub registry: FederationRegistry,
    pub fan_out: InquiryFanOut,
}

impl SiteState for ManagerState {
    fn role(&self) -> Role {
        Role::Manager
    }

    fn db(&self) -> &Database {
        &self.db
    }

    fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }
}

impl SiteState for ProxyState {
    fn role(&self) -> Role {
        Role::Proxy
    }

    fn db(&self) -> &Database {
        &self.db
    }

    fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }
}

/// Handler state of whichever role this process runs.
#[derive(Clone)]
pub enum AppState {
    Manager(ManagerState),
    Proxy(ProxyState),
}
