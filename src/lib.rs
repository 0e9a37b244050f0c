pub mod api;
pub mod archive;
pub mod background;
pub mod config;
pub mod db;
pub mod error;
pub mod federation;
pub mod metrics;
pub mod models;
pub mod presence;
pub mod utils;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use log::{error, info, warn};
use tokio::net::TcpListener;

use api::{AppState, ManagerState, ProxyState};
use archive::UploadArchive;
use background::{BackgroundTask, RegistrySweeper, SessionReaper};
use config::{EstimationMode, Role, Settings};
use db::Database;
use federation::{
    register_until_accepted, FederationRegistry, HttpPeerClient, HttpRegistrar, InquiryFanOut,
    PeerIdentity, ProxyInquiryClient, RegistrationRequest,
};
use metrics::MetricsCollector;
use presence::{BeaconCatalogue, EstimationSource, LocalEstimator, PresenceService, RemoteEstimator};

const LOG_TARGET: &str = "roomsense";

/// A wired-up process for one role: database, components, background loops
/// and the HTTP state. Background loops run from `build` until `shutdown`.
pub struct Service {
    role: Role,
    state: AppState,
    tasks: Vec<BackgroundTask>,
}

impl Service {
    pub async fn build(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let db = Database::new(settings.db_path.clone(), settings.db_busy_timeout())
            .context("failed to open database")?;
        let metrics = MetricsCollector::new();

        let (state, tasks) = match settings.role {
            Role::Manager => {
                let presence = Arc::new(presence_service(&settings, &db, &metrics).await?);
                let tasks = manager_tasks(&settings, &db, &metrics)?;
                let archive = UploadArchive::new(
                    settings.archive.uploads_dir.clone(),
                    settings.archive.fingerprint_dir.clone(),
                    settings.archive.keep_submissions,
                );
                let state = ManagerState {
                    db,
                    metrics,
                    presence,
                    archive,
                };
                (AppState::Manager(state), tasks)
            }
            Role::Proxy => proxy_components(&settings, db, metrics)?,
        };

        info!(
            target: LOG_TARGET,
            "{:?} ready on port {} using {}",
            settings.role,
            settings.server_port,
            settings.db_path.display()
        );
        Ok(Self {
            role: settings.role,
            state,
            tasks,
        })
    }

    pub fn router(&self) -> Router {
        api::create_router(self.state.clone())
    }

    /// Stops every background loop and waits for them.
    pub async fn shutdown(mut self) -> Result<()> {
        for task in self.tasks.iter_mut() {
            task.stop().await?;
        }
        info!(target: LOG_TARGET, "{:?} stopped", self.role);
        Ok(())
    }
}

/// Builds the configured role, serves HTTP until Ctrl-C, then stops the
/// background loops.
pub async fn run(settings: Settings) -> Result<()> {
    utils::logging::init_logging();
    info!(target: LOG_TARGET, "roomsense starting as {:?}", settings.role);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server_port));
    let service = Service::build(settings).await?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, service.router())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    service.shutdown().await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(target: LOG_TARGET, "failed to listen for shutdown signal: {err}");
    }
    info!(target: LOG_TARGET, "shutdown requested");
}

async fn presence_service(
    settings: &Settings,
    db: &Database,
    metrics: &MetricsCollector,
) -> Result<PresenceService> {
    let seed = settings.seed_profiles()?;
    if !seed.is_empty() {
        let written = db.seed_beacon_profiles(seed).await?;
        if written > 0 {
            info!(target: LOG_TARGET, "seeded {written} catalogue rows");
        }
    }
    for entry in &settings.catalogue_seed {
        if let Some(name) = &entry.room_name {
            db.ensure_room(entry.room_id, name).await?;
        }
    }
    let unnamed = db.register_catalogue_rooms().await?;
    if unnamed > 0 {
        info!(target: LOG_TARGET, "added {unnamed} catalogue rooms without a configured name");
    }
    for username in &settings.seed_users {
        db.ensure_user(username).await?;
    }

    let catalogue = Arc::new(
        BeaconCatalogue::load(db)
            .await
            .context("beacon catalogue is unloadable")?,
    );
    if catalogue.is_empty() {
        warn!(target: LOG_TARGET, "beacon catalogue is empty; no submission can resolve a room");
    }

    let estimator: Arc<dyn EstimationSource> = match settings.estimation {
        EstimationMode::Local => Arc::new(LocalEstimator::new(Arc::clone(&catalogue))),
        EstimationMode::Remote => Arc::new(RemoteEstimator::new(
            settings.estimation_url.clone().unwrap_or_default(),
            settings.estimation_timeout(),
        )?),
    };
    let peers = Arc::new(ProxyInquiryClient::new(
        settings.inquiry_url.clone(),
        settings.inquiry_timeout(),
    )?);

    Ok(PresenceService::new(
        db.clone(),
        catalogue,
        estimator,
        peers,
        metrics.clone(),
    ))
}

fn manager_tasks(
    settings: &Settings,
    db: &Database,
    metrics: &MetricsCollector,
) -> Result<Vec<BackgroundTask>> {
    let mut tasks = Vec::new();

    let reaper = SessionReaper::new(
        db.clone(),
        settings.inactivity_threshold(),
        settings.reaper_interval(),
        metrics.clone(),
    );
    let mut reaper_task = BackgroundTask::new("session reaper");
    reaper_task.start(move |cancel| reaper.run(cancel))?;
    tasks.push(reaper_task);

    if settings.skip_registration {
        info!(target: LOG_TARGET, "self-registration disabled");
        return Ok(tasks);
    }

    let registrar = HttpRegistrar::new(
        settings.proxy_register_url.clone(),
        settings.registration_timeout(),
    )?;
    let request = RegistrationRequest {
        scheme: settings.registration.scheme.clone(),
        host: settings.registration.host.clone(),
        port: settings.server_port,
    };
    let retry = settings.registration_retry();
    let mut registration_task = BackgroundTask::new("self-registration");
    registration_task.start(move |cancel| async move {
        register_until_accepted(&registrar, &request, retry, cancel).await;
    })?;
    tasks.push(registration_task);

    Ok(tasks)
}

fn proxy_components(
    settings: &Settings,
    db: Database,
    metrics: MetricsCollector,
) -> Result<(AppState, Vec<BackgroundTask>)> {
    let registry = FederationRegistry::new(db.clone(), settings.peer_expiry(), metrics.clone());
    let fan_out = InquiryFanOut::new(
        Arc::new(HttpPeerClient::new(settings.peer_timeout())?),
        settings.peer_timeout(),
        metrics.clone(),
    )
    .excluding(PeerIdentity {
        scheme: settings.registration.scheme.clone(),
        host: settings.registration.host.clone(),
        port: settings.server_port,
    });

    let sweeper = RegistrySweeper::new(registry.clone(), settings.sweep_interval());
    let mut sweep_task = BackgroundTask::new("registry sweep");
    sweep_task.start(move |cancel| sweeper.run(cancel))?;

    let state = ProxyState {
        db,
        metrics,
        registry,
        fan_out,
    };
    Ok((AppState::Proxy(state), vec![sweep_task]))
}
