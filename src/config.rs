//! Service configuration: an optional TOML file overridden by CLI flags.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::db::models::BeaconProfile;
use crate::models::SignalKind;

pub const DEFAULT_CONFIG_FILE: &str = "roomsense.toml";
const DEFAULT_WIFI_THRESHOLD: i32 = -80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Owns users, sessions and the catalogue.
    Manager,
    /// Owns the federation registry and fans out inquiries.
    Proxy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimationMode {
    /// Classifier confidence against the local catalogue.
    Local,
    /// External estimation server at `estimation_url`.
    Remote,
}

#[derive(Debug, Parser)]
#[command(name = "roomsense", version, about = "Room-level presence from WiFi and BLE scans")]
pub struct Args {
    /// Path to the TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub role: Option<Role>,

    /// HTTP listen port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// SQLite database file
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Do not register with the proxy at startup
    #[arg(long)]
    pub skip_registration: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationSettings {
    pub scheme: String,
    pub host: String,
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            scheme: "http".into(),
            host: "localhost".into(),
        }
    }
}

/// Peer calls are bounded by `peer_timeout_secs`; a manager's call to the
/// proxy must outlast a full fan-out, so `inquiry_timeout_secs` has to be
/// strictly larger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub estimation_timeout_secs: u64,
    pub inquiry_timeout_secs: u64,
    pub peer_timeout_secs: u64,
    pub registration_timeout_secs: u64,
    pub db_busy_timeout_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            estimation_timeout_secs: 30,
            inquiry_timeout_secs: 15,
            peer_timeout_secs: 5,
            registration_timeout_secs: 5,
            db_busy_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperSettings {
    pub interval_secs: u64,
    pub inactivity_secs: u64,
}

impl Default for ReaperSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            inactivity_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub sweep_interval_secs: u64,
    pub expiry_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 3600,
            expiry_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveSettings {
    /// Keep a copy of every submission under `uploads_dir`.
    pub keep_submissions: bool,
    pub uploads_dir: PathBuf,
    /// Where `/api/fingerprint/collect` files labelled samples.
    pub fingerprint_dir: PathBuf,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            keep_submissions: true,
            uploads_dir: PathBuf::from("uploads"),
            fingerprint_dir: PathBuf::from("fingerprints"),
        }
    }
}

/// One catalogue row written at startup when the catalogue tables are empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedEntry {
    pub kind: SignalKind,
    pub identifier: String,
    /// Required for BLE; WiFi defaults to -80.
    #[serde(default)]
    pub rssi_threshold: Option<i32>,
    pub room_id: i64,
    #[serde(default)]
    pub room_name: Option<String>,
}

impl SeedEntry {
    pub fn to_profile(&self) -> Result<BeaconProfile> {
        let rssi_threshold = match (self.kind, self.rssi_threshold) {
            (_, Some(threshold)) => threshold,
            (SignalKind::Wifi, None) => DEFAULT_WIFI_THRESHOLD,
            (SignalKind::Ble, None) => {
                bail!("BLE seed entry {} needs an rssi_threshold", self.identifier)
            }
        };
        Ok(BeaconProfile {
            kind: self.kind,
            identifier: self.identifier.clone(),
            rssi_threshold,
            room_id: self.room_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub role: Role,
    pub server_port: u16,
    pub db_path: PathBuf,
    pub estimation: EstimationMode,
    pub estimation_url: Option<String>,
    /// The proxy's `/api/inquiry`, used by managers.
    pub inquiry_url: String,
    /// The proxy's `/api/register`, used by managers.
    pub proxy_register_url: String,
    /// How this site appears in the proxy's registry.
    pub registration: RegistrationSettings,
    pub skip_registration: bool,
    pub registration_retry_secs: u64,
    pub timeouts: TimeoutSettings,
    pub reaper: ReaperSettings,
    pub registry: RegistrySettings,
    pub archive: ArchiveSettings,
    pub catalogue_seed: Vec<SeedEntry>,
    /// Usernames created at startup if missing.
    pub seed_users: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            role: Role::Manager,
            server_port: 8080,
            db_path: PathBuf::from("roomsense.sqlite3"),
            estimation: EstimationMode::Local,
            estimation_url: None,
            inquiry_url: "http://localhost:8081/api/inquiry".into(),
            proxy_register_url: "http://localhost:8081/api/register".into(),
            registration: RegistrationSettings::default(),
            skip_registration: false,
            registration_retry_secs: 5,
            timeouts: TimeoutSettings::default(),
            reaper: ReaperSettings::default(),
            registry: RegistrySettings::default(),
            archive: ArchiveSettings::default(),
            catalogue_seed: Vec::new(),
            seed_users: Vec::new(),
        }
    }
}

impl Settings {
    /// Reads `path`, or `roomsense.toml` in the working directory when no
    /// path is given. Only an explicitly named file is required to exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !path.exists() {
            if required {
                bail!("config file {} does not exist", path.display());
            }
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("invalid config in {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("failed to parse TOML")
    }

    /// File settings, then flag overrides, then validation.
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut settings = Self::load(args.config.as_deref())?;
        settings.apply_args(args);
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(role) = args.role {
            self.role = role;
        }
        if let Some(port) = args.port {
            self.server_port = port;
        }
        if let Some(db_path) = &args.db_path {
            self.db_path = db_path.clone();
        }
        if args.skip_registration {
            self.skip_registration = true;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.role == Role::Manager
            && self.estimation == EstimationMode::Remote
            && self.estimation_url.as_deref().map_or(true, str::is_empty)
        {
            bail!("estimation = \"remote\" requires estimation_url");
        }
        if !matches!(self.registration.scheme.as_str(), "http" | "https") {
            bail!("registration.scheme must be http or https");
        }

        let positive = [
            ("timeouts.estimation_timeout_secs", self.timeouts.estimation_timeout_secs),
            ("timeouts.inquiry_timeout_secs", self.timeouts.inquiry_timeout_secs),
            ("timeouts.peer_timeout_secs", self.timeouts.peer_timeout_secs),
            ("timeouts.registration_timeout_secs", self.timeouts.registration_timeout_secs),
            ("reaper.interval_secs", self.reaper.interval_secs),
            ("reaper.inactivity_secs", self.reaper.inactivity_secs),
            ("registry.sweep_interval_secs", self.registry.sweep_interval_secs),
            ("registry.expiry_secs", self.registry.expiry_secs),
            ("registration_retry_secs", self.registration_retry_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                bail!("{name} must be greater than zero");
            }
        }

        if self.timeouts.inquiry_timeout_secs <= self.timeouts.peer_timeout_secs {
            bail!(
                "timeouts.inquiry_timeout_secs ({}) must exceed timeouts.peer_timeout_secs ({})",
                self.timeouts.inquiry_timeout_secs,
                self.timeouts.peer_timeout_secs
            );
        }

        for entry in &self.catalogue_seed {
            entry.to_profile()?;
        }
        Ok(())
    }

    pub fn seed_profiles(&self) -> Result<Vec<BeaconProfile>> {
        self.catalogue_seed.iter().map(SeedEntry::to_profile).collect()
    }

    pub fn estimation_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.estimation_timeout_secs)
    }

    pub fn inquiry_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.inquiry_timeout_secs)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.peer_timeout_secs)
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.registration_timeout_secs)
    }

    pub fn db_busy_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.db_busy_timeout_secs)
    }

    pub fn registration_retry(&self) -> Duration {
        Duration::from_secs(self.registration_retry_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper.interval_secs)
    }

    pub fn inactivity_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reaper.inactivity_secs as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.registry.sweep_interval_secs)
    }

    pub fn peer_expiry(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.registry.expiry_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_means_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.estimation_timeout(), Duration::from_secs(30));
        assert_eq!(settings.peer_expiry(), chrono::Duration::hours(24));
        settings.validate().unwrap();
    }

    #[test]
    fn parses_nested_sections_and_seed() {
        let settings = Settings::from_toml(
            r#"
            role = "proxy"
            server_port = 9000

            [reaper]
            inactivity_secs = 900

            [[catalogue_seed]]
            kind = "ble"
            identifier = "UUID-A"
            rssi_threshold = -70
            room_id = 5
            room_name = "Lab"

            [[catalogue_seed]]
            kind = "wifi"
            identifier = "AA:BB"
            room_id = 6
            "#,
        )
        .unwrap();

        assert_eq!(settings.role, Role::Proxy);
        assert_eq!(settings.reaper.inactivity_secs, 900);
        assert_eq!(settings.reaper.interval_secs, 60);
        let profiles = settings.seed_profiles().unwrap();
        assert_eq!(profiles[0].rssi_threshold, -70);
        assert_eq!(profiles[1].rssi_threshold, -80);
    }

    #[test]
    fn flags_override_file() {
        let mut settings = Settings::default();
        let args = Args::parse_from([
            "roomsense",
            "--role",
            "proxy",
            "--port",
            "9100",
            "--skip-registration",
        ]);
        settings.apply_args(&args);

        assert_eq!(settings.role, Role::Proxy);
        assert_eq!(settings.server_port, 9100);
        assert!(settings.skip_registration);
    }

    #[test]
    fn rejects_inconsistent_settings() {
        let remote = Settings {
            estimation: EstimationMode::Remote,
            ..Settings::default()
        };
        assert!(remote.validate().is_err());

        let mut zero = Settings::default();
        zero.reaper.interval_secs = 0;
        assert!(zero.validate().is_err());

        let bad_seed = Settings::from_toml(
            r#"
            [[catalogue_seed]]
            kind = "ble"
            identifier = "UUID-A"
            room_id = 5
            "#,
        )
        .unwrap();
        assert!(bad_seed.validate().is_err());
        assert!(Settings::load(Some(Path::new("/nonexistent/roomsense.toml"))).is_err());
    }

    #[test]
    fn inquiry_must_outlast_peer_calls() {
        let defaults = Settings::default();
        assert!(defaults.inquiry_timeout() > defaults.peer_timeout());

        let mut equal = Settings::default();
        equal.timeouts.inquiry_timeout_secs = 5;
        equal.timeouts.peer_timeout_secs = 5;
        let err = equal.validate().unwrap_err();
        assert!(err.to_string().contains("inquiry_timeout_secs"));

        let parsed = Settings::from_toml(
            r#"
            [timeouts]
            peer_timeout_secs = 20
            "#,
        )
        .unwrap();
        assert!(parsed.validate().is_err());
    }
}
