//! On-disk copies of uploaded scans.
//!
//! Submissions land in `<uploads_dir>/<YYYY-MM-DD>/<username>/` and labelled
//! fingerprint samples in `<fingerprint_dir>/{positive,negative}_samples/<room_id>/`.
//! Each scan is written as a `wifi_data_<micros>.csv` / `ble_data_<micros>.csv`
//! pair.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{PresenceError, PresenceResult};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "roomsense::archive";

use crate::{log_debug, log_warn};

/// Room id 0 labels a scan taken outside every known room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    Positive,
    Negative,
}

impl SampleKind {
    pub fn for_room(room_id: i64) -> Self {
        if room_id == 0 {
            SampleKind::Negative
        } else {
            SampleKind::Positive
        }
    }

    fn dir_name(self) -> &'static str {
        match self {
            SampleKind::Positive => "positive_samples",
            SampleKind::Negative => "negative_samples",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedScan {
    pub wifi_path: PathBuf,
    pub ble_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct UploadArchive {
    uploads_dir: PathBuf,
    fingerprint_dir: PathBuf,
    keep_submissions: bool,
}

impl UploadArchive {
    pub fn new(
        uploads_dir: impl Into<PathBuf>,
        fingerprint_dir: impl Into<PathBuf>,
        keep_submissions: bool,
    ) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            fingerprint_dir: fingerprint_dir.into(),
            keep_submissions,
        }
    }

    /// Keeps a copy of a presence submission. Returns `None` when submission
    /// archiving is switched off.
    pub async fn store_submission(
        &self,
        username: &str,
        at: DateTime<Utc>,
        wifi_csv: &str,
        ble_csv: &str,
    ) -> PresenceResult<Option<ArchivedScan>> {
        if !self.keep_submissions {
            return Ok(None);
        }
        let dir = self
            .uploads_dir
            .join(at.format("%Y-%m-%d").to_string())
            .join(path_component(username)?);
        write_scan(&dir, at, wifi_csv, ble_csv).await.map(Some)
    }

    /// Files a labelled training sample under its room.
    pub async fn store_fingerprint(
        &self,
        room_id: i64,
        at: DateTime<Utc>,
        wifi_csv: &str,
        ble_csv: &str,
    ) -> PresenceResult<(SampleKind, ArchivedScan)> {
        if room_id < 0 {
            return Err(PresenceError::validation(format!(
                "room_id must not be negative, got {room_id}"
            )));
        }
        let kind = SampleKind::for_room(room_id);
        let dir = self
            .fingerprint_dir
            .join(kind.dir_name())
            .join(room_id.to_string());
        let scan = write_scan(&dir, at, wifi_csv, ble_csv).await?;
        Ok((kind, scan))
    }
}

/// A single directory name taken from caller input.
fn path_component(raw: &str) -> PresenceResult<&str> {
    let name = raw.trim();
    let unsafe_name = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if unsafe_name {
        return Err(PresenceError::validation(format!(
            "'{raw}' cannot be used as an archive directory"
        )));
    }
    Ok(name)
}

async fn write_scan(
    dir: &Path,
    at: DateTime<Utc>,
    wifi_csv: &str,
    ble_csv: &str,
) -> PresenceResult<ArchivedScan> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let stamp = at.timestamp_micros();
    let scan = ArchivedScan {
        wifi_path: dir.join(format!("wifi_data_{stamp}.csv")),
        ble_path: dir.join(format!("ble_data_{stamp}.csv")),
    };
    write_file(&scan.wifi_path, wifi_csv).await?;
    write_file(&scan.ble_path, ble_csv).await?;

    log_debug!("archived scan in {}", dir.display());
    Ok(scan)
}

/// Writes through a temp file so a reader never sees half a CSV.
async fn write_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    let tmp = path.with_extension("csv.tmp");
    if let Err(err) = tokio::fs::write(&tmp, contents).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err).with_context(|| format!("failed to write {}", tmp.display()));
    }
    if let Err(err) = tokio::fs::rename(&tmp, path).await {
        log_warn!("could not move {} into place: {err}", tmp.display());
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err).with_context(|| format!("failed to finalize {}", path.display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn archive(root: &Path, keep: bool) -> UploadArchive {
        UploadArchive::new(root.join("uploads"), root.join("fingerprints"), keep)
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn submissions_are_filed_by_day_and_user() {
        let dir = tempfile::tempdir().unwrap();
        let scan = archive(dir.path(), true)
            .store_submission("alice", at(), "lab,AA:BB,-50\n", "1,UUID-A,-60\n")
            .await
            .unwrap()
            .unwrap();

        let expected_dir = dir.path().join("uploads/2026-10-17/alice");
        assert_eq!(scan.wifi_path.parent().unwrap(), expected_dir);
        assert!(scan
            .ble_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("ble_data_"));
        assert_eq!(
            std::fs::read_to_string(&scan.wifi_path).unwrap(),
            "lab,AA:BB,-50\n"
        );
        assert_eq!(std::fs::read_to_string(&scan.ble_path).unwrap(), "1,UUID-A,-60\n");
    }

    #[tokio::test]
    async fn disabled_archive_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let stored = archive(dir.path(), false)
            .store_submission("alice", at(), "a,b,-1\n", "")
            .await
            .unwrap();
        assert!(stored.is_none());
        assert!(!dir.path().join("uploads").exists());
    }

    #[tokio::test]
    async fn rejects_usernames_that_escape_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive(dir.path(), true);
        for name in ["..", "../etc", "a/b", " "] {
            assert!(matches!(
                archive.store_submission(name, at(), "", "").await,
                Err(PresenceError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn room_zero_is_a_negative_sample() {
        let dir = tempfile::tempdir().unwrap();
        let archive = archive(dir.path(), false);

        let (kind, scan) = archive
            .store_fingerprint(0, at(), "x,AA:BB,-90\n", "")
            .await
            .unwrap();
        assert_eq!(kind, SampleKind::Negative);
        assert_eq!(
            scan.wifi_path.parent().unwrap(),
            dir.path().join("fingerprints/negative_samples/0")
        );

        let (kind, scan) = archive
            .store_fingerprint(5, at(), "", "1,UUID-A,-60\n")
            .await
            .unwrap();
        assert_eq!(kind, SampleKind::Positive);
        assert!(scan.ble_path.exists());
        assert!(scan
            .ble_path
            .starts_with(dir.path().join("fingerprints/positive_samples/5")));

        assert!(archive.store_fingerprint(-1, at(), "", "").await.is_err());
    }
}
