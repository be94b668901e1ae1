//! Version snapshots: `latest-<runKey>.txt` and `update-<runKey>.txt`.
//!
//! A snapshot lists one `repository:version` per line. Snapshots of earlier
//! runs are history and never rewritten; the most recent one other than the
//! current run is the baseline for reconciliation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use a3s_offline_core::error::{Result, SyncError};
use a3s_offline_core::{major_version, normalize};

use crate::reference::ImageReference;

const LATEST_PREFIX: &str = "latest-";
const UPDATE_PREFIX: &str = "update-";
const SNAPSHOT_SUFFIX: &str = ".txt";

/// Run key format. Sorts lexicographically in time order and shares its
/// leading `YYYYMMDD` with legacy date-only keys.
const RUN_KEY_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Build the run key for a point in time.
pub fn run_key_at(time: DateTime<Local>) -> String {
    time.format(RUN_KEY_FORMAT).to_string()
}

/// Run key for the current local time.
pub fn new_run_key() -> String {
    run_key_at(Local::now())
}

/// Calendar date (`YYYYMMDD`) part of a run key.
pub fn run_date(run_key: &str) -> &str {
    run_key.split('-').next().unwrap_or(run_key)
}

/// Image → major group → version, as recorded in a snapshot.
pub type RecordedVersions = BTreeMap<String, BTreeMap<String, String>>;

/// A snapshot file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub run_key: String,
    pub path: PathBuf,
}

/// Reads and writes snapshot files in the versions directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn latest_path(&self, run_key: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", LATEST_PREFIX, run_key, SNAPSHOT_SUFFIX))
    }

    fn update_path(&self, run_key: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", UPDATE_PREFIX, run_key, SNAPSHOT_SUFFIX))
    }

    /// `base`, or `base-NNN` when files for `base` already exist. Suffixed
    /// keys still sort after `base` and before the next second.
    pub fn unique_run_key(&self, base: &str) -> String {
        if !self.key_taken(base) {
            return base.to_string();
        }
        let mut n = 1u32;
        loop {
            let key = format!("{}-{:03}", base, n);
            if !self.key_taken(&key) {
                tracing::debug!(run_key = %key, "Run key already used, added suffix");
                return key;
            }
            n += 1;
        }
    }

    fn key_taken(&self, run_key: &str) -> bool {
        self.latest_path(run_key).exists() || self.update_path(run_key).exists()
    }

    /// Most recent snapshot whose run key is not `excluding_run_key`.
    pub fn find_latest_prior(&self, excluding_run_key: &str) -> Result<Option<Snapshot>> {
        if !self.dir.exists() {
            return Ok(None);
        }

        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            SyncError::SnapshotError(format!("Failed to list {}: {}", self.dir.display(), e))
        })?;

        let mut latest: Option<Snapshot> = None;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(run_key) = name
                .to_str()
                .and_then(|n| n.strip_prefix(LATEST_PREFIX))
                .and_then(|n| n.strip_suffix(SNAPSHOT_SUFFIX))
            else {
                continue;
            };
            if run_key == excluding_run_key {
                continue;
            }
            if latest.as_ref().map_or(true, |s| run_key > s.run_key.as_str()) {
                latest = Some(Snapshot {
                    run_key: run_key.to_string(),
                    path: entry.path(),
                });
            }
        }

        Ok(latest)
    }

    /// Load a snapshot into image → major → version.
    pub fn load(&self, snapshot: &Snapshot) -> Result<RecordedVersions> {
        let content = std::fs::read_to_string(&snapshot.path).map_err(|e| {
            SyncError::SnapshotError(format!(
                "Failed to read {}: {}",
                snapshot.path.display(),
                e
            ))
        })?;

        let mut recorded = RecordedVersions::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match ImageReference::parse(line) {
                Ok(reference) => {
                    let major = major_version(&reference.tag).to_string();
                    recorded
                        .entry(reference.repository)
                        .or_default()
                        .insert(major, reference.tag);
                }
                Err(e) => {
                    tracing::warn!(
                        file = %snapshot.path.display(),
                        line = lineno + 1,
                        error = %e,
                        "Skipping malformed snapshot line"
                    );
                }
            }
        }

        Ok(recorded)
    }

    /// Write `latest-<runKey>.txt` from repository → versions.
    pub fn save(&self, run_key: &str, entries: &BTreeMap<String, Vec<String>>) -> Result<Snapshot> {
        let mut lines = Vec::new();
        for (repository, versions) in entries {
            let mut versions: Vec<&String> = versions.iter().collect();
            versions.sort_by(|a, b| normalize(a).cmp(&normalize(b)).then_with(|| a.cmp(b)));
            for version in versions {
                lines.push(format!("{}:{}", repository, version));
            }
        }

        let path = self.latest_path(run_key);
        self.write_lines(&path, &lines)?;
        tracing::debug!(path = %path.display(), entries = lines.len(), "Saved snapshot");

        Ok(Snapshot {
            run_key: run_key.to_string(),
            path,
        })
    }

    /// Write `update-<runKey>.txt` with one full image reference per line.
    pub fn save_update_list(&self, run_key: &str, references: &[String]) -> Result<PathBuf> {
        let path = self.update_path(run_key);
        self.write_lines(&path, references)?;
        tracing::debug!(path = %path.display(), entries = references.len(), "Saved update list");
        Ok(path)
    }

    /// Delete snapshot and update files whose run key falls on `date` (`YYYYMMDD`).
    pub fn remove_for_date(&self, date: &str) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        if !self.dir.exists() {
            return Ok(removed);
        }

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(run_key) = name.to_str().and_then(|n| {
                n.strip_prefix(LATEST_PREFIX)
                    .or_else(|| n.strip_prefix(UPDATE_PREFIX))
                    .and_then(|n| n.strip_suffix(SNAPSHOT_SUFFIX))
            }) else {
                continue;
            };
            if run_date(run_key) == date {
                std::fs::remove_file(entry.path())?;
                removed.push(entry.path());
            }
        }

        removed.sort();
        Ok(removed)
    }

    fn write_lines(&self, path: &Path, lines: &[String]) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            SyncError::SnapshotError(format!("Failed to create {}: {}", self.dir.display(), e))
        })?;

        let mut content = lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        std::fs::write(path, content).map_err(|e| {
            SyncError::SnapshotError(format!("Failed to write {}: {}", path.display(), e))
        })
    }
}
