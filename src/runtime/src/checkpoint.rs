//! Crash-resilient run checkpoint.
//!
//! Persists `{current_date, last_step, updates_needed}` to `state.json` with
//! atomic writes. A checkpoint on disk at startup means the previous run did
//! not finish and resumes from the recorded stage.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use a3s_offline_core::error::{Result, SyncError};

use crate::export::ExportResult;
use crate::reconcile::UpdateSet;

/// Last completed stage with its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "last_step", rename_all = "snake_case")]
pub enum Stage {
    /// Nothing finished yet
    None,
    /// Versions resolved and reconciled; export pending
    VersionsResolved { updates_needed: UpdateSet },
    /// Export finished; reporting pending
    ImagesExported {
        updates_needed: UpdateSet,
        #[serde(default)]
        failed: Vec<ExportResult>,
    },
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::VersionsResolved { .. } => write!(f, "versions_resolved"),
            Self::ImagesExported { .. } => write!(f, "images_exported"),
        }
    }
}

/// Checkpoint contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Run key of the interrupted run
    pub current_date: String,
    #[serde(flatten)]
    pub stage: Stage,
}

impl Checkpoint {
    pub fn new(run_key: impl Into<String>) -> Self {
        Self {
            current_date: run_key.into(),
            stage: Stage::None,
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }
}

/// What was found at the checkpoint path.
#[derive(Debug)]
pub enum LoadOutcome {
    Missing,
    Found(Checkpoint),
    /// Present but unreadable; the message says why
    Corrupt(String),
}

/// Checkpoint file backed by JSON.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint. Read and parse failures are reported, not raised.
    pub fn load(&self) -> LoadOutcome {
        if !self.path.exists() {
            return LoadOutcome::Missing;
        }
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) => return LoadOutcome::Corrupt(e.to_string()),
        };
        match serde_json::from_str::<Checkpoint>(&data) {
            Ok(checkpoint) => LoadOutcome::Found(checkpoint),
            Err(e) => LoadOutcome::Corrupt(e.to_string()),
        }
    }

    /// Save atomically (write to .tmp, then rename).
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let data = serde_json::to_string_pretty(checkpoint)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &data).map_err(|e| {
            SyncError::CheckpointError(format!("Failed to write {}: {}", tmp_path.display(), e))
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            SyncError::CheckpointError(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;

        tracing::debug!(path = %self.path.display(), stage = %checkpoint.stage, "Checkpoint saved");
        Ok(())
    }

    /// Delete the checkpoint. Returns whether one existed.
    pub fn clear(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SyncError::CheckpointError(format!(
                "Failed to remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}
