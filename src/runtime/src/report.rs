//! Post-export validation, JSON run report and remediation script.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use a3s_offline_core::error::{Result, SyncError};

use crate::export::{ExportResult, WorkItem, ARCHIVE_EXTENSION};

/// (image, version, architecture) identity of an archive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArchiveId {
    pub image_name: String,
    pub version: String,
    pub arch: String,
}

impl std::fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} ({})", self.image_name, self.version, self.arch)
    }
}

/// Parse `<image>_<version>_<arch>_<date>.tar.gz` back into its parts.
pub fn parse_archive_name(file_name: &str) -> Option<(ArchiveId, String)> {
    let stem = file_name.strip_suffix(ARCHIVE_EXTENSION)?;
    let mut parts = stem.rsplitn(4, '_');
    let date = parts.next()?;
    let arch = parts.next()?;
    let version = parts.next()?;
    let image_name = parts.next()?;
    if [date, arch, version, image_name].iter().any(|p| p.is_empty()) {
        return None;
    }
    Some((
        ArchiveId {
            image_name: image_name.to_string(),
            version: version.to_string(),
            arch: arch.to_string(),
        },
        date.to_string(),
    ))
}

/// Archives found under `<images>/<date>/<arch>/`.
pub fn scan_archives(images_dir: &Path, date: &str) -> Result<BTreeSet<ArchiveId>> {
    let mut found = BTreeSet::new();
    let day_dir = images_dir.join(date);
    if !day_dir.exists() {
        return Ok(found);
    }

    for arch_dir in std::fs::read_dir(&day_dir)? {
        let arch_dir = arch_dir?;
        if !arch_dir.file_type()?.is_dir() {
            continue;
        }
        for entry in std::fs::read_dir(arch_dir.path())? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            match parse_archive_name(name) {
                Some((id, file_date)) if file_date == date => {
                    found.insert(id);
                }
                Some(_) => {}
                None => {
                    tracing::debug!(file = %entry.path().display(), "Ignoring non-archive file");
                }
            }
        }
    }
    Ok(found)
}

/// Expected archives compared with what is on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub expected: usize,
    pub found: usize,
    pub missing: Vec<ArchiveId>,
    pub unexpected: Vec<ArchiveId>,
}

impl Validation {
    /// Every expected archive is present.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Diff the work items of a run against the archives on disk.
pub fn validate(items: &[WorkItem], images_dir: &Path, date: &str) -> Result<Validation> {
    let expected: BTreeSet<ArchiveId> = items
        .iter()
        .map(|item| ArchiveId {
            image_name: item.image_name.clone(),
            version: item.version.clone(),
            arch: item.arch.clone(),
        })
        .collect();
    let found = scan_archives(images_dir, date)?;

    let validation = Validation {
        expected: expected.len(),
        found: found.len(),
        missing: expected.difference(&found).cloned().collect(),
        unexpected: found.difference(&expected).cloned().collect(),
    };

    for id in &validation.missing {
        tracing::warn!(archive = %id, "Expected archive is missing");
    }
    for id in &validation.unexpected {
        tracing::debug!(archive = %id, "Archive on disk was not part of this run");
    }
    Ok(validation)
}

/// JSON summary of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_key: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub duration_secs: f64,
    /// Stage the run resumed from, if it picked up a checkpoint
    pub resumed_from: Option<String>,
    pub components_checked: usize,
    pub components_updated: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<ExportResult>,
    pub validation: Validation,
    pub remediation_script: Option<PathBuf>,
}

/// Writes reports and remediation scripts into the reports directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn report_path(&self, run_key: &str) -> PathBuf {
        self.dir.join(format!("report-{}.json", run_key))
    }

    pub fn script_path(&self, run_key: &str) -> PathBuf {
        self.dir.join(format!("retry-{}.sh", run_key))
    }

    /// Write `report-<runKey>.json`.
    pub fn write_report(&self, report: &RunReport) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.report_path(&report.run_key);
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json).map_err(|e| {
            SyncError::Other(format!("Failed to write report {}: {}", path.display(), e))
        })?;
        tracing::info!(path = %path.display(), "Report written");
        Ok(path)
    }

    /// Write `retry-<runKey>.sh` for the failed results, if there are any.
    pub fn write_remediation_script(
        &self,
        run_key: &str,
        runtime_binary: &str,
        failed: &[&ExportResult],
        generated_at: DateTime<Local>,
    ) -> Result<Option<PathBuf>> {
        if failed.is_empty() {
            return Ok(None);
        }

        std::fs::create_dir_all(&self.dir)?;
        let path = self.script_path(run_key);
        let script = render_remediation_script(runtime_binary, failed, generated_at);
        std::fs::write(&path, script).map_err(|e| {
            SyncError::Other(format!("Failed to write script {}: {}", path.display(), e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        }

        tracing::warn!(path = %path.display(), failed = failed.len(), "Remediation script written");
        Ok(Some(path))
    }

    /// Delete all reports and scripts.
    pub fn clear(&self) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                std::fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Shell script re-running pull and save for each failed triple, grouped by arch.
pub fn render_remediation_script(
    runtime_binary: &str,
    failed: &[&ExportResult],
    generated_at: DateTime<Local>,
) -> String {
    let mut by_arch: BTreeMap<&str, Vec<&ExportResult>> = BTreeMap::new();
    for result in failed {
        by_arch.entry(result.arch.as_str()).or_default().push(result);
    }

    let bin = shell_words::quote(runtime_binary);
    let mut out = String::new();
    out.push_str("#!/bin/bash\n");
    out.push_str("# Retry failed offline image exports\n");
    out.push_str(&format!(
        "# Generated: {}\n",
        generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    out.push_str("set -eo pipefail\n");

    for (arch, results) in by_arch {
        out.push_str(&format!("\n# ==== {} ====\n", arch));
        for result in results {
            let reference = shell_words::quote(&result.reference);
            let target = result.target.to_string_lossy();
            if let Some(error) = &result.error_message {
                out.push_str(&format!("# {}\n", error.replace('\n', " ")));
            }
            out.push_str(&format!(
                "{} pull --platform=linux/{} {}\n",
                bin,
                shell_words::quote(arch),
                reference
            ));
            if let Some(parent) = result.target.parent() {
                out.push_str(&format!(
                    "mkdir -p {}\n",
                    shell_words::quote(&parent.to_string_lossy())
                ));
            }
            let partial = format!("{}.partial", target);
            out.push_str(&format!(
                "{} save --platform=linux/{} {} | gzip > {}\n",
                bin,
                shell_words::quote(arch),
                reference,
                shell_words::quote(&partial)
            ));
            out.push_str(&format!(
                "mv {} {}\n",
                shell_words::quote(&partial),
                shell_words::quote(&target)
            ));
        }
    }
    out
}
