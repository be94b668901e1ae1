//! Pull and export of offline image archives.
//!
//! Every (component, version, architecture) triple of an update set becomes
//! a [`WorkItem`]. Items run on a bounded worker pool; each one checks the
//! local store, pulls with retry, then streams `save` output through gzip
//! into its target file. A failed item never cancels its siblings.
//!
//! The engine keeps one local image per tag, so items of the same reference
//! hold a per-reference lock from existence check through export.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

use a3s_offline_core::error::{Result, SyncError};
use a3s_offline_core::SyncConfig;

use crate::container::ContainerRuntime;
use crate::reconcile::UpdateSet;
use crate::snapshot::run_date;

/// Suffix of archives still being written.
const PARTIAL_SUFFIX: &str = ".partial";

/// Archive file extension.
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// One (component, version, architecture) unit of export work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub component: String,
    /// Last repository segment, used in file names
    pub image_name: String,
    pub version: String,
    pub arch: String,
    /// Full image reference
    pub reference: String,
    /// Final archive path
    pub target: PathBuf,
}

/// Outcome of one work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportResult {
    pub component: String,
    pub image_name: String,
    pub version: String,
    pub arch: String,
    pub reference: String,
    pub target: PathBuf,
    pub pull_succeeded: bool,
    pub export_succeeded: bool,
    /// Pull attempts made (0 when the pull was skipped)
    pub attempts: u32,
    /// Image was already present for this architecture
    pub pull_skipped: bool,
    /// Archive was already on disk from an earlier attempt
    pub export_skipped: bool,
    pub error_message: Option<String>,
    /// Written archive, set only on success
    pub file_path: Option<PathBuf>,
}

impl ExportResult {
    fn new(item: &WorkItem) -> Self {
        Self {
            component: item.component.clone(),
            image_name: item.image_name.clone(),
            version: item.version.clone(),
            arch: item.arch.clone(),
            reference: item.reference.clone(),
            target: item.target.clone(),
            pull_succeeded: false,
            export_succeeded: false,
            attempts: 0,
            pull_skipped: false,
            export_skipped: false,
            error_message: None,
            file_path: None,
        }
    }

    fn failed(mut self, error: impl ToString) -> Self {
        self.error_message = Some(error.to_string());
        self
    }

    /// Both pull and export succeeded.
    pub fn succeeded(&self) -> bool {
        self.pull_succeeded && self.export_succeeded
    }
}

/// Archive path: `<images>/<date>/<arch>/<image>_<version>_<arch>_<date>.tar.gz`.
pub fn target_path(images_dir: &Path, image_name: &str, version: &str, arch: &str, date: &str) -> PathBuf {
    images_dir.join(date).join(arch).join(format!(
        "{}_{}_{}_{}{}",
        image_name, version, arch, date, ARCHIVE_EXTENSION
    ))
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(PARTIAL_SUFFIX);
    target.with_file_name(name)
}

/// Expand an update set into work items, architectures innermost.
pub fn work_items(
    update_set: &UpdateSet,
    architectures: &[String],
    images_dir: &Path,
    run_key: &str,
) -> Vec<WorkItem> {
    let date = run_date(run_key);
    let mut items = Vec::new();
    for (name, planned) in update_set {
        let image_name = planned.component.image_name();
        for version in &planned.versions {
            for arch in architectures {
                items.push(WorkItem {
                    component: name.clone(),
                    image_name: image_name.to_string(),
                    version: version.clone(),
                    arch: arch.clone(),
                    reference: planned.component.reference(version),
                    target: target_path(images_dir, image_name, version, arch, date),
                });
            }
        }
    }
    items
}

/// One lock per image reference, shared by all workers.
#[derive(Clone, Default)]
struct ReferenceLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ReferenceLocks {
    async fn get(&self, reference: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(reference.to_string()).or_default())
    }
}

/// Per-item pull/export logic, cloned into every worker task.
#[derive(Clone)]
struct Worker {
    runtime: Arc<dyn ContainerRuntime>,
    locks: ReferenceLocks,
    pull_timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl Worker {
    async fn run(&self, item: WorkItem) -> ExportResult {
        let lock = self.locks.get(&item.reference).await;
        let _guard = lock.lock().await;
        self.run_locked(item).await
    }

    async fn run_locked(&self, item: WorkItem) -> ExportResult {
        let mut result = ExportResult::new(&item);

        if item.target.exists() {
            tracing::info!(
                arch = %item.arch,
                file = %item.target.display(),
                "Archive already present, skipping"
            );
            result.pull_succeeded = true;
            result.pull_skipped = true;
            result.export_succeeded = true;
            result.export_skipped = true;
            result.file_path = Some(item.target);
            return result;
        }

        match self.runtime.image_architecture(&item.reference).await {
            Ok(Some(arch)) if arch == item.arch => {
                tracing::info!(arch = %item.arch, reference = %item.reference, "Image already present");
                result.pull_skipped = true;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    arch = %item.arch,
                    reference = %item.reference,
                    error = %e,
                    "Existence check failed, pulling"
                );
            }
        }

        if !result.pull_skipped {
            match self.pull_with_retry(&item, &mut result.attempts).await {
                Ok(()) => {}
                Err(e) => return result.failed(e),
            }
        }
        result.pull_succeeded = true;

        match self.export(&item).await {
            Ok(bytes) => {
                tracing::info!(
                    arch = %item.arch,
                    file = %item.target.display(),
                    bytes,
                    "Archive written"
                );
                result.export_succeeded = true;
                result.file_path = Some(item.target);
                result
            }
            Err(e) => {
                tracing::error!(
                    arch = %item.arch,
                    reference = %item.reference,
                    error = %e,
                    "Export failed"
                );
                result.failed(e)
            }
        }
    }

    async fn pull_with_retry(&self, item: &WorkItem, attempts: &mut u32) -> Result<()> {
        let mut last_error = None;
        for attempt in 1..=self.max_retries {
            *attempts = attempt;
            tracing::info!(arch = %item.arch, reference = %item.reference, attempt, "Pulling image");

            match self
                .runtime
                .pull(&item.reference, &item.arch, self.pull_timeout)
                .await
            {
                Ok(()) => {
                    tracing::info!(arch = %item.arch, reference = %item.reference, "Pulled image");
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tracing::warn!(
                            arch = %item.arch,
                            reference = %item.reference,
                            attempt,
                            error = %e,
                            "Pull failed, retrying"
                        );
                        tokio::time::sleep(self.retry_delay).await;
                    } else {
                        tracing::error!(
                            arch = %item.arch,
                            reference = %item.reference,
                            attempts = attempt,
                            error = %e,
                            "Pull failed, giving up"
                        );
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SyncError::PullError {
            reference: item.reference.clone(),
            arch: item.arch.clone(),
            message: "no pull attempts configured".to_string(),
        }))
    }

    /// Stream `save` through gzip into a partial file, then move it into place.
    async fn export(&self, item: &WorkItem) -> Result<u64> {
        if let Some(parent) = item.target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let partial = partial_path(&item.target);
        let outcome = self.write_archive(item, &partial).await;
        if outcome.is_err() {
            if let Err(e) = std::fs::remove_file(&partial) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(file = %partial.display(), error = %e, "Failed to remove partial archive");
                }
            }
        }
        outcome
    }

    async fn write_archive(&self, item: &WorkItem, partial: &Path) -> Result<u64> {
        tracing::info!(arch = %item.arch, file = %item.target.display(), "Writing archive");

        let file = File::create(partial)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        let bytes = self
            .runtime
            .save(&item.reference, &item.arch, &mut encoder)
            .await?;

        let export_error = |e: std::io::Error| SyncError::ExportError {
            reference: item.reference.clone(),
            arch: item.arch.clone(),
            message: e.to_string(),
        };
        let mut file = encoder.finish().map_err(export_error)?;
        file.flush().map_err(export_error)?;
        file.sync_all().map_err(export_error)?;
        drop(file);

        std::fs::rename(partial, &item.target)?;
        Ok(bytes)
    }
}

/// Bounded-concurrency pull/export driver.
pub struct ExportPipeline {
    worker: Worker,
    architectures: Vec<String>,
    images_dir: PathBuf,
    concurrency: usize,
}

impl ExportPipeline {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: &SyncConfig) -> Self {
        Self {
            worker: Worker {
                runtime,
                locks: ReferenceLocks::default(),
                pull_timeout: config.pull_timeout(),
                max_retries: config.max_retries,
                retry_delay: config.retry_delay(),
            },
            architectures: config.architectures.clone(),
            images_dir: config.images_dir(),
            concurrency: config.concurrency.max(1),
        }
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Work items of an update set for this pipeline's architectures.
    pub fn work_items(&self, update_set: &UpdateSet, run_key: &str) -> Vec<WorkItem> {
        work_items(update_set, &self.architectures, &self.images_dir, run_key)
    }

    /// Run every work item to completion. Results come back in item order.
    pub async fn process(&self, items: Vec<WorkItem>) -> Vec<ExportResult> {
        let total = items.len();
        if total == 0 {
            return Vec::new();
        }

        tracing::info!(items = total, concurrency = self.concurrency, "Processing images");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (index, item) in items.iter().cloned().enumerate() {
            let worker = self.worker.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => worker.run(item).await,
                    Err(_) => ExportResult::new(&item).failed("worker pool closed"),
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<ExportResult>> = vec![None; total];
        let mut done = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    done += 1;
                    tracing::info!(
                        progress = %format!("{}/{}", done, total),
                        reference = %result.reference,
                        arch = %result.arch,
                        ok = result.succeeded(),
                        "Work item finished"
                    );
                    slots[index] = Some(result);
                }
                Err(e) => tracing::error!(error = %e, "Worker task failed"),
            }
        }

        slots
            .into_iter()
            .zip(items.iter())
            .map(|(slot, item)| {
                slot.unwrap_or_else(|| ExportResult::new(item).failed("worker task panicked"))
            })
            .collect()
    }
}
