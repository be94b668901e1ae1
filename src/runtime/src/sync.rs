//! End-to-end sync run with checkpoint resume.
//!
//! Stages: resolve and reconcile versions, export images, validate and
//! report. The checkpoint is written after each stage so an interrupted run
//! picks up where it stopped.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;

use a3s_offline_core::error::Result;
use a3s_offline_core::SyncConfig;

use crate::checkpoint::{Checkpoint, CheckpointStore, LoadOutcome, Stage};
use crate::container::{ContainerRuntime, DockerCli};
use crate::export::{ExportPipeline, ExportResult};
use crate::reconcile::{PlannedUpdate, Reconciler, Reconciliation, UpdateSet};
use crate::registry::{RegistryClient, TagSource};
use crate::report::{validate, ReportWriter, RunReport};
use crate::resolver::TagResolver;
use crate::snapshot::{new_run_key, run_date, SnapshotStore};

/// Options of a single `run`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Discard an existing checkpoint instead of resuming it
    pub fresh: bool,
}

/// Outcome of a completed `run`.
#[derive(Debug)]
pub struct RunOutcome {
    /// Present when this invocation resolved versions itself
    pub reconciliation: Option<Reconciliation>,
    pub report: RunReport,
    pub report_path: PathBuf,
}

impl RunOutcome {
    /// Every work item succeeded.
    pub fn is_success(&self) -> bool {
        self.report.failed == 0
    }
}

/// Wires the stages together.
pub struct SyncRunner {
    config: SyncConfig,
    resolver: TagResolver,
    snapshots: SnapshotStore,
    pipeline: ExportPipeline,
    checkpoints: CheckpointStore,
    reports: ReportWriter,
}

impl SyncRunner {
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn TagSource>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            resolver: TagResolver::new(source),
            snapshots: SnapshotStore::new(config.versions_dir()),
            pipeline: ExportPipeline::new(runtime, &config),
            checkpoints: CheckpointStore::new(config.state_file.clone()),
            reports: ReportWriter::new(config.reports_dir()),
            config,
        }
    }

    /// Runner backed by the registry HTTP API and the configured runtime binary.
    pub fn from_config(config: SyncConfig) -> Result<Self> {
        let source = Arc::new(RegistryClient::new(&config)?);
        let runtime = Arc::new(DockerCli::new(config.runtime_binary.clone()));
        Ok(Self::new(config, source, runtime))
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Resolve and diff without writing snapshots, checkpoints or archives.
    pub async fn check(&self) -> Result<Reconciliation> {
        Reconciler::new(&self.resolver, &self.snapshots)
            .diff(&self.config.components, &self.next_run_key())
            .await
    }

    /// Full run, resuming from the checkpoint when one is present.
    pub async fn run(&self, options: RunOptions) -> Result<RunOutcome> {
        let started_at = Local::now();

        if options.fresh && self.checkpoints.clear()? {
            tracing::info!(path = %self.checkpoints.path().display(), "Discarded existing checkpoint");
        }

        let (run_key, stage) = match self.checkpoints.load() {
            LoadOutcome::Missing => (self.next_run_key(), Stage::None),
            LoadOutcome::Corrupt(reason) => {
                tracing::warn!(
                    path = %self.checkpoints.path().display(),
                    reason = %reason,
                    "Checkpoint is unreadable, starting fresh"
                );
                (self.next_run_key(), Stage::None)
            }
            LoadOutcome::Found(checkpoint) => {
                tracing::info!(
                    run_key = %checkpoint.current_date,
                    stage = %checkpoint.stage,
                    "Resuming from checkpoint"
                );
                (checkpoint.current_date, checkpoint.stage)
            }
        };
        let resumed_from = match stage {
            Stage::None => None,
            ref s => Some(s.to_string()),
        };

        let mut reconciliation = None;
        let (update_set, results, failed) = match stage {
            Stage::None => {
                self.checkpoints.save(&Checkpoint::new(&run_key))?;

                let reconciled = Reconciler::new(&self.resolver, &self.snapshots)
                    .reconcile(&self.config.components, &run_key)
                    .await?;
                let update_set = reconciled.update_set.clone();
                reconciliation = Some(reconciled);

                if update_set.is_empty() {
                    (update_set, Vec::new(), Vec::new())
                } else {
                    self.checkpoints.save(&Checkpoint::new(&run_key).with_stage(
                        Stage::VersionsResolved {
                            updates_needed: update_set.clone(),
                        },
                    ))?;
                    let (results, failed) = self.export(&run_key, &update_set).await?;
                    (update_set, results, failed)
                }
            }
            Stage::VersionsResolved { updates_needed } => {
                let (results, failed) = self.export(&run_key, &updates_needed).await?;
                (updates_needed, results, failed)
            }
            Stage::ImagesExported {
                updates_needed,
                failed,
            } => (updates_needed, failed.clone(), failed),
        };

        let report = self.report(
            &run_key,
            started_at,
            resumed_from,
            &update_set,
            results,
            &failed,
        )?;
        let report_path = self.reports.write_report(&report)?;

        if failed.is_empty() {
            self.checkpoints.clear()?;
        } else {
            let retry = retry_set(&update_set, &failed);
            self.checkpoints.save(
                &Checkpoint::new(&run_key).with_stage(Stage::VersionsResolved {
                    updates_needed: retry,
                }),
            )?;
            tracing::warn!(
                failed = failed.len(),
                "Some images failed, the next run retries them"
            );
        }

        Ok(RunOutcome {
            reconciliation,
            report,
            report_path,
        })
    }

    /// Run key for a new run, never one that already has a snapshot.
    fn next_run_key(&self) -> String {
        self.snapshots.unique_run_key(&new_run_key())
    }

    /// Export stage: returns all results and the failed subset.
    async fn export(
        &self,
        run_key: &str,
        update_set: &UpdateSet,
    ) -> Result<(Vec<ExportResult>, Vec<ExportResult>)> {
        let items = self.pipeline.work_items(update_set, run_key);
        let results = self.pipeline.process(items).await;
        let failed: Vec<ExportResult> = results.iter().filter(|r| !r.succeeded()).cloned().collect();

        self.checkpoints.save(&Checkpoint::new(run_key).with_stage(Stage::ImagesExported {
            updates_needed: update_set.clone(),
            failed: failed.clone(),
        }))?;
        Ok((results, failed))
    }

    fn report(
        &self,
        run_key: &str,
        started_at: chrono::DateTime<Local>,
        resumed_from: Option<String>,
        update_set: &UpdateSet,
        results: Vec<ExportResult>,
        failed: &[ExportResult],
    ) -> Result<RunReport> {
        let items = self.pipeline.work_items(update_set, run_key);
        let validation = validate(&items, self.pipeline.images_dir(), run_date(run_key))?;

        let failed_refs: Vec<&ExportResult> = failed.iter().collect();
        let remediation_script = self.reports.write_remediation_script(
            run_key,
            &self.config.runtime_binary,
            &failed_refs,
            Local::now(),
        )?;

        let finished_at = Local::now();
        let total = items.len();
        Ok(RunReport {
            run_key: run_key.to_string(),
            started_at,
            finished_at,
            duration_secs: (finished_at - started_at).num_milliseconds() as f64 / 1000.0,
            resumed_from,
            components_checked: self.config.components.len(),
            components_updated: update_set.len(),
            total,
            succeeded: total.saturating_sub(failed.len()),
            failed: failed.len(),
            results,
            validation,
            remediation_script,
        })
    }
}

/// Narrow an update set to the (component, version) pairs that failed.
pub fn retry_set(update_set: &UpdateSet, failed: &[ExportResult]) -> UpdateSet {
    let mut versions: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for result in failed {
        let entry = versions.entry(result.component.as_str()).or_default();
        if !entry.contains(&result.version) {
            entry.push(result.version.clone());
        }
    }

    update_set
        .iter()
        .filter_map(|(name, planned)| {
            let failed_versions = versions.get(name.as_str())?;
            let kept: Vec<String> = planned
                .versions
                .iter()
                .filter(|v| failed_versions.contains(v))
                .cloned()
                .collect();
            (!kept.is_empty()).then(|| {
                (
                    name.clone(),
                    PlannedUpdate {
                        component: planned.component.clone(),
                        versions: kept,
                    },
                )
            })
        })
        .collect()
}
