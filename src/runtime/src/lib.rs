//! a3s-offline Runtime - version reconciliation and offline image export.
//!
//! Resolves the latest tags of configured components against a registry,
//! diffs them with the previous snapshot, and pulls and exports the changed
//! images as gzip archives per architecture, resuming from a checkpoint
//! after interruption.

pub mod checkpoint;
pub mod container;
pub mod export;
pub mod reconcile;
pub mod reference;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod snapshot;
pub mod sync;

// Re-export common types
pub use checkpoint::{Checkpoint, CheckpointStore, LoadOutcome, Stage};
pub use container::{ContainerRuntime, DockerCli};
pub use export::{ExportPipeline, ExportResult, WorkItem};
pub use reconcile::{PlannedUpdate, Reconciler, Reconciliation, RowStatus, StatusRow, UpdateSet};
pub use reference::ImageReference;
pub use registry::{RegistryClient, TagEntry, TagPage, TagSource};
pub use report::{ArchiveId, ReportWriter, RunReport, Validation};
pub use resolver::TagResolver;
pub use snapshot::{new_run_key, run_date, Snapshot, SnapshotStore};
pub use sync::{RunOptions, RunOutcome, SyncRunner};

/// a3s-offline Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
