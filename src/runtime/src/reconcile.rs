//! Reconciliation of resolved tags against the previous snapshot.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use a3s_offline_core::error::Result;
use a3s_offline_core::{major_version, Component, VersionSelection};

use crate::resolver::TagResolver;
use crate::snapshot::{RecordedVersions, Snapshot, SnapshotStore};

/// A component with the version(s) that need export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedUpdate {
    pub component: Component,
    pub versions: Vec<String>,
}

impl PlannedUpdate {
    /// Full image references of every planned version.
    pub fn references(&self) -> Vec<String> {
        self.versions
            .iter()
            .map(|v| self.component.reference(v))
            .collect()
    }
}

/// Component name → planned update.
pub type UpdateSet = BTreeMap<String, PlannedUpdate>;

/// Outcome of one (component, group) comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    /// Newer or previously unseen version
    Update,
    /// Same version as the prior snapshot
    Current,
    /// Nothing resolved upstream this run
    Unresolved,
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Update => write!(f, "update"),
            Self::Current => write!(f, "up-to-date"),
            Self::Unresolved => write!(f, "unresolved"),
        }
    }
}

/// One line of the status table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub component: String,
    pub prior: Option<String>,
    pub latest: Option<String>,
    pub status: RowStatus,
}

/// Everything a reconciliation pass produced.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub update_set: UpdateSet,
    pub rows: Vec<StatusRow>,
    /// Baseline snapshot, if any
    pub prior: Option<Snapshot>,
    /// Repository → resolved versions of every component that resolved
    pub latest: BTreeMap<String, Vec<String>>,
    /// Snapshot written for this run, `None` for a dry run
    pub snapshot: Option<Snapshot>,
    /// Update list written for this run (only when something changed)
    pub update_list: Option<PathBuf>,
}

/// Resolves every component and diffs the result against the prior snapshot.
pub struct Reconciler<'a> {
    resolver: &'a TagResolver,
    store: &'a SnapshotStore,
}

impl<'a> Reconciler<'a> {
    pub fn new(resolver: &'a TagResolver, store: &'a SnapshotStore) -> Self {
        Self { resolver, store }
    }

    /// Resolve and diff against the latest snapshot other than `run_key`'s,
    /// without writing anything.
    pub async fn diff(&self, components: &[Component], run_key: &str) -> Result<Reconciliation> {
        let prior = self.store.find_latest_prior(run_key)?;
        let recorded = match &prior {
            Some(snapshot) => {
                tracing::info!(snapshot = %snapshot.path.display(), "Using prior snapshot");
                self.store.load(snapshot)?
            }
            None => {
                tracing::warn!("No prior snapshot found, every component will be exported");
                RecordedVersions::new()
            }
        };

        let mut update_set = UpdateSet::new();
        let mut rows = Vec::new();
        let mut latest: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for component in components {
            tracing::info!(component = %component.name, "Checking versions");
            let versions = self.resolver.resolve(component).await;

            let (planned, component_rows) = plan(component, &versions, &recorded);
            rows.extend(component_rows);
            if versions.is_empty() {
                continue;
            }

            tracing::info!(
                component = %component.name,
                versions = %versions.join(", "),
                "Resolved"
            );
            latest
                .entry(component.repository.clone())
                .or_default()
                .extend(versions);
            if let Some(planned) = planned {
                update_set.insert(component.name.clone(), planned);
            }
        }

        Ok(Reconciliation {
            update_set,
            rows,
            prior,
            latest,
            snapshot: None,
            update_list: None,
        })
    }

    /// Resolve, diff and persist the snapshot (and update list) for `run_key`.
    pub async fn reconcile(&self, components: &[Component], run_key: &str) -> Result<Reconciliation> {
        let mut reconciliation = self.diff(components, run_key).await?;

        let snapshot = self.store.save(run_key, &reconciliation.latest)?;
        tracing::info!(snapshot = %snapshot.path.display(), "Saved latest versions");
        reconciliation.snapshot = Some(snapshot);

        if reconciliation.update_set.is_empty() {
            tracing::info!("All components are up to date");
        } else {
            let references: Vec<String> = reconciliation
                .update_set
                .values()
                .flat_map(PlannedUpdate::references)
                .collect();
            let path = self.store.save_update_list(run_key, &references)?;
            tracing::info!(
                path = %path.display(),
                components = reconciliation.update_set.len(),
                "Saved update list"
            );
            reconciliation.update_list = Some(path);
        }

        Ok(reconciliation)
    }
}

/// Compare one component's resolved tags with the recorded versions.
pub fn plan(
    component: &Component,
    resolved: &[String],
    recorded: &RecordedVersions,
) -> (Option<PlannedUpdate>, Vec<StatusRow>) {
    let previous = recorded.get(&component.repository);

    if resolved.is_empty() {
        let row = StatusRow {
            component: component.name.clone(),
            prior: previous.and_then(|m| m.values().next().cloned()),
            latest: None,
            status: RowStatus::Unresolved,
        };
        return (None, vec![row]);
    }

    let mut rows = Vec::with_capacity(resolved.len());
    let mut changed = Vec::new();

    for version in resolved {
        let prior = match component.selection {
            VersionSelection::Multiple => {
                previous.and_then(|m| m.get(major_version(version)).cloned())
            }
            // First recorded entry of the image
            VersionSelection::Single => previous.and_then(|m| m.values().next().cloned()),
        };

        let needs_update = prior.as_deref() != Some(version.as_str());
        if needs_update {
            changed.push(version.clone());
        }
        rows.push(StatusRow {
            component: component.name.clone(),
            prior,
            latest: Some(version.clone()),
            status: if needs_update {
                RowStatus::Update
            } else {
                RowStatus::Current
            },
        });
    }

    let planned = (!changed.is_empty()).then(|| PlannedUpdate {
        component: component.clone(),
        versions: changed,
    });
    (planned, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{TagEntry, TagPage, TagSource};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn recorded(list: &[(&str, &str, &str)]) -> RecordedVersions {
        let mut out = RecordedVersions::new();
        for (repo, major, version) in list {
            out.entry(repo.to_string())
                .or_default()
                .insert(major.to_string(), version.to_string());
        }
        out
    }

    fn redis() -> Component {
        Component::new("redis", "library/redis", r"^\d+\.\d+\.\d+$")
    }

    fn postgis() -> Component {
        Component::new("postgresql-postgis", "freelabspace/postgresql-postgis", r"^\d+\.\d+$")
            .with_selection(VersionSelection::Multiple)
    }

    #[test]
    fn test_plan_single_unchanged() {
        let (planned, rows) = plan(
            &redis(),
            &["7.2.0".to_string()],
            &recorded(&[("library/redis", "7", "7.2.0")]),
        );
        assert!(planned.is_none());
        assert_eq!(rows[0].status, RowStatus::Current);
    }

    #[test]
    fn test_plan_single_changed() {
        let (planned, rows) = plan(
            &redis(),
            &["7.4.0".to_string()],
            &recorded(&[("library/redis", "7", "7.2.0")]),
        );
        let planned = planned.unwrap();
        assert_eq!(planned.versions, vec!["7.4.0"]);
        assert_eq!(rows[0].prior.as_deref(), Some("7.2.0"));
        assert_eq!(rows[0].status, RowStatus::Update);
    }

    #[test]
    fn test_plan_single_major_bump_compares_recorded_entry() {
        let (planned, _) = plan(
            &redis(),
            &["8.0.0".to_string()],
            &recorded(&[("library/redis", "7", "7.4.0")]),
        );
        assert_eq!(planned.unwrap().versions, vec!["8.0.0"]);
    }

    #[test]
    fn test_plan_unseen_image() {
        let (planned, rows) = plan(&redis(), &["7.4.0".to_string()], &RecordedVersions::new());
        assert!(planned.is_some());
        assert!(rows[0].prior.is_none());
    }

    #[test]
    fn test_plan_multiple_only_changed_groups() {
        let (planned, rows) = plan(
            &postgis(),
            &["9.6".to_string(), "13.21".to_string(), "16.4".to_string()],
            &recorded(&[
                ("freelabspace/postgresql-postgis", "9", "9.6"),
                ("freelabspace/postgresql-postgis", "13", "13.20"),
            ]),
        );
        assert_eq!(planned.unwrap().versions, vec!["13.21", "16.4"]);
        let statuses: Vec<_> = rows.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![RowStatus::Current, RowStatus::Update, RowStatus::Update]
        );
    }

    #[test]
    fn test_plan_multiple_all_current() {
        let (planned, _) = plan(
            &postgis(),
            &["9.6".to_string()],
            &recorded(&[("freelabspace/postgresql-postgis", "9", "9.6")]),
        );
        assert!(planned.is_none());
    }

    #[test]
    fn test_plan_unresolved() {
        let (planned, rows) = plan(&redis(), &[], &recorded(&[("library/redis", "7", "7.2.0")]));
        assert!(planned.is_none());
        assert_eq!(rows[0].status, RowStatus::Unresolved);
        assert_eq!(rows[0].prior.as_deref(), Some("7.2.0"));
    }

    #[test]
    fn test_planned_references() {
        let planned = PlannedUpdate {
            component: postgis(),
            versions: vec!["9.6".to_string(), "13.21".to_string()],
        };
        assert_eq!(
            planned.references(),
            vec![
                "docker.io/freelabspace/postgresql-postgis:9.6",
                "docker.io/freelabspace/postgresql-postgis:13.21"
            ]
        );
    }

    struct MapSource(HashMap<&'static str, Vec<&'static str>>);

    #[async_trait]
    impl TagSource for MapSource {
        async fn fetch_page(&self, repository: &str, page: u32) -> Result<TagPage> {
            let results = if page == 1 {
                self.0
                    .get(repository)
                    .map(|tags| {
                        tags.iter()
                            .map(|n| TagEntry {
                                name: n.to_string(),
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            } else {
                Vec::new()
            };
            Ok(TagPage {
                results,
                next: None,
            })
        }
    }

    #[tokio::test]
    async fn test_reconcile_writes_snapshot_and_update_list() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path());
        std::fs::write(
            tmp.path().join("latest-20241201.txt"),
            "library/redis:7.2.0\nlibrary/nginx:1.27.3\n",
        )
        .unwrap();

        let source = MapSource(HashMap::from([
            ("library/redis", vec!["7.2.0", "7.4.0"]),
            ("library/nginx", vec!["1.27.3"]),
        ]));
        let resolver = TagResolver::new(Arc::new(source));
        let components = vec![
            redis(),
            Component::new("nginx", "library/nginx", r"^\d+\.\d+\.\d+$"),
            Component::new("geoserver", "kartoza/geoserver", r"^\d+\.\d+\.\d+$"),
        ];

        let result = Reconciler::new(&resolver, &store)
            .reconcile(&components, "20241218-100000")
            .await
            .unwrap();

        assert_eq!(result.prior.unwrap().run_key, "20241201");
        assert_eq!(result.update_set.len(), 1);
        assert_eq!(result.update_set["redis"].versions, vec!["7.4.0"]);
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.rows[2].status, RowStatus::Unresolved);

        // Unresolved components are left out of the snapshot
        let snapshot = std::fs::read_to_string(result.snapshot.unwrap().path).unwrap();
        assert_eq!(snapshot, "library/nginx:1.27.3\nlibrary/redis:7.4.0\n");

        let update_list = std::fs::read_to_string(result.update_list.unwrap()).unwrap();
        assert_eq!(update_list, "docker.io/library/redis:7.4.0\n");
    }

    #[tokio::test]
    async fn test_reconcile_nothing_changed_skips_update_list() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path());
        std::fs::write(tmp.path().join("latest-20241201.txt"), "library/redis:7.4.0\n").unwrap();

        let source = MapSource(HashMap::from([("library/redis", vec!["7.4.0"])]));
        let resolver = TagResolver::new(Arc::new(source));

        let result = Reconciler::new(&resolver, &store)
            .reconcile(&[redis()], "20241218-100000")
            .await
            .unwrap();
        assert!(result.update_set.is_empty());
        assert!(result.update_list.is_none());
        assert!(result.snapshot.unwrap().path.exists());
    }

    #[tokio::test]
    async fn test_diff_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path().join("versions"));
        let source = MapSource(HashMap::from([("library/redis", vec!["7.4.0"])]));
        let resolver = TagResolver::new(Arc::new(source));

        let result = Reconciler::new(&resolver, &store)
            .diff(&[redis()], "20241218-100000")
            .await
            .unwrap();
        assert_eq!(result.update_set["redis"].versions, vec!["7.4.0"]);
        assert_eq!(result.latest["library/redis"], vec!["7.4.0"]);
        assert!(result.snapshot.is_none());
        assert!(!tmp.path().join("versions").exists());
    }
}
