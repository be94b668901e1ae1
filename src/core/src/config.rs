use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::component::{Component, VersionScheme, VersionSelection};
use crate::error::{Result, SyncError};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "a3s-offline.yaml";

/// Sync configuration, built once at startup and passed to every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Registry API base URL (tag listing endpoint lives under it)
    pub registry_api_url: String,

    /// Registry page size for tag listing
    pub registry_page_size: u32,

    /// Attempts per registry request (transport errors and 5xx)
    pub registry_attempts: u32,

    /// Base backoff between registry attempts in milliseconds (doubles per attempt)
    pub registry_backoff_ms: u64,

    /// Per-request registry timeout in seconds
    pub registry_request_timeout_secs: u64,

    /// Pull timeout in seconds
    pub timeout_secs: u64,

    /// Total pull attempts per work item
    pub max_retries: u32,

    /// Fixed delay between pull attempts in seconds
    pub retry_delay_secs: u64,

    /// Concurrent pull/export workers
    pub concurrency: usize,

    /// Target architectures, primary first
    pub architectures: Vec<String>,

    /// Container runtime binary
    pub runtime_binary: String,

    /// Data directory (versions/, images/, reports/)
    pub data_dir: PathBuf,

    /// Log directory
    pub logs_dir: PathBuf,

    /// Checkpoint file
    pub state_file: PathBuf,

    /// Configured components
    pub components: Vec<Component>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            registry_api_url: "https://registry.hub.docker.com/v2".to_string(),
            registry_page_size: 100,
            registry_attempts: 5,
            registry_backoff_ms: 1000,
            registry_request_timeout_secs: 30,
            timeout_secs: 300,
            max_retries: 3,
            retry_delay_secs: 2,
            concurrency: 2,
            architectures: vec!["amd64".to_string(), "arm64".to_string()],
            runtime_binary: "docker".to_string(),
            data_dir: PathBuf::from("data"),
            logs_dir: PathBuf::from("logs"),
            state_file: PathBuf::from("state.json"),
            components: Self::default_components(),
        }
    }
}

impl SyncConfig {
    /// The image families tracked out of the box.
    pub fn default_components() -> Vec<Component> {
        vec![
            Component::new(
                "elasticsearch",
                "library/elasticsearch",
                r"^[0-9]+\.[0-9]+\.[0-9]+$",
            ),
            Component::new(
                "minio",
                "minio/minio",
                r"^RELEASE\.[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}-[0-9]{2}-[0-9]{2}Z$",
            )
            .with_scheme(VersionScheme::TimestampRelease),
            Component::new("nacos", "nacos/nacos-server", r"^v[0-9]+\.[0-9]+\.[0-9]+$")
                .with_scheme(VersionScheme::VPrefixed),
            Component::new(
                "nginx",
                "library/nginx",
                r"^[0-9]+\.[0-9]+\.[0-9]+(?:-alpine)?$",
            ),
            Component::new(
                "rabbitmq",
                "library/rabbitmq",
                r"^[0-9]+\.[0-9]+\.[0-9]+-management-alpine$",
            )
            .with_scheme(VersionScheme::SuffixedNumeric),
            Component::new("redis", "library/redis", r"^[0-9]+\.[0-9]+\.[0-9]+$"),
            Component::new("geoserver", "kartoza/geoserver", r"^[0-9]+\.[0-9]+\.[0-9]+$"),
            Component::new(
                "postgresql-postgis",
                "freelabspace/postgresql-postgis",
                r"^[0-9]+\.[0-9]+$",
            )
            .with_exclude(r"^buildcache-.*")
            .with_selection(VersionSelection::Multiple),
        ]
    }

    /// Load configuration from a YAML file. Missing keys take defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            SyncError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: SyncConfig = serde_yaml::from_str(&data).map_err(|e| {
            SyncError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, else the default file if present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(SyncError::ConfigError(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(SyncError::ConfigError(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.architectures.is_empty() {
            return Err(SyncError::ConfigError(
                "at least one architecture is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for component in &self.components {
            if !seen.insert(component.name.as_str()) {
                return Err(SyncError::ConfigError(format!(
                    "duplicate component '{}'",
                    component.name
                )));
            }
            component.tag_filter()?;
        }
        Ok(())
    }

    /// Look up a component by name.
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.data_dir.join("versions")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }

    pub fn pull_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn registry_backoff(&self) -> Duration {
        Duration::from_millis(self.registry_backoff_ms)
    }

    pub fn registry_request_timeout(&self) -> Duration {
        Duration::from_secs(self.registry_request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.timeout_secs, 300);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_secs, 2);
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.architectures, vec!["amd64", "arm64"]);
        assert_eq!(config.components.len(), 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_components_schemes() {
        let config = SyncConfig::default();
        assert_eq!(
            config.component("minio").unwrap().scheme,
            VersionScheme::TimestampRelease
        );
        assert_eq!(
            config.component("nacos").unwrap().scheme,
            VersionScheme::VPrefixed
        );
        assert_eq!(
            config.component("rabbitmq").unwrap().scheme,
            VersionScheme::SuffixedNumeric
        );
        assert_eq!(
            config.component("postgresql-postgis").unwrap().selection,
            VersionSelection::Multiple
        );
        assert!(config.component("missing").is_none());
    }

    #[test]
    fn test_derived_paths() {
        let config = SyncConfig {
            data_dir: PathBuf::from("/srv/offline"),
            ..Default::default()
        };
        assert_eq!(config.versions_dir(), PathBuf::from("/srv/offline/versions"));
        assert_eq!(config.images_dir(), PathBuf::from("/srv/offline/images"));
        assert_eq!(config.reports_dir(), PathBuf::from("/srv/offline/reports"));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = SyncConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::ConfigError(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_components() {
        let mut config = SyncConfig::default();
        config
            .components
            .push(Component::new("redis", "library/redis", r"^\d+$"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate component 'redis'"));
    }

    #[test]
    fn test_validate_rejects_no_architectures() {
        let config = SyncConfig {
            architectures: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_partial_override() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a3s-offline.yaml");
        std::fs::write(
            &path,
            "concurrency: 4\nruntime_binary: podman\narchitectures: [amd64]\n",
        )
        .unwrap();

        let config = SyncConfig::from_file(&path).unwrap();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.runtime_binary, "podman");
        assert_eq!(config.architectures, vec!["amd64"]);
        // Untouched keys keep their defaults
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.components.len(), 8);
    }

    #[test]
    fn test_from_file_replaces_components() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.yaml");
        std::fs::write(
            &path,
            r#"
components:
  - name: redis
    repository: library/redis
    tag_pattern: '^\d+\.\d+\.\d+$'
"#,
        )
        .unwrap();

        let config = SyncConfig::from_file(&path).unwrap();
        assert_eq!(config.components.len(), 1);
        assert_eq!(config.components[0].name, "redis");
    }

    #[test]
    fn test_from_file_missing() {
        let result = SyncConfig::from_file(Path::new("/nonexistent/a3s-offline.yaml"));
        assert!(matches!(result, Err(SyncError::ConfigError(_))));
    }

    #[test]
    fn test_from_file_invalid_pattern() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.yaml");
        std::fs::write(
            &path,
            "components:\n  - name: bad\n    repository: x/bad\n    tag_pattern: '(unclosed'\n",
        )
        .unwrap();
        assert!(SyncConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_durations() {
        let config = SyncConfig::default();
        assert_eq!(config.pull_timeout(), Duration::from_secs(300));
        assert_eq!(config.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.registry_backoff(), Duration::from_millis(1000));
    }
}
