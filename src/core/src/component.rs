//! Component definitions: one configured image family per component.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Default registry host when none is configured.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// How many tags a component tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSelection {
    /// Only the single latest tag.
    #[default]
    Single,
    /// The latest tag of every major version group.
    Multiple,
}

/// Tag naming scheme, used to pick the sort key for single selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionScheme {
    /// `8.16.0`
    #[default]
    Numeric,
    /// `RELEASE.2024-12-18T13-15-44Z`
    TimestampRelease,
    /// `v2.4.3`
    VPrefixed,
    /// `4.0.5-management-alpine`
    SuffixedNumeric,
}

impl fmt::Display for VersionSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Multiple => write!(f, "multiple"),
        }
    }
}

impl fmt::Display for VersionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric => write!(f, "numeric"),
            Self::TimestampRelease => write!(f, "timestamp-release"),
            Self::VPrefixed => write!(f, "v-prefixed"),
            Self::SuffixedNumeric => write!(f, "suffixed-numeric"),
        }
    }
}

fn default_registry() -> String {
    DEFAULT_REGISTRY.to_string()
}

/// A configured image family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    /// Unique component name (e.g., "redis")
    pub name: String,
    /// Registry host (e.g., "docker.io")
    #[serde(default = "default_registry")]
    pub registry: String,
    /// Repository path without registry host (e.g., "library/redis")
    pub repository: String,
    /// Tags must match this pattern
    pub tag_pattern: String,
    /// Tags matching this pattern are rejected
    #[serde(default)]
    pub exclude_pattern: Option<String>,
    #[serde(default)]
    pub selection: VersionSelection,
    #[serde(default)]
    pub scheme: VersionScheme,
}

impl Component {
    /// Create a single-selection numeric component on the default registry.
    pub fn new(
        name: impl Into<String>,
        repository: impl Into<String>,
        tag_pattern: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            registry: default_registry(),
            repository: repository.into(),
            tag_pattern: tag_pattern.into(),
            exclude_pattern: None,
            selection: VersionSelection::Single,
            scheme: VersionScheme::Numeric,
        }
    }

    pub fn with_exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_pattern = Some(pattern.into());
        self
    }

    pub fn with_selection(mut self, selection: VersionSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_scheme(mut self, scheme: VersionScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Full image name with registry host (e.g., "docker.io/library/redis").
    pub fn image(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// Full image reference for a version (e.g., "docker.io/library/redis:7.4.0").
    pub fn reference(&self, version: &str) -> String {
        format!("{}:{}", self.image(), version)
    }

    /// Last path segment of the repository (e.g., "redis", "nacos-server").
    pub fn image_name(&self) -> &str {
        self.repository
            .rsplit('/')
            .next()
            .unwrap_or(&self.repository)
    }

    /// Compile the include/exclude patterns.
    pub fn tag_filter(&self) -> Result<TagFilter> {
        let include = compile(&self.name, &self.tag_pattern)?;
        let exclude = self
            .exclude_pattern
            .as_deref()
            .map(|p| compile(&self.name, p))
            .transpose()?;
        Ok(TagFilter { include, exclude })
    }
}

fn compile(component: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| {
        SyncError::ConfigError(format!(
            "Invalid tag pattern '{}' for component '{}': {}",
            pattern, component, e
        ))
    })
}

/// Compiled tag predicate of a component.
#[derive(Debug, Clone)]
pub struct TagFilter {
    include: Regex,
    exclude: Option<Regex>,
}

impl TagFilter {
    /// Whether a tag matches the include pattern and not the exclude pattern.
    pub fn accepts(&self, tag: &str) -> bool {
        if !self.include.is_match(tag) {
            return false;
        }
        !self.exclude.as_ref().is_some_and(|re| re.is_match(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_image_and_reference() {
        let c = Component::new("redis", "library/redis", r"^\d+\.\d+\.\d+$");
        assert_eq!(c.image(), "docker.io/library/redis");
        assert_eq!(c.reference("7.4.0"), "docker.io/library/redis:7.4.0");
        assert_eq!(c.image_name(), "redis");
    }

    #[test]
    fn test_image_name_nested_repository() {
        let c = Component::new("nacos", "nacos/nacos-server", r"^v\d+\.\d+\.\d+$");
        assert_eq!(c.image_name(), "nacos-server");
    }

    #[test]
    fn test_tag_filter_include_only() {
        let c = Component::new("redis", "library/redis", r"^\d+\.\d+\.\d+$");
        let filter = c.tag_filter().unwrap();
        assert!(filter.accepts("7.4.0"));
        assert!(!filter.accepts("7.4.0-alpine"));
        assert!(!filter.accepts("latest"));
    }

    #[test]
    fn test_tag_filter_exclude() {
        let c = Component::new("pg", "freelabspace/postgresql-postgis", r"^\d+\.\d+$")
            .with_exclude(r"^buildcache-.*");
        let filter = c.tag_filter().unwrap();
        assert!(filter.accepts("16.4"));
        assert!(!filter.accepts("buildcache-x"));
    }

    #[test]
    fn test_tag_filter_invalid_pattern() {
        let c = Component::new("bad", "library/bad", r"^(unclosed");
        let err = c.tag_filter().unwrap_err();
        assert!(matches!(err, SyncError::ConfigError(_)));
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_component_yaml_defaults() {
        let yaml = r#"
name: redis
repository: library/redis
tag_pattern: '^\d+\.\d+\.\d+$'
"#;
        let c: Component = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(c.registry, "docker.io");
        assert_eq!(c.selection, VersionSelection::Single);
        assert_eq!(c.scheme, VersionScheme::Numeric);
        assert!(c.exclude_pattern.is_none());
    }

    #[test]
    fn test_component_yaml_enums() {
        let yaml = r#"
name: minio
repository: minio/minio
tag_pattern: '^RELEASE\.'
selection: multiple
scheme: timestamp_release
"#;
        let c: Component = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(c.selection, VersionSelection::Multiple);
        assert_eq!(c.scheme, VersionScheme::TimestampRelease);
    }

    #[test]
    fn test_display() {
        assert_eq!(VersionSelection::Multiple.to_string(), "multiple");
        assert_eq!(VersionScheme::SuffixedNumeric.to_string(), "suffixed-numeric");
    }
}
