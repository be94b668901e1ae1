//! Image reference parsing.
//!
//! Parses snapshot entries like `library/redis:7.4.0` or legacy
//! `docker.io/library/redis:7.2.0` into registry, repository and tag.

use a3s_offline_core::error::{Result, SyncError};
use a3s_offline_core::DEFAULT_REGISTRY;

/// Parsed image reference. Snapshot entries always carry a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname (e.g., "docker.io", "ghcr.io")
    pub registry: String,
    /// Repository path (e.g., "library/redis", "minio/minio")
    pub repository: String,
    /// Tag (e.g., "7.4.0", "RELEASE.2024-12-18T13-15-44Z")
    pub tag: String,
}

impl ImageReference {
    /// Parse a `[registry/]repository:tag` string.
    ///
    /// - `redis:7.4.0` → docker.io, library/redis, 7.4.0
    /// - `minio/minio:RELEASE.2024-12-18T13-15-44Z` → docker.io, minio/minio
    /// - `docker.io/library/redis:7.2.0` → docker.io, library/redis, 7.2.0
    /// - `localhost:5000/app:1.0` → localhost:5000, app, 1.0
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(SyncError::ReferenceError(
                "Empty image reference".to_string(),
            ));
        }
        if reference.contains('@') {
            return Err(SyncError::ReferenceError(format!(
                "Digest references are not tracked: '{}'",
                reference
            )));
        }

        // The tag colon is the last one after the last slash
        let tag_start = reference.rfind('/').map(|p| p + 1).unwrap_or(0);
        let (name, tag) = match reference[tag_start..].rfind(':') {
            Some(colon) => {
                let split = tag_start + colon;
                (&reference[..split], &reference[split + 1..])
            }
            None => {
                return Err(SyncError::ReferenceError(format!(
                    "Missing tag in reference '{}'",
                    reference
                )))
            }
        };

        if name.is_empty() || tag.is_empty() {
            return Err(SyncError::ReferenceError(format!(
                "Invalid image reference '{}'",
                reference
            )));
        }

        let (registry, repository) = split_registry_repository(name);
        Ok(Self {
            registry,
            repository,
            tag: tag.to_string(),
        })
    }

    /// Full reference string including registry.
    pub fn full_reference(&self) -> String {
        format!("{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

/// Split a name into registry and repository.
///
/// The first segment is a registry when it contains a `.` or `:` or is
/// `localhost`. Single-segment names live under `library/`.
fn split_registry_repository(name: &str) -> (String, String) {
    if let Some((first, rest)) = name.split_once('/') {
        if first.contains('.') || first.contains(':') || first == "localhost" {
            let repository = if rest.contains('/') {
                rest.to_string()
            } else if first == DEFAULT_REGISTRY {
                format!("library/{}", rest)
            } else {
                rest.to_string()
            };
            return (first.to_string(), repository);
        }
        return (DEFAULT_REGISTRY.to_string(), name.to_string());
    }
    (DEFAULT_REGISTRY.to_string(), format!("library/{}", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_name() {
        let r = ImageReference::parse("redis:7.4.0").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "library/redis");
        assert_eq!(r.tag, "7.4.0");
    }

    #[test]
    fn test_parse_namespaced() {
        let r = ImageReference::parse("minio/minio:RELEASE.2024-12-18T13-15-44Z").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "minio/minio");
        assert_eq!(r.tag, "RELEASE.2024-12-18T13-15-44Z");
    }

    #[test]
    fn test_parse_strips_registry_host() {
        let r = ImageReference::parse("docker.io/library/redis:7.2.0").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "library/redis");
        assert_eq!(r.tag, "7.2.0");
    }

    #[test]
    fn test_parse_docker_io_single_segment() {
        let r = ImageReference::parse("docker.io/nginx:1.27.3").unwrap();
        assert_eq!(r.repository, "library/nginx");
    }

    #[test]
    fn test_parse_registry_with_port() {
        let r = ImageReference::parse("localhost:5000/app:1.0").unwrap();
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.repository, "app");
        assert_eq!(r.tag, "1.0");
    }

    #[test]
    fn test_parse_ghcr() {
        let r = ImageReference::parse("ghcr.io/org/image:v2.4.3").unwrap();
        assert_eq!(r.registry, "ghcr.io");
        assert_eq!(r.repository, "org/image");
        assert_eq!(r.full_reference(), "ghcr.io/org/image:v2.4.3");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let r = ImageReference::parse("  library/redis:7.4.0 \n").unwrap();
        assert_eq!(r.repository, "library/redis");
        assert_eq!(r.tag, "7.4.0");
    }

    #[test]
    fn test_parse_missing_tag() {
        assert!(ImageReference::parse("library/redis").is_err());
        assert!(ImageReference::parse("localhost:5000/app").is_err());
    }

    #[test]
    fn test_parse_empty_parts() {
        assert!(ImageReference::parse("").is_err());
        assert!(ImageReference::parse("library/redis:").is_err());
        assert!(ImageReference::parse(":7.4.0").is_err());
    }

    #[test]
    fn test_parse_rejects_digest() {
        let err = ImageReference::parse("redis@sha256:abc").unwrap_err();
        assert!(matches!(err, SyncError::ReferenceError(_)));
    }

    #[test]
    fn test_display() {
        let r = ImageReference::parse("library/redis:7.4.0").unwrap();
        assert_eq!(r.to_string(), "docker.io/library/redis:7.4.0");
    }
}
