//! Tag normalization into a totally ordered version key.
//!
//! Registry tags follow several naming schemes (`8.16.0`, `v2.4.3`,
//! `RELEASE.2024-12-18T13-15-44Z`, `4.0.5-management-alpine`). [`normalize`]
//! maps all of them onto a fixed three-component integer key so tags sharing
//! a scheme can be compared with plain tuple ordering. Malformed input never
//! fails; it degrades to `(0, 0, 0)`.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Prefix of timestamp-release tags (MinIO style).
const RELEASE_PREFIX: &str = "RELEASE.";

/// Comparable key for a tag: `(major, minor, patch)` or `(year, month, day)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct VersionKey(pub u64, pub u64, pub u64);

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.0, self.1, self.2)
    }
}

fn release_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d{4})-(\d{2})-(\d{2})").expect("release date pattern is valid")
    })
}

/// Normalize a tag string into a [`VersionKey`].
pub fn normalize(tag: &str) -> VersionKey {
    if tag.is_empty() {
        return VersionKey::default();
    }

    if tag.starts_with(RELEASE_PREFIX) {
        if let Some(caps) = release_date_pattern().captures(tag) {
            let part = |i: usize| caps[i].parse::<u64>().unwrap_or(0);
            return VersionKey(part(1), part(2), part(3));
        }
    }

    let stripped = tag.strip_prefix('v').unwrap_or(tag);
    let numeric = stripped.split('-').next().unwrap_or("");

    let mut parts = numeric
        .split('.')
        .map(|segment| segment.parse::<u64>().unwrap_or(0))
        .chain(std::iter::repeat(0));

    VersionKey(
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

/// Major version group of a tag: the first dot segment after a leading `v`.
///
/// `13.21` → `13`, `v2.4.3` → `2`. Empty input yields an empty group.
pub fn major_version(tag: &str) -> &str {
    let stripped = tag.strip_prefix('v').unwrap_or(tag);
    stripped.split('.').next().unwrap_or("")
}
