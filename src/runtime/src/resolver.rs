//! Tag resolution: page a repository's tags and pick the version(s) to track.

use std::collections::BTreeMap;
use std::sync::Arc;

use a3s_offline_core::error::Result;
use a3s_offline_core::{
    major_version, normalize, Component, TagFilter, VersionKey, VersionScheme, VersionSelection,
};

use crate::registry::TagSource;

/// Resolves the latest tag(s) of components against a [`TagSource`].
pub struct TagResolver {
    source: Arc<dyn TagSource>,
}

impl TagResolver {
    pub fn new(source: Arc<dyn TagSource>) -> Self {
        Self { source }
    }

    /// Resolve a component to its tag set.
    ///
    /// Single selection yields at most one tag; multiple selection yields one
    /// tag per major group, ascending by major. Upstream failures and empty
    /// matches are logged and yield an empty set.
    pub async fn resolve(&self, component: &Component) -> Vec<String> {
        let filter = match component.tag_filter() {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(component = %component.name, error = %e, "Invalid tag filter");
                return Vec::new();
            }
        };

        let matching = match self.list_matching(component, &filter).await {
            Ok(tags) => tags,
            Err(e) => {
                tracing::error!(
                    component = %component.name,
                    repository = %component.repository,
                    error = %e,
                    "Failed to list tags"
                );
                return Vec::new();
            }
        };

        tracing::debug!(
            component = %component.name,
            matching = matching.len(),
            "Collected matching tags"
        );

        if matching.is_empty() {
            tracing::error!(
                component = %component.name,
                pattern = %component.tag_pattern,
                "No tags match the configured pattern"
            );
            return Vec::new();
        }

        select(component, matching)
    }

    /// Page through the listing and keep every accepted tag, in upstream order.
    async fn list_matching(&self, component: &Component, filter: &TagFilter) -> Result<Vec<String>> {
        let mut matching = Vec::new();
        let mut page = 1;

        loop {
            let listing = self.source.fetch_page(&component.repository, page).await?;
            if listing.results.is_empty() {
                break;
            }

            matching.extend(
                listing
                    .results
                    .into_iter()
                    .map(|entry| entry.name)
                    .filter(|name| filter.accepts(name)),
            );

            if listing.next.is_none() {
                break;
            }
            page += 1;
        }

        Ok(matching)
    }
}

/// Pick the tracked tag(s) from a non-empty list of matching tags.
pub fn select(component: &Component, matching: Vec<String>) -> Vec<String> {
    match component.selection {
        VersionSelection::Multiple => select_per_major(matching),
        VersionSelection::Single => select_latest(component, matching).into_iter().collect(),
    }
}

/// Sort key of a tag under a scheme, `None` when the tag does not follow it.
fn sort_key(scheme: VersionScheme, tag: &str) -> Option<VersionKey> {
    match scheme {
        VersionScheme::Numeric | VersionScheme::TimestampRelease => Some(normalize(tag)),
        VersionScheme::VPrefixed => tag.strip_prefix('v').map(normalize),
        VersionScheme::SuffixedNumeric => tag.split_once('-').map(|(base, _)| normalize(base)),
    }
}

fn select_latest(component: &Component, matching: Vec<String>) -> Option<String> {
    let keys: Option<Vec<VersionKey>> = matching
        .iter()
        .map(|tag| sort_key(component.scheme, tag))
        .collect();

    let Some(keys) = keys else {
        tracing::error!(
            component = %component.name,
            scheme = %component.scheme,
            "Tag does not follow the configured version scheme, falling back to first match"
        );
        return matching.into_iter().next();
    };

    if component.scheme == VersionScheme::TimestampRelease {
        // Ties keep the earliest tag in upstream order
        let mut best: Option<(VersionKey, usize)> = None;
        for (i, key) in keys.iter().enumerate() {
            if best.map_or(true, |(k, _)| *key > k) {
                best = Some((*key, i));
            }
        }
        return best.and_then(|(_, i)| matching.into_iter().nth(i));
    }

    let mut keyed: Vec<(VersionKey, String)> = keys.into_iter().zip(matching).collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.pop().map(|(_, tag)| tag)
}

fn select_per_major(matching: Vec<String>) -> Vec<String> {
    let mut groups: BTreeMap<(u64, String), Vec<String>> = BTreeMap::new();
    for tag in matching {
        let major = major_version(&tag).to_string();
        let order = major.parse::<u64>().unwrap_or(0);
        groups.entry((order, major)).or_default().push(tag);
    }

    groups
        .into_values()
        .filter_map(|mut group| {
            group.sort_by_key(|tag| normalize(tag));
            group.pop()
        })
        .collect()
}
