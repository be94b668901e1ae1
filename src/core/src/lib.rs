//! a3s-offline Core - Foundational Types
//!
//! Configuration, component definitions, tag version ordering and the
//! shared error type used across the a3s-offline workspace.

pub mod component;
pub mod config;
pub mod error;
pub mod version;

// Re-export commonly used types
pub use component::{Component, TagFilter, VersionScheme, VersionSelection, DEFAULT_REGISTRY};
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use version::{major_version, normalize, VersionKey};

/// a3s-offline version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
