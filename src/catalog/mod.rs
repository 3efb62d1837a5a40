//! Dependency catalog
//!
//! Resolves logical dependency names to pinned versions and installs them.
//! The production catalog reads the buildpack's `manifest.toml`.

mod manifest;

pub use manifest::{BuildpackManifest, DefaultVersion, MANIFEST_FILE};

use crate::error::StageResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A dependency resolved from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Logical name (e.g. `node-function-invoker`)
    pub name: String,
    /// Pinned version
    pub version: String,
    /// Source location
    pub uri: String,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// Catalog of installable dependencies
#[async_trait]
pub trait Catalog: Send + Sync {
    /// All known versions of a dependency, ascending
    fn all_versions(&self, name: &str) -> Vec<String>;

    /// Resolve the pinned default version of a dependency
    fn default_version(&self, name: &str) -> StageResult<Dependency>;

    /// Install a dependency's contents into `dir`
    async fn install_dependency(&self, dep: &Dependency, dir: &Path) -> StageResult<()>;
}
