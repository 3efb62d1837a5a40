//! Buildpack manifest parsing
//!
//! The buildpack ships a `manifest.toml` listing every dependency it can
//! install and which version is the default for each name.

use super::{Catalog, Dependency};
use crate::error::{StageError, StageResult};
use crate::tree::{self, CopyError};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// File name of the catalog inside the buildpack directory
pub const MANIFEST_FILE: &str = "manifest.toml";

/// Per-slot catalog overrides written by earlier buildpacks
pub const OVERRIDE_FILE: &str = "override.toml";

/// Parsed `manifest.toml`
#[derive(Debug, Clone, Deserialize)]
pub struct BuildpackManifest {
    /// Language label recorded in the final config
    #[serde(default)]
    pub language: Option<String>,

    /// Installable dependencies
    #[serde(default)]
    pub dependencies: Vec<Dependency>,

    /// Pinned default versions per name
    #[serde(default)]
    pub default_versions: Vec<DefaultVersion>,

    /// Buildpack root, relative URIs resolve against it
    #[serde(skip)]
    root: PathBuf,
}

/// A `[[default_versions]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultVersion {
    pub name: String,
    pub version: String,
}

/// One language's section of an `override.toml`
#[derive(Debug, Default, Deserialize)]
struct OverrideSection {
    #[serde(default)]
    dependencies: Vec<Dependency>,
    #[serde(default)]
    default_versions: Vec<DefaultVersion>,
}

impl BuildpackManifest {
    /// Load the manifest from a buildpack directory
    pub async fn load(buildpack_dir: &Path) -> StageResult<Self> {
        let path = buildpack_dir.join(MANIFEST_FILE);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| StageError::io(format!("reading catalog {}", path.display()), e))?;

        let mut manifest = Self::parse(&content).map_err(|e| match e {
            StageError::CatalogInvalid { reason, .. } => StageError::CatalogInvalid {
                path: path.clone(),
                reason,
            },
            other => other,
        })?;
        manifest.root = buildpack_dir.to_path_buf();
        debug!(
            "Loaded catalog with {} dependencies from {}",
            manifest.dependencies.len(),
            path.display()
        );
        Ok(manifest)
    }

    /// Parse a manifest from a TOML string
    pub fn parse(content: &str) -> StageResult<Self> {
        toml::from_str(content).map_err(|e| StageError::CatalogInvalid {
            path: MANIFEST_FILE.into(),
            reason: e.to_string(),
        })
    }

    /// Merge the `override.toml` of every deps slot into this catalog
    ///
    /// Only the table keyed by this manifest's language applies. Slots are
    /// visited in name order, so a later slot wins over an earlier one.
    pub async fn apply_overrides(&mut self, deps_dir: &Path) -> StageResult<()> {
        let Some(language) = self.language.clone() else {
            debug!("Catalog has no language, skipping overrides");
            return Ok(());
        };

        let mut slots = Vec::new();
        let mut entries = tokio::fs::read_dir(deps_dir)
            .await
            .map_err(|e| StageError::io(format!("reading {}", deps_dir.display()), e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StageError::io(format!("reading {}", deps_dir.display()), e))?
        {
            let path = entry.path().join(OVERRIDE_FILE);
            if path.is_file() {
                slots.push(path);
            }
        }
        slots.sort();

        for path in slots {
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| StageError::io(format!("reading override {}", path.display()), e))?;
            let invalid = |reason: String| StageError::CatalogInvalid {
                path: path.clone(),
                reason,
            };

            let mut table: toml::Table =
                toml::from_str(&content).map_err(|e| invalid(e.to_string()))?;
            let Some(section) = table.remove(&language) else {
                continue;
            };
            let section: OverrideSection =
                section.try_into().map_err(|e: toml::de::Error| invalid(e.to_string()))?;

            debug!(
                "Applying {} dependency overrides from {}",
                section.dependencies.len(),
                path.display()
            );
            self.merge(section);
        }
        Ok(())
    }

    fn merge(&mut self, section: OverrideSection) {
        for dep in section.dependencies {
            match self
                .dependencies
                .iter_mut()
                .find(|d| d.name == dep.name && d.version == dep.version)
            {
                Some(existing) => *existing = dep,
                None => self.dependencies.push(dep),
            }
        }
        for pin in section.default_versions {
            match self.default_versions.iter_mut().find(|d| d.name == pin.name) {
                Some(existing) => *existing = pin,
                None => self.default_versions.push(pin),
            }
        }
    }

    /// Set the directory relative URIs resolve against
    pub fn with_root(mut self, root: PathBuf) -> Self {
        self.root = root;
        self
    }

    /// Resolve a dependency URI to a local path
    fn source_path(&self, uri: &str) -> PathBuf {
        let raw = uri.strip_prefix("file://").unwrap_or(uri);
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn find(&self, name: &str, version: &str) -> Option<&Dependency> {
        self.dependencies
            .iter()
            .find(|d| d.name == name && d.version == version)
    }
}

/// Ascending semver order; unparseable versions sort last, lexically
fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn is_archive(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    name.ends_with(".tgz") || name.ends_with(".tar.gz") || name.ends_with(".tar")
}

fn copy_error(dep: &Dependency, err: CopyError) -> StageError {
    let (path, source) = match err {
        CopyError::Source { path, source } | CopyError::Destination { path, source } => {
            (path, source)
        }
    };
    StageError::io(format!("installing {} ({})", dep, path.display()), source)
}

async fn extract_archive(archive: &Path, dir: &Path) -> StageResult<()> {
    let flags = if archive.extension().is_some_and(|e| e == "tar") {
        "-xf"
    } else {
        "-xzf"
    };
    let command = format!("tar {} {} -C {}", flags, archive.display(), dir.display());
    debug!("Executing: {}", command);

    let output = Command::new("tar")
        .arg(flags)
        .arg(archive)
        .arg("-C")
        .arg(dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| StageError::command_failed(&command, e))?;

    if !output.status.success() {
        return Err(StageError::io(
            format!("extracting {}", archive.display()),
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ),
        ));
    }
    Ok(())
}

#[async_trait]
impl Catalog for BuildpackManifest {
    fn all_versions(&self, name: &str) -> Vec<String> {
        let mut versions: Vec<String> = self
            .dependencies
            .iter()
            .filter(|d| d.name == name)
            .map(|d| d.version.clone())
            .collect();
        versions.sort_by(|a, b| compare_versions(a, b));
        versions
    }

    fn default_version(&self, name: &str) -> StageResult<Dependency> {
        if let Some(pinned) = self.default_versions.iter().find(|d| d.name == name) {
            return self
                .find(name, &pinned.version)
                .cloned()
                .ok_or_else(|| StageError::DependencyNotFound(format!("{} {}", name, pinned.version)));
        }

        let mut candidates = self.dependencies.iter().filter(|d| d.name == name);
        match (candidates.next(), candidates.next()) {
            (None, _) => Err(StageError::DependencyNotFound(name.to_string())),
            (Some(only), None) => Ok(only.clone()),
            (Some(_), Some(_)) => Err(StageError::NoDefaultVersion {
                name: name.to_string(),
            }),
        }
    }

    async fn install_dependency(&self, dep: &Dependency, dir: &Path) -> StageResult<()> {
        let source = self.source_path(&dep.uri);
        let meta = tokio::fs::metadata(&source)
            .await
            .map_err(|e| StageError::io(format!("locating {} at {}", dep, source.display()), e))?;

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StageError::io(format!("creating {}", dir.display()), e))?;

        if meta.is_dir() {
            let name = source.file_name().unwrap_or(source.as_os_str());
            tree::copy_tree(&source, &dir.join(name))
                .await
                .map_err(|e| copy_error(dep, e))?;
        } else if is_archive(&source) {
            extract_archive(&source, dir).await?;
        } else {
            let name = source.file_name().unwrap_or(source.as_os_str());
            tree::copy_file(&source, &dir.join(name))
                .await
                .map_err(|e| copy_error(dep, e))?;
        }

        debug!("Installed {} into {}", dep, dir.display());
        Ok(())
    }
}
