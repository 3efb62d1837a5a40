//! Staging directory layout
//!
//! A build owns one slot under the shared deps directory:
//!
//! ```text
//! <deps-dir>/<idx>/            dependency dir for this buildpack
//! <deps-dir>/<idx>/profile.d/  scripts sourced at launch
//! <deps-dir>/<idx>/env/        variables exported to later buildpacks
//! ```

use crate::error::{StageError, StageResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Directory layout and environment helpers used by the stages
pub trait Stager: Send + Sync {
    /// Application (project) directory
    fn build_dir(&self) -> &Path;

    /// Dependency directory owned by this build slot
    fn dep_dir(&self) -> PathBuf;

    /// Build slot index
    fn deps_idx(&self) -> &str;

    /// Write a launch-time script into `<dep_dir>/profile.d/<name>`
    fn write_profile_d(&self, name: &str, contents: &str) -> StageResult<()>;

    /// Write an exported variable into `<dep_dir>/env/<name>`
    fn write_env_file(&self, name: &str, value: &str) -> StageResult<()>;

    /// Apply the environment contributed by every slot to this process
    fn set_staging_environment(&self) -> StageResult<()>;
}

/// Stager over the real filesystem layout handed to the buildpack
#[derive(Debug, Clone)]
pub struct BuildpackStager {
    build_dir: PathBuf,
    cache_dir: PathBuf,
    deps_dir: PathBuf,
    deps_idx: String,
}

/// Contents of the final `config.toml`
#[derive(Debug, Serialize)]
struct SlotConfig<'a> {
    name: &'a str,
    version: &'a str,
    deps_idx: &'a str,
}

/// Search-path variables fed by slot subdirectories
const SEARCH_PATHS: &[(&str, &[&str])] = &[
    ("bin", &["PATH"]),
    ("lib", &["LD_LIBRARY_PATH", "LIBRARY_PATH"]),
    ("include", &["CPATH"]),
    ("pkgconfig", &["PKG_CONFIG_PATH"]),
];

impl BuildpackStager {
    /// Create a stager from the staging arguments
    pub fn new(
        build_dir: PathBuf,
        cache_dir: PathBuf,
        deps_dir: PathBuf,
        deps_idx: impl Into<String>,
    ) -> Self {
        Self {
            build_dir,
            cache_dir,
            deps_dir,
            deps_idx: deps_idx.into(),
        }
    }

    /// Cache directory persisted across builds
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Check the build dir exists and create this slot's dependency dir
    pub async fn validate(&self) -> StageResult<()> {
        if !self.build_dir.is_dir() {
            return Err(StageError::BuildDirMissing(self.build_dir.clone()));
        }
        let dep_dir = self.dep_dir();
        fs::create_dir_all(&dep_dir)
            .await
            .map_err(|e| StageError::io(format!("creating {}", dep_dir.display()), e))
    }

    /// Write `<dep_dir>/config.toml` recording which buildpack owns the slot
    pub async fn write_config(&self, name: &str, version: &str) -> StageResult<()> {
        let config = SlotConfig {
            name,
            version,
            deps_idx: &self.deps_idx,
        };
        let path = self.dep_dir().join("config.toml");
        let content = toml::to_string(&config)?;
        fs::write(&path, content)
            .await
            .map_err(|e| StageError::io(format!("writing {}", path.display()), e))
    }

    /// Compute the staging environment from every slot under the deps dir
    ///
    /// Slots are visited in ascending index order and search paths list
    /// them in that order, so slot 0 comes first.
    pub fn staging_environment(&self) -> StageResult<Vec<(String, String)>> {
        let mut slots: Vec<(u32, PathBuf)> = Vec::new();
        let entries = std::fs::read_dir(&self.deps_dir).map_err(|e| {
            StageError::io(format!("reading deps dir {}", self.deps_dir.display()), e)
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| StageError::io("reading deps dir entry", e))?;
            let index = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok());
            if let Some(index) = index {
                if entry.path().is_dir() {
                    slots.push((index, entry.path()));
                }
            }
        }
        slots.sort();

        let mut search: Vec<(&str, Vec<String>)> = Vec::new();
        let mut exported: Vec<(String, String)> = Vec::new();

        for (_, slot) in &slots {
            for (subdir, vars) in SEARCH_PATHS {
                let dir = slot.join(subdir);
                if !dir.is_dir() {
                    continue;
                }
                for &var in *vars {
                    match search.iter_mut().find(|(name, _)| *name == var) {
                        Some((_, dirs)) => dirs.push(dir.display().to_string()),
                        None => search.push((var, vec![dir.display().to_string()])),
                    }
                }
            }

            let env_dir = slot.join("env");
            if env_dir.is_dir() {
                let mut files: Vec<PathBuf> = std::fs::read_dir(&env_dir)
                    .map_err(|e| StageError::io(format!("reading {}", env_dir.display()), e))?
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|path| path.is_file())
                    .collect();
                files.sort();
                for file in files {
                    let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
                        continue;
                    };
                    let value = std::fs::read_to_string(&file)
                        .map_err(|e| StageError::io(format!("reading {}", file.display()), e))?;
                    exported.retain(|(existing, _)| existing != name);
                    exported.push((name.to_string(), value));
                }
            }
        }

        let mut env: Vec<(String, String)> = Vec::new();
        for (var, mut dirs) in search {
            if let Ok(existing) = std::env::var(var) {
                if !existing.is_empty() {
                    dirs.push(existing);
                }
            }
            env.push((var.to_string(), dirs.join(":")));
        }
        env.extend(exported);
        env.push((
            "DEPS_DIR".to_string(),
            self.deps_dir.display().to_string(),
        ));
        Ok(env)
    }
}

impl Stager for BuildpackStager {
    fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    fn dep_dir(&self) -> PathBuf {
        self.deps_dir.join(&self.deps_idx)
    }

    fn deps_idx(&self) -> &str {
        &self.deps_idx
    }

    fn write_profile_d(&self, name: &str, contents: &str) -> StageResult<()> {
        let dir = self.dep_dir().join("profile.d");
        std::fs::create_dir_all(&dir)
            .map_err(|e| StageError::io(format!("creating {}", dir.display()), e))?;
        let path = dir.join(name);
        std::fs::write(&path, contents)
            .map_err(|e| StageError::io(format!("writing {}", path.display()), e))?;
        debug!("Wrote profile script {}", path.display());
        Ok(())
    }

    fn write_env_file(&self, name: &str, value: &str) -> StageResult<()> {
        let dir = self.dep_dir().join("env");
        std::fs::create_dir_all(&dir)
            .map_err(|e| StageError::io(format!("creating {}", dir.display()), e))?;
        let path = dir.join(name);
        std::fs::write(&path, value)
            .map_err(|e| StageError::io(format!("writing {}", path.display()), e))
    }

    fn set_staging_environment(&self) -> StageResult<()> {
        for (key, value) in self.staging_environment()? {
            debug!("Staging env {}={}", key, value);
            std::env::set_var(&key, &value);
        }
        Ok(())
    }
}
