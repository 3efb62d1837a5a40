//! In-memory collaborators for pipeline tests
//!
//! Every double appends to a shared [`Journal`] so tests can assert on the
//! order of calls across collaborators.

use crate::cache::{CacheOutcome, DependencyCache};
use crate::catalog::{Catalog, Dependency};
use crate::error::{StageError, StageResult};
use crate::installer::PackageInstaller;
use crate::stager::Stager;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Ordered record of collaborator calls
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub fn invoker_dependency(version: &str) -> Dependency {
    Dependency {
        name: "node-function-invoker".to_string(),
        version: version.to_string(),
        uri: format!("dependencies/node-function-invoker-{}.tgz", version),
    }
}

/// Stager keeping profile scripts in memory; dirs live under a temp root
pub struct FakeStager {
    build_dir: PathBuf,
    dep_dir: PathBuf,
    deps_idx: String,
    profile: Mutex<Vec<(String, String)>>,
    pub fail_staging_env: bool,
    journal: Journal,
}

impl FakeStager {
    pub fn new(root: &Path, deps_idx: &str, journal: Journal) -> Self {
        let build_dir = root.join("build");
        let dep_dir = root.join("deps").join(deps_idx);
        std::fs::create_dir_all(&build_dir).unwrap();
        std::fs::create_dir_all(&dep_dir).unwrap();
        Self {
            build_dir,
            dep_dir,
            deps_idx: deps_idx.to_string(),
            profile: Mutex::new(Vec::new()),
            fail_staging_env: false,
            journal,
        }
    }

    pub fn profile_scripts(&self) -> Vec<(String, String)> {
        self.profile.lock().unwrap().clone()
    }
}

impl Stager for FakeStager {
    fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    fn dep_dir(&self) -> PathBuf {
        self.dep_dir.clone()
    }

    fn deps_idx(&self) -> &str {
        &self.deps_idx
    }

    fn write_profile_d(&self, name: &str, contents: &str) -> StageResult<()> {
        self.journal.record(format!("stager.profile_d {}", name));
        let mut profile = self.profile.lock().unwrap();
        profile.retain(|(existing, _)| existing != name);
        profile.push((name.to_string(), contents.to_string()));
        Ok(())
    }

    fn write_env_file(&self, name: &str, _value: &str) -> StageResult<()> {
        self.journal.record(format!("stager.env_file {}", name));
        Ok(())
    }

    fn set_staging_environment(&self) -> StageResult<()> {
        if self.fail_staging_env {
            return Err(StageError::User("deps dir unreadable".to_string()));
        }
        self.journal.record("stager.staging_env");
        Ok(())
    }
}

/// Catalog whose installs write a fixed set of files
pub struct FakeCatalog {
    dependencies: Vec<Dependency>,
    files: Vec<(&'static str, &'static str)>,
    journal: Journal,
}

impl FakeCatalog {
    pub fn new(
        dependencies: Vec<Dependency>,
        files: Vec<(&'static str, &'static str)>,
        journal: Journal,
    ) -> Self {
        Self {
            dependencies,
            files,
            journal,
        }
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    fn all_versions(&self, name: &str) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|d| d.name == name)
            .map(|d| d.version.clone())
            .collect()
    }

    fn default_version(&self, name: &str) -> StageResult<Dependency> {
        self.dependencies
            .iter()
            .find(|d| d.name == name)
            .cloned()
            .ok_or_else(|| StageError::DependencyNotFound(name.to_string()))
    }

    async fn install_dependency(&self, dep: &Dependency, dir: &Path) -> StageResult<()> {
        self.journal.record(format!("catalog.install {}", dep));
        std::fs::create_dir_all(dir).unwrap();
        for (relative, contents) in &self.files {
            let path = dir.join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }
        Ok(())
    }
}

/// Installer that records which operation ran
pub struct FakeInstaller {
    failure: Option<String>,
    journal: Journal,
}

impl FakeInstaller {
    pub fn new(journal: Journal) -> Self {
        Self {
            failure: None,
            journal,
        }
    }

    pub fn failing(journal: Journal, output: &str) -> Self {
        Self {
            failure: Some(output.to_string()),
            journal,
        }
    }

    fn finish(&self, command: &str) -> StageResult<()> {
        match &self.failure {
            Some(output) => Err(StageError::InstallerFailed {
                command: command.to_string(),
                code: 1,
                output: output.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PackageInstaller for FakeInstaller {
    async fn build(&self) -> StageResult<()> {
        self.journal.record("installer.build");
        self.finish("npm install")
    }

    async fn rebuild(&self) -> StageResult<()> {
        self.journal.record("installer.rebuild");
        self.finish("npm rebuild")
    }
}

/// Cache returning a fixed restore outcome and recording saves
pub struct FakeCache {
    outcome: CacheOutcome,
    saved: Mutex<Vec<String>>,
    pub fail_save: bool,
    journal: Journal,
}

impl FakeCache {
    pub fn new(outcome: CacheOutcome, journal: Journal) -> Self {
        Self {
            outcome,
            saved: Mutex::new(Vec::new()),
            fail_save: false,
            journal,
        }
    }

    /// Runtime versions passed to each save
    pub fn saved(&self) -> Vec<String> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl DependencyCache for FakeCache {
    async fn initialize(&self) -> StageResult<()> {
        self.journal.record("cache.initialize");
        Ok(())
    }

    async fn restore(&self, _runtime: &Dependency) -> StageResult<CacheOutcome> {
        self.journal.record("cache.restore");
        Ok(self.outcome.clone())
    }

    async fn save(&self, runtime: &Dependency) -> StageResult<()> {
        if self.fail_save {
            return Err(StageError::io(
                "writing cache entry",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            ));
        }
        self.journal
            .record(format!("cache.save {}", runtime.version));
        self.saved.lock().unwrap().push(runtime.version.clone());
        Ok(())
    }
}
