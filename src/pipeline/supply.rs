//! Supply stage: invoker install, default environment, dependency build

use super::{begin_step, default_env_script, step_failed};
use crate::cache::DependencyCache;
use crate::catalog::{Catalog, Dependency};
use crate::config::schema::InvokerConfig;
use crate::diagnostics::DiagnosticLog;
use crate::error::{StageError, StageResult};
use crate::installer::PackageInstaller;
use crate::stager::Stager;
use crate::tree;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Runs the supply stage against its collaborators
pub struct Supplier<'a> {
    pub stager: &'a dyn Stager,
    pub catalog: &'a dyn Catalog,
    pub installer: &'a dyn PackageInstaller,
    pub cache: &'a dyn DependencyCache,
    pub log: &'a DiagnosticLog,
    pub invoker: &'a InvokerConfig,
    /// Set by a cache hit; selects rebuild over a cold install
    pub rebuild: bool,
}

impl<'a> Supplier<'a> {
    /// Run every step in order, stopping at the first failure
    pub async fn run(&mut self) -> StageResult<()> {
        let result = self.run_steps().await;
        let synced = self.log.sync();
        result?;
        synced
    }

    async fn run_steps(&mut self) -> StageResult<()> {
        begin_step("Installing invoker");
        let runtime = self
            .install_invoker()
            .await
            .map_err(|e| step_failed("install invoker", e))?;

        self.create_default_env()
            .map_err(|e| step_failed("setup default environment", e))?;

        self.stager
            .set_staging_environment()
            .map_err(|e| step_failed("setup environment variables", e))?;

        self.cache
            .initialize()
            .await
            .map_err(|e| step_failed("initialize cache", e))?;

        let outcome = self
            .cache
            .restore(&runtime)
            .await
            .map_err(|e| step_failed("restore cache", e))?;
        self.rebuild = outcome.is_hit();

        self.build_dependencies()
            .await
            .map_err(|e| step_failed("build dependencies", e))?;

        self.cache
            .save(&runtime)
            .await
            .map_err(|e| step_failed("save cache", e))
    }

    /// Install the default invoker version into `<dep_dir>/<install_dir>`
    pub async fn install_invoker(&self) -> StageResult<Dependency> {
        let dep = self.catalog.default_version(&self.invoker.dependency)?;
        info!("Installing {}", dep);

        let dep_dir = self.stager.dep_dir();
        let staging = dep_dir.join(format!(".invoker-staging-{}", Uuid::new_v4()));
        let dest = dep_dir.join(&self.invoker.install_dir);

        let result = self.install_into(&dep, &staging, &dest).await;
        if let Err(e) = tree::remove_if_exists(&staging).await {
            warn!("Failed to remove {}: {}", staging.display(), e);
        }
        result.map(|()| dep)
    }

    async fn install_into(&self, dep: &Dependency, staging: &Path, dest: &Path) -> StageResult<()> {
        self.catalog.install_dependency(dep, staging).await?;

        let entries = top_level_entries(staging).await?;
        let Some(first) = entries.first() else {
            return Err(StageError::MissingArtifact {
                name: self.invoker.install_dir.clone(),
            });
        };
        if entries.len() > 1 {
            warn!(
                "{} extracted {} top-level entries, using {}",
                dep,
                entries.len(),
                first.display()
            );
        }

        tree::remove_if_exists(dest)
            .await
            .map_err(|e| StageError::io(format!("removing previous {}", dest.display()), e))?;
        fs::rename(first, dest).await.map_err(|e| {
            StageError::io(
                format!("moving {} to {}", first.display(), dest.display()),
                e,
            )
        })?;
        debug!("Installed invoker at {}", dest.display());
        Ok(())
    }

    /// Write the profile.d script exporting the invoker defaults
    pub fn create_default_env(&self) -> StageResult<()> {
        let script = default_env_script(self.invoker, self.stager.deps_idx());
        self.stager
            .write_profile_d(&self.invoker.profile_script, &script)
    }

    /// Cold install, or rebuild over a restored tree
    pub async fn build_dependencies(&self) -> StageResult<()> {
        begin_step("Building dependencies");

        if self.rebuild {
            info!("Prebuild detected (dependencies restored from cache)");
            self.installer.rebuild().await
        } else {
            self.installer.build().await
        }
    }
}

/// Visible top-level entries of a directory, sorted by name
async fn top_level_entries(dir: &Path) -> StageResult<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| StageError::io(format!("reading {}", dir.display()), e))?;

    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StageError::io(format!("reading {}", dir.display()), e))?
    {
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        found.push(entry.path());
    }
    found.sort();
    Ok(found)
}
