//! Finalize stage: publish startup scripts

use super::{begin_step, step_failed};
use crate::diagnostics::DiagnosticLog;
use crate::error::{StageError, StageResult};
use crate::stager::Stager;
use crate::tree::{self, CopyError};
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};

/// Copies the buildpack's profile.d scripts into the build slot
pub struct Finalizer<'a> {
    pub stager: &'a dyn Stager,
    /// Buildpack-provided script directory
    pub source_dir: PathBuf,
    pub log: &'a DiagnosticLog,
}

impl<'a> Finalizer<'a> {
    /// Publish scripts, then sync the diagnostic log
    pub async fn run(&self) -> StageResult<()> {
        begin_step("Publishing startup scripts");
        let result = self
            .copy_profile_scripts()
            .await
            .map(|copied| info!("Published {} startup scripts", copied.len()))
            .map_err(|e| step_failed("copy profile.d scripts", e));
        let synced = self.log.sync();
        result?;
        synced
    }

    /// Copy every regular file from the source dir into `<dep_dir>/profile.d`
    ///
    /// Same-named files are overwritten. A failure part-way leaves the files
    /// already copied in place.
    pub async fn copy_profile_scripts(&self) -> StageResult<Vec<PathBuf>> {
        let dest_dir = self.stager.dep_dir().join("profile.d");
        fs::create_dir_all(&dest_dir)
            .await
            .map_err(|e| StageError::io(format!("creating {}", dest_dir.display()), e))?;

        let mut entries = fs::read_dir(&self.source_dir).await.map_err(|e| {
            StageError::io(format!("reading {}", self.source_dir.display()), e)
        })?;

        let mut sources = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StageError::io(format!("reading {}", self.source_dir.display()), e))?
        {
            let path = entry.path();
            let meta = fs::metadata(&path)
                .await
                .map_err(|e| StageError::io(format!("reading {}", path.display()), e))?;
            if meta.is_file() {
                sources.push(path);
            } else {
                debug!("Skipping {} (not a file)", path.display());
            }
        }
        sources.sort();

        let mut copied = Vec::with_capacity(sources.len());
        for source in sources {
            let Some(name) = source.file_name() else {
                continue;
            };
            let dest = dest_dir.join(name);
            tree::copy_file(&source, &dest).await.map_err(|e| match e {
                CopyError::Source { path, source } | CopyError::Destination { path, source } => {
                    StageError::io(format!("copying {}", path.display()), source)
                }
            })?;
            debug!("Copied {} -> {}", source.display(), dest.display());
            copied.push(dest);
        }
        Ok(copied)
    }
}
