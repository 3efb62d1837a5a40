//! Filesystem-backed dependency cache
//!
//! Layout under the build's cache directory:
//!
//! ```text
//! <cache-dir>/<name>/current                 name of the live entry dir
//! <cache-dir>/<name>/entry-<uuid>/entry.json fingerprint + snapshot stats
//! <cache-dir>/<name>/entry-<uuid>/snapshot/  copy of the install tree
//! ```
//!
//! Save builds a complete `entry-*` directory, then replaces the `current`
//! pointer with a single rename. Readers see either the old entry or the new
//! one. Entry directories no pointer names are swept by `initialize`.
//!
//! Restore copies the snapshot into a hidden sibling of the install dir and
//! only swaps it in once the copy is complete, so a miss leaves the project
//! as it was.

use super::fingerprint::{self, Fingerprint};
use super::{CacheOutcome, DependencyCache, MissReason};
use crate::catalog::Dependency;
use crate::error::{StageError, StageResult};
use crate::tree::{self, CopyError, TreeStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

const POINTER_FILE: &str = "current";
const POINTER_TMP_PREFIX: &str = ".current-";
const ENTRY_PREFIX: &str = "entry-";
const ENTRY_FILE: &str = "entry.json";
const SNAPSHOT_DIR: &str = "snapshot";

/// Persisted cache entry metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Fingerprint of the declarations the snapshot was built from
    pub fingerprint: Fingerprint,
    /// Runtime component version at save time
    pub runtime_version: String,
    /// When the entry was saved
    pub created_at: DateTime<Utc>,
    /// Files in the snapshot
    pub files: u64,
    /// Bytes in the snapshot
    pub bytes: u64,
}

impl CacheEntry {
    fn stats(&self) -> TreeStats {
        TreeStats {
            files: self.files,
            bytes: self.bytes,
        }
    }
}

/// Dependency cache stored under the build's cache directory
#[derive(Debug, Clone)]
pub struct FsCache {
    root: PathBuf,
    project_dir: PathBuf,
    modules_dir: String,
}

impl FsCache {
    /// Create a cache rooted at `<cache_dir>/<name>` for a project
    pub fn new(cache_dir: &Path, name: &str, project_dir: PathBuf, modules_dir: &str) -> Self {
        Self {
            root: cache_dir.join(name),
            project_dir,
            modules_dir: modules_dir.to_string(),
        }
    }

    /// Storage root
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn install_dir(&self) -> PathBuf {
        self.project_dir.join(&self.modules_dir)
    }

    /// Name of the entry directory the pointer names
    async fn live_name(&self) -> Result<Option<String>, String> {
        let path = self.root.join(POINTER_FILE);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("reading {}: {}", path.display(), e)),
        };

        let name = content.trim();
        if !name.starts_with(ENTRY_PREFIX) || name.contains('/') || name.contains('\\') {
            return Err(format!("{} names an invalid entry {:?}", path.display(), name));
        }
        Ok(Some(name.to_string()))
    }

    /// Directory of the live entry
    ///
    /// `Ok(None)` when nothing has been saved; `Err` carries the reason the
    /// pointer could not be read.
    pub async fn live_dir(&self) -> Result<Option<PathBuf>, String> {
        Ok(self.live_name().await?.map(|name| self.root.join(name)))
    }

    async fn load_live(&self) -> Result<Option<(PathBuf, CacheEntry)>, String> {
        let Some(dir) = self.live_dir().await? else {
            return Ok(None);
        };
        let path = dir.join(ENTRY_FILE);
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| format!("reading {}: {}", path.display(), e))?;
        let entry = serde_json::from_str(&content)
            .map_err(|e| format!("parsing {}: {}", path.display(), e))?;
        Ok(Some((dir, entry)))
    }

    /// Read the stored entry
    ///
    /// `Ok(None)` when nothing has been saved; `Err` carries the reason an
    /// existing entry could not be read.
    pub async fn entry(&self) -> Result<Option<CacheEntry>, String> {
        Ok(self.load_live().await?.map(|(_, entry)| entry))
    }

    /// Remove the stored entry and any leftovers
    pub async fn clear(&self) -> StageResult<()> {
        tree::remove_if_exists(&self.root)
            .await
            .map_err(|e| StageError::io(format!("removing cache {}", self.root.display()), e))
    }

    /// Remove entries no pointer names and half-written pointer files
    async fn sweep_leftovers(&self) -> StageResult<()> {
        let live = self.live_name().await.ok().flatten();
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| StageError::io(format!("reading cache {}", self.root.display()), e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StageError::io("reading cache entry", e))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            let orphaned = name.starts_with(ENTRY_PREFIX) && live.as_deref() != Some(name.as_str());
            if orphaned || name.starts_with(POINTER_TMP_PREFIX) {
                debug!("Removing leftover cache item {}", name);
                tree::remove_if_exists(&entry.path())
                    .await
                    .map_err(|e| StageError::io(format!("removing {}", entry.path().display()), e))?;
            }
        }

        self.sweep_restore_leftovers().await;
        Ok(())
    }

    /// Remove restore staging dirs an interrupted run left in the project
    async fn sweep_restore_leftovers(&self) {
        let install_dir = self.install_dir();
        let (parent, prefix) = restore_staging_parts(&install_dir);
        let Ok(mut entries) = fs::read_dir(&parent).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                discard(&entry.path()).await;
            }
        }
    }

    /// Check the snapshot still matches what the entry recorded
    async fn verify_snapshot(&self, dir: &Path, entry: &CacheEntry) -> Result<PathBuf, MissReason> {
        let snapshot = dir.join(SNAPSHOT_DIR);
        let stats = tree::tree_stats(&snapshot)
            .await
            .map_err(|e| MissReason::Corrupt(format!("reading snapshot: {}", e)))?;

        if stats != entry.stats() {
            return Err(MissReason::Corrupt(format!(
                "snapshot has {} files ({} bytes), entry recorded {} files ({} bytes)",
                stats.files, stats.bytes, entry.files, entry.bytes
            )));
        }
        Ok(snapshot)
    }

    /// Copy the snapshot beside the install dir, then swap it in
    async fn restore_snapshot(&self, snapshot: &Path) -> StageResult<CacheOutcome> {
        let install_dir = self.install_dir();
        let (parent, prefix) = restore_staging_parts(&install_dir);
        let staging = parent.join(format!("{}{}", prefix, Uuid::new_v4()));

        let stats = match tree::copy_tree(snapshot, &staging).await {
            Ok(stats) => stats,
            Err(CopyError::Source { path, source }) => {
                discard(&staging).await;
                return Ok(miss(MissReason::Corrupt(format!(
                    "reading {}: {}",
                    path.display(),
                    source
                ))));
            }
            Err(CopyError::Destination { path, source }) => {
                discard(&staging).await;
                return Err(StageError::io(
                    format!("restoring dependencies into {}", path.display()),
                    source,
                ));
            }
        };

        if let Err(e) = tree::remove_if_exists(&install_dir).await {
            discard(&staging).await;
            return Err(StageError::io(format!("clearing {}", install_dir.display()), e));
        }
        if let Err(e) = fs::rename(&staging, &install_dir).await {
            discard(&staging).await;
            return Err(StageError::io(
                format!("moving restored dependencies to {}", install_dir.display()),
                e,
            ));
        }

        info!(
            "Restored {} cached files into {}",
            stats.files,
            install_dir.display()
        );
        Ok(CacheOutcome::Hit { files: stats.files })
    }

    /// Build a complete entry in `dir`
    async fn stage_entry(&self, dir: &Path, runtime: &Dependency) -> StageResult<CacheEntry> {
        let fingerprint = fingerprint::compute(&self.project_dir, &runtime.version).await?;
        let snapshot = dir.join(SNAPSHOT_DIR);
        let install_dir = self.install_dir();

        let stats = if install_dir.is_dir() {
            tree::copy_tree(&install_dir, &snapshot)
                .await
                .map_err(|e| copy_to_io("saving dependency snapshot", e))?
        } else {
            debug!("No {} to cache, saving empty snapshot", install_dir.display());
            fs::create_dir_all(&snapshot)
                .await
                .map_err(|e| StageError::io(format!("creating {}", snapshot.display()), e))?;
            TreeStats::default()
        };

        let entry = CacheEntry {
            fingerprint,
            runtime_version: runtime.version.clone(),
            created_at: Utc::now(),
            files: stats.files,
            bytes: stats.bytes,
        };
        let path = dir.join(ENTRY_FILE);
        fs::write(&path, serde_json::to_string_pretty(&entry)?)
            .await
            .map_err(|e| StageError::io(format!("writing {}", path.display()), e))?;
        Ok(entry)
    }

    /// Point `current` at `name`; returns the entry it named before
    async fn commit(&self, name: &str) -> StageResult<Option<String>> {
        let previous = self.live_name().await.ok().flatten();
        let tmp = self
            .root
            .join(format!("{}{}", POINTER_TMP_PREFIX, Uuid::new_v4()));

        fs::write(&tmp, name)
            .await
            .map_err(|e| StageError::io(format!("writing {}", tmp.display()), e))?;
        if let Err(e) = fs::rename(&tmp, self.root.join(POINTER_FILE)).await {
            discard(&tmp).await;
            return Err(StageError::io("committing cache entry", e));
        }
        Ok(previous)
    }
}

/// Parent dir and name prefix of restore staging dirs for `install_dir`
fn restore_staging_parts(install_dir: &Path) -> (PathBuf, String) {
    let parent = install_dir
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let name = install_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    (parent, format!(".{}-restore-", name))
}

async fn discard(path: &Path) {
    if let Err(e) = tree::remove_if_exists(path).await {
        warn!("Failed to remove {}: {}", path.display(), e);
    }
}

fn copy_to_io(context: &str, err: CopyError) -> StageError {
    match err {
        CopyError::Source { path, source } | CopyError::Destination { path, source } => {
            StageError::io(format!("{} ({})", context, path.display()), source)
        }
    }
}

#[async_trait]
impl DependencyCache for FsCache {
    async fn initialize(&self) -> StageResult<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StageError::io(format!("creating cache {}", self.root.display()), e))?;

        let marker = self.root.join(format!(".write-check-{}", Uuid::new_v4()));
        fs::write(&marker, b"")
            .await
            .map_err(|e| StageError::io(format!("cache {} is not writable", self.root.display()), e))?;
        fs::remove_file(&marker)
            .await
            .map_err(|e| StageError::io(format!("removing {}", marker.display()), e))?;

        self.sweep_leftovers().await
    }

    async fn restore(&self, runtime: &Dependency) -> StageResult<CacheOutcome> {
        let current = fingerprint::compute(&self.project_dir, &runtime.version).await?;

        let (dir, entry) = match self.load_live().await {
            Ok(Some(live)) => live,
            Ok(None) => return Ok(miss(MissReason::NoEntry)),
            Err(reason) => return Ok(miss(MissReason::Corrupt(reason))),
        };
        if entry.fingerprint != current {
            debug!(
                "Cached fingerprint {} != current {}",
                entry.fingerprint.short(),
                current.short()
            );
            return Ok(miss(MissReason::FingerprintMismatch));
        }

        match self.verify_snapshot(&dir, &entry).await {
            Ok(snapshot) => self.restore_snapshot(&snapshot).await,
            Err(reason) => Ok(miss(reason)),
        }
    }

    async fn save(&self, runtime: &Dependency) -> StageResult<()> {
        let name = format!("{}{}", ENTRY_PREFIX, Uuid::new_v4());
        let dir = self.root.join(&name);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StageError::io(format!("creating {}", dir.display()), e))?;

        let result = match self.stage_entry(&dir, runtime).await {
            Ok(entry) => self.commit(&name).await.map(|previous| (entry, previous)),
            Err(e) => Err(e),
        };

        match result {
            Ok((entry, previous)) => {
                if let Some(previous) = previous.filter(|p| *p != name) {
                    discard(&self.root.join(previous)).await;
                }
                info!(
                    "Saved {} dependency files to cache (fingerprint {})",
                    entry.files,
                    entry.fingerprint.short()
                );
                Ok(())
            }
            Err(e) => {
                discard(&dir).await;
                Err(e)
            }
        }
    }
}

fn miss(reason: MissReason) -> CacheOutcome {
    match &reason {
        MissReason::Corrupt(_) => warn!("Cache miss ({}), falling back to a full install", reason),
        _ => info!("Cache miss ({}), running a full install", reason),
    }
    CacheOutcome::Miss(reason)
}
