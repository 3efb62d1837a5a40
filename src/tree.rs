//! Directory tree helpers shared by the cache, catalog and publisher
//!
//! Copies are iterative (explicit work stack) so deep `node_modules` trees
//! don't need recursive async calls. Symlinks are recreated, not followed.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// File count and byte total of a tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    /// Regular files and symlinks
    pub files: u64,
    /// Sum of regular file sizes
    pub bytes: u64,
}

/// Which side of a copy failed
#[derive(Debug)]
pub enum CopyError {
    /// Reading the source tree failed
    Source { path: PathBuf, source: io::Error },
    /// Writing the destination tree failed
    Destination { path: PathBuf, source: io::Error },
}

impl CopyError {
    fn source(path: &Path, source: io::Error) -> Self {
        Self::Source {
            path: path.to_path_buf(),
            source,
        }
    }

    fn destination(path: &Path, source: io::Error) -> Self {
        Self::Destination {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl std::fmt::Display for CopyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source { path, source } => write!(f, "reading {}: {}", path.display(), source),
            Self::Destination { path, source } => {
                write!(f, "writing {}: {}", path.display(), source)
            }
        }
    }
}

/// Copy the tree rooted at `src` to `dst`, creating `dst`
pub async fn copy_tree(src: &Path, dst: &Path) -> Result<TreeStats, CopyError> {
    let mut stats = TreeStats::default();
    let mut stack = vec![(src.to_path_buf(), dst.to_path_buf())];

    fs::create_dir_all(dst)
        .await
        .map_err(|e| CopyError::destination(dst, e))?;

    while let Some((from_dir, to_dir)) = stack.pop() {
        let mut entries = fs::read_dir(&from_dir)
            .await
            .map_err(|e| CopyError::source(&from_dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CopyError::source(&from_dir, e))?
        {
            let from = entry.path();
            let to = to_dir.join(entry.file_name());
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| CopyError::source(&from, e))?;

            if file_type.is_dir() {
                fs::create_dir_all(&to)
                    .await
                    .map_err(|e| CopyError::destination(&to, e))?;
                stack.push((from, to));
            } else if file_type.is_symlink() {
                copy_symlink(&from, &to).await?;
                stats.files += 1;
            } else {
                stats.bytes += copy_file(&from, &to).await?;
                stats.files += 1;
            }
        }
    }

    Ok(stats)
}

/// Copy a single file, replacing any existing file at `to`
pub async fn copy_file(from: &Path, to: &Path) -> Result<u64, CopyError> {
    // Read first so a source failure never truncates the destination
    let contents = fs::read(from)
        .await
        .map_err(|e| CopyError::source(from, e))?;
    let permissions = fs::metadata(from)
        .await
        .map_err(|e| CopyError::source(from, e))?
        .permissions();

    fs::write(to, &contents)
        .await
        .map_err(|e| CopyError::destination(to, e))?;
    fs::set_permissions(to, permissions)
        .await
        .map_err(|e| CopyError::destination(to, e))?;

    Ok(contents.len() as u64)
}

#[cfg(unix)]
async fn copy_symlink(from: &Path, to: &Path) -> Result<(), CopyError> {
    let target = fs::read_link(from)
        .await
        .map_err(|e| CopyError::source(from, e))?;
    if fs::symlink_metadata(to).await.is_ok() {
        fs::remove_file(to)
            .await
            .map_err(|e| CopyError::destination(to, e))?;
    }
    fs::symlink(&target, to)
        .await
        .map_err(|e| CopyError::destination(to, e))
}

#[cfg(not(unix))]
async fn copy_symlink(from: &Path, to: &Path) -> Result<(), CopyError> {
    copy_file(from, to).await.map(|_| ())
}

/// Count files and bytes under `root`
pub async fn tree_stats(root: &Path) -> io::Result<TreeStats> {
    let mut stats = TreeStats::default();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_symlink() {
                stats.files += 1;
            } else {
                stats.files += 1;
                stats.bytes += entry.metadata().await?.len();
            }
        }
    }

    Ok(stats)
}

/// Remove a file or directory tree if present
pub async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).await,
        Ok(_) => fs::remove_file(path).await,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
