//! Dependency-declaration fingerprinting
//!
//! The fingerprint is a SHA256 over the contents of the project's
//! dependency declarations plus the runtime component version. Same
//! declarations on the same runtime = same install = cache hit.

use crate::error::{StageError, StageResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Bump when the hashed layout changes so old entries stop matching.
pub const FINGERPRINT_VERSION: u32 = 1;

/// Declaration files, in hashing order
pub const DECLARATION_FILES: &[&str] = &[
    "package.json",
    "package-lock.json",
    "npm-shrinkwrap.json",
    "yarn.lock",
];

/// Hex-encoded SHA256 identifying a dependency-declaration state
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Full hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for display
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hash declaration contents; `None` marks an absent file
pub fn fingerprint_declarations(
    runtime_version: &str,
    declarations: &[(&str, Option<Vec<u8>>)],
) -> Fingerprint {
    let mut hasher = Sha256::new();

    hasher.update(b"fnstage-deps-v");
    hasher.update(FINGERPRINT_VERSION.to_le_bytes());
    hasher.update(b"\n");

    hasher.update(b"runtime:");
    hasher.update(runtime_version.as_bytes());
    hasher.update(b"\n");

    for (name, contents) in declarations {
        hasher.update(name.as_bytes());
        hasher.update(b":");
        match contents {
            Some(bytes) => {
                hasher.update(b"present:");
                hasher.update((bytes.len() as u64).to_le_bytes());
                hasher.update(bytes);
            }
            None => hasher.update(b"absent"),
        }
        hasher.update(b"\n");
    }

    Fingerprint(hex::encode(hasher.finalize()))
}

/// Compute the fingerprint of a project directory
pub async fn compute(project_dir: &Path, runtime_version: &str) -> StageResult<Fingerprint> {
    let mut declarations = Vec::with_capacity(DECLARATION_FILES.len());

    for name in DECLARATION_FILES {
        let path = project_dir.join(name);
        let contents = match tokio::fs::read(&path).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(StageError::io(
                    format!("reading dependency declaration {}", path.display()),
                    e,
                ))
            }
        };
        declarations.push((*name, contents));
    }

    let fingerprint = fingerprint_declarations(runtime_version, &declarations);
    debug!(
        "Fingerprint {} for {} (runtime {})",
        fingerprint.short(),
        project_dir.display(),
        runtime_version
    );
    Ok(fingerprint)
}

/// Declaration files present in a project
pub fn detect_declarations(project_dir: &Path) -> Vec<PathBuf> {
    DECLARATION_FILES
        .iter()
        .map(|name| project_dir.join(name))
        .filter(|path| path.is_file())
        .collect()
}
