//! Persistent dependency cache
//!
//! Keeps a fingerprinted snapshot of the installed application dependencies
//! between builds, so a build with unchanged declarations can restore the
//! previous install tree and run an incremental rebuild instead of a cold
//! install.
//!
//! # Outcomes
//!
//! | Outcome | Cause | Effect |
//! |---------|-------|--------|
//! | Hit | fingerprint matches, snapshot intact | snapshot copied into the project, rebuild |
//! | Miss | no entry | cold install |
//! | Miss | fingerprint mismatch | cold install |
//! | Miss | entry or snapshot unreadable | cold install (logged as corrupt) |
//!
//! A miss never fails the build. Save runs after every successful build and
//! replaces the previous entry, so the cache converges after any miss.

pub mod fingerprint;
mod store;

pub use fingerprint::{compute as compute_fingerprint, detect_declarations, Fingerprint};
pub use store::{CacheEntry, FsCache};

use crate::catalog::Dependency;
use crate::error::StageResult;
use async_trait::async_trait;
use std::fmt;

/// Why a restore did not hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    /// No entry has been saved yet
    NoEntry,
    /// Declarations or runtime changed since the last save
    FingerprintMismatch,
    /// Entry metadata or snapshot could not be trusted
    Corrupt(String),
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoEntry => write!(f, "no cached dependencies"),
            Self::FingerprintMismatch => write!(f, "dependency declarations changed"),
            Self::Corrupt(reason) => write!(f, "cache entry corrupt: {}", reason),
        }
    }
}

/// Result of a cache restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Snapshot restored into the project
    Hit { files: u64 },
    /// Nothing restored
    Miss(MissReason),
}

impl CacheOutcome {
    /// Whether the install tree was restored (selects an incremental rebuild)
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }
}

/// Cache of installed application dependencies
#[async_trait]
pub trait DependencyCache: Send + Sync {
    /// Prepare the storage location; idempotent
    async fn initialize(&self) -> StageResult<()>;

    /// Restore the install tree if the stored fingerprint matches
    async fn restore(&self, runtime: &Dependency) -> StageResult<CacheOutcome>;

    /// Replace the stored entry with the current install tree
    async fn save(&self, runtime: &Dependency) -> StageResult<()>;
}
