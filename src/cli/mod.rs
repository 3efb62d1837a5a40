//! Command-line interface

pub mod args;
pub mod commands;
pub mod exit;

pub use args::{Cli, Commands, GlobalArgs};
pub use exit::{InPhase, Phase, PhaseFailure};

use crate::error::{StageError, StageResult};
use std::path::PathBuf;

/// Resolve the buildpack root
///
/// The stage binaries live in `<buildpack>/bin/`, so without an explicit
/// directory the root is the parent of the executable's directory.
pub fn buildpack_dir(explicit: Option<PathBuf>) -> StageResult<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    let exe = std::env::current_exe()
        .map_err(|e| StageError::io("locating the current executable", e))?;
    exe.parent()
        .and_then(|bin| bin.parent())
        .map(PathBuf::from)
        .ok_or_else(|| StageError::User(format!("cannot derive buildpack dir from {}", exe.display())))
}
