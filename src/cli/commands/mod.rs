//! CLI command implementations

pub mod cache;
pub mod finalize;
pub mod supply;

pub use cache::execute as cache;
pub use finalize::execute as finalize;
pub use supply::execute as supply;

use crate::cli::args::GlobalArgs;
use crate::cli::exit::{InPhase, Phase, PhaseFailure};
use crate::config::{Config, ConfigManager};
use crate::diagnostics::{self, DiagnosticLog};
use crate::error::StageResult;
use std::path::Path;
use tracing::debug;

/// Create the stage's diagnostic log and install tracing
///
/// Tracing is installed even when the log can't be created, so the failure
/// itself still reaches the console.
pub(crate) fn open_log(stage: &str, globals: &GlobalArgs) -> Result<DiagnosticLog, PhaseFailure> {
    match DiagnosticLog::create(stage) {
        Ok(log) => {
            diagnostics::init_tracing(globals.verbose, Some(&log), globals.log_format);
            debug!("Diagnostic log: {}", log.path().display());
            Ok(log)
        }
        Err(e) => {
            diagnostics::init_tracing(globals.verbose, None, globals.log_format);
            Err(e).in_phase(Phase::LogSetup)
        }
    }
}

/// Load configuration from `--config` or the buildpack directory
pub(crate) async fn load_config(buildpack_dir: &Path, globals: &GlobalArgs) -> StageResult<Config> {
    let manager = match &globals.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(buildpack_dir),
    };
    debug!("Config path: {}", manager.path().display());
    manager.load().await
}
