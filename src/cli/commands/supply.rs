//! Supply command - install the invoker and build dependencies

use super::{load_config, open_log};
use crate::cache::FsCache;
use crate::catalog::BuildpackManifest;
use crate::cli::args::{GlobalArgs, StageArgs};
use crate::cli::buildpack_dir;
use crate::cli::exit::{InPhase, Phase, PhaseFailure};
use crate::config::schema::HooksConfig;
use crate::error::{StageError, StageResult};
use crate::installer::NpmInstaller;
use crate::pipeline::Supplier;
use crate::stager::{BuildpackStager, Stager};
use std::path::Path;
use tokio::process::Command;
use tracing::{error, info};

/// Execute the supply command
pub async fn execute(args: StageArgs, globals: &GlobalArgs) -> Result<(), PhaseFailure> {
    let log = open_log("supply", globals)?;

    let buildpack_dir = buildpack_dir(globals.buildpack_dir.clone())
        .inspect_err(|e| error!("Unable to determine buildpack directory: {}", e))
        .in_phase(Phase::BuildpackDir)?;

    let config = load_config(&buildpack_dir, globals)
        .await
        .inspect_err(|e| error!("Unable to load configuration: {}", e))
        .in_phase(Phase::ConfigLoad)?;

    let mut manifest = BuildpackManifest::load(&buildpack_dir)
        .await
        .inspect_err(|e| error!("Unable to load buildpack manifest: {}", e))
        .in_phase(Phase::CatalogLoad)?;

    let stager = BuildpackStager::new(
        args.build_dir.clone(),
        args.cache_dir.clone(),
        args.deps_dir.clone(),
        args.deps_idx.clone(),
    );
    stager
        .validate()
        .await
        .inspect_err(|e| error!("Invalid staging layout: {}", e))
        .in_phase(Phase::LayoutValidation)?;

    manifest
        .apply_overrides(&args.deps_dir)
        .await
        .inspect_err(|e| error!("Unable to apply override.toml files: {}", e))
        .in_phase(Phase::ApplyOverride)?;

    run_before_compile(&config.hooks, stager.build_dir())
        .await
        .inspect_err(|e| error!("Before Compile: {}", e))
        .in_phase(Phase::BeforeCompile)?;

    stager
        .set_staging_environment()
        .inspect_err(|e| error!("Unable to setup environment variables: {}", e))
        .in_phase(Phase::StagingEnvironment)?;

    let installer = NpmInstaller::new(args.build_dir.clone(), config.installer.clone());
    let cache = FsCache::new(
        stager.cache_dir(),
        &config.cache.dir_name,
        args.build_dir.clone(),
        &config.installer.modules_dir,
    );

    let mut supplier = Supplier {
        stager: &stager,
        catalog: &manifest,
        installer: &installer,
        cache: &cache,
        log: &log,
        invoker: &config.invoker,
        rebuild: false,
    };
    supplier.run().await.in_phase(Phase::Stage)?;

    let name = manifest
        .language
        .as_deref()
        .unwrap_or(env!("CARGO_PKG_NAME"));
    stager
        .write_config(name, env!("CARGO_PKG_VERSION"))
        .await
        .inspect_err(|e| error!("Error writing config: {}", e))
        .in_phase(Phase::ConfigWrite)?;

    log.sync().in_phase(Phase::ConfigWrite)
}

/// Run the configured before-compile hook in the build dir
async fn run_before_compile(hooks: &HooksConfig, build_dir: &Path) -> StageResult<()> {
    let Some(script) = hooks.before_compile.as_deref() else {
        return Ok(());
    };
    info!("Running before-compile hook");

    let status = Command::new("sh")
        .arg("-c")
        .arg(script)
        .current_dir(build_dir)
        .status()
        .await
        .map_err(|e| StageError::command_failed(format!("sh -c {}", script), e))?;

    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(StageError::User(format!(
            "before-compile hook exited with code {}",
            code
        ))),
        None => Err(StageError::ProcessSignaled),
    }
}
