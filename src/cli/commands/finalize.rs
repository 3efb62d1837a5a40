//! Finalize command - publish startup scripts

use super::{load_config, open_log};
use crate::cli::args::{GlobalArgs, StageArgs};
use crate::cli::buildpack_dir;
use crate::cli::exit::{InPhase, Phase, PhaseFailure};
use crate::pipeline::Finalizer;
use crate::stager::BuildpackStager;
use tracing::error;

/// Execute the finalize command
pub async fn execute(args: StageArgs, globals: &GlobalArgs) -> Result<(), PhaseFailure> {
    let log = open_log("finalize", globals)?;

    let buildpack_dir = buildpack_dir(globals.buildpack_dir.clone())
        .inspect_err(|e| error!("Unable to determine buildpack directory: {}", e))
        .in_phase(Phase::BuildpackDir)?;

    // Validates the configuration even though publishing needs none of it
    load_config(&buildpack_dir, globals)
        .await
        .inspect_err(|e| error!("Unable to load configuration: {}", e))
        .in_phase(Phase::ConfigLoad)?;

    let stager = BuildpackStager::new(
        args.build_dir,
        args.cache_dir,
        args.deps_dir,
        args.deps_idx,
    );
    stager
        .validate()
        .await
        .inspect_err(|e| error!("Invalid staging layout: {}", e))
        .in_phase(Phase::LayoutValidation)?;

    let finalizer = Finalizer {
        stager: &stager,
        source_dir: buildpack_dir.join("profile.d"),
        log: &log,
    };
    finalizer.run().await.in_phase(Phase::Stage)
}
