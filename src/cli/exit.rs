//! Failure phases and their process exit codes.
//!
//! Commands return `PhaseFailure` instead of exiting directly, so `main()`
//! owns process termination and callers can tell failure points apart by
//! exit code alone.

use crate::error::StageError;
use std::fmt;
use thiserror::Error;

/// Point in a stage invocation where a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    LogSetup,
    BuildpackDir,
    CatalogLoad,
    LayoutValidation,
    ApplyOverride,
    BeforeCompile,
    StagingEnvironment,
    Stage,
    ConfigWrite,
    ConfigLoad,
}

impl Phase {
    /// Process exit code for this phase
    pub fn exit_code(self) -> u8 {
        match self {
            Self::LogSetup => 8,
            Self::BuildpackDir => 9,
            Self::CatalogLoad => 10,
            Self::LayoutValidation => 11,
            Self::BeforeCompile => 12,
            Self::StagingEnvironment => 13,
            Self::Stage => 14,
            Self::ConfigWrite => 15,
            Self::ConfigLoad => 16,
            Self::ApplyOverride => 17,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LogSetup => "log setup",
            Self::BuildpackDir => "buildpack directory",
            Self::CatalogLoad => "catalog load",
            Self::LayoutValidation => "layout validation",
            Self::BeforeCompile => "before compile",
            Self::StagingEnvironment => "staging environment",
            Self::Stage => "stage",
            Self::ConfigWrite => "config write",
            Self::ConfigLoad => "config load",
            Self::ApplyOverride => "apply override",
        };
        write!(f, "{}", name)
    }
}

/// A stage error tagged with the phase it happened in
#[derive(Debug, Error)]
#[error("{phase}: {source}")]
pub struct PhaseFailure {
    pub phase: Phase,
    #[source]
    pub source: StageError,
}

/// Tag a result's error with a phase
pub trait InPhase<T> {
    fn in_phase(self, phase: Phase) -> Result<T, PhaseFailure>;
}

impl<T> InPhase<T> for Result<T, StageError> {
    fn in_phase(self, phase: Phase) -> Result<T, PhaseFailure> {
        self.map_err(|source| PhaseFailure { phase, source })
    }
}
