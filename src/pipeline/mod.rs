//! Staging pipeline
//!
//! Two stages run as separate invocations:
//! - supply: install the invoker, write the default environment, restore
//!   the dependency cache, build dependencies, save the cache
//! - finalize: publish startup scripts into the slot's profile.d
//!
//! Each stage is fail-fast: the first failing step is logged with its name
//! and its error is returned unchanged. Both stages sync the diagnostic log
//! before returning.

mod env;
mod finalize;
mod supply;
#[cfg(test)]
mod testing;

pub use env::default_env_script;
pub use finalize::Finalizer;
pub use supply::Supplier;

use crate::error::StageError;
use tracing::{error, info};

/// Log a step header
pub(crate) fn begin_step(title: &str) {
    info!("-----> {}", title);
}

/// Log a failed step; the error passes through unchanged
pub(crate) fn step_failed(step: &str, err: StageError) -> StageError {
    error!(step, "       **ERROR** Unable to {}: {}", step, err);
    err
}
