//! fnstage - function invoker staging
//!
//! Installs the function invoker into a build slot, builds the application's
//! dependencies through a fingerprinted cache, and publishes the scripts the
//! platform sources at launch.

pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod installer;
pub mod pipeline;
pub mod stager;
pub mod tree;

pub use error::{StageError, StageResult};
