//! CLI argument definitions using clap derive

use crate::diagnostics::LogFormat;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// fnstage - function invoker staging
///
/// Installs the function invoker, builds application dependencies with a
/// fingerprinted cache, and publishes launch-time scripts.
#[derive(Parser, Debug)]
#[command(name = "fnstage")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub globals: GlobalArgs,
}

/// Flags shared by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Buildpack root (defaults to the parent of the executable's directory)
    #[arg(long, global = true, env = "BUILDPACK_DIR")]
    pub buildpack_dir: Option<PathBuf>,

    /// Configuration file path (defaults to <buildpack-dir>/fnstage.toml)
    #[arg(short, long, global = true, env = "FNSTAGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Diagnostic log file format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "FNSTAGE_LOG_FORMAT")]
    pub log_format: LogFormat,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install the invoker and build application dependencies
    Supply(StageArgs),

    /// Publish startup scripts into the build slot
    Finalize(StageArgs),

    /// Inspect or clear the dependency cache
    Cache(CacheArgs),
}

/// Positional directories handed to every stage
#[derive(Parser, Debug, Clone)]
pub struct StageArgs {
    /// Application directory
    pub build_dir: PathBuf,

    /// Cache directory persisted across builds
    pub cache_dir: PathBuf,

    /// Shared dependencies directory
    pub deps_dir: PathBuf,

    /// Build slot index under the dependencies directory
    pub deps_idx: String,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show the stored cache entry
    Info {
        /// Cache directory persisted across builds
        #[arg(long)]
        cache_dir: PathBuf,

        /// Application directory to compare against the stored fingerprint
        #[arg(long)]
        build_dir: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove the stored cache entry
    Clear {
        /// Cache directory persisted across builds
        #[arg(long)]
        cache_dir: PathBuf,
    },
}

/// Output format for cache info
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON output
    Json,
}
