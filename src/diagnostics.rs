//! Diagnostic log for a staging invocation
//!
//! Every tracing event is written both to the console and to a per-invocation
//! log file under the system temp dir. Stages hold the `DiagnosticLog` by
//! reference and call [`DiagnosticLog::sync`] at their completion boundary so
//! the file is durable once the stage returns.

use crate::error::{StageError, StageResult};
use clap::ValueEnum;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};
use uuid::Uuid;

/// Format of the diagnostic log file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines with timestamps
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Append-only diagnostic log file shared by the stages of one invocation
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    path: PathBuf,
    file: Arc<File>,
}

impl DiagnosticLog {
    /// Create a fresh log file for a stage in the system temp dir
    pub fn create(stage: &str) -> StageResult<Self> {
        let path = std::env::temp_dir().join(format!("fnstage.{}.{}.log", stage, Uuid::new_v4()));
        Self::open(path)
    }

    /// Open (or create) a log file for appending
    pub fn open(path: PathBuf) -> StageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StageError::io(format!("creating {}", parent.display()), e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StageError::io(format!("opening log file {}", path.display()), e))?;

        Ok(Self {
            path,
            file: Arc::new(file),
        })
    }

    /// Log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writer handle for the tracing file layer
    pub fn writer(&self) -> Arc<File> {
        Arc::clone(&self.file)
    }

    /// Flush pending content to durable storage
    pub fn sync(&self) -> StageResult<()> {
        self.file
            .sync_all()
            .map_err(|e| StageError::io(format!("syncing log file {}", self.path.display()), e))
    }
}

/// Install the global tracing subscriber
///
/// Verbosity: 0 = info, 1 = debug, 2+ = trace. `RUST_LOG` wins when set.
pub fn init_tracing(verbose: u8, log: Option<&DiagnosticLog>, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("fnstage=info"),
        1 => EnvFilter::new("fnstage=debug"),
        _ => EnvFilter::new("fnstage=trace"),
    });

    let file_layer: Option<Box<dyn Layer<Registry> + Send + Sync>> = log.map(|log| {
        let layer = fmt::layer().with_writer(log.writer()).with_ansi(false);
        match format {
            LogFormat::Json => layer.json().boxed(),
            LogFormat::Text => layer.boxed(),
        }
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
