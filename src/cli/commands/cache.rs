//! Cache command - inspect or clear the dependency cache

use super::load_config;
use crate::cache::{compute_fingerprint, detect_declarations, CacheEntry, FsCache};
use crate::cli::args::{CacheAction, CacheArgs, GlobalArgs, OutputFormat};
use crate::cli::buildpack_dir;
use crate::cli::exit::{InPhase, Phase, PhaseFailure};
use crate::config::Config;
use crate::diagnostics;
use crate::error::{StageError, StageResult};
use console::style;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Execute the cache command
pub async fn execute(args: CacheArgs, globals: &GlobalArgs) -> Result<(), PhaseFailure> {
    diagnostics::init_tracing(globals.verbose, None, globals.log_format);

    let buildpack_dir = buildpack_dir(globals.buildpack_dir.clone()).in_phase(Phase::BuildpackDir)?;
    let config = load_config(&buildpack_dir, globals)
        .await
        .in_phase(Phase::ConfigLoad)?;

    let result = match args.action {
        CacheAction::Info {
            cache_dir,
            build_dir,
            format,
        } => show_info(&config, &cache_dir, build_dir, format).await,
        CacheAction::Clear { cache_dir } => clear(&config, &cache_dir).await,
    };
    result.in_phase(Phase::Stage)
}

/// Cache state as reported by `cache info`
#[derive(Debug, Serialize)]
struct CacheReport {
    root: PathBuf,
    entry: Option<CacheEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    corrupt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    would_hit: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    declarations: Vec<PathBuf>,
}

async fn build_report(
    config: &Config,
    cache_dir: &Path,
    build_dir: Option<PathBuf>,
) -> StageResult<CacheReport> {
    let project_dir = build_dir.clone().unwrap_or_default();
    let cache = FsCache::new(
        cache_dir,
        &config.cache.dir_name,
        project_dir.clone(),
        &config.installer.modules_dir,
    );

    let (entry, corrupt) = match cache.entry().await {
        Ok(entry) => (entry, None),
        Err(reason) => (None, Some(reason)),
    };

    let mut report = CacheReport {
        root: cache.root().to_path_buf(),
        entry,
        corrupt,
        current_fingerprint: None,
        would_hit: None,
        declarations: Vec::new(),
    };

    if build_dir.is_some() {
        if !project_dir.is_dir() {
            return Err(StageError::BuildDirMissing(project_dir));
        }
        report.declarations = detect_declarations(&project_dir);

        // The fingerprint covers the runtime version, which only the entry records
        if let Some(entry) = &report.entry {
            let current = compute_fingerprint(&project_dir, &entry.runtime_version).await?;
            report.would_hit = Some(current == entry.fingerprint);
            report.current_fingerprint = Some(current.to_string());
        }
    }

    Ok(report)
}

async fn show_info(
    config: &Config,
    cache_dir: &Path,
    build_dir: Option<PathBuf>,
    format: OutputFormat,
) -> StageResult<()> {
    let report = build_report(config, cache_dir, build_dir).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &CacheReport) {
    println!("Cache: {}", report.root.display());
    println!();

    if let Some(reason) = &report.corrupt {
        println!("  {} entry unreadable: {}", style("✗").red(), reason);
        return;
    }

    let Some(entry) = &report.entry else {
        println!("  {} no cached dependencies", style("○").dim());
        return;
    };

    println!("  {:<14} {}", "Fingerprint", entry.fingerprint.short());
    println!("  {:<14} {}", "Runtime", entry.runtime_version);
    println!(
        "  {:<14} {}",
        "Saved",
        entry.created_at.format("%Y-%m-%d %H:%M")
    );
    println!("  {:<14} {} ({} bytes)", "Files", entry.files, entry.bytes);

    if !report.declarations.is_empty() {
        println!();
        println!("Declarations:");
        for path in &report.declarations {
            println!(
                "  {} {}",
                style("•").cyan(),
                path.file_name().unwrap_or_default().to_string_lossy()
            );
        }
    }

    if let Some(would_hit) = report.would_hit {
        println!();
        if would_hit {
            println!("  {} next build restores from cache", style("✓").green());
        } else {
            println!(
                "  {} declarations changed, next build installs from scratch",
                style("~").yellow()
            );
        }
    }
}

async fn clear(config: &Config, cache_dir: &Path) -> StageResult<()> {
    let cache = FsCache::new(
        cache_dir,
        &config.cache.dir_name,
        PathBuf::new(),
        &config.installer.modules_dir,
    );

    if !cache.root().exists() {
        println!("No cache at {}", cache.root().display());
        return Ok(());
    }

    cache.clear().await?;
    println!(
        "{} Removed {}",
        style("✓").green(),
        cache.root().display()
    );
    Ok(())
}
