//! kiln-ingest: bake raw vendor feeds into the columnar store
//!
//! Usage:
//!   # Process everything the manifest names
//!   kiln-ingest --manifest run.json --schemas schemas.json --output ./bronze
//!
//!   # Reprocess even when outputs look fresh
//!   kiln-ingest --manifest run.json --schemas schemas.json --output ./bronze --force
//!
//!   # Bound the worker pool
//!   kiln-ingest --manifest run.json --schemas schemas.json --output ./bronze --workers 4

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use kiln::pipeline::{BatchDriver, DriverOptions, RunManifest};
use kiln::schema::SchemaRegistry;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kiln-ingest")]
#[command(about = "Batch-convert raw football feeds into compressed columnar units", long_about = None)]
struct Args {
    /// Run manifest: data sources, record types, input directories
    #[arg(long, short = 'm')]
    manifest: PathBuf,

    /// Canonical schema file (JSON array, one schema per record type)
    #[arg(long, short = 's')]
    schemas: PathBuf,

    /// Output root for the columnar store
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// Worker threads for unit processing (default: core count)
    #[arg(long, default_value_t = 0)]
    workers: usize,

    /// Bypass the change-detection gate and reprocess everything
    #[arg(long)]
    force: bool,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kiln=info")),
        )
        .init();

    let args = Args::parse();

    let registry = SchemaRegistry::from_file(&args.schemas)
        .with_context(|| format!("Failed to load schemas from {}", args.schemas.display()))?;
    let manifest = RunManifest::from_file(&args.manifest)
        .with_context(|| format!("Failed to load manifest from {}", args.manifest.display()))?;

    let driver = BatchDriver::new(
        registry,
        DriverOptions {
            output_dir: args.output,
            workers: args.workers,
            force: args.force,
        },
    );

    let summary = driver.run(&manifest).context("Run failed")?;

    for ((source, record_type), counts) in &summary.counts {
        println!(
            "{source}/{record_type}: {} written, {} skipped, {} recovered, {} fatal",
            counts.written,
            counts.skipped_unchanged,
            counts.failed_recoverable,
            counts.failed_fatal
        );
    }

    if !summary.failures.is_empty() {
        println!();
        for failure in &summary.failures {
            let kind = if failure.recovered {
                "recovered"
            } else {
                "fatal"
            };
            println!(
                "{kind}: {}/{}/{}: {}",
                failure.source, failure.record_type, failure.unit, failure.reason
            );
        }
    }

    let totals = summary.totals();
    println!(
        "\n{} units: {} written, {} skipped, {} recovered, {} fatal",
        totals.total(),
        totals.written,
        totals.skipped_unchanged,
        totals.failed_recoverable,
        totals.failed_fatal
    );

    // best-effort batch completion: fatal units are reported, not a
    // process failure
    Ok(ExitCode::SUCCESS)
}
