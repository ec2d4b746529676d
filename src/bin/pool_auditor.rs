//! Standalone snapshot auditor.
//!
//! Reads a registry state snapshot produced by the `wanpool` CLI,
//! re-derives every pool invariant offline, and writes JSON and text
//! reports. Exits non-zero when any finding is present so the tool can
//! gate cron jobs and release pipelines.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::{Context, Result};
use env_logger::Env;
use log::info;

use wanpool::audit;
use wanpool::pool::RegistrySnapshot;

#[derive(Parser)]
#[command(name = "pool-auditor")]
#[command(about = "Offline consistency audit of wanpool registry snapshots", version)]
struct Args {
    /// Path to the registry snapshot (JSON)
    #[arg(short, long, default_value = "wanpool_state.json")]
    snapshot: PathBuf,

    /// Output directory for reports
    #[arg(short, long, default_value = "audit_output")]
    output: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of parallel audit workers (0 = auto-detect)
    #[arg(short = 'j', long, default_value = "0")]
    threads: usize,
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(Env::default().default_filter_or(&args.log_level)).init();

    // Set thread pool size
    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
        info!("Using {} audit threads", args.threads);
    }

    info!("Loading snapshot from {}...", args.snapshot.display());
    let raw = fs::read_to_string(&args.snapshot)
        .with_context(|| format!("Failed to read snapshot '{}'", args.snapshot.display()))?;
    let snapshot: RegistrySnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("Snapshot '{}' is not a registry state file", args.snapshot.display()))?;
    info!(
        "Loaded {} pools and {} assignment records",
        snapshot.pools.len(),
        snapshot.assignments.len()
    );

    let report = audit::run_audit(&snapshot);

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create output directory: {}", args.output.display()))?;
    audit::generate_json_report(&report, &args.output.join("audit_report.json"))?;
    audit::generate_text_report(&report, &args.output.join("audit_report.txt"))?;

    audit::print_summary(&report);

    if report.clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(2))
    }
}
