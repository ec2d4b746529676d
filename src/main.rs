//! Address management CLI for operator provisioning workflows.
//!
//! Wraps the engine for day-to-day use: analyze an address (or a pasted
//! chat message), allocate and release assignments, and report usage.
//! Registry state round-trips through a JSON snapshot between invocations.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use env_logger::Env;
use log::info;

use wanpool::analyze::{extract_candidate_ip, AddressReport, AnalysisEngine};
use wanpool::config::{self, Config};
use wanpool::pool::{CachedPoolStore, MemoryStore, PoolRegistry, PoolStore, RegistrySnapshot};
use wanpool::recommend::{RegionDirectory, StaticRecommendations};

/// IPv4 address-pool management for regional ISP provisioning
#[derive(Parser)]
#[command(name = "wanpool")]
#[command(about = "IPv4 address-pool management for regional ISP provisioning")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Operator configuration YAML seeding regions and pools
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Registry snapshot JSON read at startup and written back on exit
    #[arg(short, long, default_value = "wanpool_state.json")]
    state: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an address: subnet math, owning pool, router guidance
    Analyze {
        /// The address to analyze (dotted quad)
        ip: Option<String>,

        /// Pull the address out of raw text instead (chat transcripts)
        #[arg(long, conflicts_with = "ip")]
        free_text: Option<String>,

        /// Prefix length override
        #[arg(short, long)]
        prefix: Option<u8>,

        /// Service interface for the recommendation lookup
        #[arg(short, long)]
        interface: Option<String>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Allocate the lowest free address in a pool
    Allocate {
        /// Pool to allocate from
        #[arg(long)]
        pool: String,

        /// Customer account receiving the address
        #[arg(long)]
        account: String,
    },

    /// Release an assignment back to its pool
    Release {
        /// Assignment id to release
        #[arg(long)]
        assignment: String,
    },

    /// Show registry-wide usage statistics
    Stats,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    // Load registry state, then layer the operator config on top
    let store = Arc::new(load_state(&cli.state)?);
    let cached: Arc<dyn PoolStore> = Arc::new(CachedPoolStore::new(store.clone()));

    let (registry, regions) = match &cli.config {
        Some(path) => {
            let config = config::load_config(path)?;
            let registry = PoolRegistry::new(cached.clone())
                .with_retry_settings(config.registry.retry_settings());
            seed_pools(&registry, store.as_ref(), &config)?;
            (registry, config.region_directory())
        }
        None => (PoolRegistry::new(cached), RegionDirectory::builtin()),
    };
    let engine = AnalysisEngine::new(registry, regions, Arc::new(StaticRecommendations));

    match cli.command {
        Commands::Analyze {
            ip,
            free_text,
            prefix,
            interface,
            json,
        } => {
            let ip = match (ip, free_text) {
                (Some(ip), _) => ip,
                (None, Some(text)) => extract_candidate_ip(&text)
                    .ok_or_else(|| eyre!("No valid IPv4 address found in the text"))?
                    .to_string(),
                (None, None) => {
                    return Err(eyre!("Provide an address or --free-text"));
                }
            };

            let report = engine.analyze_address(&ip, prefix, interface.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Allocate { pool, account } => {
            let assignment = engine.registry().allocate_next(&pool, &account)?;
            println!("\n=== ADDRESS ASSIGNED ===\n");
            println!("Assignment: {}", assignment.id);
            println!("Account:    {}", assignment.account_id);
            println!("Address:    {}", assignment.assigned_ip);
            println!("Gateway:    {}", assignment.assigned_gateway);
            println!("Pool:       {}", assignment.pool_id);
        }
        Commands::Release { assignment } => {
            engine.registry().release_assignment(&assignment)?;
            println!("Assignment {} released", assignment);
        }
        Commands::Stats => {
            let stats = engine.registry().statistics()?;
            println!("\n=== REGISTRY USAGE ===\n");
            println!("Pools:      {}", stats.total_pools);
            println!("Addresses:  {}", stats.total_addresses);
            if stats.total_addresses > 0 {
                let percent =
                    stats.used_addresses as f64 / stats.total_addresses as f64 * 100.0;
                println!("Used:       {} ({:.1}%)", stats.used_addresses, percent);
            } else {
                println!("Used:       0");
            }
            println!("Available:  {}", stats.available_addresses);
            if !stats.pools_per_region.is_empty() {
                println!("Per region:");
                for (region, count) in &stats.pools_per_region {
                    println!("  {}: {} pools", region, count);
                }
            }
        }
    }

    save_state(store.as_ref(), &cli.state)?;
    Ok(())
}

/// Load the snapshot behind `path`, or start empty when there is none
fn load_state(path: &Path) -> Result<MemoryStore> {
    if !path.exists() {
        info!("No state file at {}; starting empty", path.display());
        return Ok(MemoryStore::new());
    }
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open state file '{}'", path.display()))?;
    let snapshot: RegistrySnapshot = serde_json::from_reader(file)
        .with_context(|| format!("State file '{}' is not a valid snapshot", path.display()))?;
    info!(
        "Loaded {} pools and {} assignments from {}",
        snapshot.pools.len(),
        snapshot.assignments.len(),
        path.display()
    );
    Ok(MemoryStore::from_snapshot(snapshot))
}

fn save_state(store: &MemoryStore, path: &Path) -> Result<()> {
    let snapshot = store.snapshot()?;
    let json = serde_json::to_string_pretty(&snapshot)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write state file '{}'", path.display()))?;
    Ok(())
}

/// Activate configured pools that the store does not hold yet.
///
/// Pools already present keep their stored counters and assignments; the
/// config is a seed, not a reset.
fn seed_pools(registry: &PoolRegistry, store: &MemoryStore, config: &Config) -> Result<()> {
    let existing: HashSet<String> = store.load_pools()?.into_iter().map(|p| p.id).collect();
    let mut seeded = 0;
    for pool in config.build_pools()? {
        if existing.contains(&pool.id) {
            log::debug!("Pool {} already in the registry; keeping stored state", pool.id);
            continue;
        }
        registry.activate_pool(pool)?;
        seeded += 1;
    }
    if seeded > 0 {
        info!("Seeded {} pools from configuration", seeded);
    }
    Ok(())
}

fn print_report(report: &AddressReport) {
    println!("\n=== ADDRESS ANALYSIS ===\n");
    println!("Address:    {}", report.query_ip);
    let network = &report.network;
    println!("Prefix:     /{}", network.prefix_length);
    println!("Mask:       {}", network.subnet_mask);
    println!("Network:    {}", network.network_address);
    println!("Broadcast:  {}", network.broadcast_address);
    println!(
        "Usable:     {} - {}",
        network.first_usable, network.last_usable
    );
    println!(
        "Hosts:      {} total, {} usable",
        network.total_hosts, network.usable_hosts
    );
    match &report.pool {
        Some(pool) => {
            let region = pool.region_name.as_deref().unwrap_or(pool.region_id.as_str());
            println!(
                "Pool:       {} ({}, {})",
                pool.pool_id, region, pool.customer_class
            );
            println!("Range:      {} - {}", pool.start_ip, pool.end_ip);
            println!(
                "Usage:      {} used, {} available",
                pool.used_addresses, pool.available_addresses
            );
        }
        None => println!("Pool:       none (address is not managed)"),
    }
    if let Some(rec) = &report.recommendation {
        println!("Router:     {}", rec.router_model);
        println!("Tutorials:");
        for url in &rec.tutorial_urls {
            println!("  - {}", url);
        }
    }
    println!();
}
