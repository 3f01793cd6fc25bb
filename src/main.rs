//! ringlb - ring-hash inspection tool
//!
//! Usage:
//!     ringlb --config <path>
//!
//! Builds the hash ring described by a configuration file and reports its
//! geometry and pick distribution. See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use ringlb::config::{load_config, ToolConfig};
use ringlb::ring::Ring;
use ringlb::util::init_logging;
use std::path::PathBuf;
use tracing::info;

/// Inspect the ring a weighted server list produces.
#[derive(Parser, Debug)]
#[command(name = "ringlb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Number of uniformly spaced request hashes to simulate
    #[arg(long, default_value_t = 100_000)]
    samples: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).with_context(|| {
        format!(
            "failed to load configuration from '{}'",
            cli.config.display()
        )
    })?;

    // Determine log level (CLI overrides config)
    let log_level = cli.log_level.as_deref().unwrap_or(&config.global.log_level);
    init_logging(log_level, &config.global.log_format);

    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  Servers: {}", config.servers.len());
        println!(
            "  Ring size bounds: [{}, {}]",
            config.ring.min_ring_size, config.ring.max_ring_size
        );
        return Ok(());
    }

    info!(
        config_path = %cli.config.display(),
        servers = config.servers.len(),
        "ringlb starting"
    );

    inspect(&config, cli.samples)
}

/// Build the ring and print its geometry and simulated pick distribution.
fn inspect(config: &ToolConfig, samples: u64) -> Result<()> {
    let addresses = config.weighted_addresses();
    let total_weight: u64 = addresses.iter().map(|a| u64::from(a.weight)).sum();

    let ring = Ring::build(&addresses, &config.ring);
    println!("Ring: {} entries over {} servers", ring.len(), addresses.len());

    // Entries per server.
    let mut entry_counts = vec![0u64; addresses.len()];
    for entry in ring.entries() {
        entry_counts[entry.endpoint_index as usize] += 1;
    }

    // Simulated picks over uniformly spaced request hashes.
    let mut pick_counts = vec![0u64; addresses.len()];
    let stride = u64::MAX / samples.max(1);
    for i in 0..samples {
        let index = ring.find(i * stride);
        pick_counts[ring.entries()[index].endpoint_index as usize] += 1;
    }

    println!("{:<24} {:>8} {:>10} {:>10} {:>10}", "server", "weight", "entries", "picks", "share");
    for (i, address) in addresses.iter().enumerate() {
        let share = pick_counts[i] as f64 / samples as f64;
        let ideal = f64::from(address.weight) / total_weight as f64;
        println!(
            "{:<24} {:>8} {:>10} {:>10} {:>9.2}% (ideal {:.2}%)",
            address.address.to_string(),
            address.weight,
            entry_counts[i],
            pick_counts[i],
            share * 100.0,
            ideal * 100.0,
        );
    }

    Ok(())
}
