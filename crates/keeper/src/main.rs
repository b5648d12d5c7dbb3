use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::time;

use calida_keeper::config::create_example_config;
use calida_keeper::{DryRun, KeeperConfig};

#[derive(Parser, Debug)]
#[command(name = "calida-keeper")]
#[command(about = "Calida vault rebalancing keeper")]
struct Args {
    /// Path to keeper configuration file
    #[arg(short, long, default_value = "keeper.toml")]
    config: String,

    /// Write an example configuration to this path and exit
    #[arg(long)]
    init: Option<String>,

    /// Update interval in seconds, overrides the configuration
    #[arg(short, long)]
    interval: Option<u64>,

    /// Stop after this many passes
    #[arg(short = 'n', long)]
    iterations: Option<u64>,

    /// Print each pass report as JSON
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.verbose { "debug" } else { "info" }),
    )
    .init();

    if let Some(path) = args.init {
        create_example_config(&path).with_context(|| format!("writing example config to {}", path))?;
        log::info!("Example configuration written to {}", path);
        return Ok(());
    }

    // Load configuration
    let config = if Path::new(&args.config).exists() {
        KeeperConfig::load(&args.config)?
    } else {
        log::warn!("No configuration at {}, using defaults", args.config);
        KeeperConfig::default()
    };
    let interval = args.interval.unwrap_or(config.update_interval_secs).max(1);

    log::info!("Starting Calida keeper (dry run) on network '{}'", config.network);
    log::info!("Update interval: {}s", interval);

    let mut dry_run = DryRun::build(config)?;
    let mut interval_timer = time::interval(Duration::from_secs(interval));

    loop {
        interval_timer.tick().await;

        match dry_run.tick().await {
            Ok(report) => {
                if report.rebalanced > 0 || report.failed > 0 {
                    log::info!(
                        "Pass {}: {} rebalanced, {} in band, {} failed",
                        report.iteration,
                        report.rebalanced,
                        report.in_band,
                        report.failed
                    );
                } else {
                    log::debug!("Pass {}: all troves in band", report.iteration);
                }
                if args.json {
                    println!("{}", serde_json::to_string(&report)?);
                }
            }
            Err(e) => {
                log::error!("Error in keeper pass {}: {}", dry_run.keeper().iteration(), e);
                // Continue running even if individual passes fail
            }
        }

        // Basic health check every 100 passes
        let iteration = dry_run.keeper().iteration();
        if iteration % 100 == 0 {
            if let Err(e) = dry_run.keeper().health_check() {
                log::warn!("Health check warning: {}", e);
            }
        }

        if args.iterations.is_some_and(|limit| iteration >= limit) {
            log::info!("Stopping after {} passes", iteration);
            return Ok(());
        }
    }
}
