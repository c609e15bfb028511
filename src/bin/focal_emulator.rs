//! Emulator binary - publishes synthetic FOCAL raw batches via ZeroMQ
//!
//! Usage:
//!   cargo run --bin focal_emulator                           # Use defaults
//!   cargo run --bin focal_emulator -- --config config.toml   # Use config file
//!   cargo run --bin focal_emulator -- --batches 10           # Run for 10 batches

use clap::Parser;
use focal_rs::common::EmulatorArgs;
use focal_rs::config::Config;
use focal_rs::emulator::Emulator;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (logging)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("focal_rs=info".parse()?))
        .init();

    let args = EmulatorArgs::parse();

    // Build configuration
    let config_path = &args.common.config_file;
    let mut emulator_config = if std::path::Path::new(config_path).exists() {
        let config = Config::load(config_path)?;
        info!(config_file = %config_path, "Loaded configuration");
        config.emulator
    } else {
        Default::default()
    };

    // CLI overrides config file
    if let Some(addr) = args.address {
        emulator_config.address = addr;
    }
    if let Some(interval) = args.interval {
        emulator_config.batch_interval_ms = interval;
    }
    if args.seed.is_some() {
        emulator_config.seed = args.seed;
    }

    let mut emulator = Emulator::new(emulator_config.clone()).await?;

    println!("Emulator running, publishing to {}", emulator_config.address);

    if let Some(count) = args.batches {
        println!("Will send {} batches then EOS.", count);
        emulator.run_batches(count).await?;
    } else {
        println!("Press Ctrl+C to stop.");

        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => println!("\nReceived Ctrl+C, shutting down..."),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
            }
            let _ = shutdown_tx.send(());
        });

        emulator.run(shutdown_rx).await?;
    }

    println!("Emulator stopped.");
    Ok(())
}
