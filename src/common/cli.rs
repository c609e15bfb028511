//! CLI argument parsing for the FOCAL binaries
//!
//! Common arguments are shared via `#[command(flatten)]`; each binary
//! embeds [`CommonArgs`] in its own argument struct. Values given on the
//! command line override the configuration file.

use clap::Parser;

/// Common arguments shared across all binaries
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    /// Path to configuration file
    #[arg(short = 'f', long = "config", default_value = "config.toml")]
    pub config_file: String,
}

/// Arguments for the raw decoder / event builder
#[derive(Parser, Debug, Clone)]
pub struct DecoderArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Subscribe to upstream raw data address (can specify multiple times)
    #[arg(short = 's', long = "sub", action = clap::ArgAction::Append)]
    pub sub_addresses: Vec<String>,

    /// Publish built events to this address
    #[arg(short = 'p', long = "pub")]
    pub pub_address: Option<String>,

    /// Disable pad decoding and assembly
    #[arg(long = "no-pads")]
    pub no_pads: bool,

    /// Disable pixel decoding and assembly
    #[arg(long = "no-pixels")]
    pub no_pixels: bool,

    /// Verbose per-trigger diagnostics
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Routing identifier attached to published batches
    #[arg(long = "routing-id", env = "FOCAL_ROUTING_ID")]
    pub routing_id: Option<u32>,
}

/// Arguments for the synthetic raw data source
#[derive(Parser, Debug, Clone)]
pub struct EmulatorArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Override bind address (e.g., tcp://*:5555)
    #[arg(short, long)]
    pub address: Option<String>,

    /// Run for N batches then exit
    #[arg(short, long)]
    pub batches: Option<u64>,

    /// Batch interval in milliseconds
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Seed for the random generator
    #[arg(long)]
    pub seed: Option<u64>,
}
