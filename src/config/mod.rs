//! Configuration module for the FOCAL decoder
//!
//! Supports loading configuration from TOML files with sections:
//! - `[decoder]`: assembler options
//! - `[network]`: ZMQ addresses of the decoder
//! - `[emulator]`: synthetic raw data source
//! - `[[pixel_mapping]]`: chip-to-layer table
//!
//! # Example
//! ```ignore
//! let config = Config::load("config.toml")?;
//! let mapper = config.pixel_mapper()?;
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::assembler::AssemblerConfig;
use crate::dataformat::PIXELS_NLAYERS;
use crate::decoder::TablePixelMapper;
use crate::emulator::EmulatorConfig;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid pixel mapping: {0}")]
    InvalidMapping(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub decoder: AssemblerConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub emulator: EmulatorConfig,

    /// Chip-to-layer table of the pixel front-end cards
    #[serde(default)]
    pub pixel_mapping: Vec<ChipPosition>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Build the chip-to-layer mapper from the `[[pixel_mapping]]` entries
    ///
    /// Rejects layers outside the detector and chips listed twice.
    pub fn pixel_mapper(&self) -> Result<TablePixelMapper, ConfigError> {
        let mut seen = HashSet::new();
        for entry in &self.pixel_mapping {
            if entry.layer >= PIXELS_NLAYERS {
                return Err(ConfigError::InvalidMapping(format!(
                    "fec {} chip {}: layer {} out of range (0..{})",
                    entry.fec_id, entry.chip, entry.layer, PIXELS_NLAYERS
                )));
            }
            if !seen.insert((entry.fec_id, entry.chip)) {
                return Err(ConfigError::InvalidMapping(format!(
                    "fec {} chip {} listed more than once",
                    entry.fec_id, entry.chip
                )));
            }
        }

        Ok(TablePixelMapper::from_entries(
            self.pixel_mapping
                .iter()
                .map(|e| (e.fec_id, e.chip, e.layer)),
        ))
    }
}

// =============================================================================
// Network Configuration
// =============================================================================

/// Decoder network configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// ZMQ addresses to subscribe to (raw data sources)
    #[serde(default = "default_subscribe")]
    pub subscribe: Vec<String>,

    /// ZMQ address to publish built events to
    #[serde(default = "default_publish")]
    pub publish: String,

    /// Capacity of the channel between assembler and sender task
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            subscribe: default_subscribe(),
            publish: default_publish(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_subscribe() -> Vec<String> {
    vec!["tcp://localhost:5555".to_string()]
}

fn default_publish() -> String {
    "tcp://*:5557".to_string()
}

fn default_channel_capacity() -> usize {
    1000
}

/// Position of one pixel chip in the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ChipPosition {
    pub fec_id: u16,
    pub chip: u8,
    pub layer: usize,
}
