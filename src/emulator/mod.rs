//! Emulator raw data source - generates synthetic FOCAL readout for testing
//!
//! Produces raw batches in the input envelope format with packed pad and
//! pixel payloads, and publishes them via a ZeroMQ PUB socket.
//!
//! Each batch covers `hbfs_per_batch` consecutive orbits. Every orbit holds
//! `triggers_per_hbf` triggers at distinct bunch crossings; every trigger
//! gets one pad fragment and one pixel fragment per front-end card.

use std::time::Duration;

use futures::SinkExt;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};
use thiserror::Error;
use tmq::{publish, Context};
use tokio::time::interval;
use tracing::{debug, info};

use crate::common::{InteractionRecord, BUNCHES_PER_ORBIT};
use crate::dataformat::{PadData, PixelChip, PixelHit, PIXELS_NLAYERS};
use crate::decoder::packed::{encode_pad_payload, encode_pixel_payload};
use crate::decoder::{RawBatchWriter, TablePixelMapper, END_OF_STREAM_MARKER};

/// Pixel matrix size of one chip
const CHIP_COLUMNS: u16 = 1024;
const CHIP_ROWS: u16 = 512;

/// Pad pedestal and noise in ADC counts
const PAD_PEDESTAL: f64 = 50.0;
const PAD_NOISE: f64 = 5.0;

/// Emulator configuration
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// ZMQ bind address for data (e.g., "tcp://*:5555")
    pub address: String,
    /// Heartbeat frames (orbits) per published batch
    pub hbfs_per_batch: usize,
    /// Triggers per heartbeat frame
    pub triggers_per_hbf: usize,
    /// Pixel front-end cards to simulate
    pub fec_ids: Vec<u16>,
    /// Chips read out by each front-end card
    pub chips_per_fec: u8,
    /// Mean number of hits per chip and trigger (Poisson)
    pub mean_hits_per_chip: f64,
    /// Interval between batches in milliseconds (0 = full speed)
    pub batch_interval_ms: u64,
    /// Emit pad fragments
    pub pad_enabled: bool,
    /// Emit pixel fragments
    pub pixel_enabled: bool,
    /// Fraction of payloads truncated to exercise decode errors
    pub corrupt_ratio: f64,
    /// Seed for reproducible output
    pub seed: Option<u64>,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            address: "tcp://*:5555".to_string(),
            hbfs_per_batch: 4,
            triggers_per_hbf: 2,
            fec_ids: vec![0, 1],
            chips_per_fec: 4,
            mean_hits_per_chip: 5.0,
            batch_interval_ms: 100,
            pad_enabled: true,
            pixel_enabled: true,
            corrupt_ratio: 0.0,
            seed: None,
        }
    }
}

impl EmulatorConfig {
    /// Chip-to-layer table matching the generated data
    ///
    /// Front-end card `i` of `fec_ids` reads layer `i % PIXELS_NLAYERS`.
    pub fn pixel_mapper(&self) -> TablePixelMapper {
        TablePixelMapper::from_entries(self.fec_ids.iter().enumerate().flat_map(|(i, &fec)| {
            (0..self.chips_per_fec).map(move |chip| (fec, chip, i % PIXELS_NLAYERS))
        }))
    }
}

/// Emulator errors
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("ZMQ error: {0}")]
    Zmq(#[from] tmq::TmqError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("Invalid emulator configuration: {0}")]
    InvalidConfig(String),
}

/// Generates raw batches from a seeded random source
pub struct BatchGenerator {
    config: EmulatorConfig,
    rng: StdRng,
    pad_noise: Normal<f64>,
    hit_count: Poisson<f64>,
    orbit: u32,
    batches: u64,
}

impl BatchGenerator {
    pub fn new(config: EmulatorConfig) -> Result<Self, EmulatorError> {
        if config.triggers_per_hbf > BUNCHES_PER_ORBIT as usize {
            return Err(EmulatorError::InvalidConfig(format!(
                "triggers_per_hbf {} exceeds {} bunch crossings",
                config.triggers_per_hbf, BUNCHES_PER_ORBIT
            )));
        }
        if !(0.0..=1.0).contains(&config.corrupt_ratio) {
            return Err(EmulatorError::InvalidConfig(format!(
                "corrupt_ratio {} not in [0, 1]",
                config.corrupt_ratio
            )));
        }

        let pad_noise = Normal::new(PAD_PEDESTAL, PAD_NOISE)
            .map_err(|e| EmulatorError::InvalidConfig(e.to_string()))?;
        let hit_count = Poisson::new(config.mean_hits_per_chip).map_err(|e| {
            EmulatorError::InvalidConfig(format!(
                "mean_hits_per_chip {}: {}",
                config.mean_hits_per_chip, e
            ))
        })?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            config,
            rng,
            pad_noise,
            hit_count,
            orbit: 0,
            batches: 0,
        })
    }

    /// Batches generated so far
    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Next orbit to be generated
    pub fn orbit(&self) -> u32 {
        self.orbit
    }

    /// Generate the next raw batch
    pub fn next_batch(&mut self) -> Result<Vec<u8>, EmulatorError> {
        let mut writer = RawBatchWriter::new();

        for _ in 0..self.config.hbfs_per_batch {
            let orbit = self.orbit;
            self.orbit = self.orbit.wrapping_add(1);

            let mut bcs: Vec<u16> = index::sample(
                &mut self.rng,
                BUNCHES_PER_ORBIT as usize,
                self.config.triggers_per_hbf,
            )
            .into_iter()
            .map(|bc| bc as u16)
            .collect();
            bcs.sort_unstable();

            for bc in bcs {
                let ir = InteractionRecord::new(orbit, bc);
                if self.config.pad_enabled {
                    let data = self.pad_data();
                    let payload = self.maybe_corrupt(encode_pad_payload(&data)?);
                    writer.push_pad(ir, &payload);
                }
                if self.config.pixel_enabled {
                    for fec_id in self.config.fec_ids.clone() {
                        let chips = self.pixel_chips();
                        let payload = self.maybe_corrupt(encode_pixel_payload(&chips)?);
                        writer.push_pixel(ir, fec_id, &payload);
                    }
                }
            }
        }

        self.batches += 1;
        debug!(
            batch = self.batches,
            fragments = writer.len(),
            next_orbit = self.orbit,
            "Generated raw batch"
        );
        Ok(writer.finish())
    }

    /// Pedestal noise on every channel plus an occasional shower signal
    fn pad_data(&mut self) -> PadData {
        let mut data = PadData::empty();
        for (layer, asic) in data.asics.iter_mut().enumerate() {
            for half in asic.headers.iter_mut() {
                half.header = 0x5;
                half.bc = self.rng.gen_range(0..BUNCHES_PER_ORBIT);
                half.trailer = 0xb;
            }
            for channel in asic.channels.iter_mut() {
                channel.adc = self.pad_noise.sample(&mut self.rng).clamp(0.0, 1023.0) as u16;
                channel.toa = 0;
                channel.tot = 0;
            }
            if self.rng.gen_bool(0.1) {
                let hit = self.rng.gen_range(0..asic.channels.len());
                let channel = &mut asic.channels[hit];
                // Shower maximum around the middle layers
                let depth = 1.0 - (layer as f64 - 6.0).abs() / 12.0;
                channel.adc = (PAD_PEDESTAL + 800.0 * depth.max(0.1)) as u16;
                channel.toa = self.rng.gen_range(1..1024);
                channel.tot = self.rng.gen_range(1..4096);
            }
            asic.cmn = [asic.channels[0]; 2];
        }
        data
    }

    fn pixel_chips(&mut self) -> Vec<PixelChip> {
        (0..self.config.chips_per_fec)
            .map(|chip| {
                let n_hits = self.hit_count.sample(&mut self.rng) as usize;
                let hits = (0..n_hits)
                    .map(|_| {
                        PixelHit::new(
                            self.rng.gen_range(0..CHIP_COLUMNS),
                            self.rng.gen_range(0..CHIP_ROWS),
                        )
                    })
                    .collect();
                PixelChip::new(chip % 4, chip, hits)
            })
            .collect()
    }

    fn maybe_corrupt(&mut self, mut payload: Vec<u8>) -> Vec<u8> {
        if self.config.corrupt_ratio > 0.0 && self.rng.gen_bool(self.config.corrupt_ratio) {
            payload.truncate(2);
        }
        payload
    }
}

/// Emulator data source
///
/// Generates raw batches and publishes via ZeroMQ.
pub struct Emulator {
    config: EmulatorConfig,
    generator: BatchGenerator,
    data_socket: publish::Publish,
}

impl Emulator {
    /// Create a new emulator with the given configuration
    pub async fn new(config: EmulatorConfig) -> Result<Self, EmulatorError> {
        let generator = BatchGenerator::new(config.clone())?;
        let context = Context::new();
        let data_socket = publish(&context).bind(&config.address)?;

        info!(
            data_address = %config.address,
            hbfs_per_batch = config.hbfs_per_batch,
            triggers_per_hbf = config.triggers_per_hbf,
            fecs = config.fec_ids.len(),
            "Emulator bound to data address"
        );

        Ok(Self {
            config,
            generator,
            data_socket,
        })
    }

    /// Batches published so far
    pub fn batches(&self) -> u64 {
        self.generator.batches()
    }

    async fn publish_frame(&mut self, bytes: &[u8]) -> Result<(), EmulatorError> {
        let msg: tmq::Multipart = vec![tmq::Message::from(bytes)].into();
        self.data_socket.send(msg).await?;
        Ok(())
    }

    async fn publish_batch(&mut self) -> Result<(), EmulatorError> {
        let bytes = self.generator.next_batch()?;
        self.publish_frame(&bytes).await?;
        debug!(
            batch = self.generator.batches(),
            bytes = bytes.len(),
            "Published batch"
        );
        Ok(())
    }

    /// Send EOS (End Of Stream) signal
    async fn send_eos(&mut self) -> Result<(), EmulatorError> {
        self.publish_frame(&END_OF_STREAM_MARKER).await?;
        info!(batches = self.generator.batches(), "Published EOS");
        Ok(())
    }

    /// Publish until shutdown is signalled
    ///
    /// If batch_interval_ms is 0, runs at full speed without delay.
    pub async fn run(
        &mut self,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> Result<(), EmulatorError> {
        let use_ticker = self.config.batch_interval_ms > 0;
        let mut ticker = interval(Duration::from_millis(self.config.batch_interval_ms.max(1)));

        info!(
            batch_interval_ms = self.config.batch_interval_ms,
            "Emulator running"
        );

        loop {
            if use_ticker {
                tokio::select! {
                    biased;

                    _ = shutdown.recv() => {
                        info!("Emulator received shutdown signal");
                        break;
                    }

                    _ = ticker.tick() => {
                        self.publish_batch().await?;
                    }
                }
            } else {
                tokio::select! {
                    biased;

                    _ = shutdown.recv() => {
                        info!("Emulator received shutdown signal");
                        break;
                    }

                    _ = tokio::time::sleep(Duration::ZERO) => {}
                }
                self.publish_batch().await?;
            }
        }

        self.send_eos().await?;
        info!(total_batches = self.generator.batches(), "Emulator stopped");
        Ok(())
    }

    /// Run for a fixed number of batches, then send EOS
    pub async fn run_batches(&mut self, count: u64) -> Result<(), EmulatorError> {
        let mut ticker = interval(Duration::from_millis(self.config.batch_interval_ms.max(1)));

        for _ in 0..count {
            ticker.tick().await;
            self.publish_batch().await?;
        }

        self.send_eos().await?;
        info!(total_batches = self.generator.batches(), "Emulator finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{ChipLayerMapper, RawBatch, SourceKind};

    fn seeded(config: EmulatorConfig) -> BatchGenerator {
        BatchGenerator::new(EmulatorConfig {
            seed: Some(7),
            ..config
        })
        .unwrap()
    }

    #[test]
    fn default_config() {
        let config = EmulatorConfig::default();
        assert_eq!(config.address, "tcp://*:5555");
        assert_eq!(config.hbfs_per_batch, 4);
        assert_eq!(config.fec_ids, vec![0, 1]);
        assert!(config.seed.is_none());
    }

    #[test]
    fn batch_layout() {
        let mut gen = seeded(EmulatorConfig::default());
        let bytes = gen.next_batch().unwrap();
        let batch = RawBatch::parse(&bytes).unwrap();

        // 4 orbits x 2 triggers, one pad and two pixel fragments each
        assert_eq!(batch.count(SourceKind::Pad), 8);
        assert_eq!(batch.count(SourceKind::Pixel), 16);
        assert_eq!(gen.orbit(), 4);
        assert_eq!(gen.batches(), 1);

        let orbits: Vec<u32> = batch.fragments().iter().map(|f| f.interaction.orbit).collect();
        assert!(orbits.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn batches_continue_orbits() {
        let mut gen = seeded(EmulatorConfig {
            hbfs_per_batch: 2,
            ..Default::default()
        });
        gen.next_batch().unwrap();
        let bytes = gen.next_batch().unwrap();
        let batch = RawBatch::parse(&bytes).unwrap();
        assert_eq!(batch.fragments()[0].interaction.orbit, 2);
    }

    #[test]
    fn same_seed_same_output() {
        let mut a = seeded(EmulatorConfig::default());
        let mut b = seeded(EmulatorConfig::default());
        assert_eq!(a.next_batch().unwrap(), b.next_batch().unwrap());
    }

    #[test]
    fn disabled_sources_are_omitted() {
        let mut gen = seeded(EmulatorConfig {
            pad_enabled: false,
            ..Default::default()
        });
        let bytes = gen.next_batch().unwrap();
        let batch = RawBatch::parse(&bytes).unwrap();
        assert_eq!(batch.count(SourceKind::Pad), 0);
        assert_eq!(batch.count(SourceKind::Pixel), 16);
    }

    #[test]
    fn full_corruption_truncates_payloads() {
        let mut gen = seeded(EmulatorConfig {
            corrupt_ratio: 1.0,
            ..Default::default()
        });
        let bytes = gen.next_batch().unwrap();
        let batch = RawBatch::parse(&bytes).unwrap();
        assert!(batch.fragments().iter().all(|f| f.payload.len() == 2));
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(matches!(
            BatchGenerator::new(EmulatorConfig {
                mean_hits_per_chip: 0.0,
                ..Default::default()
            }),
            Err(EmulatorError::InvalidConfig(_))
        ));
        assert!(matches!(
            BatchGenerator::new(EmulatorConfig {
                corrupt_ratio: 1.5,
                ..Default::default()
            }),
            Err(EmulatorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn mapper_covers_generated_chips() {
        let config = EmulatorConfig {
            fec_ids: vec![3, 8, 9],
            chips_per_fec: 2,
            ..Default::default()
        };
        let mapper = config.pixel_mapper();
        assert_eq!(mapper.len(), 6);
        assert_eq!(mapper.layer(3, 1), Some(0));
        assert_eq!(mapper.layer(8, 0), Some(1));
        assert_eq!(mapper.layer(9, 1), Some(0));
        assert_eq!(mapper.layer(9, 2), None);
    }

    #[tokio::test]
    async fn test_emulator_creation() {
        let config = EmulatorConfig {
            address: "tcp://127.0.0.1:15655".to_string(),
            seed: Some(1),
            ..Default::default()
        };
        let emulator = Emulator::new(config).await.unwrap();
        assert_eq!(emulator.batches(), 0);
    }
}
