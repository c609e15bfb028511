//! Event assembler - decodes pad and pixel fragments and builds trigger records
//!
//! Architecture:
//! - Decode: each fragment goes to its payload decoder; the result is
//!   buffered in the bucket of its heartbeat frame (HBF), keyed by
//!   interaction record in an ordered map
//! - Build: buckets are walked in increasing IR order; inside a bucket both
//!   sides are sorted by trigger IR, pad entry `i` is paired with pixel
//!   entry `i` and the pair is flattened into the output collections
//! - Emit: the four collections are handed to an [`OutputSink`] as one
//!   batch and all buffers are cleared
//!
//! One cycle is `decode × N → build → emit`. A framing error in the input
//! batch aborts the cycle before any bucket is touched.

pub mod sink;

pub use sink::OutputSink;

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::common::{
    AssemblerState, AssemblerStats, CycleReport, DecodeError, InteractionRecord, PipelineError,
    PipelineResult,
};
use crate::dataformat::{
    create_pad_event, EventBatch, IndexRange, PadEvent, PixelChip, PixelChipRecord, PixelEvent,
    TriggerRecord, PIXELS_NLAYERS,
};
use crate::decoder::{
    ChipLayerMapper, PadPayloadDecoder, PixelPayloadDecoder, RawBatch, RawFragment, SourceKind,
};

/// Assembler configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Decode and assemble pad data
    pub use_pad_data: bool,
    /// Decode and assemble pixel data
    pub use_pixel_data: bool,
    /// Verbose per-bucket and per-trigger diagnostics
    pub debug_mode: bool,
    /// Routing tag attached to published batches
    pub output_routing_id: u32,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            use_pad_data: true,
            use_pixel_data: true,
            debug_mode: false,
            output_routing_id: 0,
        }
    }
}

/// Data buffered for one heartbeat frame
#[derive(Debug, Clone, Default)]
pub struct HbfBucket {
    pad_events: Vec<PadEvent>,
    pad_triggers: Vec<InteractionRecord>,
    pixel_events: Vec<PixelEvent>,
    pixel_triggers: Vec<InteractionRecord>,
}

impl HbfBucket {
    pub fn pad_events(&self) -> &[PadEvent] {
        &self.pad_events
    }

    pub fn pad_triggers(&self) -> &[InteractionRecord] {
        &self.pad_triggers
    }

    pub fn pixel_events(&self) -> &[PixelEvent] {
        &self.pixel_events
    }

    pub fn pixel_triggers(&self) -> &[InteractionRecord] {
        &self.pixel_triggers
    }

    pub fn is_empty(&self) -> bool {
        self.pad_events.is_empty() && self.pixel_events.is_empty()
    }

    /// Pad and pixel entries, each sorted by trigger IR
    ///
    /// Arrival order inside a heartbeat frame is not guaranteed; positional
    /// pairing runs over the sorted sequences.
    fn into_ordered(
        self,
    ) -> (
        Vec<(PadEvent, InteractionRecord)>,
        Vec<(PixelEvent, InteractionRecord)>,
    ) {
        let mut pads: Vec<_> = self.pad_events.into_iter().zip(self.pad_triggers).collect();
        let mut pixels: Vec<_> = self
            .pixel_events
            .into_iter()
            .zip(self.pixel_triggers)
            .collect();
        pads.sort_by_key(|(_, ir)| *ir);
        pixels.sort_by_key(|(_, ir)| *ir);
        (pads, pixels)
    }

    /// Append a pad event; returns false if the trigger is already buffered
    fn push_pad(&mut self, trigger: InteractionRecord, event: PadEvent) -> bool {
        if self.pad_triggers.contains(&trigger) {
            return false;
        }
        self.pad_triggers.push(trigger);
        self.pad_events.push(event);
        true
    }

    /// Add pixel layers for a trigger; returns true if merged into an existing entry
    fn add_pixel(&mut self, trigger: InteractionRecord, event: PixelEvent) -> bool {
        match self.pixel_triggers.iter().position(|t| *t == trigger) {
            Some(index) => {
                for (layer, incoming) in self.pixel_events[index].iter_mut().zip(event) {
                    layer.merge(incoming);
                }
                true
            }
            None => {
                self.pixel_triggers.push(trigger);
                self.pixel_events.push(event);
                false
            }
        }
    }
}

/// Decodes raw fragments and assembles them into per-trigger records
///
/// The payload decoders and the chip mapper are owned collaborators fixed
/// at configuration time.
pub struct EventAssembler<P, X, M> {
    config: AssemblerConfig,
    state: AssemblerState,
    pad_decoder: P,
    pixel_decoder: X,
    mapper: M,
    hbfs: BTreeMap<InteractionRecord, HbfBucket>,
    output: EventBatch,
    cycle: CycleReport,
    sequence_number: u64,
    stats: AssemblerStats,
}

impl<P, X, M> EventAssembler<P, X, M>
where
    P: PadPayloadDecoder,
    X: PixelPayloadDecoder,
    M: ChipLayerMapper,
{
    /// Create an assembler ready for its first cycle
    pub fn configure(config: AssemblerConfig, pad_decoder: P, pixel_decoder: X, mapper: M) -> Self {
        info!(
            use_pad_data = config.use_pad_data,
            use_pixel_data = config.use_pixel_data,
            debug_mode = config.debug_mode,
            routing_id = config.output_routing_id,
            "Event assembler configured"
        );
        if !config.use_pad_data && !config.use_pixel_data {
            warn!("Pad and pixel data both disabled, every batch will be empty");
        }

        Self {
            output: EventBatch::new(config.output_routing_id, 0),
            config,
            state: AssemblerState::Configured,
            pad_decoder,
            pixel_decoder,
            mapper,
            hbfs: BTreeMap::new(),
            cycle: CycleReport::default(),
            sequence_number: 0,
            stats: AssemblerStats::default(),
        }
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    pub fn stats(&self) -> &AssemblerStats {
        &self.stats
    }

    /// Number of heartbeat frames currently buffered
    pub fn buffered_hbfs(&self) -> usize {
        self.hbfs.len()
    }

    /// Bucket of the heartbeat frame containing `interaction`
    pub fn bucket(&self, interaction: InteractionRecord) -> Option<&HbfBucket> {
        self.hbfs.get(&interaction.heartbeat_frame())
    }

    /// Output built so far in the current cycle
    pub fn pending_output(&self) -> &EventBatch {
        &self.output
    }

    fn transition(&mut self, target: AssemblerState, expected: &str) -> PipelineResult<()> {
        if !self.state.can_transition_to(target) {
            return Err(PipelineError::invalid_state(expected, self.state));
        }
        self.state = target;
        Ok(())
    }

    /// Decode one pad fragment and buffer it for `interaction`
    ///
    /// A decode failure is counted and returned; nothing is buffered for
    /// the fragment and the cycle can continue.
    pub fn decode_pad_data(
        &mut self,
        raw: &[u8],
        interaction: InteractionRecord,
    ) -> PipelineResult<()> {
        self.transition(AssemblerState::Decoding, "Configured or Decoding")?;
        if !self.config.use_pad_data {
            self.stats.skipped_fragments += 1;
            return Ok(());
        }
        self.stats.fragments += 1;
        self.cycle.fragments += 1;

        let event = match self.decode_pad_event(raw) {
            Ok(event) => event,
            Err(e) => {
                self.record_decode_error();
                warn!(%interaction, error = %e, "Skipping pad fragment");
                return Err(e.into());
            }
        };

        let hbf = interaction.heartbeat_frame();
        if !self.hbfs.entry(hbf).or_default().push_pad(interaction, event) {
            self.stats.duplicate_pad_triggers += 1;
            warn!(%interaction, "Pad trigger already buffered, fragment dropped");
        } else if self.config.debug_mode {
            info!(%interaction, %hbf, bytes = raw.len(), "Buffered pad event");
        }
        Ok(())
    }

    fn decode_pad_event(&mut self, raw: &[u8]) -> Result<PadEvent, DecodeError> {
        let minimum = self.pad_decoder.min_frame_size();
        if raw.len() < minimum {
            return Err(DecodeError::TooShort {
                actual: raw.len(),
                minimum,
            });
        }
        let data = self.pad_decoder.decode(raw)?;
        create_pad_event(&data)
    }

    /// Decode one pixel fragment from front-end card `fec_id` and buffer it
    ///
    /// Fragments from several cards for the same trigger are merged into
    /// one entry. Decode failures behave as for pads.
    pub fn decode_pixel_data(
        &mut self,
        raw: &[u8],
        interaction: InteractionRecord,
        fec_id: u16,
    ) -> PipelineResult<()> {
        self.transition(AssemblerState::Decoding, "Configured or Decoding")?;
        if !self.config.use_pixel_data {
            self.stats.skipped_fragments += 1;
            return Ok(());
        }
        self.stats.fragments += 1;
        self.cycle.fragments += 1;

        let event = match self.decode_pixel_event(raw, fec_id) {
            Ok(event) => event,
            Err(e) => {
                self.record_decode_error();
                warn!(%interaction, fec_id, error = %e, "Skipping pixel fragment");
                return Err(e.into());
            }
        };

        let hbf = interaction.heartbeat_frame();
        let merged = self.hbfs.entry(hbf).or_default().add_pixel(interaction, event);
        if merged {
            self.stats.merged_pixel_fragments += 1;
        }
        if self.config.debug_mode {
            info!(%interaction, %hbf, fec_id, merged, "Buffered pixel event");
        }
        Ok(())
    }

    fn decode_pixel_event(&mut self, raw: &[u8], fec_id: u16) -> Result<PixelEvent, DecodeError> {
        let minimum = self.pixel_decoder.min_frame_size();
        if raw.len() < minimum {
            return Err(DecodeError::TooShort {
                actual: raw.len(),
                minimum,
            });
        }
        let chips = self.pixel_decoder.decode(raw, fec_id)?;
        self.fill_chips_to_layers(fec_id, chips)
    }

    /// Sort chips into layers; fails without partial result on any unmapped chip
    fn fill_chips_to_layers(
        &self,
        fec_id: u16,
        chips: Vec<PixelChip>,
    ) -> Result<PixelEvent, DecodeError> {
        let mut layers: PixelEvent = Default::default();
        for chip in chips {
            let layer = self
                .mapper
                .layer(fec_id, chip.chip)
                .ok_or(DecodeError::UnmappedChip {
                    fec_id,
                    chip: chip.chip,
                })?;
            let target = layers
                .get_mut(layer)
                .ok_or(DecodeError::LayerOutOfRange {
                    fec_id,
                    chip: chip.chip,
                    layer,
                    n_layers: PIXELS_NLAYERS,
                })?;
            target.add_chip(chip);
        }
        Ok(layers)
    }

    fn record_decode_error(&mut self) {
        self.stats.decode_errors += 1;
        self.cycle.decode_errors += 1;
    }

    /// Dispatch a fragment to the decoder of its source
    pub fn process_fragment(&mut self, fragment: &RawFragment<'_>) -> PipelineResult<()> {
        match fragment.source {
            SourceKind::Pad => self.decode_pad_data(fragment.payload, fragment.interaction),
            SourceKind::Pixel => {
                self.decode_pixel_data(fragment.payload, fragment.interaction, fragment.fec_id)
            }
        }
    }

    /// Flatten all buffered heartbeat frames into trigger records
    pub fn build_events(&mut self) -> PipelineResult<()> {
        self.transition(AssemblerState::Built, "Configured or Decoding")?;

        let hbfs = std::mem::take(&mut self.hbfs);
        self.cycle.hbfs = hbfs.len();
        for (hbf, bucket) in hbfs {
            self.build_hbf(hbf, bucket);
        }
        Ok(())
    }

    fn build_hbf(&mut self, hbf: InteractionRecord, bucket: HbfBucket) {
        let (pads, pixels) = bucket.into_ordered();

        if self.config.debug_mode {
            info!(
                %hbf,
                pad_events = pads.len(),
                pixel_events = pixels.len(),
                "Building heartbeat frame"
            );
        }

        match (self.config.use_pad_data, self.config.use_pixel_data) {
            (true, true) => {
                let n_pad = pads.len();
                let n_pixel = pixels.len();
                if n_pad != n_pixel {
                    if n_pad == 0 || n_pixel == 0 {
                        self.stats.incomplete_buckets += 1;
                        warn!(%hbf, n_pad, n_pixel, "Incomplete heartbeat frame dropped");
                    } else {
                        self.stats.alignment_mismatches += 1;
                        warn!(
                            %hbf,
                            n_pad,
                            n_pixel,
                            "Pad/pixel trigger count mismatch, aligning to shorter sequence"
                        );
                    }
                    self.stats.dropped_pad_events += n_pad.saturating_sub(n_pixel) as u64;
                    self.stats.dropped_pixel_events += n_pixel.saturating_sub(n_pad) as u64;
                }

                for ((pad_event, pad_ir), (pixel_event, pixel_ir)) in pads.into_iter().zip(pixels)
                {
                    // Pairing is positional; a differing IR is only reported
                    if pad_ir != pixel_ir {
                        self.stats.ir_disagreements += 1;
                        debug!(%hbf, %pad_ir, %pixel_ir, "Paired triggers have different IRs");
                    }
                    self.push_trigger(pixel_ir, Some(pad_event), Some(pixel_event));
                }
            }
            (false, true) => {
                for (pixel_event, ir) in pixels {
                    self.push_trigger(ir, None, Some(pixel_event));
                }
            }
            (true, false) => {
                for (pad_event, ir) in pads {
                    self.push_trigger(ir, Some(pad_event), None);
                }
            }
            (false, false) => {}
        }
    }

    fn push_trigger(
        &mut self,
        ir: InteractionRecord,
        pads: Option<PadEvent>,
        pixels: Option<PixelEvent>,
    ) {
        let out = &mut self.output;

        let hit_start = out.pixel_hits.len();
        let chip_start = out.pixel_chips.len();
        if let Some(layers) = pixels {
            fill_event_pixel_hits(out, layers);
        }

        let pad_start = out.pad_layers.len();
        if let Some(layers) = pads {
            out.pad_layers.extend(layers);
        }

        let record = TriggerRecord {
            ir,
            pad_layers: IndexRange::between(pad_start, out.pad_layers.len()),
            pixel_hits: IndexRange::between(hit_start, out.pixel_hits.len()),
            pixel_chips: IndexRange::between(chip_start, out.pixel_chips.len()),
        };

        if self.config.debug_mode {
            info!(
                %ir,
                pad_layers = record.pad_layers.entries,
                pixel_chips = record.pixel_chips.entries,
                pixel_hits = record.pixel_hits.entries,
                "Built trigger"
            );
        }
        out.trigger_records.push(record);
    }

    /// Take the built batch and start a new cycle
    pub fn take_output(&mut self) -> PipelineResult<EventBatch> {
        self.finish_cycle().map(|(batch, _)| batch)
    }

    fn finish_cycle(&mut self) -> PipelineResult<(EventBatch, CycleReport)> {
        if self.state != AssemblerState::Built {
            return Err(PipelineError::invalid_state("Built", self.state));
        }
        self.transition(AssemblerState::Configured, "Built")?;

        let next = EventBatch::new(self.config.output_routing_id, self.sequence_number + 1);
        let batch = std::mem::replace(&mut self.output, next);
        self.sequence_number += 1;

        let mut report = std::mem::take(&mut self.cycle);
        report.sequence_number = batch.sequence_number;
        report.triggers = batch.trigger_records.len();
        report.pixel_hits = batch.pixel_hits.len();
        report.pad_layers = batch.pad_layers.len();
        self.stats.record_cycle(&report);

        Ok((batch, report))
    }

    /// Hand the built batch to `sink` and clear all buffers
    pub fn emit<S: OutputSink + ?Sized>(&mut self, sink: &mut S) -> PipelineResult<CycleReport> {
        let (batch, report) = self.finish_cycle()?;
        if self.config.debug_mode {
            info!(
                sequence = report.sequence_number,
                triggers = report.triggers,
                pixel_hits = report.pixel_hits,
                pad_layers = report.pad_layers,
                "Emitting batch"
            );
        }
        sink.publish(batch)?;
        Ok(report)
    }

    /// Drop everything buffered in the current cycle
    pub fn abort_cycle(&mut self) -> PipelineResult<()> {
        if self.state == AssemblerState::TornDown {
            return Err(PipelineError::invalid_state(
                "Configured, Decoding or Built",
                self.state,
            ));
        }
        let dropped_hbfs = self.hbfs.len();
        self.reset_containers();
        self.state = AssemblerState::Configured;
        self.stats.aborted_cycles += 1;
        warn!(dropped_hbfs, "Cycle aborted, buffers cleared");
        Ok(())
    }

    fn reset_containers(&mut self) {
        self.hbfs.clear();
        self.output.clear();
        self.cycle = CycleReport::default();
    }

    /// Run one complete cycle over a raw input batch
    ///
    /// The envelope is parsed completely before any fragment is decoded, so
    /// a framing error leaves no trace. Decode errors of single fragments are
    /// counted and the cycle continues.
    pub fn run_cycle<S: OutputSink + ?Sized>(
        &mut self,
        data: &[u8],
        sink: &mut S,
    ) -> PipelineResult<CycleReport> {
        if !self.state.accepts_input() {
            return Err(PipelineError::invalid_state(
                "Configured or Decoding",
                self.state,
            ));
        }

        let batch = match RawBatch::parse(data) {
            Ok(batch) => batch,
            Err(e) => {
                self.abort_cycle()?;
                warn!(error = %e, bytes = data.len(), "Unparsable input batch");
                return Err(e.into());
            }
        };

        for fragment in batch.fragments() {
            if let Err(e) = self.process_fragment(fragment) {
                if !e.is_recoverable() {
                    return Err(e);
                }
            }
        }

        self.build_events()?;
        self.emit(sink)
    }

    /// End the lifecycle; buffered data is dropped
    pub fn teardown(&mut self) -> PipelineResult<AssemblerStats> {
        self.transition(AssemblerState::TornDown, "Configured, Decoding or Built")?;

        let pending = self.hbfs.len();
        if pending > 0 {
            self.stats.incomplete_buckets += pending as u64;
            warn!(pending, "Dropping buffered heartbeat frames at teardown");
        }
        self.reset_containers();

        info!(
            cycles = self.stats.cycles,
            aborted = self.stats.aborted_cycles,
            fragments = self.stats.fragments,
            decode_errors = self.stats.decode_errors,
            triggers = self.stats.triggers_built,
            alignment_mismatches = self.stats.alignment_mismatches,
            incomplete_buckets = self.stats.incomplete_buckets,
            "Event assembler torn down"
        );
        Ok(self.stats.clone())
    }
}

/// Append the hits of every chip, layer by layer, with one chip record each
fn fill_event_pixel_hits(out: &mut EventBatch, layers: PixelEvent) {
    for (layer, event) in layers.into_iter().enumerate() {
        for chip in event.into_chips() {
            let first_hit = out.pixel_hits.len();
            let n_hits = chip.hits.len();
            out.pixel_hits.extend(chip.hits);
            out.pixel_chips.push(PixelChipRecord {
                layer: layer as u8,
                lane: chip.lane,
                chip: chip.chip,
                status: chip.status,
                first_hit,
                n_hits,
            });
        }
    }
}
