//! Diagnostic counters for the event assembler
//!
//! The assembler is single-threaded, so plain integers are enough here.
//! [`AssemblerStats`] accumulates over the lifetime of an assembler,
//! [`CycleReport`] describes one decode-build-emit pass.

/// Lifetime counters of one assembler instance
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssemblerStats {
    /// Completed cycles (published batches)
    pub cycles: u64,
    /// Cycles aborted by a fatal input error
    pub aborted_cycles: u64,
    /// Fragments handed to a decoder
    pub fragments: u64,
    /// Fragments rejected with a decode error
    pub decode_errors: u64,
    /// Fragments ignored because their source is disabled
    pub skipped_fragments: u64,
    /// Pad fragments repeating a trigger already buffered in the HBF
    pub duplicate_pad_triggers: u64,
    /// Pixel fragments merged into an already buffered trigger
    pub merged_pixel_fragments: u64,
    /// Buckets whose pad and pixel counts disagreed
    pub alignment_mismatches: u64,
    /// Pad events dropped as alignment surplus
    pub dropped_pad_events: u64,
    /// Pixel events dropped as alignment surplus
    pub dropped_pixel_events: u64,
    /// Buckets with data from only one enabled source
    pub incomplete_buckets: u64,
    /// Aligned pairs whose pad and pixel trigger IRs differ
    pub ir_disagreements: u64,
    /// Trigger records built
    pub triggers_built: u64,
}

impl AssemblerStats {
    /// Fold one cycle's report into the lifetime counters
    pub fn record_cycle(&mut self, report: &CycleReport) {
        self.cycles += 1;
        self.triggers_built += report.triggers as u64;
    }

    /// Fraction of fragments that failed to decode
    pub fn decode_error_rate(&self) -> f64 {
        if self.fragments == 0 {
            0.0
        } else {
            self.decode_errors as f64 / self.fragments as f64
        }
    }

    /// Total events discarded during alignment
    pub fn dropped_events(&self) -> u64 {
        self.dropped_pad_events + self.dropped_pixel_events
    }

    /// Reset all counters to zero
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Summary of one decode-build-emit cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Sequence number of the published batch
    pub sequence_number: u64,
    /// Fragments in the input batch
    pub fragments: usize,
    /// Fragments rejected with a decode error
    pub decode_errors: usize,
    /// Heartbeat frames visited during build
    pub hbfs: usize,
    /// Trigger records emitted
    pub triggers: usize,
    /// Pixel hits emitted
    pub pixel_hits: usize,
    /// Pad layer events emitted
    pub pad_layers: usize,
}
