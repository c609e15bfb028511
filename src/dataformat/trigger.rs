//! Trigger records and the flattened output batch
//!
//! The output is a structure of arrays: four flat collections plus one
//! [`TriggerRecord`] per trigger holding index ranges into three of them.
//! Downstream consumers depend on this layout.
//!
//! ```text
//! trigger_records:  [ T0 ][ T1 ][ T2 ]
//!                     │     │     │
//! pad_layers:       [ 18 × T0 | 18 × T1 | 18 × T2 ]
//! pixel_chips:      [ c c c | c | c c ]
//! pixel_hits:       [ h h h h h | h h | h h h h ]
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::pad::PadLayerEvent;
use super::pixel::{PixelChipRecord, PixelHit};
use crate::common::InteractionRecord;

/// Half-open index range `[first, first + entries)` into an output collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRange {
    pub first: usize,
    pub entries: usize,
}

impl IndexRange {
    pub fn new(first: usize, entries: usize) -> Self {
        Self { first, entries }
    }

    /// Range between a collection length before and after appending
    #[inline]
    pub fn between(start: usize, end: usize) -> Self {
        Self {
            first: start,
            entries: end - start,
        }
    }

    /// One past the last index
    #[inline]
    pub fn end(&self) -> usize {
        self.first + self.entries
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.first..self.end()
    }
}

/// Output entries belonging to one trigger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub ir: InteractionRecord,
    pub pad_layers: IndexRange,
    pub pixel_hits: IndexRange,
    pub pixel_chips: IndexRange,
}

/// Violations of the batch layout invariants
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchLayoutError {
    #[error("Trigger {index} ({current}) does not follow {previous}")]
    Unordered {
        index: usize,
        previous: InteractionRecord,
        current: InteractionRecord,
    },

    #[error("Trigger {trigger}: {collection} range starts at {found}, expected {expected}")]
    Gap {
        collection: &'static str,
        trigger: usize,
        expected: usize,
        found: usize,
    },

    #[error("{collection}: ranges cover {covered} of {len} entries")]
    Coverage {
        collection: &'static str,
        covered: usize,
        len: usize,
    },

    #[error("Chip record {chip}: hits start at {found}, expected {expected}")]
    ChipHits {
        chip: usize,
        expected: usize,
        found: usize,
    },
}

/// One cycle's built events, published as one unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    /// Routing tag attached by configuration
    pub routing_id: u32,
    /// Cycle counter for loss detection downstream
    pub sequence_number: u64,
    pub trigger_records: Vec<TriggerRecord>,
    pub pixel_hits: Vec<PixelHit>,
    pub pixel_chips: Vec<PixelChipRecord>,
    pub pad_layers: Vec<PadLayerEvent>,
}

/// Borrowed view of one trigger's entries
#[derive(Debug, Clone, Copy)]
pub struct TriggerView<'a> {
    pub record: &'a TriggerRecord,
    pub pad_layers: &'a [PadLayerEvent],
    pub pixel_hits: &'a [PixelHit],
    pub pixel_chips: &'a [PixelChipRecord],
}

impl EventBatch {
    /// Create an empty batch
    pub fn new(routing_id: u32, sequence_number: u64) -> Self {
        Self {
            routing_id,
            sequence_number,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.trigger_records.is_empty()
            && self.pixel_hits.is_empty()
            && self.pixel_chips.is_empty()
            && self.pad_layers.is_empty()
    }

    pub fn n_triggers(&self) -> usize {
        self.trigger_records.len()
    }

    /// Clear the collections, keeping the allocations
    pub fn clear(&mut self) {
        self.trigger_records.clear();
        self.pixel_hits.clear();
        self.pixel_chips.clear();
        self.pad_layers.clear();
    }

    /// Entries of the trigger at `index`
    ///
    /// Returns `None` if the index is out of range or the record points
    /// outside the collections.
    pub fn trigger(&self, index: usize) -> Option<TriggerView<'_>> {
        let record = self.trigger_records.get(index)?;
        Some(TriggerView {
            record,
            pad_layers: self.pad_layers.get(record.pad_layers.range())?,
            pixel_hits: self.pixel_hits.get(record.pixel_hits.range())?,
            pixel_chips: self.pixel_chips.get(record.pixel_chips.range())?,
        })
    }

    /// Iterate over all triggers in order
    pub fn triggers(&self) -> impl Iterator<Item = TriggerView<'_>> {
        (0..self.trigger_records.len()).filter_map(move |i| self.trigger(i))
    }

    /// Check the layout invariants
    ///
    /// Trigger IRs strictly increase; each collection is partitioned by the
    /// trigger ranges without gaps or overlaps; chip records partition the
    /// hit collection in the same way.
    pub fn validate(&self) -> Result<(), BatchLayoutError> {
        for (index, pair) in self.trigger_records.windows(2).enumerate() {
            if pair[1].ir <= pair[0].ir {
                return Err(BatchLayoutError::Unordered {
                    index: index + 1,
                    previous: pair[0].ir,
                    current: pair[1].ir,
                });
            }
        }

        check_partition(
            "pad_layers",
            self.trigger_records.iter().map(|t| t.pad_layers),
            self.pad_layers.len(),
        )?;
        check_partition(
            "pixel_hits",
            self.trigger_records.iter().map(|t| t.pixel_hits),
            self.pixel_hits.len(),
        )?;
        check_partition(
            "pixel_chips",
            self.trigger_records.iter().map(|t| t.pixel_chips),
            self.pixel_chips.len(),
        )?;

        let mut next_hit = 0;
        for (chip, record) in self.pixel_chips.iter().enumerate() {
            if record.first_hit != next_hit {
                return Err(BatchLayoutError::ChipHits {
                    chip,
                    expected: next_hit,
                    found: record.first_hit,
                });
            }
            next_hit += record.n_hits;
        }
        if next_hit != self.pixel_hits.len() {
            return Err(BatchLayoutError::Coverage {
                collection: "pixel_chips",
                covered: next_hit,
                len: self.pixel_hits.len(),
            });
        }

        Ok(())
    }
}

fn check_partition(
    collection: &'static str,
    ranges: impl Iterator<Item = IndexRange>,
    len: usize,
) -> Result<(), BatchLayoutError> {
    let mut next = 0;
    for (trigger, range) in ranges.enumerate() {
        if range.first != next {
            return Err(BatchLayoutError::Gap {
                collection,
                trigger,
                expected: next,
                found: range.first,
            });
        }
        next = range.end();
    }
    if next != len {
        return Err(BatchLayoutError::Coverage {
            collection,
            covered: next,
            len,
        });
    }
    Ok(())
}
