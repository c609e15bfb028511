//! Pixel detector data

use serde::{Deserialize, Serialize};

/// Number of pixel layers
pub const PIXELS_NLAYERS: usize = 2;

/// One trigger's worth of pixel layers
pub type PixelEvent = [PixelLayerEvent; PIXELS_NLAYERS];

/// A fired pixel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelHit {
    pub column: u16,
    pub row: u16,
}

impl PixelHit {
    pub fn new(column: u16, row: u16) -> Self {
        Self { column, row }
    }
}

/// Hits of one chip as delivered by the pixel decoder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelChip {
    /// Readout lane of the chip
    pub lane: u8,
    /// Chip identifier, scoped by front-end card
    pub chip: u8,
    /// Status bits reported by the chip trailer
    pub status: u16,
    pub hits: Vec<PixelHit>,
}

impl PixelChip {
    pub fn new(lane: u8, chip: u8, hits: Vec<PixelHit>) -> Self {
        Self {
            lane,
            chip,
            status: 0,
            hits,
        }
    }

    /// Whether both describe the same physical chip
    #[inline]
    pub fn same_chip(&self, other: &PixelChip) -> bool {
        self.lane == other.lane && self.chip == other.chip
    }
}

/// One pixel layer's chips for one trigger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelLayerEvent {
    chips: Vec<PixelChip>,
}

impl PixelLayerEvent {
    /// Add a chip; hits of a chip already present are appended to it
    pub fn add_chip(&mut self, chip: PixelChip) {
        match self.chips.iter_mut().find(|c| c.same_chip(&chip)) {
            Some(existing) => {
                existing.status |= chip.status;
                existing.hits.extend(chip.hits);
            }
            None => self.chips.push(chip),
        }
    }

    /// Fold all chips of another layer event into this one
    pub fn merge(&mut self, other: PixelLayerEvent) {
        for chip in other.chips {
            self.add_chip(chip);
        }
    }

    pub fn chips(&self) -> &[PixelChip] {
        &self.chips
    }

    pub fn into_chips(self) -> Vec<PixelChip> {
        self.chips
    }

    /// Total hits over all chips
    pub fn n_hits(&self) -> usize {
        self.chips.iter().map(|c| c.hits.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chips.is_empty()
    }
}

/// Flattened chip: position of its hits in the batch hit collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelChipRecord {
    pub layer: u8,
    pub lane: u8,
    pub chip: u8,
    pub status: u16,
    /// Index of the first hit in the pixel hit collection
    pub first_hit: usize,
    /// Number of hits belonging to this chip
    pub n_hits: usize,
}

impl PixelChipRecord {
    /// Index range of this chip's hits
    pub fn hit_range(&self) -> std::ops::Range<usize> {
        self.first_hit..self.first_hit + self.n_hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_chip_merges_same_chip() {
        let mut layer = PixelLayerEvent::default();
        layer.add_chip(PixelChip::new(0, 1, vec![PixelHit::new(1, 1)]));
        layer.add_chip(PixelChip::new(0, 2, vec![PixelHit::new(2, 2)]));
        let mut again = PixelChip::new(0, 1, vec![PixelHit::new(3, 3)]);
        again.status = 0x4;
        layer.add_chip(again);

        assert_eq!(layer.chips().len(), 2);
        assert_eq!(layer.chips()[0].hits.len(), 2);
        assert_eq!(layer.chips()[0].status, 0x4);
        assert_eq!(layer.n_hits(), 3);
    }

    #[test]
    fn same_chip_id_on_other_lane_is_distinct() {
        let mut layer = PixelLayerEvent::default();
        layer.add_chip(PixelChip::new(0, 1, vec![]));
        layer.add_chip(PixelChip::new(1, 1, vec![]));
        assert_eq!(layer.chips().len(), 2);
    }

    #[test]
    fn merge_layers() {
        let mut a = PixelLayerEvent::default();
        a.add_chip(PixelChip::new(0, 0, vec![PixelHit::new(0, 0)]));
        let mut b = PixelLayerEvent::default();
        b.add_chip(PixelChip::new(0, 0, vec![PixelHit::new(5, 5)]));
        b.add_chip(PixelChip::new(0, 9, vec![]));
        a.merge(b);
        assert_eq!(a.chips().len(), 2);
        assert_eq!(a.n_hits(), 2);
        assert!(!a.is_empty());
    }

    #[test]
    fn chip_record_hit_range() {
        let rec = PixelChipRecord {
            first_hit: 4,
            n_hits: 3,
            ..Default::default()
        };
        assert_eq!(rec.hit_range(), 4..7);
    }
}
