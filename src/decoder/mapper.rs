//! Table-driven chip-to-layer mapping

use std::collections::HashMap;

use super::ChipLayerMapper;

/// Chip-to-layer lookup filled from configuration
#[derive(Debug, Clone, Default)]
pub struct TablePixelMapper {
    layers: HashMap<(u16, u8), usize>,
}

impl TablePixelMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(fec_id, chip, layer)` entries; later entries win
    pub fn from_entries(entries: impl IntoIterator<Item = (u16, u8, usize)>) -> Self {
        let mut mapper = Self::new();
        for (fec_id, chip, layer) in entries {
            mapper.insert(fec_id, chip, layer);
        }
        mapper
    }

    /// Map `chip` on `fec_id` to `layer`, returning the previous layer if any
    pub fn insert(&mut self, fec_id: u16, chip: u8, layer: usize) -> Option<usize> {
        self.layers.insert((fec_id, chip), layer)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Front-end cards with at least one mapped chip
    pub fn fec_ids(&self) -> Vec<u16> {
        let mut fecs: Vec<u16> = self.layers.keys().map(|(fec, _)| *fec).collect();
        fecs.sort_unstable();
        fecs.dedup();
        fecs
    }
}

impl ChipLayerMapper for TablePixelMapper {
    fn layer(&self, fec_id: u16, chip: u8) -> Option<usize> {
        self.layers.get(&(fec_id, chip)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_scoped_by_fec() {
        let mapper = TablePixelMapper::from_entries([(0, 3, 0), (1, 3, 1)]);
        assert_eq!(mapper.layer(0, 3), Some(0));
        assert_eq!(mapper.layer(1, 3), Some(1));
        assert_eq!(mapper.layer(2, 3), None);
        assert_eq!(mapper.len(), 2);
    }

    #[test]
    fn insert_overrides() {
        let mut mapper = TablePixelMapper::new();
        assert!(mapper.is_empty());
        assert_eq!(mapper.insert(0, 0, 0), None);
        assert_eq!(mapper.insert(0, 0, 1), Some(0));
        assert_eq!(mapper.layer(0, 0), Some(1));
    }

    #[test]
    fn fec_ids_sorted_unique() {
        let mapper = TablePixelMapper::from_entries([(5, 0, 0), (2, 0, 0), (5, 1, 0)]);
        assert_eq!(mapper.fec_ids(), vec![2, 5]);
    }
}
