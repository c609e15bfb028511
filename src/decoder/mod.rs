//! Decoder interfaces used by the event assembler
//!
//! The bit-level pad and pixel decoders and the chip-to-layer mapper are
//! collaborators injected into the assembler. This module defines their
//! contracts and ships:
//! - [`envelope`]: framing of the raw input batch
//! - [`packed`]: MessagePack payload codecs for simulated data
//! - [`mapper`]: table-driven chip-to-layer mapping

pub mod envelope;
pub mod mapper;
pub mod packed;

pub use envelope::{
    is_end_of_stream, RawBatch, RawBatchWriter, RawFragment, SourceKind, END_OF_STREAM_MARKER,
};
pub use mapper::TablePixelMapper;
pub use packed::{PackedPadDecoder, PackedPixelDecoder};

use crate::common::DecodeError;
use crate::dataformat::{PadData, PixelChip};

/// Turns a pad payload into per-channel samples for one trigger
pub trait PadPayloadDecoder {
    /// Smallest payload the decoder can make sense of
    fn min_frame_size(&self) -> usize;

    /// Decode one trigger's pad payload
    fn decode(&mut self, raw: &[u8]) -> Result<PadData, DecodeError>;
}

/// Turns a pixel payload from one front-end card into chip hit records
pub trait PixelPayloadDecoder {
    /// Smallest payload the decoder can make sense of
    fn min_frame_size(&self) -> usize;

    /// Decode one trigger's pixel payload from front-end card `fec_id`
    fn decode(&mut self, raw: &[u8], fec_id: u16) -> Result<Vec<PixelChip>, DecodeError>;
}

/// Resolves a chip to the pixel layer it sits in
pub trait ChipLayerMapper {
    /// Layer index of `chip` on front-end card `fec_id`, if known
    fn layer(&self, fec_id: u16, chip: u8) -> Option<usize>;
}

impl<T: PadPayloadDecoder + ?Sized> PadPayloadDecoder for Box<T> {
    fn min_frame_size(&self) -> usize {
        (**self).min_frame_size()
    }

    fn decode(&mut self, raw: &[u8]) -> Result<PadData, DecodeError> {
        (**self).decode(raw)
    }
}

impl<T: PixelPayloadDecoder + ?Sized> PixelPayloadDecoder for Box<T> {
    fn min_frame_size(&self) -> usize {
        (**self).min_frame_size()
    }

    fn decode(&mut self, raw: &[u8], fec_id: u16) -> Result<Vec<PixelChip>, DecodeError> {
        (**self).decode(raw, fec_id)
    }
}

impl<T: ChipLayerMapper + ?Sized> ChipLayerMapper for Box<T> {
    fn layer(&self, fec_id: u16, chip: u8) -> Option<usize> {
        (**self).layer(fec_id, chip)
    }
}
