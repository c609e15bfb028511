//! Detector data formats
//!
//! Decoder-side structures (what the payload decoders hand over) and
//! output-side structures (the flattened event batch).

pub mod pad;
pub mod pixel;
pub mod trigger;

pub use pad::{
    create_pad_event, PadAsic, PadAsicHeader, PadChannel, PadData, PadEvent, PadLayerEvent,
    PADS_NCHANNELS, PADS_NHALVES, PADS_NLAYERS,
};
pub use pixel::{PixelChip, PixelChipRecord, PixelEvent, PixelHit, PixelLayerEvent, PIXELS_NLAYERS};
pub use trigger::{BatchLayoutError, EventBatch, IndexRange, TriggerRecord, TriggerView};
