//! Packed payload codecs
//!
//! Simulated payloads carry already-unpacked structures instead of detector
//! words: a 4-byte little-endian body length followed by a MessagePack
//! body (`PadData` for pads, `Vec<PixelChip>` for pixels). The emulator
//! writes this format and the decoder binary reads it.

use std::collections::HashSet;

use tracing::debug;

use super::{PadPayloadDecoder, PixelPayloadDecoder};
use crate::common::DecodeError;
use crate::dataformat::{PadData, PixelChip};

mod constants {
    pub const LENGTH_PREFIX_SIZE: usize = 4;
    /// Length prefix plus at least one body byte
    pub const MIN_FRAME_SIZE: usize = LENGTH_PREFIX_SIZE + 1;
}

pub use constants::MIN_FRAME_SIZE;

/// Validate the length prefix and return the body
fn unpack_body(raw: &[u8]) -> Result<&[u8], DecodeError> {
    if raw.len() < constants::MIN_FRAME_SIZE {
        return Err(DecodeError::TooShort {
            actual: raw.len(),
            minimum: constants::MIN_FRAME_SIZE,
        });
    }

    let declared = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
    let body = &raw[constants::LENGTH_PREFIX_SIZE..];
    if declared != body.len() {
        return Err(DecodeError::LengthMismatch {
            declared,
            actual: body.len(),
        });
    }
    Ok(body)
}

fn pack_body(body: Vec<u8>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(constants::LENGTH_PREFIX_SIZE + body.len());
    buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
    buf.extend_from_slice(&body);
    buf
}

/// Encode a pad payload
pub fn encode_pad_payload(data: &PadData) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    Ok(pack_body(rmp_serde::to_vec(data)?))
}

/// Encode a pixel payload
pub fn encode_pixel_payload(chips: &[PixelChip]) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    Ok(pack_body(rmp_serde::to_vec(chips)?))
}

/// Pad decoder for packed payloads
#[derive(Debug, Clone, Default)]
pub struct PackedPadDecoder {
    decoded: u64,
}

impl PackedPadDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads decoded successfully so far
    pub fn decoded(&self) -> u64 {
        self.decoded
    }
}

impl PadPayloadDecoder for PackedPadDecoder {
    fn min_frame_size(&self) -> usize {
        constants::MIN_FRAME_SIZE
    }

    fn decode(&mut self, raw: &[u8]) -> Result<PadData, DecodeError> {
        let body = unpack_body(raw)?;
        let data: PadData =
            rmp_serde::from_slice(body).map_err(|e| DecodeError::Corrupted(e.to_string()))?;
        self.decoded += 1;
        Ok(data)
    }
}

/// Pixel decoder for packed payloads
///
/// Optionally restricted to a set of front-end cards; payloads from any
/// other card are rejected.
#[derive(Debug, Clone, Default)]
pub struct PackedPixelDecoder {
    fecs: Option<HashSet<u16>>,
    decoded: u64,
}

impl PackedPixelDecoder {
    /// Decoder accepting every front-end card
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder accepting only the listed front-end cards
    pub fn with_fecs(fecs: impl IntoIterator<Item = u16>) -> Self {
        Self {
            fecs: Some(fecs.into_iter().collect()),
            decoded: 0,
        }
    }

    /// Payloads decoded successfully so far
    pub fn decoded(&self) -> u64 {
        self.decoded
    }
}

impl PixelPayloadDecoder for PackedPixelDecoder {
    fn min_frame_size(&self) -> usize {
        constants::MIN_FRAME_SIZE
    }

    fn decode(&mut self, raw: &[u8], fec_id: u16) -> Result<Vec<PixelChip>, DecodeError> {
        if let Some(fecs) = &self.fecs {
            if !fecs.contains(&fec_id) {
                return Err(DecodeError::UnknownFec(fec_id));
            }
        }

        let body = unpack_body(raw)?;
        let chips: Vec<PixelChip> =
            rmp_serde::from_slice(body).map_err(|e| DecodeError::Corrupted(e.to_string()))?;
        debug!(fec_id, chips = chips.len(), "Decoded pixel payload");
        self.decoded += 1;
        Ok(chips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataformat::PixelHit;

    #[test]
    fn pad_payload_decodes() {
        let mut data = PadData::empty();
        data.asics[0].channels[1].adc = 321;
        let payload = encode_pad_payload(&data).unwrap();

        let mut decoder = PackedPadDecoder::new();
        let decoded = decoder.decode(&payload).unwrap();
        assert_eq!(decoded, data);
        assert_eq!(decoder.decoded(), 1);
    }

    #[test]
    fn pixel_payload_decodes() {
        let chips = vec![PixelChip::new(
            0,
            4,
            vec![PixelHit::new(10, 20), PixelHit::new(11, 20)],
        )];
        let payload = encode_pixel_payload(&chips).unwrap();

        let mut decoder = PackedPixelDecoder::new();
        assert_eq!(decoder.decode(&payload, 7).unwrap(), chips);
    }

    #[test]
    fn short_payload_is_rejected() {
        let mut decoder = PackedPixelDecoder::new();
        let err = decoder.decode(&[1, 0, 0], 0).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TooShort {
                actual: 3,
                minimum: MIN_FRAME_SIZE
            }
        );
        assert_eq!(decoder.decoded(), 0);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let mut payload = encode_pixel_payload(&[]).unwrap();
        payload.push(0);
        let mut decoder = PackedPixelDecoder::new();
        assert!(matches!(
            decoder.decode(&payload, 0),
            Err(DecodeError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn garbage_body_is_corrupted() {
        let payload = pack_body(vec![0xc1, 0xc1]); // 0xc1 is never valid MessagePack
        let mut decoder = PackedPadDecoder::new();
        assert!(matches!(
            decoder.decode(&payload),
            Err(DecodeError::Corrupted(_))
        ));
    }

    #[test]
    fn unknown_fec_is_rejected() {
        let payload = encode_pixel_payload(&[]).unwrap();
        let mut decoder = PackedPixelDecoder::with_fecs([1, 2]);
        assert!(decoder.decode(&payload, 2).is_ok());
        assert_eq!(
            decoder.decode(&payload, 3).unwrap_err(),
            DecodeError::UnknownFec(3)
        );
    }
}
