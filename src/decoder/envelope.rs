//! Raw input batch framing
//!
//! Batch structure:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Batch header (12 bytes)                │
//! │  - Magic "FOCRAW01" (8)                 │
//! │  - Fragment count (u32 LE)              │
//! ├─────────────────────────────────────────┤
//! │  Fragment header (16 bytes)             │
//! │  - source u8 (0 = pad, 1 = pixel)       │
//! │  - reserved u8                          │
//! │  - fec_id u16 LE                        │
//! │  - orbit u32 LE, bc u16 LE              │
//! │  - reserved u16                         │
//! │  - payload length u32 LE                │
//! │  Payload                                │
//! ├─────────────────────────────────────────┤
//! │  ...                                    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Parsing is all-or-nothing: any framing violation is a
//! [`FatalInputError`] and no fragment is returned.

use crate::common::{FatalInputError, InteractionRecord};

/// Magic bytes opening every raw batch
pub const BATCH_MAGIC: [u8; 8] = *b"FOCRAW01";

/// Frame sent by a raw data source when it stops
pub const END_OF_STREAM_MARKER: [u8; 8] = *b"FOCEOS01";

/// Batch header size in bytes
pub const BATCH_HEADER_SIZE: usize = 12;

/// Fragment header size in bytes
pub const FRAGMENT_HEADER_SIZE: usize = 16;

/// Whether `data` is an end-of-stream frame rather than a batch
pub fn is_end_of_stream(data: &[u8]) -> bool {
    data == END_OF_STREAM_MARKER
}

/// Sub-detector a fragment comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Pad,
    Pixel,
}

impl SourceKind {
    fn to_byte(self) -> u8 {
        match self {
            SourceKind::Pad => 0,
            SourceKind::Pixel => 1,
        }
    }
}

impl TryFrom<u8> for SourceKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SourceKind::Pad),
            1 => Ok(SourceKind::Pixel),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Pad => write!(f, "pad"),
            SourceKind::Pixel => write!(f, "pixel"),
        }
    }
}

/// One payload fragment borrowed from a raw batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFragment<'a> {
    pub source: SourceKind,
    /// Front-end card (meaningful for pixel fragments)
    pub fec_id: u16,
    /// Trigger the payload belongs to
    pub interaction: InteractionRecord,
    pub payload: &'a [u8],
}

/// Parsed raw batch
#[derive(Debug, Clone, Default)]
pub struct RawBatch<'a> {
    fragments: Vec<RawFragment<'a>>,
}

#[inline]
fn read_u16(data: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([data[pos], data[pos + 1]])
}

#[inline]
fn read_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

impl<'a> RawBatch<'a> {
    /// Parse a complete batch
    pub fn parse(data: &'a [u8]) -> Result<Self, FatalInputError> {
        if data.len() < BATCH_HEADER_SIZE {
            return Err(FatalInputError::TooShort {
                actual: data.len(),
                minimum: BATCH_HEADER_SIZE,
            });
        }
        if data[0..8] != BATCH_MAGIC {
            return Err(FatalInputError::InvalidMagic);
        }

        let count = read_u32(data, 8) as usize;
        // Each fragment needs at least its header; cap the allocation on bogus counts
        let mut fragments =
            Vec::with_capacity(count.min((data.len() - BATCH_HEADER_SIZE) / FRAGMENT_HEADER_SIZE));
        let mut pos = BATCH_HEADER_SIZE;

        for index in 0..count {
            if data.len() - pos < FRAGMENT_HEADER_SIZE {
                return Err(FatalInputError::TruncatedHeader { index });
            }

            let source = SourceKind::try_from(data[pos])
                .map_err(|value| FatalInputError::UnknownSource { index, value })?;
            let fec_id = read_u16(data, pos + 2);
            let orbit = read_u32(data, pos + 4);
            let bc = read_u16(data, pos + 8);
            let payload_len = read_u32(data, pos + 12) as usize;
            pos += FRAGMENT_HEADER_SIZE;

            let interaction = InteractionRecord::new(orbit, bc);
            if !interaction.is_valid() {
                return Err(FatalInputError::InvalidBunchCrossing { index, bc });
            }

            let available = data.len() - pos;
            if payload_len > available {
                return Err(FatalInputError::PayloadOverrun {
                    index,
                    declared: payload_len,
                    available,
                });
            }

            fragments.push(RawFragment {
                source,
                fec_id,
                interaction,
                payload: &data[pos..pos + payload_len],
            });
            pos += payload_len;
        }

        if pos != data.len() {
            return Err(FatalInputError::TrailingBytes(data.len() - pos));
        }

        Ok(Self { fragments })
    }

    pub fn fragments(&self) -> &[RawFragment<'a>] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Number of fragments from `source`
    pub fn count(&self, source: SourceKind) -> usize {
        self.fragments.iter().filter(|f| f.source == source).count()
    }
}

/// Builder for raw batches
#[derive(Debug, Clone)]
pub struct RawBatchWriter {
    buf: Vec<u8>,
    count: u32,
}

impl Default for RawBatchWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl RawBatchWriter {
    pub fn new() -> Self {
        let mut buf = Vec::with_capacity(4096);
        buf.extend_from_slice(&BATCH_MAGIC);
        buf.extend_from_slice(&0u32.to_le_bytes());
        Self { buf, count: 0 }
    }

    /// Append a pad fragment
    pub fn push_pad(&mut self, interaction: InteractionRecord, payload: &[u8]) -> &mut Self {
        self.push(SourceKind::Pad, 0, interaction, payload)
    }

    /// Append a pixel fragment from front-end card `fec_id`
    pub fn push_pixel(
        &mut self,
        interaction: InteractionRecord,
        fec_id: u16,
        payload: &[u8],
    ) -> &mut Self {
        self.push(SourceKind::Pixel, fec_id, interaction, payload)
    }

    /// Append a fragment
    pub fn push(
        &mut self,
        source: SourceKind,
        fec_id: u16,
        interaction: InteractionRecord,
        payload: &[u8],
    ) -> &mut Self {
        self.buf.push(source.to_byte());
        self.buf.push(0);
        self.buf.extend_from_slice(&fec_id.to_le_bytes());
        self.buf.extend_from_slice(&interaction.orbit.to_le_bytes());
        self.buf.extend_from_slice(&interaction.bc.to_le_bytes());
        self.buf.extend_from_slice(&0u16.to_le_bytes());
        self.buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(payload);
        self.count += 1;
        self
    }

    /// Fragments written so far
    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Finish the batch and return its bytes
    pub fn finish(mut self) -> Vec<u8> {
        self.buf[8..12].copy_from_slice(&self.count.to_le_bytes());
        self.buf
    }
}
