//! Error types for the decoder pipeline
//!
//! Three severities, matching how far a failure propagates:
//! - [`DecodeError`]: one payload fragment is malformed. The fragment is
//!   skipped and the cycle continues.
//! - [`FatalInputError`]: the batch envelope cannot be parsed. The whole
//!   cycle is aborted and nothing is published.
//! - [`PipelineError`]: everything a caller of the assembler or the
//!   transport layer can see, wrapping the two above.

use thiserror::Error;

use super::state::AssemblerState;

/// Malformed payload for a single fragment
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Payload too short: {actual} bytes, decoder needs at least {minimum}")]
    TooShort { actual: usize, minimum: usize },

    #[error("Payload length mismatch: header says {declared} bytes, {actual} available")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Corrupted payload: {0}")]
    Corrupted(String),

    #[error("Expected {expected} pad layers, decoder returned {actual}")]
    PadLayerCount { expected: usize, actual: usize },

    #[error("Pad layer {layer}: expected {expected} channels, got {actual}")]
    PadChannelCount {
        layer: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Front-end card {0} is not configured")]
    UnknownFec(u16),

    #[error("No layer mapping for chip {chip} on FEC {fec_id}")]
    UnmappedChip { fec_id: u16, chip: u8 },

    #[error("Chip {chip} on FEC {fec_id} maps to layer {layer}, only {n_layers} pixel layers exist")]
    LayerOutOfRange {
        fec_id: u16,
        chip: u8,
        layer: usize,
        n_layers: usize,
    },
}

/// Batch framing violation that makes the whole input unparsable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FatalInputError {
    #[error("Batch too short: {actual} bytes, need at least {minimum}")]
    TooShort { actual: usize, minimum: usize },

    #[error("Invalid batch magic")]
    InvalidMagic,

    #[error("Fragment {index}: header truncated")]
    TruncatedHeader { index: usize },

    #[error("Fragment {index}: unknown source kind {value}")]
    UnknownSource { index: usize, value: u8 },

    #[error("Fragment {index}: bunch crossing {bc} outside the orbit")]
    InvalidBunchCrossing { index: usize, bc: u16 },

    #[error("Fragment {index}: payload of {declared} bytes overruns batch ({available} left)")]
    PayloadOverrun {
        index: usize,
        declared: usize,
        available: usize,
    },

    #[error("{0} trailing bytes after last fragment")]
    TrailingBytes(usize),
}

/// Pipeline errors seen by callers of the assembler and transport
#[derive(Error, Debug)]
pub enum PipelineError {
    /// One fragment could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Input batch framing is broken, cycle aborted
    #[error("Fatal input error: {0}")]
    Fatal(#[from] FatalInputError),

    /// Output channel is full, batch dropped
    #[error("Output channel full: batch dropped")]
    ChannelFull,

    /// Channel send failed (receiver dropped)
    #[error("Channel send failed: receiver dropped")]
    ChannelSend,

    /// Assembler not in a state that allows the operation
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

impl PipelineError {
    /// Create an invalid state error
    ///
    /// `actual` lists the operations the current state still accepts.
    pub fn invalid_state(expected: impl Into<String>, actual: AssemblerState) -> Self {
        let allowed = actual.valid_operations();
        let actual = if allowed.is_empty() {
            actual.to_string()
        } else {
            format!("{} (allowed: {})", actual, allowed.join(", "))
        };
        Self::InvalidState {
            expected: expected.into(),
            actual,
        }
    }

    /// Whether the error only affects one fragment
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

/// Result type alias using PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_error() {
        let err = PipelineError::invalid_state("Built", AssemblerState::TornDown);
        let msg = err.to_string();
        assert!(msg.contains("Built"));
        assert!(msg.contains("TornDown"));
    }

    #[test]
    fn test_decode_error_is_recoverable() {
        let err: PipelineError = DecodeError::TooShort {
            actual: 2,
            minimum: 5,
        }
        .into();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("at least 5"));
    }

    #[test]
    fn test_fatal_error_is_not_recoverable() {
        let err: PipelineError = FatalInputError::InvalidMagic.into();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_invalid_state_lists_allowed_operations() {
        let err = PipelineError::invalid_state("Configured or Decoding", AssemblerState::Built);
        let msg = err.to_string();
        assert!(msg.contains("got Built (allowed: "));
        for op in AssemblerState::Built.valid_operations() {
            assert!(msg.contains(op), "{} missing from {}", op, msg);
        }
    }

    #[test]
    fn test_channel_errors_are_not_recoverable() {
        assert!(!PipelineError::ChannelFull.is_recoverable());
        assert!(!PipelineError::ChannelSend.is_recoverable());
    }

    #[test]
    fn test_unmapped_chip_message() {
        let err = DecodeError::UnmappedChip { fec_id: 3, chip: 7 };
        assert_eq!(err.to_string(), "No layer mapping for chip 7 on FEC 3");
    }
}
