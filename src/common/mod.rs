//! Common types shared across components
//!
//! This module defines the trigger key (interaction record), the wire
//! message carrying built event batches, and re-exports the error,
//! lifecycle, statistics and CLI helpers.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub mod cli;
pub use cli::{CommonArgs, DecoderArgs, EmulatorArgs};

pub mod error;
pub use error::{DecodeError, FatalInputError, PipelineError, PipelineResult};

pub mod metrics;
pub use metrics::{AssemblerStats, CycleReport};

pub mod state;
pub use state::AssemblerState;

use crate::dataformat::EventBatch;

/// Number of bunch crossings in one LHC orbit
pub const BUNCHES_PER_ORBIT: u16 = 3564;

/// Interaction record: identifies one trigger instant by orbit and bunch crossing
///
/// Ordering is total: orbit first, then bunch crossing. The assembler relies
/// on this ordering to walk heartbeat frames in time order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct InteractionRecord {
    /// LHC orbit counter
    pub orbit: u32,
    /// Bunch crossing within the orbit (0..3564)
    pub bc: u16,
}

impl InteractionRecord {
    /// Create a new interaction record
    pub fn new(orbit: u32, bc: u16) -> Self {
        Self { orbit, bc }
    }

    /// Key of the heartbeat frame containing this interaction (one HBF per orbit)
    #[inline]
    pub fn heartbeat_frame(&self) -> Self {
        Self {
            orbit: self.orbit,
            bc: 0,
        }
    }

    /// Whether the bunch crossing is inside the orbit
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.bc < BUNCHES_PER_ORBIT
    }
}

impl Ord for InteractionRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.orbit
            .cmp(&other.orbit)
            .then_with(|| self.bc.cmp(&other.bc))
    }
}

impl PartialOrd for InteractionRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for InteractionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "orbit={} bc={}", self.orbit, self.bc)
    }
}

/// Message types published downstream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Built events of one cycle
    Data(EventBatch),
    /// End of stream signal - decoder is shutting down
    EndOfStream { routing_id: u32 },
}

impl Message {
    /// Create a data message
    pub fn data(batch: EventBatch) -> Self {
        Self::Data(batch)
    }

    /// Create an EOS message
    pub fn eos(routing_id: u32) -> Self {
        Self::EndOfStream { routing_id }
    }

    /// Check if this is an EOS message
    pub fn is_eos(&self) -> bool {
        matches!(self, Self::EndOfStream { .. })
    }

    /// Routing identifier the message is tagged with
    pub fn routing_id(&self) -> u32 {
        match self {
            Self::Data(batch) => batch.routing_id,
            Self::EndOfStream { routing_id } => *routing_id,
        }
    }

    /// Serialize to MessagePack bytes
    pub fn to_msgpack(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    /// Deserialize from MessagePack bytes
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ir_orders_by_orbit_then_bc() {
        let a = InteractionRecord::new(10, 3000);
        let b = InteractionRecord::new(11, 0);
        let c = InteractionRecord::new(11, 5);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(b.cmp(&b), Ordering::Equal);

        let mut irs = vec![c, a, b];
        irs.sort();
        assert_eq!(irs, vec![a, b, c]);
    }

    #[test]
    fn heartbeat_frame_truncates_bc() {
        let ir = InteractionRecord::new(42, 1234);
        assert_eq!(ir.heartbeat_frame(), InteractionRecord::new(42, 0));
        assert_eq!(ir.heartbeat_frame().heartbeat_frame(), ir.heartbeat_frame());
    }

    #[test]
    fn ir_validity() {
        assert!(InteractionRecord::new(0, 3563).is_valid());
        assert!(!InteractionRecord::new(0, 3564).is_valid());
    }

    #[test]
    fn ir_display() {
        assert_eq!(InteractionRecord::new(7, 100).to_string(), "orbit=7 bc=100");
    }

    #[test]
    fn message_roundtrip_eos() {
        let msg = Message::eos(3);
        let bytes = msg.to_msgpack().unwrap();
        let decoded = Message::from_msgpack(&bytes).unwrap();
        assert!(decoded.is_eos());
        assert_eq!(decoded.routing_id(), 3);
    }

    #[test]
    fn message_data_carries_routing_id() {
        let msg = Message::data(EventBatch::new(9, 1));
        assert!(!msg.is_eos());
        assert_eq!(msg.routing_id(), 9);
    }
}
