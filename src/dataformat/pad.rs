//! Pad detector data
//!
//! The pad decoder delivers one [`PadData`] per trigger: one ASIC readout
//! per layer, each split in two halves with their own header, calibration
//! and common-mode channels. The assembler turns it into one
//! [`PadLayerEvent`] per layer.

use serde::{Deserialize, Serialize};

use crate::common::DecodeError;

/// Number of pad layers
pub const PADS_NLAYERS: usize = 18;

/// Number of readout channels per pad layer
pub const PADS_NCHANNELS: usize = 72;

/// Number of ASIC halves per layer
pub const PADS_NHALVES: usize = 2;

/// One trigger's worth of pad layers
pub type PadEvent = [PadLayerEvent; PADS_NLAYERS];

/// Header/trailer words of one ASIC half
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadAsicHeader {
    /// Header marker
    pub header: u16,
    /// Bunch crossing counter of the ASIC
    pub bc: u16,
    /// Write address in the circular buffer
    pub wadd: u16,
    /// Four-bit status field
    pub fourbit: u8,
    /// Trailer marker
    pub trailer: u8,
}

/// Samples of one pad channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadChannel {
    /// ADC amplitude
    pub adc: u16,
    /// Time of arrival
    pub toa: u16,
    /// Time over threshold
    pub tot: u16,
}

/// Decoded readout of one pad ASIC (one layer)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadAsic {
    pub headers: [PadAsicHeader; PADS_NHALVES],
    pub channels: Vec<PadChannel>,
    pub calibration: [PadChannel; PADS_NHALVES],
    pub cmn: [PadChannel; PADS_NHALVES],
    /// Trigger sums from the trigger window of this ASIC
    pub trigger_sums: Vec<u16>,
}

/// Output of the pad payload decoder for one trigger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadData {
    /// One ASIC per layer, indexed by layer
    pub asics: Vec<PadAsic>,
}

impl PadData {
    /// Pad data with `PADS_NLAYERS` zeroed ASICs
    pub fn empty() -> Self {
        Self {
            asics: (0..PADS_NLAYERS)
                .map(|_| PadAsic {
                    channels: vec![PadChannel::default(); PADS_NCHANNELS],
                    ..Default::default()
                })
                .collect(),
        }
    }
}

/// One pad layer's samples for one trigger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadLayerEvent {
    pub headers: [PadAsicHeader; PADS_NHALVES],
    pub channels: Vec<PadChannel>,
    pub calibration: [PadChannel; PADS_NHALVES],
    pub cmn: [PadChannel; PADS_NHALVES],
    pub trigger_sums: Vec<u16>,
}

impl PadLayerEvent {
    /// Build the layer event from the ASIC readout of layer `layer`
    pub fn from_asic(layer: usize, asic: &PadAsic) -> Result<Self, DecodeError> {
        if asic.channels.len() != PADS_NCHANNELS {
            return Err(DecodeError::PadChannelCount {
                layer,
                expected: PADS_NCHANNELS,
                actual: asic.channels.len(),
            });
        }
        Ok(Self {
            headers: asic.headers,
            channels: asic.channels.clone(),
            calibration: asic.calibration,
            cmn: asic.cmn,
            trigger_sums: asic.trigger_sums.clone(),
        })
    }
}

/// Convert decoder output into one layer event per pad layer
pub fn create_pad_event(data: &PadData) -> Result<PadEvent, DecodeError> {
    let layers = data
        .asics
        .iter()
        .enumerate()
        .map(|(layer, asic)| PadLayerEvent::from_asic(layer, asic))
        .collect::<Result<Vec<_>, _>>()?;

    layers
        .try_into()
        .map_err(|layers: Vec<PadLayerEvent>| DecodeError::PadLayerCount {
            expected: PADS_NLAYERS,
            actual: layers.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_pad_event_from_full_data() {
        let mut data = PadData::empty();
        data.asics[3].channels[10].adc = 500;
        data.asics[3].headers[1].bc = 77;

        let event = create_pad_event(&data).unwrap();
        assert_eq!(event.len(), PADS_NLAYERS);
        assert_eq!(event[3].channels[10].adc, 500);
        assert_eq!(event[3].headers[1].bc, 77);
        assert!(event[0].channels.iter().all(|c| c.adc == 0));
    }

    #[test]
    fn create_pad_event_rejects_wrong_layer_count() {
        let mut data = PadData::empty();
        data.asics.pop();
        let err = create_pad_event(&data).unwrap_err();
        assert_eq!(
            err,
            DecodeError::PadLayerCount {
                expected: PADS_NLAYERS,
                actual: PADS_NLAYERS - 1
            }
        );
    }

    #[test]
    fn create_pad_event_rejects_wrong_channel_count() {
        let mut data = PadData::empty();
        data.asics[5].channels.truncate(10);
        let err = create_pad_event(&data).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::PadChannelCount {
                layer: 5,
                actual: 10,
                ..
            }
        ));
    }
}
