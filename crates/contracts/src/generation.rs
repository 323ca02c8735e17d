//! Probe generations and their capability records
//!
//! Generation-specific behavior is expressed as data: the acquisition loop is
//! shared and reads scale factors, packet layout and pacing from
//! [`ProbeCapabilities`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::packet::PacketLayout;
use crate::settings::ReferenceSelection;

/// Supported probe families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeGeneration {
    /// Neuropixels 1.0: 12 AP sub-samples per packet plus an LFP band
    Np1,
    /// Neuropixels 2.0: wideband, one sample per packet
    Np2,
    /// Quad Base: four shanks read as four independent streams
    QuadBase,
}

const NP1_GAINS: &[f32] = &[50.0, 125.0, 250.0, 500.0, 1000.0, 1500.0, 2000.0, 3000.0];
const NP1_REFERENCES: &[ReferenceSelection] = &[
    ReferenceSelection::External,
    ReferenceSelection::Tip,
    ReferenceSelection::Internal,
];
const NP2_REFERENCES: &[ReferenceSelection] =
    &[ReferenceSelection::External, ReferenceSelection::Tip];

/// Static description of what a probe generation can do
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeCapabilities {
    /// Recording channels per stream
    pub channel_count: usize,
    /// Independent streams per probe (one per shank for Quad Base)
    pub shank_streams: usize,
    /// Electrode banks selectable per channel
    pub bank_count: u8,
    /// AP sub-samples carried by one vendor packet
    pub samples_per_packet: usize,
    /// AP band sample rate (Hz)
    pub ap_sample_rate: f64,
    /// LFP band sample rate, `None` for wideband probes
    pub lfp_sample_rate: Option<f64>,
    /// Whether the AP high-pass filter can be switched
    pub has_ap_filter_switch: bool,
    /// ADC code range
    pub adc_full_scale: f64,
    /// ADC reference voltage (V)
    pub reference_volts: f64,
    /// Selectable AP gains, indexed by gain index
    pub ap_gains: &'static [f32],
    /// Selectable LFP gains, empty when there is no LFP band
    pub lfp_gains: &'static [f32],
    /// Selectable references, indexed by reference index
    pub references: &'static [ReferenceSelection],
    /// Packets requested per read
    pub max_packets: usize,
    /// Pacing sleep per packet missing from a full read
    pub wait_per_missing_packet: Duration,
    /// Whether a DC baseline is captured at start and subtracted
    pub dc_offset_correction: bool,
    /// Internal reference channel skipped during electrode selection
    pub reference_channel: Option<usize>,
}

impl ProbeGeneration {
    pub const ALL: [ProbeGeneration; 3] = [Self::Np1, Self::Np2, Self::QuadBase];

    /// Capability record for this generation
    pub fn capabilities(self) -> ProbeCapabilities {
        match self {
            Self::Np1 => ProbeCapabilities {
                channel_count: 384,
                shank_streams: 1,
                bank_count: 3,
                samples_per_packet: 12,
                ap_sample_rate: 30_000.0,
                lfp_sample_rate: Some(2_500.0),
                has_ap_filter_switch: true,
                adc_full_scale: 1024.0,
                reference_volts: 1.2,
                ap_gains: NP1_GAINS,
                lfp_gains: NP1_GAINS,
                references: NP1_REFERENCES,
                max_packets: 64,
                wait_per_missing_packet: Duration::from_micros(400),
                dc_offset_correction: true,
                reference_channel: Some(191),
            },
            Self::Np2 => ProbeCapabilities {
                channel_count: 384,
                shank_streams: 1,
                bank_count: 4,
                samples_per_packet: 1,
                ap_sample_rate: 30_000.0,
                lfp_sample_rate: None,
                has_ap_filter_switch: false,
                adc_full_scale: 16384.0,
                reference_volts: 1.0,
                ap_gains: &[80.0],
                lfp_gains: &[],
                references: NP2_REFERENCES,
                max_packets: 64 * 12,
                wait_per_missing_packet: Duration::from_micros(30),
                dc_offset_correction: false,
                reference_channel: None,
            },
            Self::QuadBase => ProbeCapabilities {
                channel_count: 384,
                shank_streams: 4,
                bank_count: 4,
                samples_per_packet: 1,
                ap_sample_rate: 30_000.0,
                lfp_sample_rate: None,
                has_ap_filter_switch: false,
                adc_full_scale: 4096.0,
                reference_volts: 1.0,
                ap_gains: &[100.0],
                lfp_gains: &[],
                references: NP2_REFERENCES,
                max_packets: 64 * 12 * 4,
                wait_per_missing_packet: Duration::from_micros(30),
                dc_offset_correction: false,
                reference_channel: None,
            },
        }
    }
}

impl ProbeCapabilities {
    /// Packet layout of one stream
    pub fn packet_layout(&self) -> PacketLayout {
        PacketLayout {
            samples_per_packet: self.samples_per_packet,
            channel_count: self.channel_count,
            has_lfp: self.has_lfp(),
        }
    }

    #[inline]
    pub fn has_lfp(&self) -> bool {
        self.lfp_sample_rate.is_some()
    }

    /// Largest AP frame count one FIFO read can produce
    #[inline]
    pub fn ap_frames_per_read(&self) -> usize {
        self.max_packets * self.samples_per_packet
    }

    /// Total electrode selections a settings record must carry
    #[inline]
    pub fn selection_count(&self) -> usize {
        self.channel_count * self.shank_streams
    }

    /// Microvolts per ADC code at the given gain
    pub fn microvolts_per_code(&self, gain: f32) -> f64 {
        self.reference_volts / self.adc_full_scale * 1e6 / gain as f64
    }
}

impl fmt::Display for ProbeGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Np1 => "Neuropixels 1.0",
            Self::Np2 => "Neuropixels 2.0",
            Self::QuadBase => "Quad Base",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_np1_scale() {
        let caps = ProbeGeneration::Np1.capabilities();
        let scale = caps.microvolts_per_code(caps.ap_gains[3]) as f32;
        assert_eq!(512.0 * scale, 1200.0);
    }

    #[test]
    fn test_wideband_generations_have_no_lfp() {
        for generation in [ProbeGeneration::Np2, ProbeGeneration::QuadBase] {
            let caps = generation.capabilities();
            assert!(!caps.has_lfp());
            assert!(caps.lfp_gains.is_empty());
            assert_eq!(caps.samples_per_packet, 1);
        }
    }

    #[test]
    fn test_quad_base_streams() {
        let caps = ProbeGeneration::QuadBase.capabilities();
        assert_eq!(caps.shank_streams, 4);
        assert_eq!(caps.selection_count(), 4 * 384);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&ProbeGeneration::QuadBase).unwrap();
        assert_eq!(json, "\"quad_base\"");
    }
}
