//! Probe settings
//!
//! Persisted configuration surface of a probe. The acquisition core only reads
//! it while configuring hardware and when a run starts.

use serde::{Deserialize, Serialize};

use crate::error::ContractError;
use crate::generation::{ProbeCapabilities, ProbeGeneration};

/// Electrode bank
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bank {
    #[default]
    A,
    B,
    C,
    D,
}

impl Bank {
    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }
}

/// Reference source for a channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSelection {
    /// External reference pad
    #[default]
    External,
    /// Probe tip
    Tip,
    /// Internal reference electrode
    Internal,
}

/// Which physical electrode a recording channel listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectrodeSelection {
    pub channel: u16,
    #[serde(default)]
    pub bank: Bank,
    #[serde(default)]
    pub shank: u8,
}

/// Probe configuration applied before acquisition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Index into the generation's AP gain table
    pub ap_gain_index: usize,

    /// Index into the generation's LFP gain table (ignored without LFP)
    #[serde(default)]
    pub lfp_gain_index: usize,

    /// Index into the generation's reference table
    #[serde(default)]
    pub reference_index: usize,

    /// AP high-pass filter enabled
    #[serde(default)]
    pub ap_filter_enabled: bool,

    /// Electrode selection, one entry per channel (and shank)
    #[serde(default)]
    pub electrodes: Vec<ElectrodeSelection>,

    /// Append the sync/event code as a trailing pseudo-channel
    #[serde(default)]
    pub sync_as_channel: bool,

    /// The sync line is wired with inverted polarity
    #[serde(default)]
    pub invert_sync_line: bool,
}

impl ProbeSettings {
    /// Power-on defaults for a generation
    pub fn defaults_for(generation: ProbeGeneration) -> Self {
        let caps = generation.capabilities();
        let (ap_gain_index, lfp_gain_index, ap_filter_enabled) = match generation {
            ProbeGeneration::Np1 => (3, 2, true),
            ProbeGeneration::Np2 | ProbeGeneration::QuadBase => (0, 0, false),
        };

        Self {
            ap_gain_index,
            lfp_gain_index,
            reference_index: 0,
            ap_filter_enabled,
            electrodes: default_electrodes(&caps),
            sync_as_channel: false,
            invert_sync_line: false,
        }
    }

    /// AP gain selected by this record
    pub fn ap_gain(&self, caps: &ProbeCapabilities) -> Option<f32> {
        caps.ap_gains.get(self.ap_gain_index).copied()
    }

    /// LFP gain selected by this record, `None` without an LFP band
    pub fn lfp_gain(&self, caps: &ProbeCapabilities) -> Option<f32> {
        caps.lfp_gains.get(self.lfp_gain_index).copied()
    }

    /// Reference selected by this record
    pub fn reference(&self, caps: &ProbeCapabilities) -> Option<ReferenceSelection> {
        caps.references.get(self.reference_index).copied()
    }

    /// Check every index and selection against the generation's tables.
    ///
    /// `field` prefixes the path reported in the validation error.
    pub fn check(&self, caps: &ProbeCapabilities, field: &str) -> Result<(), ContractError> {
        if self.ap_gain(caps).is_none() {
            return Err(ContractError::config_validation(
                format!("{field}.ap_gain_index"),
                format!(
                    "gain index {} out of range (0..{})",
                    self.ap_gain_index,
                    caps.ap_gains.len()
                ),
            ));
        }
        if caps.has_lfp() && self.lfp_gain(caps).is_none() {
            return Err(ContractError::config_validation(
                format!("{field}.lfp_gain_index"),
                format!(
                    "gain index {} out of range (0..{})",
                    self.lfp_gain_index,
                    caps.lfp_gains.len()
                ),
            ));
        }
        if self.reference(caps).is_none() {
            return Err(ContractError::config_validation(
                format!("{field}.reference_index"),
                format!(
                    "reference index {} out of range (0..{})",
                    self.reference_index,
                    caps.references.len()
                ),
            ));
        }
        if self.ap_filter_enabled && !caps.has_ap_filter_switch {
            return Err(ContractError::config_validation(
                format!("{field}.ap_filter_enabled"),
                "probe has no switchable AP filter",
            ));
        }
        check_electrodes(&self.electrodes, caps, field)
    }
}

/// Validate an electrode selection list against a capability record
pub fn check_electrodes(
    electrodes: &[ElectrodeSelection],
    caps: &ProbeCapabilities,
    field: &str,
) -> Result<(), ContractError> {
    if electrodes.len() != caps.selection_count() {
        return Err(ContractError::config_validation(
            format!("{field}.electrodes"),
            format!(
                "expected {} electrode selections, got {}",
                caps.selection_count(),
                electrodes.len()
            ),
        ));
    }
    for (idx, electrode) in electrodes.iter().enumerate() {
        if electrode.channel as usize >= caps.channel_count
            || electrode.bank.index() >= caps.bank_count
            || electrode.shank as usize >= caps.shank_streams
        {
            return Err(ContractError::config_validation(
                format!("{field}.electrodes[{idx}]"),
                format!(
                    "channel {} bank {:?} shank {} is outside the probe",
                    electrode.channel, electrode.bank, electrode.shank
                ),
            ));
        }
    }
    Ok(())
}

fn default_electrodes(caps: &ProbeCapabilities) -> Vec<ElectrodeSelection> {
    (0..caps.shank_streams)
        .flat_map(|shank| {
            (0..caps.channel_count).map(move |channel| ElectrodeSelection {
                channel: channel as u16,
                bank: Bank::A,
                shank: shank as u8,
            })
        })
        .collect()
}
