//! AcquisitionBlueprint - Config Loader 输出
//!
//! Describes the complete acquisition setup: buffering policy, timing
//! diagnostics, calibration search paths and the probes of every basestation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::generation::ProbeGeneration;
use crate::probe_id::ProbeAddress;
use crate::settings::ProbeSettings;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete acquisition configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AcquisitionBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// Buffering and diagnostics settings shared by every stream
    #[serde(default)]
    #[validate(nested)]
    pub acquisition: AcquisitionConfig,

    /// Directories searched for `<serial>/<serial>_*.csv` calibration files
    #[serde(default)]
    pub calibration_dirs: Vec<PathBuf>,

    /// Basestations and their probes
    #[validate(length(min = 1, message = "at least one basestation is required"), nested)]
    pub basestations: Vec<BasestationConfig>,
}

/// Per-stream buffering and health settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AcquisitionConfig {
    /// Sample buffer capacity in frames
    #[serde(default = "default_buffer_capacity")]
    #[validate(range(min = 1, message = "buffer_capacity must be >= 1"))]
    pub buffer_capacity: usize,

    /// What to do when the consumer falls behind
    #[serde(default)]
    pub drop_policy: DropPolicy,

    /// FIFO fill fraction above which a warning is logged
    #[serde(default = "default_fifo_warning_threshold")]
    #[validate(range(min = 0.0, max = 1.0, message = "fifo_warning_threshold must be within 0..=1"))]
    pub fifo_warning_threshold: f32,

    /// Upper bound for waiting on a pending re-arm before starting
    #[serde(default = "default_arm_timeout_ms")]
    pub arm_timeout_ms: u64,

    /// Hardware timestamp continuity checks
    #[serde(default)]
    #[validate(nested)]
    pub timing: TimingConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            drop_policy: DropPolicy::default(),
            fifo_warning_threshold: default_fifo_warning_threshold(),
            arm_timeout_ms: default_arm_timeout_ms(),
            timing: TimingConfig::default(),
        }
    }
}

impl AcquisitionConfig {
    #[inline]
    pub fn arm_timeout(&self) -> Duration {
        Duration::from_millis(self.arm_timeout_ms)
    }
}

fn default_buffer_capacity() -> usize {
    10_000
}

fn default_fifo_warning_threshold() -> f32 {
    0.8
}

fn default_arm_timeout_ms() -> u64 {
    25_000
}

/// Timestamp discontinuity detection thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct TimingConfig {
    /// Largest hardware timestamp increment treated as continuous
    #[serde(default = "default_allowable_jump")]
    #[validate(range(min = 1))]
    pub allowable_jump: u32,

    /// Increments at or above this are headstage clock resets, not data loss
    #[serde(default = "default_max_headstage_clock_jump")]
    pub max_headstage_clock_jump: u32,

    /// Samples after start during which jumps are not reported
    #[serde(default = "default_startup_grace_samples")]
    #[validate(range(min = 0))]
    pub startup_grace_samples: i64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            allowable_jump: default_allowable_jump(),
            max_headstage_clock_jump: default_max_headstage_clock_jump(),
            startup_grace_samples: default_startup_grace_samples(),
        }
    }
}

fn default_allowable_jump() -> u32 {
    4
}

fn default_max_headstage_clock_jump() -> u32 {
    3_221_225_475
}

fn default_startup_grace_samples() -> i64 {
    30_000
}

/// 丢包策略 (背压满时)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// 覆盖最旧的未读帧
    #[default]
    DropOldest,
    /// 拒绝写入放不下的新帧
    DropNewest,
}

/// One basestation (PXI slot or OneBox)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BasestationConfig {
    /// Slot number
    pub slot: u8,

    /// Probes attached to the basestation
    #[serde(default)]
    #[validate(nested)]
    pub probes: Vec<ProbeConfig>,
}

/// One probe on a basestation
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProbeConfig {
    /// Headstage port
    #[validate(range(min = 1, max = 4, message = "port must be within 1..=4"))]
    pub port: u8,

    /// Dock on the headstage
    #[serde(default = "default_dock")]
    #[validate(range(min = 1, max = 2, message = "dock must be within 1..=2"))]
    pub dock: u8,

    /// Probe family
    pub generation: ProbeGeneration,

    /// Disabled probes are opened and configured but never streamed
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Explicit settings, generation defaults otherwise
    #[serde(default)]
    pub settings: Option<ProbeSettings>,
}

fn default_dock() -> u8 {
    1
}

fn default_enabled() -> bool {
    true
}

impl ProbeConfig {
    /// Probe config with generation defaults
    pub fn new(port: u8, dock: u8, generation: ProbeGeneration) -> Self {
        Self {
            port,
            dock,
            generation,
            enabled: true,
            settings: None,
        }
    }

    /// Address of this probe in `slot`
    #[inline]
    pub fn address(&self, slot: u8) -> ProbeAddress {
        ProbeAddress::new(slot, self.port, self.dock)
    }

    /// Configured settings or the generation defaults
    pub fn effective_settings(&self) -> ProbeSettings {
        self.settings
            .clone()
            .unwrap_or_else(|| ProbeSettings::defaults_for(self.generation))
    }
}

impl AcquisitionBlueprint {
    /// Total configured probes across basestations
    pub fn probe_count(&self) -> usize {
        self.basestations.iter().map(|b| b.probes.len()).sum()
    }

    /// Total streams (shanks) across basestations
    pub fn stream_count(&self) -> usize {
        self.basestations
            .iter()
            .flat_map(|b| &b.probes)
            .map(|p| p.generation.capabilities().shank_streams)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_blueprint() -> AcquisitionBlueprint {
        AcquisitionBlueprint {
            version: ConfigVersion::V1,
            acquisition: AcquisitionConfig::default(),
            calibration_dirs: vec![],
            basestations: vec![BasestationConfig {
                slot: 2,
                probes: vec![
                    ProbeConfig::new(1, 1, ProbeGeneration::Np1),
                    ProbeConfig::new(2, 1, ProbeGeneration::QuadBase),
                ],
            }],
        }
    }

    #[test]
    fn acquisition_defaults() {
        let config = AcquisitionConfig::default();
        assert_eq!(config.buffer_capacity, 10_000);
        assert_eq!(config.drop_policy, DropPolicy::DropOldest);
        assert_eq!(config.arm_timeout(), Duration::from_secs(25));
        assert_eq!(config.timing.allowable_jump, 4);
        assert_eq!(config.timing.startup_grace_samples, 30_000);
    }

    #[test]
    fn stream_count_includes_shanks() {
        let blueprint = sample_blueprint();
        assert_eq!(blueprint.probe_count(), 2);
        assert_eq!(blueprint.stream_count(), 5);
    }

    #[test]
    fn derive_rules_reject_bad_values() {
        let mut blueprint = sample_blueprint();
        assert!(blueprint.validate().is_ok());

        blueprint.acquisition.buffer_capacity = 0;
        assert!(blueprint.validate().is_err());

        let mut blueprint = sample_blueprint();
        blueprint.basestations[0].probes[0].port = 9;
        assert!(blueprint.validate().is_err());

        let mut blueprint = sample_blueprint();
        blueprint.basestations.clear();
        assert!(blueprint.validate().is_err());
    }

    #[test]
    fn effective_settings_fall_back_to_defaults() {
        let probe = ProbeConfig::new(1, 1, ProbeGeneration::Np1);
        assert_eq!(
            probe.effective_settings(),
            ProbeSettings::defaults_for(ProbeGeneration::Np1)
        );
        assert_eq!(probe.address(3), ProbeAddress::new(3, 1, 1));
    }
}
