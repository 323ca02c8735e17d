//! Vendor call counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-operation call counts of a simulated adapter
#[derive(Debug, Default)]
pub struct CallCounters {
    pub open_probe: AtomicU64,
    pub init: AtomicU64,
    pub set_gain: AtomicU64,
    pub set_reference: AtomicU64,
    pub set_ap_corner_frequency: AtomicU64,
    pub select_electrode: AtomicU64,
    pub write_probe_configuration: AtomicU64,
    pub set_adc_calibration: AtomicU64,
    pub set_gain_calibration: AtomicU64,
    pub arm: AtomicU64,
    pub set_sw_trigger: AtomicU64,
    pub read_electrode_data: AtomicU64,
}

impl CallCounters {
    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> CallCountsSnapshot {
        CallCountsSnapshot {
            open_probe: self.open_probe.load(Ordering::Relaxed),
            init: self.init.load(Ordering::Relaxed),
            set_gain: self.set_gain.load(Ordering::Relaxed),
            set_reference: self.set_reference.load(Ordering::Relaxed),
            set_ap_corner_frequency: self.set_ap_corner_frequency.load(Ordering::Relaxed),
            select_electrode: self.select_electrode.load(Ordering::Relaxed),
            write_probe_configuration: self.write_probe_configuration.load(Ordering::Relaxed),
            set_adc_calibration: self.set_adc_calibration.load(Ordering::Relaxed),
            set_gain_calibration: self.set_gain_calibration.load(Ordering::Relaxed),
            arm: self.arm.load(Ordering::Relaxed),
            set_sw_trigger: self.set_sw_trigger.load(Ordering::Relaxed),
            read_electrode_data: self.read_electrode_data.load(Ordering::Relaxed),
        }
    }
}

/// Call counts snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCountsSnapshot {
    pub open_probe: u64,
    pub init: u64,
    pub set_gain: u64,
    pub set_reference: u64,
    pub set_ap_corner_frequency: u64,
    pub select_electrode: u64,
    pub write_probe_configuration: u64,
    pub set_adc_calibration: u64,
    pub set_gain_calibration: u64,
    pub arm: u64,
    pub set_sw_trigger: u64,
    pub read_electrode_data: u64,
}

impl CallCountsSnapshot {
    /// Calls that change probe configuration (the heavy setup path)
    pub fn configuration_calls(&self) -> u64 {
        self.init
            + self.set_gain
            + self.set_reference
            + self.set_ap_corner_frequency
            + self.select_electrode
            + self.write_probe_configuration
    }
}
