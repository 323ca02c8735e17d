//! Calibration file lookup
//!
//! Calibration data lives in `<dir>/<serial>/<serial>_ADCCalibration.csv`
//! and `<dir>/<serial>/<serial>_gainCalValues.csv`. The file contents are
//! parsed by the vendor library; this module only finds and applies them.

use std::path::{Path, PathBuf};

use contracts::{DeviceAdapter, NpError, ProbeAddress, ProbeGeneration};
use tracing::{debug, warn};

/// Calibration files found for one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationFiles {
    /// ADC calibration, only for generations with an on-probe ADC table
    pub adc: Option<PathBuf>,
    pub gain: PathBuf,
}

/// Result of calibrating one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalibrationStatus {
    /// Files found and accepted by the adapter
    Calibrated(CalibrationFiles),
    /// No calibration directory for the serial number
    Missing { serial: u64 },
    /// Files found but rejected by the adapter
    Failed {
        operation: &'static str,
        error: NpError,
    },
}

impl CalibrationStatus {
    #[inline]
    pub fn is_calibrated(&self) -> bool {
        matches!(self, Self::Calibrated(_))
    }
}

/// Whether the generation takes a separate ADC calibration table
pub fn needs_adc_calibration(generation: ProbeGeneration) -> bool {
    matches!(generation, ProbeGeneration::Np1)
}

/// User-visible message for a probe without calibration data
pub fn missing_calibration_message(serial: u64) -> String {
    format!(
        "Missing calibration files for probe serial number {serial}. ADC and Gain calibration \
         files must be located in a '<calibration dir>/{serial}' folder. \
         Acquisition will proceed without calibration."
    )
}

/// Search `dirs` in order for the first `<dir>/<serial>` directory
pub fn locate(
    dirs: &[PathBuf],
    serial: u64,
    generation: ProbeGeneration,
) -> Option<CalibrationFiles> {
    let probe_dir = dirs
        .iter()
        .map(|dir| dir.join(serial.to_string()))
        .find(|dir| dir.is_dir())?;

    Some(CalibrationFiles {
        adc: needs_adc_calibration(generation)
            .then(|| probe_dir.join(format!("{serial}_ADCCalibration.csv"))),
        gain: probe_dir.join(format!("{serial}_gainCalValues.csv")),
    })
}

/// Locate and apply calibration for `probe`
pub fn calibrate(
    adapter: &dyn DeviceAdapter,
    probe: ProbeAddress,
    serial: u64,
    generation: ProbeGeneration,
    dirs: &[PathBuf],
) -> CalibrationStatus {
    let Some(files) = locate(dirs, serial, generation) else {
        debug!(probe = %probe, serial, "calibration files not found");
        return CalibrationStatus::Missing { serial };
    };

    if let Some(adc) = files.adc.as_deref() {
        if let Err(error) = apply(adapter, probe, "set_adc_calibration", adc, |a, p, f| {
            a.set_adc_calibration(p, f)
        }) {
            return error;
        }
    }
    if let Err(error) = apply(adapter, probe, "set_gain_calibration", &files.gain, |a, p, f| {
        a.set_gain_calibration(p, f)
    }) {
        return error;
    }

    debug!(probe = %probe, serial, "calibration applied");
    CalibrationStatus::Calibrated(files)
}

fn apply(
    adapter: &dyn DeviceAdapter,
    probe: ProbeAddress,
    operation: &'static str,
    file: &Path,
    call: impl FnOnce(&dyn DeviceAdapter, ProbeAddress, &Path) -> Result<(), NpError>,
) -> Result<(), CalibrationStatus> {
    call(adapter, probe, file).map_err(|error| {
        warn!(
            slot = probe.slot,
            port = probe.port,
            dock = probe.dock,
            operation,
            error_code = error.code(),
            file = %file.display(),
            "calibration rejected by device: {error}"
        );
        CalibrationStatus::Failed { operation, error }
    })
}
