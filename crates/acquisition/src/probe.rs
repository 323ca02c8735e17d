//! Probe
//!
//! Groups one physical probe: address, generation, settings, status and one
//! worker (with its sample buffers) per shank stream. Configuration calls go
//! straight to the device adapter and are rejected while acquiring.

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use contracts::{
    check_electrodes, AcquisitionConfig, BroadcastSink, DeviceAdapter, DropPolicy,
    ElectrodeSelection, NpResult, ProbeAddress, ProbeCapabilities, ProbeConfig,
    ProbeGeneration, ProbeSettings, StreamId, TimingConfig,
};
use sample_buffer::{BufferReader, SampleBuffer};
use tracing::{debug, info, instrument, warn};

use crate::calibration::{self, CalibrationStatus};
use crate::config::{StreamStatsSnapshot, WorkerConfig};
use crate::decoder::RunParams;
use crate::error::{AcquisitionError, Result};
use crate::worker::{AcquisitionWorker, StreamWriters};

/// Connection state of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Disconnected,
    Connecting,
    Connected,
    Acquiring,
}

/// Buffering and diagnostics options applied to every stream of a probe
#[derive(Debug, Clone, Copy)]
pub struct ProbeOptions {
    pub buffer_capacity: usize,
    pub drop_policy: DropPolicy,
    pub timing: TimingConfig,
    pub fifo_warning_threshold: f32,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self::from(&AcquisitionConfig::default())
    }
}

impl From<&AcquisitionConfig> for ProbeOptions {
    fn from(config: &AcquisitionConfig) -> Self {
        Self {
            buffer_capacity: config.buffer_capacity,
            drop_policy: config.drop_policy,
            timing: config.timing,
            fifo_warning_threshold: config.fifo_warning_threshold,
        }
    }
}

/// Consumer ends of one stream's sample buffers
#[derive(Debug)]
pub struct StreamReaders {
    pub stream: StreamId,
    pub ap: BufferReader,
    pub lfp: Option<BufferReader>,
}

/// One physical probe
pub struct Probe {
    address: ProbeAddress,
    generation: ProbeGeneration,
    capabilities: ProbeCapabilities,
    enabled: bool,
    settings: ProbeSettings,
    serial_number: Option<u64>,
    status: ProbeStatus,
    calibration: Option<CalibrationStatus>,
    adapter: Arc<dyn DeviceAdapter>,
    workers: Vec<AcquisitionWorker>,
    readers: Vec<StreamReaders>,
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Probe")
            .field("address", &self.address)
            .field("generation", &self.generation)
            .field("status", &self.status)
            .field("serial_number", &self.serial_number)
            .field("streams", &self.workers.len())
            .finish()
    }
}

impl Probe {
    /// Open the probe and create its buffers and workers.
    ///
    /// A probe the adapter fails to open is returned in `Disconnected`
    /// status with [`Probe::is_valid`] false.
    ///
    /// # Errors
    /// Buffer construction or worker thread creation failures.
    #[instrument(
        name = "probe_open",
        skip_all,
        fields(slot = slot, port = config.port, dock = config.dock, generation = %config.generation)
    )]
    pub fn open(
        config: &ProbeConfig,
        slot: u8,
        adapter: Arc<dyn DeviceAdapter>,
        options: ProbeOptions,
        broadcast: Arc<dyn BroadcastSink>,
    ) -> Result<Self> {
        let address = config.address(slot);
        let capabilities = config.generation.capabilities();
        let mut probe = Self {
            address,
            generation: config.generation,
            capabilities,
            enabled: config.enabled,
            settings: config.effective_settings(),
            serial_number: None,
            status: ProbeStatus::Connecting,
            calibration: None,
            adapter,
            workers: Vec::new(),
            readers: Vec::new(),
        };

        if let Err(error) = probe.adapter.open_probe(address) {
            warn!(
                slot = address.slot,
                port = address.port,
                dock = address.dock,
                error_code = error.code(),
                "failed to open probe: {error}"
            );
            probe.status = ProbeStatus::Disconnected;
            return Ok(probe);
        }

        match probe.adapter.probe_serial_number(address) {
            Ok(serial) => probe.serial_number = Some(serial),
            Err(error) => warn!(
                probe = %address,
                error_code = error.code(),
                "failed to read probe serial number: {error}"
            ),
        }

        for (index, stream) in address
            .streams(capabilities.shank_streams)
            .into_iter()
            .enumerate()
        {
            let worker_config = WorkerConfig {
                stream,
                capabilities,
                timing: options.timing,
                fifo_warning_threshold: options.fifo_warning_threshold,
                reports_fill: index == 0,
                sync_as_channel: probe.settings.sync_as_channel,
            };

            let (ap_writer, ap_reader) = SampleBuffer::new(
                worker_config.ap_channels(),
                options.buffer_capacity,
                options.drop_policy,
            )?;
            let (lfp_writer, lfp_reader) = match worker_config.lfp_channels() {
                Some(channels) => {
                    let (writer, reader) =
                        SampleBuffer::new(channels, options.buffer_capacity, options.drop_policy)?;
                    (Some(writer), Some(reader))
                }
                None => (None, None),
            };

            let worker = AcquisitionWorker::spawn(
                worker_config,
                probe.adapter.clone(),
                StreamWriters {
                    ap: ap_writer,
                    lfp: lfp_writer,
                },
                broadcast.clone(),
            )?;
            probe.workers.push(worker);
            probe.readers.push(StreamReaders {
                stream,
                ap: ap_reader,
                lfp: lfp_reader,
            });
        }

        probe.status = ProbeStatus::Connected;
        info!(
            probe = %address,
            serial_number = ?probe.serial_number,
            streams = probe.workers.len(),
            "probe connected"
        );
        Ok(probe)
    }

    // ===== Accessors =====

    #[inline]
    pub fn address(&self) -> ProbeAddress {
        self.address
    }

    #[inline]
    pub fn generation(&self) -> ProbeGeneration {
        self.generation
    }

    #[inline]
    pub fn capabilities(&self) -> &ProbeCapabilities {
        &self.capabilities
    }

    #[inline]
    pub fn status(&self) -> ProbeStatus {
        self.status
    }

    /// Opened successfully and usable
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.status != ProbeStatus::Disconnected
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn serial_number(&self) -> Option<u64> {
        self.serial_number
    }

    #[inline]
    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    pub fn calibration(&self) -> Option<&CalibrationStatus> {
        self.calibration.as_ref()
    }

    pub fn streams(&self) -> Vec<StreamId> {
        self.workers.iter().map(|w| w.stream()).collect()
    }

    pub fn stream_stats(&self) -> Vec<(StreamId, StreamStatsSnapshot)> {
        self.workers.iter().map(|w| (w.stream(), w.stats())).collect()
    }

    /// Hand the buffer readers to the consumer (once)
    pub fn take_readers(&mut self) -> Vec<StreamReaders> {
        std::mem::take(&mut self.readers)
    }

    /// FIFO fill fraction reported by shank 0
    pub fn fill_percentage(&self) -> f32 {
        self.workers
            .first()
            .map(|w| w.fill_percentage())
            .unwrap_or(0.0)
    }

    // ===== Configuration =====

    fn ensure_configurable(&self, operation: &'static str) -> Result<()> {
        match self.status {
            ProbeStatus::Disconnected => Err(AcquisitionError::invalid_probe(
                self.address,
                "probe is not connected",
            )),
            ProbeStatus::Acquiring => Err(AcquisitionError::busy(self.address, operation)),
            ProbeStatus::Connecting | ProbeStatus::Connected => Ok(()),
        }
    }

    /// Issue one vendor call per item, logging every failure and carrying on
    fn run_vendor_calls<I>(
        &self,
        operation: &'static str,
        items: I,
        mut call: impl FnMut(&dyn DeviceAdapter, I::Item) -> NpResult<()>,
    ) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Copy + Debug,
    {
        let mut failures = 0usize;
        let mut last = None;
        for item in items {
            if let Err(error) = call(self.adapter.as_ref(), item) {
                warn!(
                    slot = self.address.slot,
                    port = self.address.port,
                    dock = self.address.dock,
                    operation,
                    error_code = error.code(),
                    item = ?item,
                    "vendor call failed: {error}"
                );
                failures += 1;
                last = Some(error);
            }
        }

        match last {
            None => Ok(()),
            Some(last) => Err(AcquisitionError::Configuration {
                probe: self.address,
                operation,
                failures,
                last,
            }),
        }
    }

    fn single_call(&self, operation: &'static str, result: NpResult<()>) -> Result<()> {
        self.run_vendor_calls(operation, [()], |_, _| result)
    }

    /// Reset the probe to its power-on configuration
    pub fn initialize(&mut self) -> Result<()> {
        self.ensure_configurable("initialize")?;
        let result = self.adapter.init(self.address);
        self.single_call("init", result)
    }

    /// Connect channels to electrodes. The reference channel is never switched.
    pub fn select_electrodes(&mut self, selection: &[ElectrodeSelection]) -> Result<()> {
        self.ensure_configurable("select_electrodes")?;
        check_electrodes(selection, &self.capabilities, "probe").map_err(|e| {
            AcquisitionError::invalid_setting(self.address, "electrodes", e.to_string())
        })?;

        let probe = self.address;
        let reference_channel = self.capabilities.reference_channel;
        let result = self.run_vendor_calls(
            "select_electrode",
            selection
                .iter()
                .copied()
                .filter(|e| Some(e.channel as usize) != reference_channel),
            |adapter, e| adapter.select_electrode(probe, e.channel as usize, e.shank, e.bank),
        );
        self.settings.electrodes = selection.to_vec();
        result
    }

    /// Set AP and LFP gain indices on every channel
    pub fn set_all_gains(&mut self, ap_gain_index: usize, lfp_gain_index: usize) -> Result<()> {
        self.ensure_configurable("set_all_gains")?;
        let caps = self.capabilities;
        if ap_gain_index >= caps.ap_gains.len() {
            return Err(AcquisitionError::invalid_setting(
                self.address,
                "ap_gain_index",
                format!("{ap_gain_index} out of range (0..{})", caps.ap_gains.len()),
            ));
        }
        if caps.has_lfp() && lfp_gain_index >= caps.lfp_gains.len() {
            return Err(AcquisitionError::invalid_setting(
                self.address,
                "lfp_gain_index",
                format!("{lfp_gain_index} out of range (0..{})", caps.lfp_gains.len()),
            ));
        }

        let probe = self.address;
        let lfp_index = if caps.has_lfp() { lfp_gain_index } else { 0 };
        let result = self.run_vendor_calls("set_gain", 0..caps.channel_count, |adapter, ch| {
            adapter.set_gain(probe, ch, ap_gain_index, lfp_index)
        });
        self.settings.ap_gain_index = ap_gain_index;
        self.settings.lfp_gain_index = lfp_index;
        result
    }

    /// Select the reference for every channel of every shank
    pub fn set_all_references(&mut self, reference_index: usize) -> Result<()> {
        self.ensure_configurable("set_all_references")?;
        let caps = self.capabilities;
        let Some(reference) = caps.references.get(reference_index).copied() else {
            return Err(AcquisitionError::invalid_setting(
                self.address,
                "reference_index",
                format!("{reference_index} out of range (0..{})", caps.references.len()),
            ));
        };

        let probe = self.address;
        let targets = (0..caps.shank_streams as u8)
            .flat_map(|shank| (0..caps.channel_count).map(move |channel| (channel, shank)));
        let result = self.run_vendor_calls("set_reference", targets, |adapter, (ch, shank)| {
            adapter.set_reference(probe, ch, shank, reference)
        });
        self.settings.reference_index = reference_index;
        result
    }

    /// Enable or bypass the AP high-pass filter on every channel
    pub fn set_ap_filter_state(&mut self, enabled: bool) -> Result<()> {
        self.ensure_configurable("set_ap_filter_state")?;
        if !self.capabilities.has_ap_filter_switch {
            return Err(AcquisitionError::invalid_setting(
                self.address,
                "ap_filter_enabled",
                format!("{} probes have no switchable AP filter", self.generation),
            ));
        }

        let probe = self.address;
        let result = self.run_vendor_calls(
            "set_ap_corner_frequency",
            0..self.capabilities.channel_count,
            |adapter, ch| adapter.set_ap_corner_frequency(probe, ch, !enabled),
        );
        self.settings.ap_filter_enabled = enabled;
        result
    }

    /// Push staged channel configuration to the hardware
    pub fn write_configuration(&mut self) -> Result<()> {
        self.ensure_configurable("write_configuration")?;
        let result = self.adapter.write_probe_configuration(self.address, false);
        self.single_call("write_probe_configuration", result)
    }

    /// Flip the sync line polarity used by the next run
    pub fn set_invert_sync_line(&mut self, invert: bool) -> Result<()> {
        self.ensure_configurable("set_invert_sync_line")?;
        self.settings.invert_sync_line = invert;
        Ok(())
    }

    /// Apply every stored setting and write the configuration.
    ///
    /// All steps run even when an earlier one fails; the first error is
    /// returned.
    #[instrument(name = "probe_apply_settings", skip(self), fields(probe = %self.address))]
    pub fn apply_settings(&mut self) -> Result<()> {
        self.ensure_configurable("apply_settings")?;
        let settings = self.settings.clone();

        let mut first_error = None;
        let mut keep = |result: Result<()>| {
            if let Err(error) = result {
                first_error.get_or_insert(error);
            }
        };

        keep(self.select_electrodes(&settings.electrodes));
        keep(self.set_all_references(settings.reference_index));
        keep(self.set_all_gains(settings.ap_gain_index, settings.lfp_gain_index));
        if self.capabilities.has_ap_filter_switch {
            keep(self.set_ap_filter_state(settings.ap_filter_enabled));
        }
        keep(self.write_configuration());

        match first_error {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }

    /// Locate and apply calibration files for this probe
    pub fn calibrate(&mut self, dirs: &[PathBuf]) -> Result<&CalibrationStatus> {
        self.ensure_configurable("calibrate")?;
        let serial = self.serial_number.ok_or_else(|| {
            AcquisitionError::invalid_probe(self.address, "serial number unknown")
        })?;
        let status = calibration::calibrate(
            self.adapter.as_ref(),
            self.address,
            serial,
            self.generation,
            dirs,
        );
        Ok(self.calibration.insert(status))
    }

    // ===== Acquisition =====

    fn run_params(&self) -> Result<RunParams> {
        let ap_gain = self.settings.ap_gain(&self.capabilities).ok_or_else(|| {
            AcquisitionError::invalid_setting(self.address, "ap_gain_index", "out of range")
        })?;
        let lfp_gain = if self.capabilities.has_lfp() {
            Some(self.settings.lfp_gain(&self.capabilities).ok_or_else(|| {
                AcquisitionError::invalid_setting(self.address, "lfp_gain_index", "out of range")
            })?)
        } else {
            None
        };
        Ok(RunParams {
            ap_gain,
            lfp_gain,
            invert_sync_line: self.settings.invert_sync_line,
        })
    }

    /// Start every stream worker. Returns the number of workers started.
    #[instrument(name = "probe_start", skip(self), fields(probe = %self.address))]
    pub fn start_acquisition(&mut self) -> Result<usize> {
        if !self.is_valid() {
            return Err(AcquisitionError::invalid_probe(
                self.address,
                "probe is not connected",
            ));
        }
        let params = self.run_params()?;
        let started = self
            .workers
            .iter()
            .filter(|w| w.start_acquisition(params))
            .count();
        self.status = ProbeStatus::Acquiring;
        debug!(probe = %self.address, started, "probe acquiring");
        Ok(started)
    }

    /// Ask every worker to stop without waiting
    pub fn request_stop(&self) {
        for worker in &self.workers {
            worker.request_stop();
        }
    }

    /// Wait for every worker to go idle
    pub fn wait_until_idle(&mut self) {
        for worker in &self.workers {
            worker.wait_until_idle();
        }
        if self.status == ProbeStatus::Acquiring {
            self.status = ProbeStatus::Connected;
        }
    }

    pub fn stop_acquisition(&mut self) {
        self.request_stop();
        self.wait_until_idle();
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        // join worker threads before closing the probe
        self.workers.clear();
        if self.is_valid() {
            if let Err(error) = self.adapter.close_probe(self.address) {
                debug!(probe = %self.address, error_code = error.code(), "close failed: {error}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::NpError;
    use device::{SimulatedAdapter, SimulationConfig};
    use sample_buffer::FrameBlock;
    use std::time::{Duration, Instant};

    fn open(
        generation: ProbeGeneration,
        sim: SimulationConfig,
    ) -> (Arc<SimulatedAdapter>, Probe) {
        let config = ProbeConfig::new(1, 1, generation);
        let adapter = Arc::new(SimulatedAdapter::with_probes(
            sim,
            [(config.address(2), generation)],
        ));
        let probe = Probe::open(
            &config,
            2,
            adapter.clone(),
            ProbeOptions::default(),
            Arc::new(|_: &str| {}),
        )
        .unwrap();
        (adapter, probe)
    }

    #[test]
    fn test_open_failure_marks_disconnected() {
        let sim = SimulationConfig {
            fail_open: vec![ProbeAddress::new(2, 1, 1)],
            ..Default::default()
        };
        let (_adapter, mut probe) = open(ProbeGeneration::Np1, sim);
        assert_eq!(probe.status(), ProbeStatus::Disconnected);
        assert!(!probe.is_valid());
        assert!(probe.take_readers().is_empty());
        assert!(matches!(
            probe.initialize(),
            Err(AcquisitionError::InvalidProbe { .. })
        ));
    }

    #[test]
    fn test_select_electrodes_skips_reference_channel() {
        let (adapter, mut probe) = open(ProbeGeneration::Np1, SimulationConfig::default());
        let selection = ProbeSettings::defaults_for(ProbeGeneration::Np1).electrodes;
        probe.select_electrodes(&selection).unwrap();
        assert_eq!(adapter.calls().select_electrode, 383);
    }

    #[test]
    fn test_invalid_gain_index() {
        let (adapter, mut probe) = open(ProbeGeneration::Np2, SimulationConfig::default());
        let err = probe.set_all_gains(3, 0).unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::InvalidSetting {
                field: "ap_gain_index",
                ..
            }
        ));
        assert_eq!(adapter.calls().set_gain, 0);
    }

    #[test]
    fn test_filter_switch_unsupported() {
        let (_adapter, mut probe) = open(ProbeGeneration::QuadBase, SimulationConfig::default());
        assert!(matches!(
            probe.set_ap_filter_state(true),
            Err(AcquisitionError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_configuration_failure_reported() {
        let sim = SimulationConfig {
            fail_configuration: vec![ProbeAddress::new(2, 1, 1)],
            ..Default::default()
        };
        let (adapter, mut probe) = open(ProbeGeneration::Np1, sim);
        let err = probe.apply_settings().unwrap_err();
        assert_eq!(err.vendor_error(), Some(NpError::Failed));
        assert!(probe.is_valid());

        let calls = adapter.calls();
        assert_eq!(calls.set_gain, 384);
        assert_eq!(calls.set_reference, 384);
        assert_eq!(calls.set_ap_corner_frequency, 384);
        assert_eq!(calls.write_probe_configuration, 1);
    }

    #[test]
    fn test_busy_while_acquiring() {
        let (adapter, mut probe) = open(ProbeGeneration::Np1, SimulationConfig::finite(1200, 8));
        adapter.arm(2).unwrap();
        assert_eq!(probe.start_acquisition().unwrap(), 1);
        assert_eq!(probe.status(), ProbeStatus::Acquiring);
        assert!(matches!(
            probe.set_all_gains(0, 0),
            Err(AcquisitionError::Busy { .. })
        ));
        assert!(matches!(
            probe.set_invert_sync_line(true),
            Err(AcquisitionError::Busy { .. })
        ));

        probe.stop_acquisition();
        assert_eq!(probe.status(), ProbeStatus::Connected);
        probe.set_invert_sync_line(true).unwrap();
        assert!(probe.settings().invert_sync_line);
    }

    #[test]
    fn test_quad_base_one_buffer_per_shank() {
        let (adapter, mut probe) = open(ProbeGeneration::QuadBase, SimulationConfig::finite(500, 100));
        let mut readers = probe.take_readers();
        assert_eq!(readers.len(), 4);
        assert!(probe.take_readers().is_empty());
        assert!(readers.iter().all(|r| r.lfp.is_none()));

        adapter.arm(2).unwrap();
        assert_eq!(probe.start_acquisition().unwrap(), 4);
        adapter.set_sw_trigger(2).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while readers.iter().any(|r| r.ap.available() < 500) {
            assert!(Instant::now() < deadline, "timed out");
            std::thread::sleep(Duration::from_millis(5));
        }
        probe.stop_acquisition();

        let mut block = FrameBlock::new(384, 1000);
        for reader in &mut readers {
            assert_eq!(reader.ap.read_all_from_buffer(&mut block, 1000), 500);
        }
        assert_eq!(readers[3].stream, ProbeAddress::new(2, 1, 1).shank_stream(3));
        assert!((0.0..=1.0).contains(&probe.fill_percentage()));
    }

    #[test]
    fn test_quad_base_fill_from_shank_zero_only() {
        let sim = SimulationConfig {
            pacing: device::Pacing::Unpaced {
                packets_per_read: 50,
            },
            fifo_packets: 400,
            fifo_backlog: vec![(ProbeAddress::new(2, 1, 1), 300)],
            ..Default::default()
        };
        let (adapter, mut probe) = open(ProbeGeneration::QuadBase, sim);
        let _readers = probe.take_readers();
        assert_eq!(probe.fill_percentage(), 0.0);

        adapter.arm(2).unwrap();
        probe.start_acquisition().unwrap();
        adapter.set_sw_trigger(2).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while probe.workers.iter().any(|w| w.stats().batches < 2) {
            assert!(Instant::now() < deadline, "timed out");
            std::thread::sleep(Duration::from_millis(5));
        }

        // 300 waiting, 100 headroom
        assert_eq!(probe.workers[0].fill_percentage(), 0.75);
        for worker in &probe.workers[1..] {
            assert_eq!(worker.fill_percentage(), 0.0);
        }
        assert_eq!(probe.fill_percentage(), 0.75);
        probe.stop_acquisition();
    }

    #[test]
    fn test_calibrate_without_files() {
        let (_adapter, mut probe) = open(ProbeGeneration::Np2, SimulationConfig::default());
        let status = probe.calibrate(&[]).unwrap().clone();
        assert!(matches!(status, CalibrationStatus::Missing { .. }));
        assert_eq!(probe.calibration(), Some(&status));
    }

    #[test]
    fn test_drop_closes_probe() {
        let (adapter, probe) = open(ProbeGeneration::Np1, SimulationConfig::default());
        assert!(adapter.is_open(ProbeAddress::new(2, 1, 1)));
        drop(probe);
        assert!(!adapter.is_open(ProbeAddress::new(2, 1, 1)));
    }
}
