//! Stream coordinator
//!
//! Owns every probe of one basestation slot. Arm and software trigger are
//! per slot, so all probes of the slot start on the same trigger. After a
//! stop the slot is re-armed on a short-lived thread; the next start waits
//! for it (bounded by `arm_timeout`).

use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use acquisition::calibration::missing_calibration_message;
use acquisition::{
    AcquisitionError, CalibrationStatus, Probe, ProbeOptions, StreamReaders,
};
use contracts::{
    AcquisitionBlueprint, AcquisitionConfig, BasestationConfig, BroadcastSink, DeviceAdapter,
    ProbeAddress, ProbeConfig,
};
use tracing::{debug, info, instrument, warn};

use crate::error::{BasestationError, Result};

/// Coordinator-wide options
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub probe: ProbeOptions,
    /// Upper bound for waiting on a pending re-arm
    pub arm_timeout: Duration,
    /// Directories searched for `<serial>/` calibration folders
    pub calibration_dirs: Vec<PathBuf>,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        let acquisition = AcquisitionConfig::default();
        Self {
            probe: ProbeOptions::from(&acquisition),
            arm_timeout: acquisition.arm_timeout(),
            calibration_dirs: Vec::new(),
        }
    }
}

impl CoordinatorOptions {
    pub fn from_blueprint(blueprint: &AcquisitionBlueprint) -> Self {
        Self {
            probe: ProbeOptions::from(&blueprint.acquisition),
            arm_timeout: blueprint.acquisition.arm_timeout(),
            calibration_dirs: blueprint.calibration_dirs.clone(),
        }
    }
}

/// Outcome of [`StreamCoordinator::initialize`]
#[derive(Debug, Default)]
pub struct InitializeReport {
    /// Whether this call ran the heavy per-probe setup
    pub performed_setup: bool,
    pub calibration: Vec<(ProbeAddress, CalibrationStatus)>,
    /// Probe-level failures; the probes stay in service
    pub failures: Vec<(ProbeAddress, AcquisitionError)>,
}

#[derive(Debug, Default)]
struct RearmState {
    pending: Mutex<bool>,
    done: Condvar,
}

/// Coordinates the probes of one basestation slot
pub struct StreamCoordinator {
    slot: u8,
    adapter: Arc<dyn DeviceAdapter>,
    broadcast: Arc<dyn BroadcastSink>,
    options: CoordinatorOptions,
    probes: Vec<Probe>,
    probes_initialized: bool,
    calibration_warning_sent: bool,
    acquiring: bool,
    rearm: Arc<RearmState>,
    rearm_thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for StreamCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCoordinator")
            .field("slot", &self.slot)
            .field("probes", &self.probes)
            .field("probes_initialized", &self.probes_initialized)
            .field("acquiring", &self.acquiring)
            .finish()
    }
}

impl StreamCoordinator {
    /// Empty coordinator for `slot`; probes are attached with [`Self::add_probe`]
    pub fn new(
        slot: u8,
        adapter: Arc<dyn DeviceAdapter>,
        broadcast: Arc<dyn BroadcastSink>,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            slot,
            adapter,
            broadcast,
            options,
            probes: Vec::new(),
            probes_initialized: false,
            calibration_warning_sent: false,
            acquiring: false,
            rearm: Arc::new(RearmState::default()),
            rearm_thread: None,
        }
    }

    /// Build a coordinator and open every configured probe
    pub fn from_config(
        config: &BasestationConfig,
        adapter: Arc<dyn DeviceAdapter>,
        broadcast: Arc<dyn BroadcastSink>,
        options: CoordinatorOptions,
    ) -> Result<Self> {
        let mut coordinator = Self::new(config.slot, adapter, broadcast, options);
        for probe in &config.probes {
            coordinator.add_probe(probe)?;
        }
        Ok(coordinator)
    }

    /// Open a probe and take ownership of it.
    ///
    /// A probe that fails to open is kept in disconnected state; check
    /// [`Probe::is_valid`] on the returned address.
    pub fn add_probe(&mut self, config: &ProbeConfig) -> Result<ProbeAddress> {
        let address = config.address(self.slot);
        if self.probe(address).is_some() {
            return Err(BasestationError::probe_rejected(address, "already added"));
        }

        let probe = Probe::open(
            config,
            self.slot,
            self.adapter.clone(),
            self.options.probe,
            self.broadcast.clone(),
        )?;
        if !probe.is_valid() {
            warn!(probe = %address, "probe unavailable, kept as disconnected");
        }
        self.probes.push(probe);
        Ok(address)
    }

    // ===== Accessors =====

    #[inline]
    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    pub fn probe(&self, address: ProbeAddress) -> Option<&Probe> {
        self.probes.iter().find(|p| p.address() == address)
    }

    pub fn probe_mut(&mut self, address: ProbeAddress) -> Option<&mut Probe> {
        self.probes.iter_mut().find(|p| p.address() == address)
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.probes_initialized
    }

    #[inline]
    pub fn is_acquiring(&self) -> bool {
        self.acquiring
    }

    /// Highest FIFO fill fraction over all probes
    pub fn fill_percentage(&self) -> f32 {
        self.probes
            .iter()
            .map(|p| p.fill_percentage())
            .fold(0.0, f32::max)
    }

    /// Hand every stream's buffer readers to the consumer (once)
    pub fn take_readers(&mut self) -> Vec<StreamReaders> {
        self.probes
            .iter_mut()
            .flat_map(|p| p.take_readers())
            .collect()
    }

    // ===== Lifecycle =====

    /// Prepare probes for acquisition and arm the slot.
    ///
    /// The first call runs `init`, calibration and the stored settings on
    /// every connected probe; later calls only re-arm.
    #[instrument(name = "basestation_initialize", skip(self), fields(slot = self.slot))]
    pub fn initialize(&mut self, loading_existing_config: bool) -> Result<InitializeReport> {
        if self.acquiring {
            return Err(BasestationError::Busy { slot: self.slot });
        }

        let mut report = InitializeReport::default();
        if !self.probes_initialized {
            let dirs = &self.options.calibration_dirs;
            for probe in self.probes.iter_mut().filter(|p| p.is_valid()) {
                let address = probe.address();
                if let Err(error) = probe.initialize() {
                    report.failures.push((address, error));
                }

                match probe.calibrate(dirs) {
                    Ok(status) => {
                        if let CalibrationStatus::Missing { serial } = status {
                            warn!(probe = %address, serial, "calibration files missing");
                            if !self.calibration_warning_sent {
                                self.broadcast
                                    .send_broadcast_message(&missing_calibration_message(*serial));
                                self.calibration_warning_sent = true;
                            }
                        }
                        report.calibration.push((address, status.clone()));
                    }
                    Err(error) => report.failures.push((address, error)),
                }

                if let Err(error) = probe.apply_settings() {
                    report.failures.push((address, error));
                }
            }
            self.probes_initialized = true;
            report.performed_setup = true;
            info!(
                slot = self.slot,
                probes = self.probes.len(),
                failures = report.failures.len(),
                "probes initialized"
            );
        }

        self.wait_for_rearm();
        self.adapter.arm(self.slot).map_err(|source| BasestationError::Arm {
            slot: self.slot,
            source,
        })?;
        debug!(slot = self.slot, "slot armed");
        Ok(report)
    }

    /// Start every enabled probe and fire the slot's software trigger.
    ///
    /// Returns the number of stream workers started.
    #[instrument(name = "basestation_start", skip(self), fields(slot = self.slot))]
    pub fn start_acquisition(&mut self) -> Result<usize> {
        if self.acquiring {
            warn!(slot = self.slot, "acquisition already running");
            return Ok(0);
        }
        self.wait_for_rearm();

        let mut started = 0;
        for probe in self
            .probes
            .iter_mut()
            .filter(|p| p.is_valid() && p.is_enabled())
        {
            match probe.start_acquisition() {
                Ok(count) => started += count,
                Err(error) => warn!(probe = %probe.address(), "probe not started: {error}"),
            }
        }

        if let Err(source) = self.adapter.set_sw_trigger(self.slot) {
            self.stop_probes();
            return Err(BasestationError::Trigger {
                slot: self.slot,
                source,
            });
        }

        self.acquiring = true;
        info!(slot = self.slot, streams = started, "acquisition started");
        Ok(started)
    }

    /// Stop every worker, then re-arm the slot in the background
    #[instrument(name = "basestation_stop", skip(self), fields(slot = self.slot))]
    pub fn stop_acquisition(&mut self) {
        if !self.acquiring {
            return;
        }
        self.stop_probes();
        self.acquiring = false;
        self.spawn_rearm();
        info!(slot = self.slot, "acquisition stopped");
    }

    fn stop_probes(&mut self) {
        for probe in &self.probes {
            probe.request_stop();
        }
        for probe in &mut self.probes {
            probe.wait_until_idle();
        }
    }

    fn spawn_rearm(&mut self) {
        self.join_rearm_thread();
        *self.rearm.pending.lock().unwrap() = true;

        let adapter = self.adapter.clone();
        let rearm = self.rearm.clone();
        let slot = self.slot;
        let spawned = thread::Builder::new()
            .name(format!("npx-arm-{slot}"))
            .spawn(move || {
                rearm_slot(adapter.as_ref(), slot);
                *rearm.pending.lock().unwrap() = false;
                rearm.done.notify_all();
            });

        match spawned {
            Ok(handle) => self.rearm_thread = Some(handle),
            Err(error) => {
                warn!(slot, "re-arm thread unavailable, arming inline: {error}");
                rearm_slot(self.adapter.as_ref(), slot);
                *self.rearm.pending.lock().unwrap() = false;
            }
        }
    }

    /// Block until a pending re-arm finishes or `arm_timeout` passes
    fn wait_for_rearm(&mut self) {
        let pending = self.rearm.pending.lock().unwrap();
        let (pending, result) = self
            .rearm
            .done
            .wait_timeout_while(pending, self.options.arm_timeout, |pending| *pending)
            .unwrap();
        let finished = !*pending;
        drop(pending);

        if result.timed_out() && !finished {
            warn!(
                slot = self.slot,
                timeout_ms = self.options.arm_timeout.as_millis() as u64,
                "re-arm still pending, continuing"
            );
            return;
        }
        self.join_rearm_thread();
    }

    fn join_rearm_thread(&mut self) {
        if let Some(handle) = self.rearm_thread.take() {
            if handle.join().is_err() {
                warn!(slot = self.slot, "re-arm thread panicked");
            }
        }
    }
}

fn rearm_slot(adapter: &dyn DeviceAdapter, slot: u8) {
    match adapter.arm(slot) {
        Ok(()) => debug!(slot, "slot re-armed"),
        Err(error) => warn!(slot, error_code = error.code(), "re-arm failed: {error}"),
    }
}

impl Drop for StreamCoordinator {
    fn drop(&mut self) {
        if self.acquiring {
            self.stop_probes();
            self.acquiring = false;
        }
        self.join_rearm_thread();
    }
}
