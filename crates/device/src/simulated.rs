//! Simulated basestation
//!
//! In-process implementation of [`DeviceAdapter`]. Probes are attached to
//! slots/ports explicitly, streams start on the slot software trigger and
//! data is produced by one [`StreamGenerator`] per stream.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use contracts::{
    Bank, DeviceAdapter, FifoState, NpError, NpResult, PacketBatch, ProbeAddress,
    ProbeCapabilities, ProbeGeneration, ReferenceSelection, StreamId,
};
use tracing::{debug, instrument};

use crate::config::{Pacing, SimulationConfig};
use crate::counters::{CallCounters, CallCountsSnapshot};
use crate::signal::StreamGenerator;

/// Simulated probe attached to a port
#[derive(Debug)]
struct SimulatedProbe {
    generation: ProbeGeneration,
    open: bool,
    adc_calibration: Option<PathBuf>,
    gain_calibration: Option<PathBuf>,
}

impl SimulatedProbe {
    fn capabilities(&self) -> ProbeCapabilities {
        self.generation.capabilities()
    }
}

#[derive(Debug)]
struct StreamState {
    generator: StreamGenerator,
    sample_rate: f64,
    started: Option<Instant>,
    reads: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct SlotState {
    armed: bool,
}

/// Simulated basestation(s) implementing [`DeviceAdapter`]
pub struct SimulatedAdapter {
    config: SimulationConfig,
    probes: Mutex<HashMap<ProbeAddress, SimulatedProbe>>,
    streams: Mutex<HashMap<StreamId, Arc<Mutex<StreamState>>>>,
    slots: Mutex<HashMap<u8, SlotState>>,
    counters: CallCounters,
}

impl SimulatedAdapter {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            probes: Mutex::new(HashMap::new()),
            streams: Mutex::new(HashMap::new()),
            slots: Mutex::new(HashMap::new()),
            counters: CallCounters::default(),
        }
    }

    /// Plug a probe of `generation` into `address`
    pub fn attach_probe(&self, address: ProbeAddress, generation: ProbeGeneration) {
        self.probes.lock().unwrap().insert(
            address,
            SimulatedProbe {
                generation,
                open: false,
                adc_calibration: None,
                gain_calibration: None,
            },
        );
        self.slots.lock().unwrap().entry(address.slot).or_default();
    }

    /// Convenience constructor with probes already attached
    pub fn with_probes(
        config: SimulationConfig,
        probes: impl IntoIterator<Item = (ProbeAddress, ProbeGeneration)>,
    ) -> Self {
        let adapter = Self::new(config);
        for (address, generation) in probes {
            adapter.attach_probe(address, generation);
        }
        adapter
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Snapshot of vendor call counts
    pub fn calls(&self) -> CallCountsSnapshot {
        self.counters.snapshot()
    }

    pub fn is_open(&self, probe: ProbeAddress) -> bool {
        self.probes
            .lock()
            .unwrap()
            .get(&probe)
            .is_some_and(|p| p.open)
    }

    pub fn is_armed(&self, slot: u8) -> bool {
        self.slots
            .lock()
            .unwrap()
            .get(&slot)
            .is_some_and(|s| s.armed)
    }

    /// Calibration files applied to `probe` as `(adc, gain)`
    pub fn calibration_files(&self, probe: ProbeAddress) -> (Option<PathBuf>, Option<PathBuf>) {
        self.probes
            .lock()
            .unwrap()
            .get(&probe)
            .map(|p| (p.adc_calibration.clone(), p.gain_calibration.clone()))
            .unwrap_or_default()
    }

    /// Frames produced on `stream` since the last trigger (delivered or lost)
    pub fn frames_produced(&self, stream: StreamId) -> u64 {
        self.stream_state(stream)
            .map(|s| s.lock().unwrap().generator.frames_produced())
            .unwrap_or(0)
    }

    fn stream_state(&self, stream: StreamId) -> Option<Arc<Mutex<StreamState>>> {
        self.streams.lock().unwrap().get(&stream).cloned()
    }

    /// Run `f` on an open probe
    fn with_open_probe<T>(
        &self,
        probe: ProbeAddress,
        f: impl FnOnce(&mut SimulatedProbe) -> NpResult<T>,
    ) -> NpResult<T> {
        let mut probes = self.probes.lock().unwrap();
        match probes.get_mut(&probe) {
            Some(p) if p.open => f(p),
            Some(_) => Err(NpError::NotOpen),
            None => Err(NpError::NoLink),
        }
    }

    fn check_channel(caps: &ProbeCapabilities, channel: usize) -> NpResult<()> {
        if channel < caps.channel_count {
            Ok(())
        } else {
            Err(NpError::WrongChannel)
        }
    }

    /// Packets waiting in the hardware FIFO, dropping overflow
    fn settle_backlog(&self, state: &mut StreamState) -> usize {
        let spp = state.generator.layout().samples_per_packet as u64;
        let produced = state.generator.frames_produced() / spp;
        let limit = self.config.frame_limit.map(|frames| frames / spp);

        match self.config.pacing {
            Pacing::RealTime => {
                let Some(started) = state.started else {
                    return 0;
                };
                let due_frames = (started.elapsed().as_secs_f64() * state.sample_rate) as u64;
                let due = limit.map_or(due_frames / spp, |l| (due_frames / spp).min(l));
                let backlog = due.saturating_sub(produced) as usize;
                if backlog > self.config.fifo_packets {
                    let lost = backlog - self.config.fifo_packets;
                    debug!(packets = lost, "simulated FIFO overflow");
                    state.generator.skip_packets(lost);
                    self.config.fifo_packets
                } else {
                    backlog
                }
            }
            Pacing::Unpaced { packets_per_read } => {
                if state.started.is_none() {
                    return 0;
                }
                let remaining = limit.map_or(u64::MAX, |l| l.saturating_sub(produced));
                remaining.min(packets_per_read as u64) as usize
            }
        }
    }
}

impl DeviceAdapter for SimulatedAdapter {
    #[instrument(name = "sim_open_probe", skip(self), fields(probe = %probe))]
    fn open_probe(&self, probe: ProbeAddress) -> NpResult<()> {
        CallCounters::bump(&self.counters.open_probe);
        if self.config.fail_open.contains(&probe) {
            return Err(NpError::Failed);
        }

        let mut probes = self.probes.lock().unwrap();
        let Some(state) = probes.get_mut(&probe) else {
            return Err(NpError::NoLink);
        };
        if state.open {
            return Err(NpError::AlreadyOpen);
        }
        state.open = true;

        let caps = state.capabilities();
        let layout = caps.packet_layout();
        let mut streams = self.streams.lock().unwrap();
        for stream in probe.streams(caps.shank_streams) {
            let generator = StreamGenerator::new(
                stream,
                layout,
                self.config.signal,
                &self.config.timestamp_jumps,
            );
            streams.insert(
                stream,
                Arc::new(Mutex::new(StreamState {
                    generator,
                    sample_rate: caps.ap_sample_rate,
                    started: None,
                    reads: 0,
                })),
            );
        }
        debug!(generation = %state.generation, "probe opened");
        Ok(())
    }

    fn close_probe(&self, probe: ProbeAddress) -> NpResult<()> {
        self.with_open_probe(probe, |p| {
            p.open = false;
            Ok(())
        })?;
        self.streams.lock().unwrap().retain(|id, _| id.probe != probe);
        Ok(())
    }

    fn init(&self, probe: ProbeAddress) -> NpResult<()> {
        CallCounters::bump(&self.counters.init);
        self.with_open_probe(probe, |_| Ok(()))
    }

    fn probe_serial_number(&self, probe: ProbeAddress) -> NpResult<u64> {
        self.with_open_probe(probe, |_| {
            Ok(18_000_000_000
                + probe.slot as u64 * 10_000
                + probe.port as u64 * 100
                + probe.dock as u64)
        })
    }

    fn read_electrode_data(
        &self,
        stream: StreamId,
        batch: &mut PacketBatch,
        requested: usize,
    ) -> NpResult<usize> {
        CallCounters::bump(&self.counters.read_electrode_data);
        batch.clear();
        let state = self.stream_state(stream).ok_or(NpError::NotOpen)?;

        if !self.config.read_latency.is_zero() {
            std::thread::sleep(self.config.read_latency);
        }

        let mut state = state.lock().unwrap();
        if state.started.is_none() {
            return Ok(0);
        }
        state.reads += 1;
        if let Some(every) = self.config.read_error_every.filter(|n| *n > 0) {
            if state.reads % every == 0 {
                return Err(NpError::ReadError);
            }
        }

        let backlog = self.settle_backlog(&mut state);
        let count = backlog.min(requested).min(batch.capacity());
        Ok(state.generator.fill(batch, count))
    }

    fn electrode_fifo_state(&self, stream: StreamId) -> NpResult<FifoState> {
        let state = self.stream_state(stream).ok_or(NpError::NotOpen)?;
        let mut state = state.lock().unwrap();
        let settled = self.settle_backlog(&mut state);
        let available = self
            .config
            .fifo_backlog
            .iter()
            .find(|(probe, _)| *probe == stream.probe)
            .map_or(settled, |(_, packets)| (*packets).min(self.config.fifo_packets));
        Ok(FifoState {
            packets_available: available,
            headroom: self.config.fifo_packets.saturating_sub(available),
        })
    }

    fn set_gain(
        &self,
        probe: ProbeAddress,
        channel: usize,
        ap_gain_index: usize,
        lfp_gain_index: usize,
    ) -> NpResult<()> {
        CallCounters::bump(&self.counters.set_gain);
        self.with_open_probe(probe, |p| {
            let caps = p.capabilities();
            Self::check_channel(&caps, channel)?;
            let lfp_ok = caps.lfp_gains.is_empty() || lfp_gain_index < caps.lfp_gains.len();
            if ap_gain_index >= caps.ap_gains.len() || !lfp_ok {
                return Err(NpError::IllegalArgument);
            }
            Ok(())
        })
    }

    fn set_reference(
        &self,
        probe: ProbeAddress,
        channel: usize,
        shank: u8,
        reference: ReferenceSelection,
    ) -> NpResult<()> {
        CallCounters::bump(&self.counters.set_reference);
        self.with_open_probe(probe, |p| {
            let caps = p.capabilities();
            Self::check_channel(&caps, channel)?;
            if !caps.references.contains(&reference) || shank as usize >= caps.shank_streams {
                return Err(NpError::IllegalArgument);
            }
            Ok(())
        })
    }

    fn set_ap_corner_frequency(
        &self,
        probe: ProbeAddress,
        channel: usize,
        _disable_highpass: bool,
    ) -> NpResult<()> {
        CallCounters::bump(&self.counters.set_ap_corner_frequency);
        self.with_open_probe(probe, |p| {
            let caps = p.capabilities();
            if !caps.has_ap_filter_switch {
                return Err(NpError::NotSupported);
            }
            Self::check_channel(&caps, channel)
        })
    }

    fn select_electrode(
        &self,
        probe: ProbeAddress,
        channel: usize,
        shank: u8,
        bank: Bank,
    ) -> NpResult<()> {
        CallCounters::bump(&self.counters.select_electrode);
        self.with_open_probe(probe, |p| {
            let caps = p.capabilities();
            Self::check_channel(&caps, channel)?;
            if usize::from(bank.index()) >= caps.bank_count as usize || shank as usize >= caps.shank_streams {
                return Err(NpError::IllegalArgument);
            }
            Ok(())
        })
    }

    fn write_probe_configuration(&self, probe: ProbeAddress, _read_check: bool) -> NpResult<()> {
        CallCounters::bump(&self.counters.write_probe_configuration);
        if self.config.fail_configuration.contains(&probe) {
            return Err(NpError::Failed);
        }
        self.with_open_probe(probe, |_| Ok(()))
    }

    fn set_adc_calibration(&self, probe: ProbeAddress, file: &Path) -> NpResult<()> {
        CallCounters::bump(&self.counters.set_adc_calibration);
        if !file.is_file() {
            return Err(NpError::FileOpenError);
        }
        self.with_open_probe(probe, |p| {
            p.adc_calibration = Some(file.to_path_buf());
            Ok(())
        })
    }

    fn set_gain_calibration(&self, probe: ProbeAddress, file: &Path) -> NpResult<()> {
        CallCounters::bump(&self.counters.set_gain_calibration);
        if !file.is_file() {
            return Err(NpError::FileOpenError);
        }
        self.with_open_probe(probe, |p| {
            p.gain_calibration = Some(file.to_path_buf());
            Ok(())
        })
    }

    #[instrument(name = "sim_arm", skip(self))]
    fn arm(&self, slot: u8) -> NpResult<()> {
        CallCounters::bump(&self.counters.arm);
        let mut slots = self.slots.lock().unwrap();
        let state = slots.get_mut(&slot).ok_or(NpError::NoSlot)?;
        state.armed = true;

        for (_, stream) in self
            .streams
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id.slot() == slot)
        {
            stream.lock().unwrap().started = None;
        }
        Ok(())
    }

    #[instrument(name = "sim_sw_trigger", skip(self))]
    fn set_sw_trigger(&self, slot: u8) -> NpResult<()> {
        CallCounters::bump(&self.counters.set_sw_trigger);
        let mut slots = self.slots.lock().unwrap();
        let state = slots.get_mut(&slot).ok_or(NpError::NoSlot)?;
        if !state.armed {
            return Err(NpError::Failed);
        }
        state.armed = false;

        let now = Instant::now();
        let mut started = 0usize;
        for (_, stream) in self
            .streams
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id.slot() == slot)
        {
            let mut stream = stream.lock().unwrap();
            stream.generator.reset();
            stream.reads = 0;
            stream.started = Some(now);
            started += 1;
        }
        debug!(streams = started, "slot triggered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn np1() -> ProbeAddress {
        ProbeAddress::new(2, 1, 1)
    }

    fn batch_for(generation: ProbeGeneration, capacity: usize) -> PacketBatch {
        PacketBatch::new(generation.capabilities().packet_layout(), capacity).unwrap()
    }

    #[test]
    fn test_open_unattached_probe() {
        let adapter = SimulatedAdapter::new(SimulationConfig::default());
        assert_eq!(adapter.open_probe(np1()), Err(NpError::NoLink));
    }

    #[test]
    fn test_open_failure_injection() {
        let config = SimulationConfig {
            fail_open: vec![np1()],
            ..Default::default()
        };
        let adapter = SimulatedAdapter::with_probes(config, [(np1(), ProbeGeneration::Np1)]);
        assert_eq!(adapter.open_probe(np1()), Err(NpError::Failed));
        assert!(!adapter.is_open(np1()));
    }

    #[test]
    fn test_configuration_requires_open() {
        let adapter = SimulatedAdapter::with_probes(
            SimulationConfig::default(),
            [(np1(), ProbeGeneration::Np1)],
        );
        assert_eq!(adapter.set_gain(np1(), 0, 3, 2), Err(NpError::NotOpen));

        adapter.open_probe(np1()).unwrap();
        assert_eq!(adapter.set_gain(np1(), 0, 3, 2), Ok(()));
        assert_eq!(adapter.set_gain(np1(), 384, 3, 2), Err(NpError::WrongChannel));
        assert_eq!(adapter.set_gain(np1(), 0, 8, 2), Err(NpError::IllegalArgument));
        assert_eq!(adapter.calls().set_gain, 4);
    }

    #[test]
    fn test_no_data_before_trigger() {
        let adapter = SimulatedAdapter::with_probes(
            SimulationConfig::finite(120, 4),
            [(np1(), ProbeGeneration::Np1)],
        );
        adapter.open_probe(np1()).unwrap();
        let mut batch = batch_for(ProbeGeneration::Np1, 8);

        assert_eq!(adapter.read_electrode_data(np1().stream(), &mut batch, 8), Ok(0));
        assert_eq!(adapter.set_sw_trigger(2), Err(NpError::Failed));

        adapter.arm(2).unwrap();
        adapter.set_sw_trigger(2).unwrap();
        assert_eq!(adapter.read_electrode_data(np1().stream(), &mut batch, 8), Ok(4));
        assert_eq!(batch.frame_count(), 48);
    }

    #[test]
    fn test_frame_limit() {
        let adapter = SimulatedAdapter::with_probes(
            SimulationConfig::finite(120, 4),
            [(np1(), ProbeGeneration::Np1)],
        );
        adapter.open_probe(np1()).unwrap();
        adapter.arm(2).unwrap();
        adapter.set_sw_trigger(2).unwrap();

        let mut batch = batch_for(ProbeGeneration::Np1, 8);
        let mut total = 0;
        for _ in 0..10 {
            total += adapter
                .read_electrode_data(np1().stream(), &mut batch, 8)
                .unwrap();
        }
        assert_eq!(total, 10);
        assert_eq!(adapter.frames_produced(np1().stream()), 120);
        assert_eq!(
            adapter
                .electrode_fifo_state(np1().stream())
                .unwrap()
                .packets_available,
            0
        );
    }

    #[test]
    fn test_read_error_injection() {
        let config = SimulationConfig {
            read_error_every: Some(2),
            ..SimulationConfig::finite(1200, 1)
        };
        let adapter = SimulatedAdapter::with_probes(config, [(np1(), ProbeGeneration::Np1)]);
        adapter.open_probe(np1()).unwrap();
        adapter.arm(2).unwrap();
        adapter.set_sw_trigger(2).unwrap();

        let mut batch = batch_for(ProbeGeneration::Np1, 1);
        let stream = np1().stream();
        assert_eq!(adapter.read_electrode_data(stream, &mut batch, 1), Ok(1));
        assert_eq!(
            adapter.read_electrode_data(stream, &mut batch, 1),
            Err(NpError::ReadError)
        );
        assert_eq!(adapter.read_electrode_data(stream, &mut batch, 1), Ok(1));
    }

    #[test]
    fn test_quad_base_streams_per_shank() {
        let probe = ProbeAddress::new(3, 1, 1);
        let adapter = SimulatedAdapter::with_probes(
            SimulationConfig::finite(10, 5),
            [(probe, ProbeGeneration::QuadBase)],
        );
        adapter.open_probe(probe).unwrap();
        adapter.arm(3).unwrap();
        adapter.set_sw_trigger(3).unwrap();

        let mut batch = batch_for(ProbeGeneration::QuadBase, 8);
        for shank in 0..4 {
            assert_eq!(
                adapter.read_electrode_data(probe.shank_stream(shank), &mut batch, 8),
                Ok(5)
            );
        }
        assert_eq!(
            adapter.read_electrode_data(probe.stream(), &mut batch, 8),
            Err(NpError::NotOpen)
        );
    }

    #[test]
    fn test_real_time_overflow_drops_packets() {
        let config = SimulationConfig {
            fifo_packets: 8,
            ..Default::default()
        };
        let adapter = SimulatedAdapter::with_probes(config, [(np1(), ProbeGeneration::Np1)]);
        adapter.open_probe(np1()).unwrap();
        adapter.arm(2).unwrap();
        adapter.set_sw_trigger(2).unwrap();

        std::thread::sleep(Duration::from_millis(20));
        let state = adapter.electrode_fifo_state(np1().stream()).unwrap();
        assert_eq!(state.packets_available, 8);
        assert_eq!(state.headroom, 0);
        assert!(adapter.frames_produced(np1().stream()) > 8 * 12);
    }

    #[test]
    fn test_pinned_fifo_backlog() {
        let other = ProbeAddress::new(2, 2, 1);
        let config = SimulationConfig {
            fifo_packets: 400,
            fifo_backlog: vec![(np1(), 300), (other, 1000)],
            ..SimulationConfig::finite(1200, 10)
        };
        let adapter = SimulatedAdapter::with_probes(
            config,
            [(np1(), ProbeGeneration::Np1), (other, ProbeGeneration::Np2)],
        );
        adapter.open_probe(np1()).unwrap();
        adapter.open_probe(other).unwrap();

        let state = adapter.electrode_fifo_state(np1().stream()).unwrap();
        assert_eq!(state.packets_available, 300);
        assert_eq!(state.headroom, 100);
        assert_eq!(state.fill_fraction(), 0.75);

        // capped at the FIFO depth
        let state = adapter.electrode_fifo_state(other.stream()).unwrap();
        assert_eq!(state.packets_available, 400);
        assert_eq!(state.headroom, 0);
    }

    #[test]
    fn test_calibration_file_must_exist() {
        let adapter = SimulatedAdapter::with_probes(
            SimulationConfig::default(),
            [(np1(), ProbeGeneration::Np1)],
        );
        adapter.open_probe(np1()).unwrap();
        assert_eq!(
            adapter.set_adc_calibration(np1(), Path::new("/nonexistent/adc.csv")),
            Err(NpError::FileOpenError)
        );
        assert_eq!(adapter.calibration_files(np1()), (None, None));
    }
}
