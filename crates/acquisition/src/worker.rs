//! Acquisition worker
//!
//! One OS thread per stream, created once and reused across runs. While
//! running it polls the device adapter, decodes packet batches and publishes
//! frames into the stream's sample buffers. The idle/running handshake goes
//! through a `Mutex` + `Condvar`; the hot loop only touches atomics.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

use contracts::{BroadcastSink, DeviceAdapter, FifoState, PacketBatch, StreamId};
use sample_buffer::{BufferError, BufferWriter, FrameBlock};
use tracing::{debug, info, instrument, warn};

use crate::config::{StreamStats, StreamStatsSnapshot, WorkerConfig};
use crate::continuity::TimestampJump;
use crate::decoder::{RunParams, StreamDecoder};
use crate::error::{AcquisitionError, Result};

/// Worker lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Idle,
    Running,
    ShutDown,
}

/// Sample buffer writers fed by one worker
#[derive(Debug)]
pub struct StreamWriters {
    pub ap: BufferWriter,
    pub lfp: Option<BufferWriter>,
}

impl StreamWriters {
    fn clear(&mut self) {
        self.ap.clear();
        if let Some(lfp) = self.lfp.as_mut() {
            lfp.clear();
        }
    }
}

#[derive(Debug)]
struct ControlState {
    phase: WorkerPhase,
    pending: Option<RunParams>,
    runs_started: u64,
}

/// State shared between the worker handle and its thread
#[derive(Debug)]
struct Control {
    state: Mutex<ControlState>,
    changed: Condvar,
    stop_requested: AtomicBool,
    /// FIFO fill fraction as `f32` bits
    fill: AtomicU32,
}

impl Control {
    fn set_phase(&self, phase: WorkerPhase) {
        let mut state = self.state.lock().unwrap();
        if state.phase != WorkerPhase::ShutDown {
            state.phase = phase;
        }
        self.changed.notify_all();
    }
}

/// Handle to one acquisition thread
pub struct AcquisitionWorker {
    stream: StreamId,
    control: Arc<Control>,
    stats: Arc<StreamStats>,
    handle: Option<JoinHandle<()>>,
}

impl fmt::Debug for AcquisitionWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionWorker")
            .field("stream", &self.stream)
            .field("phase", &self.phase())
            .finish()
    }
}

impl AcquisitionWorker {
    /// Create the worker thread. It parks until the first start.
    ///
    /// # Errors
    /// Writer channel counts that do not match `config`, or thread spawn failure.
    #[instrument(name = "worker_spawn", skip_all, fields(stream = %config.stream))]
    pub fn spawn(
        config: WorkerConfig,
        adapter: Arc<dyn DeviceAdapter>,
        writers: StreamWriters,
        broadcast: Arc<dyn BroadcastSink>,
    ) -> Result<Self> {
        check_channels(&writers.ap, config.ap_channels())?;
        match (&writers.lfp, config.lfp_channels()) {
            (Some(lfp), Some(channels)) => check_channels(lfp, channels)?,
            (None, _) => {}
            (Some(lfp), None) => {
                return Err(BufferError::ChannelMismatch {
                    expected: 0,
                    actual: lfp.buffer().channel_count(),
                }
                .into())
            }
        }

        let stream = config.stream;
        let control = Arc::new(Control {
            state: Mutex::new(ControlState {
                phase: WorkerPhase::Idle,
                pending: None,
                runs_started: 0,
            }),
            changed: Condvar::new(),
            stop_requested: AtomicBool::new(false),
            fill: AtomicU32::new(0f32.to_bits()),
        });
        let stats = Arc::new(StreamStats::new());

        let batch = PacketBatch::new(
            config.capabilities.packet_layout(),
            config.capabilities.max_packets,
        )?;
        let worker_loop = WorkerLoop {
            decoder: StreamDecoder::new(&config),
            config,
            adapter,
            broadcast,
            control: control.clone(),
            stats: stats.clone(),
            writers,
            batch,
            jumps: Vec::new(),
            fifo_warning_active: false,
        };

        let handle = std::thread::Builder::new()
            .name(format!("npx-{stream}"))
            .spawn(move || worker_loop.run())
            .map_err(|source| AcquisitionError::Spawn { stream, source })?;

        debug!(stream = %stream, "acquisition thread created");
        Ok(Self {
            stream,
            control,
            stats,
            handle: Some(handle),
        })
    }

    #[inline]
    pub fn stream(&self) -> StreamId {
        self.stream
    }

    pub fn phase(&self) -> WorkerPhase {
        self.control.state.lock().unwrap().phase
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.phase() == WorkerPhase::Running
    }

    /// Latest FIFO fill fraction in `[0, 1]`, possibly stale
    #[inline]
    pub fn fill_percentage(&self) -> f32 {
        f32::from_bits(self.control.fill.load(Ordering::Relaxed))
    }

    pub fn stats(&self) -> StreamStatsSnapshot {
        self.stats.snapshot()
    }

    /// Idle → Running.
    ///
    /// Returns once the thread has cleared the buffers and reset its state.
    /// Returns `false` (and does nothing) when already running or shut down.
    #[instrument(name = "worker_start", skip(self, params), fields(stream = %self.stream))]
    pub fn start_acquisition(&self, params: RunParams) -> bool {
        let mut state = self.control.state.lock().unwrap();
        match state.phase {
            WorkerPhase::Running => {
                warn!(stream = %self.stream, "acquisition already running");
                return false;
            }
            WorkerPhase::ShutDown => return false,
            WorkerPhase::Idle => {}
        }

        self.control.stop_requested.store(false, Ordering::SeqCst);
        self.control.fill.store(0f32.to_bits(), Ordering::Relaxed);
        let run = state.runs_started;
        state.phase = WorkerPhase::Running;
        state.pending = Some(params);
        self.control.changed.notify_all();

        let _state = self
            .control
            .changed
            .wait_while(state, |s| {
                s.runs_started == run && s.phase == WorkerPhase::Running
            })
            .unwrap();
        true
    }

    /// Ask the thread to leave the loop after the current batch
    pub fn request_stop(&self) {
        self.control.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Block until the thread is idle (or shut down)
    pub fn wait_until_idle(&self) {
        let state = self.control.state.lock().unwrap();
        let _state = self
            .control
            .changed
            .wait_while(state, |s| s.phase == WorkerPhase::Running)
            .unwrap();
    }

    /// Cooperative stop: request + wait
    #[instrument(name = "worker_stop", skip(self), fields(stream = %self.stream))]
    pub fn stop_acquisition(&self) {
        self.request_stop();
        self.wait_until_idle();
    }
}

impl Drop for AcquisitionWorker {
    fn drop(&mut self) {
        self.control.stop_requested.store(true, Ordering::SeqCst);
        {
            let mut state = self.control.state.lock().unwrap();
            state.phase = WorkerPhase::ShutDown;
            self.control.changed.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(stream = %self.stream, "acquisition thread panicked");
            }
        }
    }
}

fn check_channels(writer: &BufferWriter, expected: usize) -> Result<()> {
    let actual = writer.buffer().channel_count();
    if actual == expected {
        Ok(())
    } else {
        Err(BufferError::ChannelMismatch { expected, actual }.into())
    }
}

fn wall_clock_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Thread-owned state
struct WorkerLoop {
    config: WorkerConfig,
    adapter: Arc<dyn DeviceAdapter>,
    broadcast: Arc<dyn BroadcastSink>,
    control: Arc<Control>,
    stats: Arc<StreamStats>,
    writers: StreamWriters,
    decoder: StreamDecoder,
    batch: PacketBatch,
    jumps: Vec<TimestampJump>,
    fifo_warning_active: bool,
}

impl WorkerLoop {
    fn run(mut self) {
        while let Some(params) = self.wait_for_start() {
            self.writers.clear();
            self.decoder.begin_run(params);
            self.fifo_warning_active = false;
            {
                let mut state = self.control.state.lock().unwrap();
                state.runs_started += 1;
                self.control.changed.notify_all();
            }
            info!(stream = %self.config.stream, "acquisition started");

            self.acquire();

            info!(
                stream = %self.config.stream,
                samples = self.decoder.ap_sample_number(),
                "acquisition stopped"
            );
            self.control.set_phase(WorkerPhase::Idle);
        }
        debug!(stream = %self.config.stream, "acquisition thread exiting");
    }

    /// Park until started (`Some`) or shut down (`None`)
    fn wait_for_start(&self) -> Option<RunParams> {
        let mut state = self.control.state.lock().unwrap();
        loop {
            if state.phase == WorkerPhase::ShutDown {
                return None;
            }
            if state.phase == WorkerPhase::Running {
                if let Some(params) = state.pending.take() {
                    return Some(params);
                }
            }
            state = self.control.changed.wait(state).unwrap();
        }
    }

    fn acquire(&mut self) {
        let caps = self.config.capabilities;
        let stream = self.config.stream;

        while !self.control.stop_requested.load(Ordering::Acquire) {
            match self
                .adapter
                .read_electrode_data(stream, &mut self.batch, caps.max_packets)
            {
                Ok(count) if count > 0 => self.process_batch(),
                Ok(_) => {}
                Err(error) => {
                    debug!(
                        stream = %stream,
                        slot = stream.slot(),
                        port = stream.port(),
                        error_code = error.code(),
                        "read_electrode_data failed: {error}"
                    );
                    StreamStats::add(&self.stats.read_errors, 1);
                    observability::record_read_error(&stream.to_string(), error.code());
                }
            }
            self.decoder.end_of_cycle();

            let available = match self.adapter.electrode_fifo_state(stream) {
                Ok(state) => {
                    self.update_fill(state);
                    state.packets_available
                }
                Err(_) => 0,
            };
            if available < caps.max_packets {
                let missing = (caps.max_packets - available) as u32;
                std::thread::sleep(caps.wait_per_missing_packet * missing);
            }
        }
    }

    fn process_batch(&mut self) {
        let timestamp = wall_clock_seconds();
        self.jumps.clear();
        self.decoder.decode(&self.batch, timestamp, &mut self.jumps);

        let jumps = std::mem::take(&mut self.jumps);
        for jump in &jumps {
            self.report_jump(*jump);
        }
        self.jumps = jumps;

        self.publish();
        StreamStats::add(&self.stats.batches, 1);

        if self.decoder.capture_offsets_if_needed() {
            debug!(stream = %self.config.stream, "DC offsets captured");
        }
    }

    fn report_jump(&self, jump: TimestampJump) {
        let stream = self.config.stream;
        let message = format!(
            "NPX TIMESTAMP JUMP: {}, expected 3 or 4...Possible data loss on slot {}, probe {} at sample number {}",
            jump.jump,
            stream.slot(),
            stream.port(),
            jump.sample_number
        );
        warn!(
            stream = %stream,
            jump = jump.jump,
            sample_number = jump.sample_number,
            "hardware timestamp discontinuity"
        );
        StreamStats::add(&self.stats.timestamp_jumps, 1);
        observability::record_timestamp_jump(&stream.to_string(), jump.jump);
        self.broadcast.send_broadcast_message(&message);
    }

    fn publish(&mut self) {
        let stream = self.config.stream.to_string();
        let ap = publish_block(&mut self.writers.ap, self.decoder.ap_block(), &stream, "ap");
        StreamStats::add(&self.stats.ap_frames, ap.stored as u64);
        let mut overrun = ap.overrun;

        if let (Some(writer), Some(block)) =
            (self.writers.lfp.as_mut(), self.decoder.lfp_block())
        {
            let lfp = publish_block(writer, block, &stream, "lfp");
            StreamStats::add(&self.stats.lfp_frames, lfp.stored as u64);
            overrun += lfp.overrun;
        }

        if overrun > 0 {
            StreamStats::add(&self.stats.frames_overrun, overrun as u64);
            observability::record_buffer_overrun(&stream, overrun);
        }
    }

    fn update_fill(&mut self, state: FifoState) {
        let fill = state.fill_fraction();
        if self.config.reports_fill {
            self.control.fill.store(fill.to_bits(), Ordering::Relaxed);
        }
        let stream = self.config.stream;
        observability::record_fifo_fill(&stream.to_string(), fill);

        let above = fill > self.config.fifo_warning_threshold;
        if above && !self.fifo_warning_active {
            warn!(
                stream = %stream,
                fill,
                packets_available = state.packets_available,
                "hardware FIFO filling up"
            );
            StreamStats::add(&self.stats.fifo_warnings, 1);
        } else if !above && self.fifo_warning_active {
            info!(stream = %stream, fill, "hardware FIFO recovered");
        }
        self.fifo_warning_active = above;
    }
}

struct Published {
    stored: usize,
    overrun: usize,
}

/// Write one block; overrun counts frames overwritten or refused by this write
fn publish_block(
    writer: &mut BufferWriter,
    block: &FrameBlock,
    stream: &str,
    band: &'static str,
) -> Published {
    let before = writer.buffer().stats();
    match writer.add_block(block) {
        Ok(stored) => {
            let after = writer.buffer().stats();
            observability::record_frames_published(stream, band, stored);
            Published {
                stored,
                overrun: ((after.frames_overwritten + after.frames_refused)
                    - (before.frames_overwritten + before.frames_refused))
                    as usize,
            }
        }
        Err(error) => {
            warn!(stream = %stream, band, "failed to publish frames: {error}");
            Published {
                stored: 0,
                overrun: block.len(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DropPolicy, ProbeAddress, ProbeGeneration, TimingConfig};
    use device::{SimulatedAdapter, SimulationConfig, TimestampJumpInjection};
    use sample_buffer::{BufferReader, SampleBuffer};
    use std::time::{Duration, Instant};

    struct Harness {
        adapter: Arc<SimulatedAdapter>,
        worker: AcquisitionWorker,
        ap: BufferReader,
        lfp: Option<BufferReader>,
        messages: Arc<Mutex<Vec<String>>>,
    }

    fn harness(
        generation: ProbeGeneration,
        sim: SimulationConfig,
        timing: TimingConfig,
    ) -> Harness {
        let probe = ProbeAddress::new(2, 1, 1);
        let adapter = Arc::new(SimulatedAdapter::with_probes(sim, [(probe, generation)]));
        adapter.open_probe(probe).unwrap();
        adapter.arm(2).unwrap();

        let stream = probe.streams(generation.capabilities().shank_streams)[0];
        let mut config = WorkerConfig::new(stream, generation.capabilities());
        config.timing = timing;

        let (ap_writer, ap) =
            SampleBuffer::new(config.ap_channels(), 100_000, DropPolicy::DropOldest).unwrap();
        let (lfp_writer, lfp) = match config.lfp_channels() {
            Some(channels) => {
                let (w, r) = SampleBuffer::new(channels, 10_000, DropPolicy::DropOldest).unwrap();
                (Some(w), Some(r))
            }
            None => (None, None),
        };

        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = messages.clone();
        let broadcast: Arc<dyn BroadcastSink> =
            Arc::new(move |text: &str| sink.lock().unwrap().push(text.to_string()));

        let worker = AcquisitionWorker::spawn(
            config,
            adapter.clone(),
            StreamWriters {
                ap: ap_writer,
                lfp: lfp_writer,
            },
            broadcast,
        )
        .unwrap();

        Harness {
            adapter,
            worker,
            ap,
            lfp,
            messages,
        }
    }

    fn params() -> RunParams {
        RunParams {
            ap_gain: 500.0,
            lfp_gain: Some(250.0),
            invert_sync_line: false,
        }
    }

    fn wait_for(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !done() {
            assert!(Instant::now() < deadline, "timed out");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_idle_until_started() {
        let h = harness(
            ProbeGeneration::Np1,
            SimulationConfig::finite(1200, 64),
            TimingConfig::default(),
        );
        assert_eq!(h.worker.phase(), WorkerPhase::Idle);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(h.ap.available(), 0);
        assert_eq!(h.adapter.calls().read_electrode_data, 0);
    }

    #[test]
    fn test_monotonic_sample_numbers_across_jumps() {
        let sim = SimulationConfig {
            timestamp_jumps: vec![TimestampJumpInjection {
                stream: None,
                at_frame: 600,
                extra_ticks: 50,
            }],
            ..SimulationConfig::finite(1200, 10)
        };
        let mut h = harness(
            ProbeGeneration::Np1,
            sim,
            TimingConfig {
                startup_grace_samples: 100,
                ..Default::default()
            },
        );

        assert!(h.worker.start_acquisition(params()));
        h.adapter.set_sw_trigger(2).unwrap();
        wait_for(|| h.worker.stats().ap_frames == 1200);
        h.worker.stop_acquisition();

        let mut block = FrameBlock::new(384, 2000);
        assert_eq!(h.ap.read_all_from_buffer(&mut block, 2000), 1200);
        for (i, n) in block.sample_numbers().iter().enumerate() {
            assert_eq!(*n, i as i64);
        }

        let messages = h.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("NPX TIMESTAMP JUMP: 5"), "{}", messages[0]);
        assert!(
            messages[0].ends_with("slot 2, probe 1 at sample number 600"),
            "{}",
            messages[0]
        );
        assert_eq!(h.worker.stats().timestamp_jumps, 1);

        let mut lfp = FrameBlock::new(384, 200);
        assert_eq!(h.lfp.as_mut().unwrap().read_all_from_buffer(&mut lfp, 200), 100);
    }

    #[test]
    fn test_restart_resets_state() {
        let mut h = harness(
            ProbeGeneration::Np2,
            SimulationConfig::finite(300, 100),
            TimingConfig::default(),
        );

        for _ in 0..2 {
            h.adapter.arm(2).unwrap();
            assert!(h.worker.start_acquisition(RunParams {
                ap_gain: 80.0,
                lfp_gain: None,
                invert_sync_line: false,
            }));
            assert!(h.worker.is_running());
            h.adapter.set_sw_trigger(2).unwrap();
            wait_for(|| h.ap.available() == 300);
            h.worker.stop_acquisition();
            assert_eq!(h.worker.phase(), WorkerPhase::Idle);

            let mut block = FrameBlock::new(384, 400);
            assert_eq!(h.ap.read_all_from_buffer(&mut block, 400), 300);
            assert_eq!(block.sample_numbers()[0], 0);
        }
        assert!(h.lfp.is_none());
    }

    #[test]
    fn test_double_start_is_noop() {
        let h = harness(
            ProbeGeneration::Np1,
            SimulationConfig::finite(120, 1),
            TimingConfig::default(),
        );
        assert!(h.worker.start_acquisition(params()));
        assert!(!h.worker.start_acquisition(params()));
        h.worker.stop_acquisition();
        assert!(!h.worker.is_running());
    }

    #[test]
    fn test_read_errors_counted_and_retried() {
        let sim = SimulationConfig {
            read_error_every: Some(3),
            ..SimulationConfig::finite(1200, 4)
        };
        let h = harness(ProbeGeneration::Np1, sim, TimingConfig::default());
        h.worker.start_acquisition(params());
        h.adapter.set_sw_trigger(2).unwrap();
        wait_for(|| h.worker.stats().ap_frames == 1200);
        h.worker.stop_acquisition();

        let stats = h.worker.stats();
        assert!(stats.read_errors > 0);
        assert_eq!(stats.ap_frames, 1200);
    }

    #[test]
    fn test_fill_percentage_reported() {
        let sim = SimulationConfig {
            fifo_packets: 64,
            ..Default::default()
        };
        let h = harness(ProbeGeneration::Np1, sim, TimingConfig::default());
        h.worker.start_acquisition(params());
        h.adapter.set_sw_trigger(2).unwrap();
        wait_for(|| h.worker.stats().batches > 2);
        let fill = h.worker.fill_percentage();
        assert!((0.0..=1.0).contains(&fill));
        h.worker.stop_acquisition();
    }

    #[test]
    fn test_stop_waits_for_in_flight_read() {
        let sim = SimulationConfig {
            pacing: device::Pacing::Unpaced {
                packets_per_read: 100,
            },
            read_latency: Duration::from_millis(100),
            ..Default::default()
        };
        let h = harness(ProbeGeneration::Np2, sim, TimingConfig::default());
        h.worker.start_acquisition(params());
        h.adapter.set_sw_trigger(2).unwrap();
        wait_for(|| h.worker.stats().batches >= 2);

        // catch the start of a fresh read, then stop while it sleeps
        let before = h.adapter.calls().read_electrode_data;
        wait_for(|| h.adapter.calls().read_electrode_data > before);
        let in_flight = h.adapter.calls().read_electrode_data;
        std::thread::sleep(Duration::from_millis(10));
        h.worker.request_stop();
        assert_eq!(h.worker.phase(), WorkerPhase::Running);

        let started = Instant::now();
        h.worker.wait_until_idle();
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(h.worker.phase(), WorkerPhase::Idle);
        assert_eq!(h.adapter.calls().read_electrode_data, in_flight);

        let stats = h.worker.stats();
        assert_eq!(h.ap.available() % 100, 0);
        assert_eq!(h.ap.available() as u64, stats.batches * 100);
        assert_eq!(stats.ap_frames, stats.batches * 100);
    }

    #[test]
    fn test_channel_mismatch_rejected() {
        let probe = ProbeAddress::new(2, 1, 1);
        let adapter: Arc<dyn DeviceAdapter> =
            Arc::new(SimulatedAdapter::new(SimulationConfig::default()));
        let config = WorkerConfig::new(probe.stream(), ProbeGeneration::Np2.capabilities());
        let (ap, _reader) = SampleBuffer::new(10, 100, DropPolicy::DropOldest).unwrap();

        let err = AcquisitionWorker::spawn(
            config,
            adapter,
            StreamWriters { ap, lfp: None },
            Arc::new(|_: &str| {}),
        )
        .unwrap_err();
        assert!(matches!(err, AcquisitionError::Buffer(_)));
    }

    #[test]
    fn test_drop_joins_thread() {
        let h = harness(
            ProbeGeneration::Np1,
            SimulationConfig::finite(120_000, 64),
            TimingConfig::default(),
        );
        h.worker.start_acquisition(params());
        h.adapter.set_sw_trigger(2).unwrap();
        drop(h.worker);
    }
}
