//! Simulation configuration
//!
//! Mirrors the failure-injection style of a mock client: every scenario is a
//! plain data field on [`SimulationConfig`].

use std::time::Duration;

use contracts::{ProbeAddress, StreamId};

/// How fast the simulated FIFO fills
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// Packets become available at the probe's native sample rate
    RealTime,
    /// Every read returns up to `packets_per_read` packets immediately
    Unpaced { packets_per_read: usize },
}

/// Synthetic signal shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalConfig {
    /// DC level (ADC codes) added to every channel
    pub dc_offset: i16,
    /// Uniform noise amplitude (ADC codes), 0 for a deterministic signal
    pub noise: i16,
    /// Frames per sync-line half period (15 000 = 1 Hz at 30 kHz)
    pub sync_half_period: u64,
    /// RNG seed
    pub seed: u64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            dc_offset: 12,
            noise: 4,
            sync_half_period: 15_000,
            seed: 0x5eed,
        }
    }
}

/// Extra hardware timestamp ticks inserted before a given frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampJumpInjection {
    /// Affected stream, `None` for every stream
    pub stream: Option<StreamId>,
    /// AP frame index (per stream, from the trigger) receiving the jump
    pub at_frame: u64,
    /// Ticks added on top of the nominal increment
    pub extra_ticks: u32,
}

/// Simulated basestation configuration
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// FIFO fill model
    pub pacing: Pacing,
    /// Hardware FIFO depth in packets; older packets are lost beyond it
    pub fifo_packets: usize,
    /// Stop producing after this many AP frames per stream
    pub frame_limit: Option<u64>,
    /// Blocking time of every read call
    pub read_latency: Duration,
    /// Synthetic signal
    pub signal: SignalConfig,
    /// Timestamp discontinuities to inject
    pub timestamp_jumps: Vec<TimestampJumpInjection>,
    /// Probes whose `open_probe` fails
    pub fail_open: Vec<ProbeAddress>,
    /// Probes whose `write_probe_configuration` fails
    pub fail_configuration: Vec<ProbeAddress>,
    /// Every Nth read of a stream fails with `ReadError`
    pub read_error_every: Option<u64>,
    /// Probes whose FIFO state reports a fixed packet backlog (capped at `fifo_packets`)
    pub fifo_backlog: Vec<(ProbeAddress, usize)>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            pacing: Pacing::RealTime,
            fifo_packets: 4096,
            frame_limit: None,
            read_latency: Duration::ZERO,
            signal: SignalConfig::default(),
            timestamp_jumps: Vec::new(),
            fail_open: Vec::new(),
            fail_configuration: Vec::new(),
            read_error_every: None,
            fifo_backlog: Vec::new(),
        }
    }
}

impl SimulationConfig {
    /// Deterministic, unpaced source producing exactly `frames` frames per stream
    pub fn finite(frames: u64, packets_per_read: usize) -> Self {
        Self {
            pacing: Pacing::Unpaced { packets_per_read },
            frame_limit: Some(frames),
            signal: SignalConfig {
                noise: 0,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
