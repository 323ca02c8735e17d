//! Worker configuration and per-stream statistics

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::{ProbeCapabilities, StreamId, TimingConfig};

/// Static configuration of one acquisition worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Stream read by this worker
    pub stream: StreamId,

    /// Capability record of the probe generation
    pub capabilities: ProbeCapabilities,

    /// Timestamp continuity thresholds
    pub timing: TimingConfig,

    /// FIFO fill fraction above which a warning is logged
    pub fifo_warning_threshold: f32,

    /// Whether this stream publishes the probe's fill percentage
    pub reports_fill: bool,

    /// Append the event code as a trailing AP pseudo-channel
    pub sync_as_channel: bool,
}

impl WorkerConfig {
    pub fn new(stream: StreamId, capabilities: ProbeCapabilities) -> Self {
        Self {
            stream,
            capabilities,
            timing: TimingConfig::default(),
            fifo_warning_threshold: 0.8,
            reports_fill: true,
            sync_as_channel: false,
        }
    }

    /// Channels in the AP buffer, including the sync pseudo-channel
    #[inline]
    pub fn ap_channels(&self) -> usize {
        self.capabilities.channel_count + usize::from(self.sync_as_channel)
    }

    /// Channels in the LFP buffer, `None` without an LFP band
    #[inline]
    pub fn lfp_channels(&self) -> Option<usize> {
        self.capabilities
            .has_lfp()
            .then_some(self.capabilities.channel_count)
    }

    /// Largest AP frame count one read can produce
    #[inline]
    pub fn ap_frames_per_read(&self) -> usize {
        self.capabilities.ap_frames_per_read()
    }
}

/// Per-stream counters, updated by the worker thread
#[derive(Debug, Default)]
pub struct StreamStats {
    /// AP frames stored in the sample buffer
    pub ap_frames: AtomicU64,

    /// LFP frames stored in the sample buffer
    pub lfp_frames: AtomicU64,

    /// Non-empty reads
    pub batches: AtomicU64,

    /// Failed adapter reads
    pub read_errors: AtomicU64,

    /// Reported hardware timestamp jumps
    pub timestamp_jumps: AtomicU64,

    /// Frames overwritten or refused by the sample buffer
    pub frames_overrun: AtomicU64,

    /// FIFO warning threshold crossings
    pub fifo_warnings: AtomicU64,
}

impl StreamStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            ap_frames: self.ap_frames.load(Ordering::Relaxed),
            lfp_frames: self.lfp_frames.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            timestamp_jumps: self.timestamp_jumps.load(Ordering::Relaxed),
            frames_overrun: self.frames_overrun.load(Ordering::Relaxed),
            fifo_warnings: self.fifo_warnings.load(Ordering::Relaxed),
        }
    }
}

/// Stream statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStatsSnapshot {
    pub ap_frames: u64,
    pub lfp_frames: u64,
    pub batches: u64,
    pub read_errors: u64,
    pub timestamp_jumps: u64,
    pub frames_overrun: u64,
    pub fifo_warnings: u64,
}
