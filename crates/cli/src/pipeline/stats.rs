//! Acquisition run statistics.

use std::time::Duration;

use acquisition::StreamStatsSnapshot;
use observability::AcquisitionMetricsAggregator;

/// Per-stream outcome of a run
#[derive(Debug, Clone, Default)]
pub struct StreamSummary {
    pub stream: String,
    /// Frames the consumer pulled from the AP buffer
    pub ap_frames_drained: u64,
    pub lfp_frames_drained: u64,
    /// Sample-number discontinuities seen by the consumer
    pub sample_gaps: u64,
    /// Producer-side counters
    pub worker: StreamStatsSnapshot,
}

/// Statistics from an acquisition run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Total duration of the run
    pub duration: Duration,

    /// Probes opened successfully
    pub probes_connected: usize,

    /// Probes that failed to open
    pub probes_disconnected: usize,

    /// Configuration failures reported by initialize
    pub configuration_failures: usize,

    pub streams: Vec<StreamSummary>,

    /// Broadcast messages sent during the run
    pub broadcast_total: u64,
    pub recent_broadcasts: Vec<String>,

    /// Drain-side metrics aggregator
    pub metrics: AcquisitionMetricsAggregator,
}

impl PipelineStats {
    pub fn total_ap_frames(&self) -> u64 {
        self.streams.iter().map(|s| s.ap_frames_drained).sum()
    }

    /// Mean AP frame rate per stream
    pub fn ap_rate_per_stream(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 && !self.streams.is_empty() {
            self.total_ap_frames() as f64 / secs / self.streams.len() as f64
        } else {
            0.0
        }
    }

    pub fn timestamp_jumps(&self) -> u64 {
        self.streams.iter().map(|s| s.worker.timestamp_jumps).sum()
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                  Acquisition Statistics                      ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!(
            "   ├─ Probes: {} connected, {} unavailable",
            self.probes_connected, self.probes_disconnected
        );
        println!("   ├─ Configuration failures: {}", self.configuration_failures);
        println!("   ├─ AP frames drained: {}", self.total_ap_frames());
        println!("   ├─ AP rate per stream: {:.1} Hz", self.ap_rate_per_stream());
        println!("   └─ Timestamp jumps: {}", self.timestamp_jumps());

        if !self.streams.is_empty() {
            println!("\n📈 Streams");
            for (i, s) in self.streams.iter().enumerate() {
                let prefix = if i == self.streams.len() - 1 { "└─" } else { "├─" };
                println!(
                    "   {} {}: ap {} lfp {} | read errors {} | overrun {} | gaps {} | fifo warnings {}",
                    prefix,
                    s.stream,
                    s.ap_frames_drained,
                    s.lfp_frames_drained,
                    s.worker.read_errors,
                    s.worker.frames_overrun,
                    s.sample_gaps,
                    s.worker.fifo_warnings
                );
            }
        }

        if self.broadcast_total > 0 {
            println!("\n⚠️  Broadcast messages ({})", self.broadcast_total);
            for message in &self.recent_broadcasts {
                println!("   ├─ {}", message);
            }
        }

        println!("\n{}", self.metrics.summary());
    }
}
