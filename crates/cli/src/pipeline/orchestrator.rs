//! Pipeline orchestrator - coordinates all components.
//!
//! Builds a simulated basestation from the blueprint, one coordinator per
//! slot, then drains every stream buffer on a fixed interval until the
//! duration elapses or a shutdown signal arrives.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use basestation::{CoordinatorOptions, StreamCoordinator};
use contracts::AcquisitionBlueprint;
use device::{SimulatedAdapter, SimulationConfig};
use observability::{record_frames_drained, AcquisitionMetricsAggregator, BroadcastLog};
use tracing::{info, warn};

use super::{PipelineStats, StreamDrain, StreamSummary};
use crate::error::CliError;

/// Frames pulled per read call
const DRAIN_BLOCK_FRAMES: usize = 4096;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The acquisition blueprint
    pub blueprint: AcquisitionBlueprint,

    /// Run length (None = until shutdown)
    pub duration: Option<Duration>,

    /// Buffer drain period
    pub drain_interval: Duration,

    /// Passed to the coordinators' initialize
    pub loading_existing_config: bool,

    /// Simulated hardware behavior
    pub simulation: SimulationConfig,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run acquisition until the duration elapses or `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let adapter = Arc::new(SimulatedAdapter::new(self.config.simulation.clone()));
        for basestation in &blueprint.basestations {
            for probe in &basestation.probes {
                adapter.attach_probe(probe.address(basestation.slot), probe.generation);
            }
        }
        info!(
            basestations = blueprint.basestations.len(),
            probes = blueprint.probe_count(),
            "Running on simulated basestations"
        );

        let broadcast = Arc::new(BroadcastLog::default());
        let options = CoordinatorOptions::from_blueprint(blueprint);
        let loading = self.config.loading_existing_config;

        let mut stats = PipelineStats::default();
        let mut coordinators = tokio::task::block_in_place(|| -> Result<Vec<StreamCoordinator>> {
            let mut coordinators = Vec::with_capacity(blueprint.basestations.len());
            for config in &blueprint.basestations {
                let mut coordinator = StreamCoordinator::from_config(
                    config,
                    adapter.clone(),
                    broadcast.clone(),
                    options.clone(),
                )
                .with_context(|| format!("Failed to open probes on slot {}", config.slot))?;

                let report = coordinator
                    .initialize(loading)
                    .with_context(|| format!("Failed to initialize slot {}", config.slot))?;
                for (probe, error) in &report.failures {
                    warn!(probe = %probe, error = %error, "Probe configuration incomplete");
                }
                stats.configuration_failures += report.failures.len();
                coordinators.push(coordinator);
            }
            Ok(coordinators)
        })?;

        for probe in coordinators.iter().flat_map(|c| c.probes()) {
            if probe.is_valid() {
                stats.probes_connected += 1;
            } else {
                stats.probes_disconnected += 1;
            }
        }

        let mut drains: Vec<StreamDrain> = coordinators
            .iter_mut()
            .flat_map(|c| c.take_readers())
            .map(|readers| StreamDrain::new(readers, DRAIN_BLOCK_FRAMES))
            .collect();
        if drains.is_empty() {
            return Err(CliError::no_probes("every configured probe failed to open").into());
        }

        tokio::task::block_in_place(|| -> Result<()> {
            for coordinator in &mut coordinators {
                let started = coordinator.start_acquisition().with_context(|| {
                    format!("Failed to start slot {}", coordinator.slot())
                })?;
                info!(slot = coordinator.slot(), streams = started, "Slot streaming");
            }
            Ok(())
        })?;

        info!(
            streams = drains.len(),
            duration_secs = ?self.config.duration.map(|d| d.as_secs_f64()),
            "Acquisition running"
        );

        let mut ticker = tokio::time::interval(self.config.drain_interval);
        let deadline = async {
            match self.config.duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(shutdown);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    drain_all(&mut drains, &coordinators, &mut stats.metrics);
                }
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping acquisition...");
                    break;
                }
                _ = &mut deadline => {
                    info!("Acquisition duration reached");
                    break;
                }
            }
        }

        info!("Stopping acquisition...");
        tokio::task::block_in_place(|| {
            for coordinator in &mut coordinators {
                coordinator.stop_acquisition();
            }
        });
        drain_all(&mut drains, &coordinators, &mut stats.metrics);

        stats.streams = collect_stream_summaries(&drains, &coordinators);
        stats.broadcast_total = broadcast.total_messages();
        stats.recent_broadcasts = broadcast.recent();

        tokio::task::block_in_place(move || drop(coordinators));
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            ap_frames = stats.total_ap_frames(),
            "Acquisition shutdown complete"
        );
        Ok(stats)
    }
}

fn drain_all(
    drains: &mut [StreamDrain],
    coordinators: &[StreamCoordinator],
    metrics: &mut AcquisitionMetricsAggregator,
) {
    for drain in drains.iter_mut() {
        let counts = drain.drain();
        if counts.ap > 0 {
            record_frames_drained(drain.label(), counts.ap);
            metrics.record_drain(drain.label(), counts.ap);
        }
    }
    for coordinator in coordinators {
        metrics.record_fill(coordinator.fill_percentage());
    }
}

fn collect_stream_summaries(
    drains: &[StreamDrain],
    coordinators: &[StreamCoordinator],
) -> Vec<StreamSummary> {
    let workers: Vec<_> = coordinators
        .iter()
        .flat_map(|c| c.probes())
        .flat_map(|p| p.stream_stats())
        .collect();

    drains
        .iter()
        .map(|drain| StreamSummary {
            stream: drain.label().to_string(),
            ap_frames_drained: drain.ap_frames(),
            lfp_frames_drained: drain.lfp_frames(),
            sample_gaps: drain.sample_gaps(),
            worker: workers
                .iter()
                .find(|(stream, _)| *stream == drain.stream())
                .map(|(_, snapshot)| *snapshot)
                .unwrap_or_default(),
        })
        .collect()
}
