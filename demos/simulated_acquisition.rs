//! Simulated Acquisition Example
//!
//! Streams one Neuropixels 1.0 probe and one Quad Base probe from the
//! simulated basestation, draining every stream buffer the way a downstream
//! processor would. No hardware required.
//!
//! Run with: cargo run -p demos --bin simulated_acquisition [config.toml]

use std::sync::Arc;
use std::time::Duration;

use basestation::{CoordinatorOptions, StreamCoordinator};
use config_loader::ConfigLoader;
use contracts::{AcquisitionBlueprint, BasestationConfig, ProbeConfig, ProbeGeneration};
use device::{SimulatedAdapter, SimulationConfig, TimestampJumpInjection};
use observability::{BroadcastLog, LogFormat, ObservabilityConfig};
use sample_buffer::FrameBlock;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize observability (Tracing only, no Prometheus exporter)
    observability::init_with_config(ObservabilityConfig {
        log_format: LogFormat::Compact,
        ..Default::default()
    })?;

    tracing::info!("Starting Simulated Acquisition Demo");

    // ==== Stage 1: Use default config or load from file ====
    let blueprint = if let Some(path) = std::env::args().nth(1) {
        tracing::info!(path = %path, "Loading acquisition config");
        ConfigLoader::load_from_path(std::path::Path::new(&path))?
    } else {
        create_test_blueprint()
    };

    // ==== Stage 2: Attach probes to the simulated basestation ====
    let simulation = SimulationConfig {
        timestamp_jumps: vec![TimestampJumpInjection {
            stream: None,
            at_frame: 45_000,
            extra_ticks: 50,
        }],
        ..Default::default()
    };
    let adapter = Arc::new(SimulatedAdapter::new(simulation));
    for basestation in &blueprint.basestations {
        for probe in &basestation.probes {
            adapter.attach_probe(probe.address(basestation.slot), probe.generation);
        }
    }

    // ==== Stage 3: Open, configure and arm ====
    let broadcast = Arc::new(BroadcastLog::default());
    let options = CoordinatorOptions::from_blueprint(&blueprint);
    let mut coordinators = Vec::new();
    for config in &blueprint.basestations {
        let mut coordinator =
            StreamCoordinator::from_config(config, adapter.clone(), broadcast.clone(), options.clone())?;
        let report = coordinator.initialize(false)?;
        tracing::info!(
            slot = config.slot,
            probes = coordinator.probes().len(),
            failures = report.failures.len(),
            "Basestation initialized"
        );
        coordinators.push(coordinator);
    }

    let mut readers: Vec<_> = coordinators
        .iter_mut()
        .flat_map(|c| c.take_readers())
        .collect();

    // ==== Stage 4: Start and drain ====
    for coordinator in &mut coordinators {
        coordinator.start_acquisition()?;
    }

    let mut block = FrameBlock::new(385, 4096);
    let mut totals = vec![0usize; readers.len()];
    let mut ticker = tokio::time::interval(Duration::from_millis(20));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);

    while tokio::time::Instant::now() < deadline {
        ticker.tick().await;
        for (reader, total) in readers.iter_mut().zip(totals.iter_mut()) {
            let channels = reader.ap.buffer().channel_count();
            if block.channels() != channels {
                block = FrameBlock::new(channels, 4096);
            }
            loop {
                let n = reader.ap.read_all_from_buffer(&mut block, 4096);
                if n == 0 {
                    break;
                }
                *total += n;
            }
        }
    }

    // ==== Stage 5: Stop and report ====
    tracing::info!("Stopping acquisition...");
    for coordinator in &mut coordinators {
        coordinator.stop_acquisition();
    }

    for (reader, total) in readers.iter().zip(&totals) {
        tracing::info!(stream = %reader.stream, ap_frames = total, "Stream drained");
    }
    for message in broadcast.recent() {
        tracing::warn!(message = %message, "Broadcast");
    }

    Ok(())
}

fn create_test_blueprint() -> AcquisitionBlueprint {
    AcquisitionBlueprint {
        version: Default::default(),
        acquisition: Default::default(),
        calibration_dirs: vec![],
        basestations: vec![BasestationConfig {
            slot: 2,
            probes: vec![
                ProbeConfig::new(1, 1, ProbeGeneration::Np1),
                ProbeConfig::new(2, 1, ProbeGeneration::QuadBase),
            ],
        }],
    }
}
