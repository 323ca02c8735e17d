//! `run` command implementation.

use anyhow::{Context, Result};
use device::{SimulationConfig, TimestampJumpInjection};
use std::time::Duration;
use tracing::info;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Ticks added by `--inject-jump-at` (a gap of ~17 samples)
const INJECTED_JUMP_TICKS: u32 = 50;

/// Execute the `run` command
pub async fn run_acquisition(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        basestations = blueprint.basestations.len(),
        probes = blueprint.probe_count(),
        streams = blueprint.stream_count(),
        buffer_capacity = blueprint.acquisition.buffer_capacity,
        drop_policy = ?blueprint.acquisition.drop_policy,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        blueprint,
        duration: (args.duration > 0).then(|| Duration::from_secs(args.duration)),
        drain_interval: Duration::from_millis(args.drain_interval_ms.max(1)),
        loading_existing_config: !args.fresh,
        simulation: simulation_config(args),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    };

    let pipeline = Pipeline::new(pipeline_config);

    info!("Starting acquisition...");
    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Acquisition failed")?;

    info!(
        ap_frames = stats.total_ap_frames(),
        timestamp_jumps = stats.timestamp_jumps(),
        duration_secs = stats.duration.as_secs_f64(),
        rate_hz = format!("{:.1}", stats.ap_rate_per_stream()),
        "Acquisition completed"
    );
    stats.print_summary();

    info!("npx-acquire finished");
    Ok(())
}

fn simulation_config(args: &RunArgs) -> SimulationConfig {
    SimulationConfig {
        timestamp_jumps: args
            .inject_jump_at
            .map(|at_frame| TimestampJumpInjection {
                stream: None,
                at_frame,
                extra_ticks: INJECTED_JUMP_TICKS,
            })
            .into_iter()
            .collect(),
        read_error_every: args.read_error_every,
        ..Default::default()
    }
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &contracts::AcquisitionBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Acquisition:");
    println!(
        "  Buffer: {} frames/stream ({:?})",
        blueprint.acquisition.buffer_capacity, blueprint.acquisition.drop_policy
    );
    println!(
        "  FIFO warning threshold: {:.0}%",
        blueprint.acquisition.fifo_warning_threshold * 100.0
    );
    println!("  Arm timeout: {} ms", blueprint.acquisition.arm_timeout_ms);

    println!("\nBasestations ({}):", blueprint.basestations.len());
    for basestation in &blueprint.basestations {
        println!("  - slot {}", basestation.slot);
        for probe in &basestation.probes {
            println!(
                "      port {} dock {}: {}{}",
                probe.port,
                probe.dock,
                probe.generation,
                if probe.enabled { "" } else { " (disabled)" }
            );
        }
    }

    if !blueprint.calibration_dirs.is_empty() {
        println!("\nCalibration directories:");
        for dir in &blueprint.calibration_dirs {
            println!("  - {}", dir.display());
        }
    }

    println!();
}
