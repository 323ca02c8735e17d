//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{AcquisitionBlueprint, ProbeConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    acquisition: AcquisitionInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    calibration_dirs: Vec<String>,
    basestations: Vec<BasestationInfo>,
}

#[derive(Serialize)]
struct AcquisitionInfo {
    buffer_capacity: usize,
    drop_policy: String,
    fifo_warning_threshold: f32,
    arm_timeout_ms: u64,
    allowable_jump: u32,
    startup_grace_samples: i64,
}

#[derive(Serialize)]
struct BasestationInfo {
    slot: u8,
    probes: Vec<ProbeInfo>,
}

#[derive(Serialize)]
struct ProbeInfo {
    port: u8,
    dock: u8,
    generation: String,
    enabled: bool,
    streams: usize,
    channels: usize,
    ap_sample_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    lfp_sample_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    settings: Option<SettingsInfo>,
}

#[derive(Serialize)]
struct SettingsInfo {
    ap_gain: Option<f32>,
    lfp_gain: Option<f32>,
    reference: Option<String>,
    ap_filter_enabled: bool,
    sync_as_channel: bool,
    invert_sync_line: bool,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn probe_info(probe: &ProbeConfig, with_settings: bool) -> ProbeInfo {
    let caps = probe.generation.capabilities();
    let settings = with_settings.then(|| {
        let s = probe.effective_settings();
        SettingsInfo {
            ap_gain: s.ap_gain(&caps),
            lfp_gain: if caps.has_lfp() { s.lfp_gain(&caps) } else { None },
            reference: s.reference(&caps).map(|r| format!("{r:?}")),
            ap_filter_enabled: s.ap_filter_enabled,
            sync_as_channel: s.sync_as_channel,
            invert_sync_line: s.invert_sync_line,
        }
    });

    ProbeInfo {
        port: probe.port,
        dock: probe.dock,
        generation: probe.generation.to_string(),
        enabled: probe.enabled,
        streams: caps.shank_streams,
        channels: caps.channel_count,
        ap_sample_rate: caps.ap_sample_rate,
        lfp_sample_rate: caps.lfp_sample_rate,
        settings,
    }
}

fn build_config_info(blueprint: &AcquisitionBlueprint, args: &InfoArgs) -> ConfigInfo {
    let acquisition = &blueprint.acquisition;
    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        acquisition: AcquisitionInfo {
            buffer_capacity: acquisition.buffer_capacity,
            drop_policy: format!("{:?}", acquisition.drop_policy),
            fifo_warning_threshold: acquisition.fifo_warning_threshold,
            arm_timeout_ms: acquisition.arm_timeout_ms,
            allowable_jump: acquisition.timing.allowable_jump,
            startup_grace_samples: acquisition.timing.startup_grace_samples,
        },
        calibration_dirs: blueprint
            .calibration_dirs
            .iter()
            .map(|d| d.display().to_string())
            .collect(),
        basestations: blueprint
            .basestations
            .iter()
            .map(|b| BasestationInfo {
                slot: b.slot,
                probes: b
                    .probes
                    .iter()
                    .map(|p| probe_info(p, args.settings))
                    .collect(),
            })
            .collect(),
    }
}

fn print_config_info(blueprint: &AcquisitionBlueprint, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               npx-acquire Configuration                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let acquisition = &blueprint.acquisition;
    println!("⚙️  Acquisition");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!(
        "   ├─ Buffer: {} frames/stream ({:?})",
        acquisition.buffer_capacity, acquisition.drop_policy
    );
    println!(
        "   ├─ FIFO warning: {:.0}%",
        acquisition.fifo_warning_threshold * 100.0
    );
    println!(
        "   ├─ Timestamp jump: > {} ticks after {} samples",
        acquisition.timing.allowable_jump, acquisition.timing.startup_grace_samples
    );
    println!("   └─ Arm timeout: {} ms", acquisition.arm_timeout_ms);

    for basestation in &blueprint.basestations {
        println!(
            "\n🔌 Slot {} ({} probes)",
            basestation.slot,
            basestation.probes.len()
        );
        for (i, probe) in basestation.probes.iter().enumerate() {
            let is_last = i == basestation.probes.len() - 1;
            let prefix = if is_last { "└─" } else { "├─" };
            let child_prefix = if is_last { "   " } else { "│  " };
            let info = probe_info(probe, args.settings);

            println!(
                "   {} port {} dock {}: {} ({} stream{}, {} ch){}",
                prefix,
                info.port,
                info.dock,
                info.generation,
                info.streams,
                if info.streams == 1 { "" } else { "s" },
                info.channels,
                if info.enabled { "" } else { " [disabled]" }
            );

            if let Some(settings) = info.settings {
                println!(
                    "   {}  ├─ AP gain: {:?}, LFP gain: {:?}",
                    child_prefix, settings.ap_gain, settings.lfp_gain
                );
                println!(
                    "   {}  ├─ Reference: {}",
                    child_prefix,
                    settings.reference.as_deref().unwrap_or("(invalid)")
                );
                println!(
                    "   {}  └─ AP filter: {}, sync channel: {}, inverted sync: {}",
                    child_prefix,
                    settings.ap_filter_enabled,
                    settings.sync_as_channel,
                    settings.invert_sync_line
                );
            }
        }
    }

    if !blueprint.calibration_dirs.is_empty() {
        println!("\n📁 Calibration directories");
        for dir in &blueprint.calibration_dirs {
            println!("   ├─ {}", dir.display());
        }
    }

    println!();
}
