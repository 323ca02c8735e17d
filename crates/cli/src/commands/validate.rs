//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::AcquisitionBlueprint;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    basestation_count: usize,
    probe_count: usize,
    stream_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    basestation_count: blueprint.basestations.len(),
                    probe_count: blueprint.probe_count(),
                    stream_count: blueprint.stream_count(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &AcquisitionBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    for basestation in &blueprint.basestations {
        if basestation.probes.is_empty() {
            warnings.push(format!("Slot {} has no probes configured", basestation.slot));
        } else if basestation.probes.iter().all(|p| !p.enabled) {
            warnings.push(format!(
                "Every probe on slot {} is disabled - nothing will stream",
                basestation.slot
            ));
        }
    }

    if blueprint.calibration_dirs.is_empty() {
        warnings.push("No calibration_dirs configured - probes will run uncalibrated".to_string());
    }

    for dir in &blueprint.calibration_dirs {
        if !dir.is_dir() {
            warnings.push(format!(
                "Calibration directory does not exist: {}",
                dir.display()
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Basestations: {}", summary.basestation_count);
            println!("  Probes: {}", summary.probe_count);
            println!("  Streams: {}", summary.stream_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn args(path: &Path) -> ValidateArgs {
        ValidateArgs {
            config: path.to_path_buf(),
            json: true,
        }
    }

    #[test]
    fn test_invalid_config_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rig.toml");
        std::fs::write(
            &path,
            "[[basestations]]\nslot = 2\n[[basestations.probes]]\nport = 9\ngeneration = \"np1\"\n",
        )
        .unwrap();

        let result = validate_config(&args(&path));
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("port"));
        assert!(run_validate(&args(&path)).is_err());
    }

    #[test]
    fn test_valid_config_with_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rig.toml");
        std::fs::write(
            &path,
            "[[basestations]]\nslot = 2\n[[basestations.probes]]\nport = 1\ngeneration = \"quad_base\"\nenabled = false\n",
        )
        .unwrap();

        let result = validate_config(&args(&path));
        assert!(result.valid);
        let summary = result.summary.unwrap();
        assert_eq!(summary.stream_count, 4);
        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("disabled")));
        assert!(warnings.iter().any(|w| w.contains("uncalibrated")));
    }
}
