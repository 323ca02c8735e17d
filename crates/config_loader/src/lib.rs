//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Generate `AcquisitionBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("acquisition.toml")).unwrap();
//! println!("probes: {}", blueprint.probe_count());
//! ```

mod parser;
mod validator;

pub use contracts::AcquisitionBlueprint;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<AcquisitionBlueprint, ContractError> {
        let format = Self::detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<AcquisitionBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Validate a blueprint built in code
    pub fn validate(blueprint: &AcquisitionBlueprint) -> Result<(), ContractError> {
        validator::validate(blueprint)
    }

    pub fn to_toml(blueprint: &AcquisitionBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    pub fn to_json(blueprint: &AcquisitionBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }

    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ProbeGeneration;

    const RIG_TOML: &str = r#"
calibration_dirs = ["CalibrationInfo"]

[acquisition]
buffer_capacity = 20000
drop_policy = "drop_newest"

[acquisition.timing]
startup_grace_samples = 100

[[basestations]]
slot = 2

[[basestations.probes]]
port = 1
generation = "np1"
[basestations.probes.settings]
ap_gain_index = 4
lfp_gain_index = 2
reference_index = 1
ap_filter_enabled = true
sync_as_channel = true

[[basestations.probes]]
port = 2
generation = "quad_base"
enabled = false
"#;

    #[test]
    fn test_load_from_str_toml() {
        let bp = ConfigLoader::load_from_str(RIG_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.probe_count(), 2);
        assert_eq!(bp.stream_count(), 5);
        assert_eq!(bp.acquisition.timing.startup_grace_samples, 100);
        assert_eq!(bp.calibration_dirs.len(), 1);
        assert_eq!(
            bp.basestations[0].probes[1].generation,
            ProbeGeneration::QuadBase
        );
    }

    #[test]
    fn test_round_trip_json() {
        let bp = ConfigLoader::load_from_str(RIG_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(
            bp.basestations[0].probes[0].settings,
            bp2.basestations[0].probes[0].settings
        );
        assert_eq!(bp.acquisition.buffer_capacity, bp2.acquisition.buffer_capacity);
    }

    #[test]
    fn test_round_trip_toml() {
        let bp = ConfigLoader::load_from_str(RIG_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.probe_count(), bp2.probe_count());
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[[basestations]]
slot = 2
[[basestations.probes]]
port = 1
generation = "np2"
[basestations.probes.settings]
ap_gain_index = 0
ap_filter_enabled = true
"#;
        let err = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("no switchable AP filter"), "got: {err}");
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rig.toml");
        std::fs::write(&path, RIG_TOML).unwrap();
        assert!(ConfigLoader::load_from_path(&path).is_ok());

        let bad = dir.path().join("rig.yaml");
        std::fs::write(&bad, RIG_TOML).unwrap();
        let err = ConfigLoader::load_from_path(&bad).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }
}
