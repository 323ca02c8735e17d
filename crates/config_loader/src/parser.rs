//! 配置解析模块
//!
//! TOML (主要) / JSON 两种格式，解析后补全 probe settings 中省略的字段。

use contracts::{AcquisitionBlueprint, ContractError, ProbeSettings};
use serde::de::DeserializeOwned;

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

fn decode<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> Result<T, ContractError> {
    match format {
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| ContractError::ConfigParse {
            message: format!("TOML parse error: {e}"),
            source: Some(Box::new(e)),
        }),
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
            message: format!("JSON parse error: {e}"),
            source: Some(Box::new(e)),
        }),
    }
}

/// 解析配置并补全默认值
pub fn parse(content: &str, format: ConfigFormat) -> Result<AcquisitionBlueprint, ContractError> {
    let mut blueprint: AcquisitionBlueprint = decode(content, format)?;
    fill_default_electrodes(&mut blueprint);
    Ok(blueprint)
}

/// An explicit settings table without `electrodes` keeps the generation's
/// default electrode map.
fn fill_default_electrodes(blueprint: &mut AcquisitionBlueprint) {
    for probe in blueprint
        .basestations
        .iter_mut()
        .flat_map(|b| b.probes.iter_mut())
    {
        let generation = probe.generation;
        if let Some(settings) = probe.settings.as_mut() {
            if settings.electrodes.is_empty() {
                settings.electrodes = ProbeSettings::defaults_for(generation).electrodes;
            }
        }
    }
}
