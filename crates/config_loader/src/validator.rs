//! 配置校验模块
//!
//! 校验规则：
//! - `validator` derive 规则 (range / length / nested)
//! - slot 唯一
//! - 同一 slot 内 (port, dock) 唯一
//! - probe settings 的 gain / reference 索引、电极列表在 generation 表范围内
//! - buffer_capacity 至少容纳一次 FIFO 读取的 AP 帧数
//! - allowable_jump < max_headstage_clock_jump

use std::collections::HashSet;

use contracts::{AcquisitionBlueprint, ContractError};
use validator::Validate;

/// 校验 AcquisitionBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &AcquisitionBlueprint) -> Result<(), ContractError> {
    validate_field_rules(blueprint)?;
    validate_unique_slots(blueprint)?;
    validate_unique_probe_addresses(blueprint)?;
    validate_probe_settings(blueprint)?;
    validate_buffer_capacity(blueprint)?;
    validate_timing(blueprint)?;
    Ok(())
}

/// Derive 规则
fn validate_field_rules(blueprint: &AcquisitionBlueprint) -> Result<(), ContractError> {
    blueprint.validate().map_err(|errors| {
        let message = errors.to_string();
        let field = message
            .split_once(':')
            .map(|(field, _)| field.trim().to_string())
            .unwrap_or_else(|| "blueprint".to_string());
        ContractError::config_validation(field, message)
    })
}

/// 校验 slot 唯一性
fn validate_unique_slots(blueprint: &AcquisitionBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, basestation) in blueprint.basestations.iter().enumerate() {
        if !seen.insert(basestation.slot) {
            return Err(ContractError::config_validation(
                format!("basestations[{idx}].slot"),
                format!("duplicate slot {}", basestation.slot),
            ));
        }
    }
    Ok(())
}

/// 校验同一 slot 内 (port, dock) 唯一性
fn validate_unique_probe_addresses(blueprint: &AcquisitionBlueprint) -> Result<(), ContractError> {
    for (b, basestation) in blueprint.basestations.iter().enumerate() {
        let mut seen = HashSet::new();
        for (p, probe) in basestation.probes.iter().enumerate() {
            if !seen.insert((probe.port, probe.dock)) {
                return Err(ContractError::config_validation(
                    format!("basestations[{b}].probes[{p}]"),
                    format!(
                        "duplicate probe at port {} dock {} in slot {}",
                        probe.port, probe.dock, basestation.slot
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// 校验 probe settings 与 generation 能力表一致
fn validate_probe_settings(blueprint: &AcquisitionBlueprint) -> Result<(), ContractError> {
    for (b, basestation) in blueprint.basestations.iter().enumerate() {
        for (p, probe) in basestation.probes.iter().enumerate() {
            if let Some(settings) = &probe.settings {
                let caps = probe.generation.capabilities();
                settings.check(&caps, &format!("basestations[{b}].probes[{p}].settings"))?;
            }
        }
    }
    Ok(())
}

/// 校验 buffer 容量不小于单次 FIFO 读取的 AP 帧数
fn validate_buffer_capacity(blueprint: &AcquisitionBlueprint) -> Result<(), ContractError> {
    let capacity = blueprint.acquisition.buffer_capacity;
    let largest = blueprint
        .basestations
        .iter()
        .flat_map(|b| &b.probes)
        .map(|p| (p.generation, p.generation.capabilities().ap_frames_per_read()))
        .max_by_key(|(_, frames)| *frames);

    if let Some((generation, frames)) = largest {
        if capacity < frames {
            return Err(ContractError::config_validation(
                "acquisition.buffer_capacity",
                format!(
                    "buffer_capacity ({capacity}) must hold one {generation} read ({frames} frames)"
                ),
            ));
        }
    }
    Ok(())
}

/// 校验时间戳阈值
fn validate_timing(blueprint: &AcquisitionBlueprint) -> Result<(), ContractError> {
    let timing = &blueprint.acquisition.timing;
    if timing.allowable_jump >= timing.max_headstage_clock_jump {
        return Err(ContractError::config_validation(
            "acquisition.timing.allowable_jump",
            format!(
                "allowable_jump ({}) must be < max_headstage_clock_jump ({})",
                timing.allowable_jump, timing.max_headstage_clock_jump
            ),
        ));
    }
    Ok(())
}
