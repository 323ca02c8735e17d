//! Acquisition 错误类型

use contracts::{ContractError, NpError, ProbeAddress, StreamId};
use sample_buffer::BufferError;
use thiserror::Error;

/// Acquisition 错误
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Worker 线程创建失败
    #[error("failed to spawn acquisition thread for {stream}: {source}")]
    Spawn {
        stream: StreamId,
        #[source]
        source: std::io::Error,
    },

    /// 采集进行中，拒绝修改配置
    #[error("probe {probe} is acquiring, {operation} rejected")]
    Busy {
        probe: ProbeAddress,
        operation: &'static str,
    },

    /// 设置超出 generation 的表范围
    #[error("invalid {field} for probe {probe}: {message}")]
    InvalidSetting {
        probe: ProbeAddress,
        field: &'static str,
        message: String,
    },

    /// 一个或多个 vendor 调用失败
    #[error(
        "{operation} on probe {probe}: {failures} vendor call(s) failed, last: {last} (code {code})",
        code = .last.code()
    )]
    Configuration {
        probe: ProbeAddress,
        operation: &'static str,
        failures: usize,
        last: NpError,
    },

    /// Probe 未打开或已失效
    #[error("probe {probe} is not usable: {message}")]
    InvalidProbe { probe: ProbeAddress, message: String },

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl AcquisitionError {
    pub fn busy(probe: ProbeAddress, operation: &'static str) -> Self {
        Self::Busy { probe, operation }
    }

    pub fn invalid_setting(
        probe: ProbeAddress,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidSetting {
            probe,
            field,
            message: message.into(),
        }
    }

    pub fn invalid_probe(probe: ProbeAddress, message: impl Into<String>) -> Self {
        Self::InvalidProbe {
            probe,
            message: message.into(),
        }
    }

    /// Last vendor status of a failed configuration call
    pub fn vendor_error(&self) -> Option<NpError> {
        match self {
            Self::Configuration { last, .. } => Some(*last),
            _ => None,
        }
    }
}

/// Acquisition Result 类型别名
pub type Result<T> = std::result::Result<T, AcquisitionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_carries_code() {
        let err = AcquisitionError::Configuration {
            probe: ProbeAddress::new(2, 1, 1),
            operation: "set_all_gains",
            failures: 3,
            last: NpError::WrongChannel,
        };
        let text = err.to_string();
        assert!(text.contains("2:1:1"), "got: {text}");
        assert!(text.contains("3 vendor call(s)"), "got: {text}");
        assert!(text.contains("code 9"), "got: {text}");
    }

    #[test]
    fn test_buffer_error_conversion() {
        let err: AcquisitionError = BufferError::ZeroSized {
            channels: 0,
            capacity: 1,
        }
        .into();
        assert!(matches!(err, AcquisitionError::Buffer(_)));
    }
}
