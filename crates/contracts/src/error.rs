//! Layered error definitions
//!
//! Categorized by source: config / device (vendor status codes) / probe

use thiserror::Error;

/// Vendor API failure status.
///
/// Every device adapter call resolves to `Ok` or one of these named codes.
/// The numeric value returned by [`NpError::code`] matches the vendor
/// status enumeration so log lines can be cross-referenced with vendor tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum NpError {
    /// Unspecified failure
    #[error("unspecified failure")]
    Failed,

    /// The board or probe was already open
    #[error("device already open")]
    AlreadyOpen,

    /// The board, port or probe is not open
    #[error("device not open")]
    NotOpen,

    /// A parameter had an illegal value or was out of range
    #[error("illegal argument")]
    IllegalArgument,

    /// The call did not complete in time
    #[error("timed out")]
    Timeout,

    /// Illegal channel number
    #[error("illegal channel number")]
    WrongChannel,

    /// A calibration file could not be parsed
    #[error("malformed CSV file")]
    CsvReadError,

    /// A file could not be opened
    #[error("file could not be opened")]
    FileOpenError,

    /// Serdes link IO error
    #[error("link IO error")]
    NoLink,

    /// Missing serializer clock, usually a bad cable or connection
    #[error("missing serializer clock")]
    NoLock,

    /// PCIe data stream IO error
    #[error("data stream read error")]
    ReadError,

    /// No basestation found at the given slot
    #[error("no basestation in slot")]
    NoSlot,

    /// The port index is out of bounds
    #[error("port out of bounds")]
    WrongPort,

    /// The function is not supported by this hardware
    #[error("not supported")]
    NotSupported,
}

impl NpError {
    /// Numeric vendor status code
    pub fn code(self) -> u32 {
        match self {
            Self::Failed => 1,
            Self::AlreadyOpen => 2,
            Self::NotOpen => 3,
            Self::IllegalArgument => 6,
            Self::Timeout => 8,
            Self::WrongChannel => 9,
            Self::CsvReadError => 13,
            Self::FileOpenError => 15,
            Self::NoLink => 23,
            Self::NoLock => 24,
            Self::ReadError => 30,
            Self::NoSlot => 31,
            Self::WrongPort => 33,
            Self::NotSupported => 0xFE,
        }
    }

    /// Map a raw vendor status code. `0` (success) and unknown codes yield `None`.
    pub fn from_code(code: u32) -> Option<Self> {
        let error = match code {
            1 => Self::Failed,
            2 => Self::AlreadyOpen,
            3 => Self::NotOpen,
            6 | 40 => Self::IllegalArgument,
            8 => Self::Timeout,
            9 => Self::WrongChannel,
            13 => Self::CsvReadError,
            15 => Self::FileOpenError,
            23 => Self::NoLink,
            24 => Self::NoLock,
            30 => Self::ReadError,
            31 => Self::NoSlot,
            33 => Self::WrongPort,
            0xFE | 0xFF => Self::NotSupported,
            _ => return None,
        };
        Some(error)
    }
}

/// Result of a vendor adapter call
pub type NpResult<T> = std::result::Result<T, NpError>;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Device Errors =====
    /// Vendor call failed
    #[error("device call '{operation}' failed for {target}: {source} (code {code})", code = .source.code())]
    Device {
        target: String,
        operation: String,
        #[source]
        source: NpError,
    },

    /// Probe is not usable
    #[error("invalid probe {probe}: {message}")]
    InvalidProbe { probe: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create device call error
    pub fn device(target: impl ToString, operation: impl Into<String>, source: NpError) -> Self {
        Self::Device {
            target: target.to_string(),
            operation: operation.into(),
            source,
        }
    }
}
