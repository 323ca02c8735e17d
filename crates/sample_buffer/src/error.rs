//! Sample buffer error types

use thiserror::Error;

/// Sample buffer error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// Buffer constructed with zero channels or zero capacity
    #[error("sample buffer needs non-zero sizes: channels={channels}, capacity={capacity}")]
    ZeroSized { channels: usize, capacity: usize },

    /// Input slices do not match the declared frame count
    #[error("'{field}' holds {actual} values, expected {expected}")]
    ShapeMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Frame block channel count differs from the buffer's
    #[error("block has {actual} channels, buffer has {expected}")]
    ChannelMismatch { expected: usize, actual: usize },
}

impl BufferError {
    pub(crate) fn check_len(field: &'static str, expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::ShapeMismatch {
                field,
                expected,
                actual,
            })
        }
    }
}

/// Sample buffer Result 类型别名
pub type Result<T> = std::result::Result<T, BufferError>;
