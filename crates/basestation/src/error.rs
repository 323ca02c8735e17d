//! Basestation error types

use acquisition::AcquisitionError;
use contracts::{NpError, ProbeAddress};
use thiserror::Error;

/// Basestation-specific errors
#[derive(Debug, Error)]
pub enum BasestationError {
    /// Probe belongs to a different slot or is already owned
    #[error("cannot add probe {probe}: {message}")]
    ProbeRejected { probe: ProbeAddress, message: String },

    /// Operation not allowed while acquiring
    #[error("slot {slot} is acquiring")]
    Busy { slot: u8 },

    /// Arming the slot failed
    #[error("failed to arm slot {slot}: {source} (code {code})", code = .source.code())]
    Arm {
        slot: u8,
        #[source]
        source: NpError,
    },

    /// The software trigger was refused
    #[error("software trigger failed on slot {slot}: {source} (code {code})", code = .source.code())]
    Trigger {
        slot: u8,
        #[source]
        source: NpError,
    },

    /// Probe-level error
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
}

impl BasestationError {
    pub fn probe_rejected(probe: ProbeAddress, message: impl Into<String>) -> Self {
        Self::ProbeRejected {
            probe,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BasestationError>;
