//! Probe and stream addressing
//!
//! A probe is addressed by `(slot, port, dock)` within the host; multi-shank
//! probes split into one stream per shank.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical probe address.
///
/// Immutable for the lifetime of a connection and cheap to copy.
///
/// # Examples
/// ```
/// use contracts::ProbeAddress;
///
/// let probe = ProbeAddress::new(2, 1, 1);
/// assert_eq!(probe.to_string(), "2:1:1");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProbeAddress {
    /// Basestation slot
    pub slot: u8,
    /// Headstage port on the basestation
    pub port: u8,
    /// Dock on the headstage (1 for single-dock headstages)
    pub dock: u8,
}

impl ProbeAddress {
    #[inline]
    pub const fn new(slot: u8, port: u8, dock: u8) -> Self {
        Self { slot, port, dock }
    }

    /// Stream covering the whole probe
    #[inline]
    pub const fn stream(self) -> StreamId {
        StreamId {
            probe: self,
            shank: None,
        }
    }

    /// Stream bound to one shank (vendor stream-source selector)
    #[inline]
    pub const fn shank_stream(self, shank: u8) -> StreamId {
        StreamId {
            probe: self,
            shank: Some(shank),
        }
    }

    /// All streams of a probe read as `shank_streams` independent sources
    pub fn streams(self, shank_streams: usize) -> Vec<StreamId> {
        if shank_streams <= 1 {
            vec![self.stream()]
        } else {
            (0..shank_streams as u8)
                .map(|shank| self.shank_stream(shank))
                .collect()
        }
    }
}

impl fmt::Display for ProbeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.slot, self.port, self.dock)
    }
}

/// One data stream: a whole probe, or one shank of a multi-shank probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId {
    pub probe: ProbeAddress,
    /// Shank index when the probe is read per shank
    pub shank: Option<u8>,
}

impl StreamId {
    #[inline]
    pub fn slot(&self) -> u8 {
        self.probe.slot
    }

    #[inline]
    pub fn port(&self) -> u8 {
        self.probe.port
    }

    /// Vendor stream-source selector (0 for single-stream probes)
    #[inline]
    pub fn source_index(&self) -> u8 {
        self.shank.unwrap_or(0)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shank {
            Some(shank) => write!(f, "{}/shank{}", self.probe, shank),
            None => write!(f, "{}", self.probe),
        }
    }
}

impl From<ProbeAddress> for StreamId {
    fn from(probe: ProbeAddress) -> Self {
        probe.stream()
    }
}
