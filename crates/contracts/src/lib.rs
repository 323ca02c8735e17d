//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the acquisition stack:
//! probe addressing, packet batches, the vendor device adapter seam, probe
//! settings and the persisted acquisition blueprint.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - The per-stream sample number (i64, +1 per decoded frame) is the primary clock
//! - The 32-bit hardware timestamp is only used for continuity diagnostics
//! - Wall-clock timestamps (seconds since UNIX epoch, f64) mark batch arrival on the host

mod blueprint;
mod broadcast;
mod device;
mod error;
mod generation;
mod packet;
mod probe_id;
mod settings;

pub use blueprint::*;
pub use broadcast::BroadcastSink;
pub use device::DeviceAdapter;
pub use error::*;
pub use generation::{ProbeCapabilities, ProbeGeneration};
pub use packet::{FifoState, PacketBatch, PacketLayout, PacketView, PacketWriter};
pub use probe_id::{ProbeAddress, StreamId};
pub use settings::*;
