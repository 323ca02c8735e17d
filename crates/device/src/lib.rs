//! # Device
//!
//! Device adapters for the acquisition core.
//!
//! Responsibilities:
//! - Provide the simulated basestation used by tests, demos and the CLI
//! - Generate packetized electrode data at the probe's native rate
//! - Inject failures (open, read, configuration) and timestamp discontinuities
//! - Count every vendor call so tests can assert on hardware traffic
//!
//! Real vendor bindings implement [`contracts::DeviceAdapter`] in the same way
//! and are not part of this workspace.

pub mod config;
pub mod counters;
pub mod signal;
pub mod simulated;

pub use config::{Pacing, SignalConfig, SimulationConfig, TimestampJumpInjection};
pub use contracts::DeviceAdapter;
pub use counters::{CallCounters, CallCountsSnapshot};
pub use simulated::SimulatedAdapter;
