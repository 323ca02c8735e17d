//! # Basestation
//!
//! Stream coordinator for one basestation slot: owns the probes, runs the
//! one-time probe setup, arms the slot and issues the shared software
//! trigger so that every stream of the slot starts together.

mod coordinator;
mod error;

pub use coordinator::{CoordinatorOptions, InitializeReport, StreamCoordinator};
pub use error::{BasestationError, Result};
