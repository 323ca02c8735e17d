//! Acquisition pipeline orchestration module.

mod drain;
mod orchestrator;
mod stats;

pub use drain::{DrainCounts, StreamDrain};
pub use orchestrator::{Pipeline, PipelineConfig};
pub use stats::{PipelineStats, StreamSummary};
