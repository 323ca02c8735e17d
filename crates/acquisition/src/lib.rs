//! # Acquisition
//!
//! 每个 probe stream 一个专用采集线程：读取 packet、解码为 µV、写入 sample buffer。
//!
//! 负责：
//! - 解码 AP / LFP band 与 sync 事件码
//! - DC offset 一次性捕获（NP1）
//! - 硬件时间戳连续性诊断
//! - FIFO 占用率上报
//! - Probe 配置与校准文件加载
//!
//! ## 使用示例
//!
//! ```ignore
//! use acquisition::{Probe, ProbeOptions};
//!
//! let mut probe = Probe::open(&config, slot, adapter, ProbeOptions::default(), broadcast)?;
//! probe.apply_settings()?;
//! let readers = probe.take_readers();
//!
//! probe.start_acquisition()?;
//! // adapter.set_sw_trigger(slot) ...
//! probe.stop_acquisition();
//! ```

pub mod calibration;
mod config;
mod continuity;
mod decoder;
mod error;
mod offsets;
mod probe;
mod worker;

// Re-exports
pub use calibration::{CalibrationFiles, CalibrationStatus};
pub use config::{StreamStatsSnapshot, WorkerConfig};
pub use continuity::{TimestampJump, TimestampMonitor};
pub use decoder::{RunParams, StreamDecoder};
pub use error::{AcquisitionError, Result};
pub use offsets::{OffsetTable, OFFSET_HISTORY_DEPTH};
pub use probe::{Probe, ProbeOptions, ProbeStatus, StreamReaders};
pub use worker::{AcquisitionWorker, StreamWriters, WorkerPhase};
