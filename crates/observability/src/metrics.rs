//! Acquisition 指标收集模块
//!
//! `metrics` facade helpers called from the acquisition hot loop, plus an
//! in-memory aggregator for end-of-run summaries.

use std::collections::BTreeMap;

use metrics::{counter, gauge, histogram};

/// 记录发布到 Sample Buffer 的帧数
///
/// # Example
///
/// ```ignore
/// let stored = writer.add_block(&block)?;
/// observability::metrics::record_frames_published("2:1:1", "ap", stored);
/// ```
pub fn record_frames_published(stream: &str, band: &'static str, frames: usize) {
    counter!(
        "npx_frames_published_total",
        "stream" => stream.to_string(),
        "band" => band
    )
    .increment(frames as u64);
}

/// 记录硬件时间戳跳变
pub fn record_timestamp_jump(stream: &str, jump: u32) {
    counter!("npx_timestamp_jumps_total", "stream" => stream.to_string()).increment(1);
    histogram!("npx_timestamp_jump_ticks", "stream" => stream.to_string()).record(jump as f64);
}

/// 记录读取失败 (vendor error code)
pub fn record_read_error(stream: &str, error_code: u32) {
    counter!(
        "npx_read_errors_total",
        "stream" => stream.to_string(),
        "error_code" => error_code.to_string()
    )
    .increment(1);
}

/// 记录硬件 FIFO 填充率 (0..=1)
pub fn record_fifo_fill(stream: &str, fill: f32) {
    gauge!("npx_fifo_fill_ratio", "stream" => stream.to_string()).set(fill as f64);
}

/// 记录被覆盖或拒绝的帧
pub fn record_buffer_overrun(stream: &str, frames: usize) {
    if frames > 0 {
        counter!("npx_buffer_overruns_total", "stream" => stream.to_string())
            .increment(frames as u64);
    }
}

/// 记录下游一次读取的帧数
pub fn record_frames_drained(stream: &str, frames: usize) {
    histogram!("npx_drain_batch_frames", "stream" => stream.to_string()).record(frames as f64);
}

/// Acquisition 指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct AcquisitionMetricsAggregator {
    /// 读取次数 (非空)
    pub drains: u64,

    /// 总帧数
    pub total_frames: u64,

    /// 各 stream 帧数
    pub stream_frames: BTreeMap<String, u64>,

    /// 单次读取帧数统计
    pub drain_stats: RunningStats,

    /// FIFO 填充率统计 (百分比)
    pub fill_stats: RunningStats,
}

impl AcquisitionMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次 buffer 读取
    pub fn record_drain(&mut self, stream: &str, frames: usize) {
        if frames == 0 {
            return;
        }
        self.drains += 1;
        self.total_frames += frames as u64;
        *self.stream_frames.entry(stream.to_string()).or_insert(0) += frames as u64;
        self.drain_stats.push(frames as f64);
    }

    /// 记录 FIFO 填充率 (0..=1)
    pub fn record_fill(&mut self, fill: f32) {
        self.fill_stats.push(fill as f64 * 100.0);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            drains: self.drains,
            total_frames: self.total_frames,
            stream_frames: self.stream_frames.clone(),
            drain_batch: StatsSummary::from(&self.drain_stats),
            fifo_fill_percent: StatsSummary::from(&self.fill_stats),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub drains: u64,
    pub total_frames: u64,
    pub stream_frames: BTreeMap<String, u64>,
    pub drain_batch: StatsSummary,
    pub fifo_fill_percent: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Acquisition Metrics Summary ===")?;
        writeln!(f, "Frames drained: {}", self.total_frames)?;
        writeln!(f, "Drain calls: {}", self.drains)?;
        writeln!(f, "Frames per drain: {}", self.drain_batch)?;
        writeln!(f, "FIFO fill (%): {}", self.fifo_fill_percent)?;

        if !self.stream_frames.is_empty() {
            writeln!(f, "Frames per stream:")?;
            for (stream, frames) in &self.stream_frames {
                writeln!(f, "  {}: {}", stream, frames)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
