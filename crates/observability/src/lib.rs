//! # Observability
//!
//! 可观测性模块：Tracing + Prometheus 指标 + broadcast log。
//!
//! ## 功能
//!
//! - Tracing 初始化 (JSON/Pretty/Compact 格式)
//! - Prometheus 指标导出
//! - Acquisition 指标 helper 与运行摘要
//! - 用户可见 broadcast 消息 ([`BroadcastLog`])
//!
//! ## 使用示例
//!
//! ```ignore
//! use observability::{init_with_config, metrics, ObservabilityConfig};
//!
//! init_with_config(ObservabilityConfig::default())?;
//!
//! let stored = writer.add_block(&block)?;
//! metrics::record_frames_published("2:1:1", "ap", stored);
//! ```

pub mod broadcast;
pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Re-exports
pub use crate::broadcast::{BroadcastLog, DEFAULT_BROADCAST_HISTORY};
pub use crate::metrics::{
    record_buffer_overrun, record_fifo_fill, record_frames_drained, record_frames_published,
    record_read_error, record_timestamp_jump, AcquisitionMetricsAggregator, MetricsSummary,
    RunningStats, StatsSummary,
};

/// 可观测性配置
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// 日志格式
    pub log_format: LogFormat,
    /// 默认日志级别 (RUST_LOG 未设置时使用)
    pub log_level: String,
    /// 忽略 RUST_LOG，强制使用 `log_level`
    pub force_log_level: bool,
    /// Prometheus 端口 (None = 禁用)
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            log_level: "info".to_string(),
            force_log_level: false,
            metrics_port: None,
        }
    }
}

impl ObservabilityConfig {
    /// Verbosity flags of a CLI: `quiet` wins, then 0 = info, 1 = debug, 2+ = trace
    pub fn from_verbosity(log_format: LogFormat, verbose: u8, quiet: bool) -> Self {
        let log_level = if quiet {
            "warn"
        } else {
            match verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        };
        Self {
            log_format,
            log_level: log_level.to_string(),
            force_log_level: quiet,
            metrics_port: None,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        if self.force_log_level {
            return EnvFilter::new(&self.log_level);
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level))
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON 结构化日志
    #[default]
    Json,
    /// 人类可读格式
    Pretty,
    /// 紧凑单行格式
    Compact,
}

fn fmt_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        // worker threads are named npx-<stream>
        LogFormat::Compact => fmt::layer().compact().with_thread_names(true).boxed(),
    }
}

/// 初始化 Tracing，按需启动 Prometheus exporter
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer(config.log_format))
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        log_level = %config.log_level,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );

    Ok(())
}

/// 仅初始化 Prometheus 指标（不初始化 Tracing）
///
/// 用于 Tracing 已由其他模块初始化的场景。
pub fn init_metrics_only(port: u16) -> Result<()> {
    let builder = PrometheusBuilder::new();
    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port = port, "Prometheus metrics endpoint initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_default_is_json() {
        assert_eq!(LogFormat::default(), LogFormat::Json);
    }

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.log_level, "info");
        assert!(!config.force_log_level);
    }

    #[test]
    fn test_from_verbosity() {
        let config = ObservabilityConfig::from_verbosity(LogFormat::Compact, 0, false);
        assert_eq!(config.log_level, "info");
        assert!(!config.force_log_level);

        assert_eq!(
            ObservabilityConfig::from_verbosity(LogFormat::Compact, 1, false).log_level,
            "debug"
        );
        assert_eq!(
            ObservabilityConfig::from_verbosity(LogFormat::Compact, 5, false).log_level,
            "trace"
        );

        // quiet wins over -v and RUST_LOG
        let quiet = ObservabilityConfig::from_verbosity(LogFormat::Json, 2, true);
        assert_eq!(quiet.log_level, "warn");
        assert!(quiet.force_log_level);
        assert_eq!(quiet.env_filter().to_string(), "warn");
    }
}
