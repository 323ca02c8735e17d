//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// npx-acquire - Neuropixels real-time acquisition pipeline
#[derive(Parser, Debug)]
#[command(
    name = "npx-acquire",
    author,
    version,
    about = "Neuropixels real-time acquisition pipeline",
    long_about = "Streams electrode data from Neuropixels basestations into per-stream \n\
                  sample buffers.\n\n\
                  Opens and configures every probe from the configuration file, arms \n\
                  the basestations, starts all streams on a shared software trigger \n\
                  and drains the buffers until interrupted."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "NPX_ACQUIRE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "NPX_ACQUIRE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run acquisition on the simulated basestation
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "acquisition.toml",
        env = "NPX_ACQUIRE_CONFIG"
    )]
    pub config: PathBuf,

    /// Acquisition duration in seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0", env = "NPX_ACQUIRE_DURATION")]
    pub duration: u64,

    /// Buffer drain interval in milliseconds
    #[arg(long, default_value = "20", env = "NPX_ACQUIRE_DRAIN_INTERVAL_MS")]
    pub drain_interval_ms: u64,

    /// Treat the configuration as freshly created rather than loaded
    #[arg(long)]
    pub fresh: bool,

    /// Inject a hardware timestamp jump at this AP frame on every stream
    #[arg(long)]
    pub inject_jump_at: Option<u64>,

    /// Fail every Nth simulated read
    #[arg(long)]
    pub read_error_every: Option<u64>,

    /// Validate configuration and exit without acquiring
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "NPX_ACQUIRE_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "acquisition.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "acquisition.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show per-probe settings
    #[arg(long)]
    pub settings: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

impl Cli {
    /// Logging setup selected by `-v`, `-q` and `--log-format`
    pub fn observability_config(&self) -> observability::ObservabilityConfig {
        observability::ObservabilityConfig::from_verbosity(
            self.log_format.clone().into(),
            self.verbose,
            self.quiet,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_args() {
        let cli = Cli::parse_from([
            "npx-acquire",
            "-v",
            "run",
            "--config",
            "rig.toml",
            "--duration",
            "5",
            "--inject-jump-at",
            "40000",
        ]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("rig.toml"));
                assert_eq!(args.duration, 5);
                assert_eq!(args.inject_jump_at, Some(40_000));
                assert!(!args.fresh);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["npx-acquire", "-q", "-v", "info"]).is_err());
    }

    #[test]
    fn test_observability_config_from_flags() {
        let cli = Cli::parse_from(["npx-acquire", "-vv", "--log-format", "json", "info"]);
        let config = cli.observability_config();
        assert_eq!(config.log_format, observability::LogFormat::Json);
        assert_eq!(config.log_level, "trace");

        let cli = Cli::parse_from(["npx-acquire", "-q", "info"]);
        let config = cli.observability_config();
        assert_eq!(config.log_format, observability::LogFormat::Pretty);
        assert_eq!(config.log_level, "warn");
        assert!(config.force_log_level);
    }
}
