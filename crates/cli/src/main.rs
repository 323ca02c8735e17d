//! # npx-acquire
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 采集配置加载与验证
//! - 模拟 basestation 上的实时采集
//! - Ctrl+C 优雅关闭

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_acquisition, run_info, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging based on CLI options
    observability::init_with_config(cli.observability_config())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "npx-acquire starting"
    );

    // Execute command
    let result = match &cli.command {
        Commands::Run(args) => run_acquisition(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}
