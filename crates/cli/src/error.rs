//! Error types for CLI operations.

use std::path::PathBuf;

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    /// Configuration is valid but nothing can stream
    #[error("No usable probes: {message}")]
    NoProbes { message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn no_probes(message: impl Into<String>) -> Self {
        Self::NoProbes {
            message: message.into(),
        }
    }
}
