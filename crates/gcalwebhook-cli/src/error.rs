//! CLI error types.

use std::path::PathBuf;

use gcalwebhook_core::{StoreError, TracingError};
use gcalwebhook_google::ApiError;
use thiserror::Error;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that end a command with a non-zero exit status.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid command arguments.
    #[error("{0}")]
    Validation(String),

    /// The channel is not in the local registry.
    #[error("Channel {0} not found in local store.")]
    ChannelNotFound(String),

    /// OAuth, credential or Calendar API failure.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Reading or writing a local document failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The configuration directory could not be created.
    #[error("failed to create config directory {}: {source}", path.display())]
    ConfigDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    /// Encoding JSON output failed.
    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),

    /// Logging could not be initialized.
    #[error(transparent)]
    Tracing(#[from] TracingError),
}

impl CliError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
