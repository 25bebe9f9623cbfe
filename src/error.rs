//! Error types shared by the worker.

use std::error::Error;

/// Error type returned by port implementations.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Startup configuration problems. The process must not start polling.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} env var required")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Per-job failures. None of these stop the poll loop.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to prepare job workspace: {0}")]
    Workspace(#[from] std::io::Error),
    #[error("failed to fetch {key}: {source}")]
    Fetch {
        key: String,
        #[source]
        source: BoxError,
    },
    #[error("failed to publish {prefix}: {source}")]
    Publish {
        prefix: String,
        #[source]
        source: BoxError,
    },
}
