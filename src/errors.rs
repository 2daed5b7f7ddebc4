//! Error types for the monitor daemon

use thiserror::Error;

/// Result type alias for the monitor daemon
pub type Result<T> = std::result::Result<T, HatError>;

/// Main error type for the monitor daemon
#[derive(Error, Debug)]
pub enum HatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Edge source error: {0}")]
    EdgeSource(#[from] EdgeSourceError),

    #[error("Failed to read {metric}: {detail}")]
    MetricRead { metric: &'static str, detail: String },

    #[error("Fan output error: {0}")]
    Fan(String),
}

impl HatError {
    /// Shorthand for a metric that could not be read or parsed
    pub fn metric(metric: &'static str, detail: impl std::fmt::Display) -> Self {
        HatError::MetricRead {
            metric,
            detail: detail.to_string(),
        }
    }
}

/// Failures of the button edge source. Any of these ends the gesture stream.
#[derive(Error, Debug)]
pub enum EdgeSourceError {
    #[error("edge source closed")]
    Closed,

    #[error("edge source I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to start edge watcher `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
}
