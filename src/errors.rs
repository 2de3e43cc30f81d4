//! Error types shared across the pipeline.
//!
//! Only configuration-time problems (bad patterns, unknown analyzer ids,
//! invalid config files) surface as [`Error`] to callers. Failures of
//! individual tasks are reported as [`TaskError`] values inside task results
//! and aggregated into scan statistics instead of aborting a scan.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for vigil operations
#[derive(Debug, Error)]
pub enum Error {
    /// A file pattern could not be compiled
    #[error("Invalid file pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// No analyzer is registered under the given id
    #[error("Unknown analyzer: {0}")]
    UnknownAnalyzer(String),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Cache operation errors
    #[error("Cache error: {0}")]
    Cache(String),

    /// Analysis errors
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// IO errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML errors
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// Regex compilation errors
    #[error(transparent)]
    Regex(#[from] regex::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path context
    pub fn config_with_path(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Create an invalid pattern error
    pub fn invalid_pattern(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Check if this error was caused by user configuration
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPattern { .. } | Self::UnknownAnalyzer(_) | Self::Config { .. } | Self::Toml(_)
        )
    }
}

/// Result type for vigil operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single scheduled task.
///
/// Task errors never propagate as pipeline-level errors; the orchestrator
/// counts them in its statistics and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The caller stopped waiting. The worker may still be running the task.
    #[error("Task timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The worker executing the task died before reporting a result
    #[error("Worker {worker_id} crashed: {reason}")]
    WorkerCrashed { worker_id: usize, reason: String },

    /// The pool was shut down before the task finished
    #[error("Worker pool shut down before task completed")]
    PoolShutdown,

    /// The task referenced an analyzer that is not registered or is disabled
    #[error("Analyzer '{0}' is not available")]
    UnknownAnalyzer(String),

    /// The analyzer returned an error
    #[error("Analyzer failed: {0}")]
    Analyzer(String),
}

impl TaskError {
    /// Short stable label used as a statistics key
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::WorkerCrashed { .. } => "worker_crashed",
            Self::PoolShutdown => "pool_shutdown",
            Self::UnknownAnalyzer(_) => "unknown_analyzer",
            Self::Analyzer(_) => "analyzer",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
