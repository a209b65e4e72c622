//! Error types and reporting for conversation stages.

use std::fmt;

/// Errors that can occur while a stage processes one unit of work.
#[derive(Debug, Clone)]
pub enum StageError {
    /// The current unit is abandoned; the stage keeps running.
    Recoverable(String),
    /// The stage must shut down.
    Fatal(String),
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Recoverable(msg) => write!(f, "Recoverable error: {}", msg),
            StageError::Fatal(msg) => write!(f, "Fatal error: {}", msg),
        }
    }
}

impl std::error::Error for StageError {}

impl From<crate::error::VoxbotError> for StageError {
    fn from(error: crate::error::VoxbotError) -> Self {
        StageError::Recoverable(error.to_string())
    }
}

/// Trait for reporting stage errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from a stage.
    fn report(&self, stage: &str, error: &StageError);
}

/// Reporter that writes through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, stage: &str, error: &StageError) {
        match error {
            StageError::Recoverable(msg) => tracing::warn!(stage, error = %msg, "stage error"),
            StageError::Fatal(msg) => tracing::error!(stage, error = %msg, "stage failed"),
        }
    }
}
