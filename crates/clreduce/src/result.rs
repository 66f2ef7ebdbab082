//! Result and error types for clreduce.

use crate::oracle::Stage;
use thiserror::Error;

/// Result type for clreduce operations
pub type ReduceResult<T> = Result<T, ReduceError>;

/// Errors that can occur in clreduce
#[derive(Debug, Error)]
pub enum ReduceError {
    /// Invalid or unparsable configuration option
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// The work-size header comment is missing or malformed
    #[error("Invalid work-size header: {message}")]
    Header {
        /// Error message
        message: String,
    },

    /// The test case could not be evaluated (strict dialect)
    #[error("Invalid test case: {stage}")]
    InvalidTestCase {
        /// Stage that rejected the test case
        stage: Stage,
    },

    /// An external tool exceeded its time budget (strict dialect)
    #[error("Timed out during {stage}")]
    Timeout {
        /// Stage whose invocation timed out
        stage: Stage,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReduceError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a header error
    #[must_use]
    pub fn header(message: impl Into<String>) -> Self {
        Self::Header {
            message: message.into(),
        }
    }

    /// Stage carried by oracle errors, if any
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::InvalidTestCase { stage } | Self::Timeout { stage } => Some(*stage),
            _ => None,
        }
    }
}
