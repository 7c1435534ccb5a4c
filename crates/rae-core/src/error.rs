//! Error types for the RAE execution core
//!
//! Two layers:
//! - [`CollaboratorError`]: what an external generate/validate/stage call reports
//! - [`EngineError`]: the engine-level taxonomy surfaced to callers
//!
//! Validation failures are not errors. A call that succeeded but produced
//! output below the quality gate is recorded as data on the attempt.

use std::time::Duration;

/// Failure reported by an external collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// Call failed in a way that may succeed if repeated
    #[error("transient failure: {0}")]
    Transient(String),

    /// Call failed and repeating it will not help
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// Call did not return within the call-site deadline
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

impl CollaboratorError {
    /// Transient failure helper
    #[inline]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Permanent failure helper
    #[inline]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}

/// Main engine error type
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// External generate/validate call failed
    #[error("transient external error: {0}")]
    TransientExternal(#[from] CollaboratorError),

    /// Breaker for the resource is open, call was not attempted
    #[error("circuit open for '{resource}', retry after {retry_after:?}")]
    CircuitOpen {
        /// Protected resource name
        resource: String,
        /// Time until the breaker admits a probe call
        retry_after: Duration,
    },

    /// Invalid parameters, detected before any work starts
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A pass exhausted its retries
    #[error("{pass} failed after {attempts} attempt(s): {message}")]
    PassExecution {
        /// Pass name (`FirstPass` / `SecondPass`)
        pass: String,
        /// Attempts made
        attempts: u32,
        /// Last failure
        message: String,
    },

    /// A scheduled stage failed
    #[error("stage '{stage}' failed: {message}")]
    StageExecution {
        /// Stage name
        stage: String,
        /// Failure description
        message: String,
    },
}

impl EngineError {
    /// Configuration error helper
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientExternal(e) => e.is_retryable(),
            Self::CircuitOpen { .. } => true,
            _ => false,
        }
    }

    /// Check if error is fatal at setup time
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Retry-after hint, present only for open breakers
    #[inline]
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}
