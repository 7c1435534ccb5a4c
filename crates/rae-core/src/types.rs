//! Core types shared across the engine
//!
//! Defines:
//! - Session and execution identifiers
//! - The validation verdict returned by validator collaborators
//! - Stage context/result exchanged with stage collaborators

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ulid::Ulid;

/// Unique retry-session identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Ulid);

impl SessionId {
    /// Generate new session ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique two-pass execution identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub Ulid);

impl ExecutionId {
    /// Generate new execution ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Verdict of a validation collaborator
///
/// `score`, when present, is the validator's own confidence in [0, 1].
/// `issues` are free-form findings; the failure analyzer classifies them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ValidationResult {
    /// Whether the validator considers the output acceptable
    pub passed: bool,
    /// Optional validator-provided score
    pub score: Option<f64>,
    /// Findings explaining the verdict
    pub issues: Vec<String>,
    /// Opaque extra details
    #[serde(default)]
    pub details: serde_json::Value,
}

impl ValidationResult {
    /// Passing verdict
    #[inline]
    #[must_use]
    pub fn pass() -> Self {
        Self {
            passed: true,
            ..Self::default()
        }
    }

    /// Failing verdict with findings
    #[inline]
    #[must_use]
    pub fn fail<I, S>(issues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            passed: false,
            issues: issues.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// With validator score (clamped to [0, 1])
    #[inline]
    #[must_use]
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score.clamp(0.0, 1.0));
        self
    }

    /// With opaque details
    #[inline]
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Status reported by a stage collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageStatus {
    /// Stage produced its output
    Completed,
    /// Stage ran and failed
    Failed,
    /// Stage decided there was nothing to do
    Skipped,
}

/// Result of one stage invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage status
    pub status: StageStatus,
    /// Stage output
    pub data: serde_json::Value,
    /// Failure description, when failed
    pub error: Option<String>,
}

impl StageResult {
    /// Completed result
    #[inline]
    #[must_use]
    pub fn completed(data: serde_json::Value) -> Self {
        Self {
            status: StageStatus::Completed,
            data,
            error: None,
        }
    }

    /// Failed result
    #[inline]
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Failed,
            data: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }

    /// Check if completed
    #[inline]
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == StageStatus::Completed
    }
}

/// Input handed to a stage collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageContext {
    /// Owning task
    pub task_id: String,
    /// Stage being executed
    pub stage: String,
    /// Stage input (possibly refined by the retry coordinator)
    pub input: String,
    /// Outputs of stages that already completed, keyed by stage name
    pub upstream: BTreeMap<String, serde_json::Value>,
}

impl StageContext {
    /// Create new context
    #[inline]
    #[must_use]
    pub fn new(task_id: impl Into<String>, stage: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            stage: stage.into(),
            input: input.into(),
            upstream: BTreeMap::new(),
        }
    }

    /// With upstream outputs
    #[inline]
    #[must_use]
    pub fn with_upstream(mut self, upstream: BTreeMap<String, serde_json::Value>) -> Self {
        self.upstream = upstream;
        self
    }

    /// Same context with a different input
    #[inline]
    #[must_use]
    pub fn with_input(&self, input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..self.clone()
        }
    }
}
