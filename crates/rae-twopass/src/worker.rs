//! Pass worker collaborator
//!
//! The worker does the actual work of a pass. Strategies decide the mode,
//! feed refinements, and score what comes back.

use crate::types::PassContext;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// How much effort a run gets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PassMode {
    /// Fast, exploratory
    Quick,
    /// Full check set
    Thorough,
}

/// Outcome of one named check run by the worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
    pub detail: Option<String>,
}

impl CheckOutcome {
    #[must_use]
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            detail: None,
        }
    }

    #[must_use]
    pub fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            detail: Some(detail.into()),
        }
    }
}

/// Raw output of a worker run
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct WorkOutput {
    pub artifacts: BTreeMap<String, Value>,
    pub checks: Vec<CheckOutcome>,
    /// Free-form observations, kept as learnings
    pub notes: Vec<String>,
}

impl WorkOutput {
    /// Fraction of checks that passed; no checks counts as fully passing
    #[must_use]
    pub fn pass_ratio(&self) -> f64 {
        if self.checks.is_empty() {
            return 1.0;
        }
        let passed = self.checks.iter().filter(|c| c.passed).count();
        #[allow(clippy::cast_precision_loss)]
        let ratio = passed as f64 / self.checks.len() as f64;
        ratio
    }
}

/// Category of a first-pass learning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LearningKind {
    Validation,
    Performance,
    Quality,
    General,
}

impl LearningKind {
    /// Keyword classification
    #[must_use]
    pub fn classify(learning: &str) -> Self {
        let lower = learning.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        if has(&["valid", "assert", "verify", "invalid"]) {
            Self::Validation
        } else if has(&["slow", "performance", "latency", "timeout", "memory", "speed"]) {
            Self::Performance
        } else if has(&["quality", "style", "readab", "complex", "duplicat", "naming"]) {
            Self::Quality
        } else {
            Self::General
        }
    }

    fn action(self) -> &'static str {
        match self {
            Self::Validation => "add explicit validation",
            Self::Performance => "optimize the hot path",
            Self::Quality => "improve structure and clarity",
            Self::General => "address",
        }
    }
}

/// Concrete improvement derived from one learning
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Refinement {
    pub kind: LearningKind,
    pub learning: String,
    pub action: String,
}

impl Refinement {
    /// Classify `learning` and derive its action
    #[must_use]
    pub fn from_learning(learning: &str) -> Self {
        let kind = LearningKind::classify(learning);
        Self {
            kind,
            learning: learning.to_string(),
            action: format!("{}: {}", kind.action(), learning),
        }
    }
}

/// Failure of a worker run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PassError {
    /// May succeed on retry
    #[error("transient pass failure: {0}")]
    Transient(String),
    /// Will not succeed on retry
    #[error("pass failure: {0}")]
    Permanent(String),
}

impl PassError {
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Does the work of a pass
#[async_trait::async_trait]
pub trait PassWorker: Send + Sync {
    /// Run once in `mode`, applying `refinements`
    async fn run(
        &self,
        mode: PassMode,
        ctx: &PassContext,
        refinements: &[Refinement],
    ) -> Result<WorkOutput, PassError>;
}
