//! Pass values
//!
//! Defines:
//! - [`PassContext`]: immutable input of a pass
//! - [`PassResult`]: outcome of one pass
//! - [`PassMemento`]: first-pass snapshot seeding and backing the second pass
//! - [`PassDelta`]: comparison of two results

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Name of the exploratory pass
pub const FIRST_PASS: &str = "FirstPass";
/// Name of the refining pass
pub const SECOND_PASS: &str = "SecondPass";

/// Input of a pass
///
/// Never mutated in place; [`PassContext::with_memento`] builds the
/// second-pass context as a new value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassContext {
    /// Owning task
    pub task_id: String,
    /// Opaque task input
    pub input: String,
    /// Caller data
    pub data: BTreeMap<String, Value>,
    /// Learnings carried over from an earlier pass
    pub prior_learnings: Vec<String>,
    /// Insights carried over from an earlier pass
    pub prior_insights: BTreeMap<String, Value>,
    /// Pass the carried data came from
    pub seeded_by: Option<String>,
}

impl PassContext {
    /// Create context
    #[must_use]
    pub fn new(task_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            input: input.into(),
            data: BTreeMap::new(),
            prior_learnings: Vec::new(),
            prior_insights: BTreeMap::new(),
            seeded_by: None,
        }
    }

    /// With one data entry
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// New context carrying the memento's learnings and insights
    #[must_use]
    pub fn with_memento(&self, memento: &PassMemento) -> Self {
        let mut prior_learnings = self.prior_learnings.clone();
        for learning in &memento.learnings {
            if !prior_learnings.contains(learning) {
                prior_learnings.push(learning.clone());
            }
        }
        let mut prior_insights = self.prior_insights.clone();
        prior_insights.extend(memento.insights.clone());

        Self {
            prior_learnings,
            prior_insights,
            seeded_by: Some(memento.source_pass.clone()),
            ..self.clone()
        }
    }
}

/// Outcome of one pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassResult {
    pub pass_name: String,
    pub success: bool,
    pub artifacts: BTreeMap<String, Value>,
    /// Quality in [0, 1]; defined even when `success` is false
    pub quality_score: f64,
    pub execution_time_secs: f64,
    pub learnings: Vec<String>,
    pub insights: BTreeMap<String, Value>,
}

/// First-pass snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassMemento {
    pub source_pass: String,
    pub learnings: Vec<String>,
    pub insights: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
    /// Full first-pass result, restored on rollback
    pub snapshot: PassResult,
}

impl PassMemento {
    /// Capture `result`
    #[must_use]
    pub fn capture(result: &PassResult) -> Self {
        Self {
            source_pass: result.pass_name.clone(),
            learnings: result.learnings.clone(),
            insights: result.insights.clone(),
            created_at: Utc::now(),
            snapshot: result.clone(),
        }
    }
}

/// Second pass compared with the first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassDelta {
    /// `second.quality_score - first.quality_score`
    pub quality_delta: f64,
    /// Artifact keys added, removed, or changed, sorted
    pub changed_artifact_keys: Vec<String>,
}

impl PassDelta {
    #[inline]
    #[must_use]
    pub fn improved(&self) -> bool {
        self.quality_delta > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(learnings: &[&str]) -> PassResult {
        PassResult {
            pass_name: FIRST_PASS.to_string(),
            success: true,
            artifacts: BTreeMap::new(),
            quality_score: 0.7,
            execution_time_secs: 0.1,
            learnings: learnings.iter().map(|l| (*l).to_string()).collect(),
            insights: BTreeMap::from([("checks_total".to_string(), json!(4))]),
        }
    }

    #[test]
    fn memento_seeds_new_context_without_touching_original() {
        let ctx = PassContext::new("t1", "input").with_data("k", json!(1));
        let memento = PassMemento::capture(&result(&["validation failed on empty input"]));

        let seeded = ctx.with_memento(&memento);

        assert!(ctx.prior_learnings.is_empty());
        assert_eq!(seeded.prior_learnings.len(), 1);
        assert_eq!(seeded.prior_insights["checks_total"], json!(4));
        assert_eq!(seeded.seeded_by.as_deref(), Some(FIRST_PASS));
        assert_eq!(seeded.data, ctx.data);
    }

    #[test]
    fn memento_learnings_are_not_duplicated() {
        let memento = PassMemento::capture(&result(&["a", "b"]));
        let ctx = PassContext::new("t", "i").with_memento(&memento).with_memento(&memento);
        assert_eq!(ctx.prior_learnings, vec!["a".to_string(), "b".to_string()]);
    }
}
