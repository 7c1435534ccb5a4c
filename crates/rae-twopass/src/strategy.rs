//! First and second pass strategies

use crate::types::{PassContext, PassResult, FIRST_PASS, SECOND_PASS};
use crate::worker::{PassError, PassMode, PassWorker, Refinement, WorkOutput};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Pass ratio at or above which a pass counts as successful
pub const SUCCESS_RATIO: f64 = 0.5;

/// One pass of the two-pass pipeline
#[async_trait::async_trait]
pub trait PassStrategy: Send + Sync {
    /// Pass name
    fn name(&self) -> &str;

    /// Execute the pass
    async fn execute(&self, ctx: &PassContext) -> Result<PassResult, PassError>;
}

/// Quick exploratory pass
///
/// Quality is the quick-check pass ratio. Failed checks and worker notes
/// become learnings for the second pass.
pub struct FirstPassStrategy {
    worker: Arc<dyn PassWorker>,
}

impl FirstPassStrategy {
    #[must_use]
    pub fn new(worker: Arc<dyn PassWorker>) -> Self {
        Self { worker }
    }
}

#[async_trait::async_trait]
impl PassStrategy for FirstPassStrategy {
    fn name(&self) -> &str {
        FIRST_PASS
    }

    async fn execute(&self, ctx: &PassContext) -> Result<PassResult, PassError> {
        let started = Instant::now();
        let output = self.worker.run(PassMode::Quick, ctx, &[]).await?;
        let quality = output.pass_ratio();

        let mut learnings: Vec<String> = output
            .checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| match &c.detail {
                Some(detail) => format!("{} check failed: {detail}", c.name),
                None => format!("{} check failed", c.name),
            })
            .collect();
        learnings.extend(output.notes.iter().cloned());

        let insights = check_insights(&output);
        Ok(PassResult {
            pass_name: FIRST_PASS.to_string(),
            success: quality >= SUCCESS_RATIO,
            artifacts: output.artifacts,
            quality_score: quality,
            execution_time_secs: started.elapsed().as_secs_f64(),
            learnings,
            insights,
        })
    }
}

/// Thorough refining pass
///
/// Each carried learning becomes a [`Refinement`]. Quality is the thorough
/// pass ratio plus a capped bonus per applied refinement.
pub struct SecondPassStrategy {
    worker: Arc<dyn PassWorker>,
    bonus_per_item: f64,
    bonus_cap: f64,
}

impl SecondPassStrategy {
    #[must_use]
    pub fn new(worker: Arc<dyn PassWorker>) -> Self {
        Self {
            worker,
            bonus_per_item: 0.02,
            bonus_cap: 0.10,
        }
    }

    /// With refinement bonus parameters
    #[must_use]
    pub fn with_bonus(mut self, per_item: f64, cap: f64) -> Self {
        self.bonus_per_item = per_item;
        self.bonus_cap = cap;
        self
    }

    /// Bonus for `applied` refinements
    #[must_use]
    pub fn bonus(&self, applied: usize) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let raw = self.bonus_per_item * applied as f64;
        raw.min(self.bonus_cap)
    }
}

#[async_trait::async_trait]
impl PassStrategy for SecondPassStrategy {
    fn name(&self) -> &str {
        SECOND_PASS
    }

    async fn execute(&self, ctx: &PassContext) -> Result<PassResult, PassError> {
        let started = Instant::now();
        let refinements: Vec<Refinement> = ctx
            .prior_learnings
            .iter()
            .map(|l| Refinement::from_learning(l))
            .collect();

        let output = self.worker.run(PassMode::Thorough, ctx, &refinements).await?;
        let ratio = output.pass_ratio();
        let bonus = self.bonus(refinements.len());
        let quality = (ratio + bonus).min(1.0);

        let learnings: Vec<String> = output
            .checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| format!("{} check still failing", c.name))
            .chain(output.notes.iter().cloned())
            .collect();

        let mut insights = check_insights(&output);
        insights.insert("refinements_applied".to_string(), json!(refinements.len()));
        insights.insert("refinement_bonus".to_string(), json!(bonus));
        insights.insert(
            "refinements".to_string(),
            json!(refinements.iter().map(|r| &r.action).collect::<Vec<_>>()),
        );

        Ok(PassResult {
            pass_name: SECOND_PASS.to_string(),
            success: ratio >= SUCCESS_RATIO,
            artifacts: output.artifacts,
            quality_score: quality,
            execution_time_secs: started.elapsed().as_secs_f64(),
            learnings,
            insights,
        })
    }
}

fn check_insights(output: &WorkOutput) -> BTreeMap<String, serde_json::Value> {
    let passed = output.checks.iter().filter(|c| c.passed).count();
    BTreeMap::from([
        ("checks_total".to_string(), json!(output.checks.len())),
        ("checks_passed".to_string(), json!(passed)),
        ("pass_ratio".to_string(), json!(output.pass_ratio())),
        ("artifact_count".to_string(), json!(output.artifacts.len())),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::{CheckOutcome, LearningKind};
    use parking_lot::Mutex;

    struct Recorder {
        refinements: Mutex<Vec<Refinement>>,
        output: WorkOutput,
    }

    #[async_trait::async_trait]
    impl PassWorker for Recorder {
        async fn run(
            &self,
            _mode: PassMode,
            _ctx: &PassContext,
            refinements: &[Refinement],
        ) -> Result<WorkOutput, PassError> {
            self.refinements.lock().extend_from_slice(refinements);
            Ok(self.output.clone())
        }
    }

    fn recorder(checks: Vec<CheckOutcome>, notes: &[&str]) -> Arc<Recorder> {
        Arc::new(Recorder {
            refinements: Mutex::new(Vec::new()),
            output: WorkOutput {
                checks,
                notes: notes.iter().map(|n| (*n).to_string()).collect(),
                ..WorkOutput::default()
            },
        })
    }

    #[tokio::test]
    async fn first_pass_learns_from_failures() {
        let worker = recorder(
            vec![CheckOutcome::pass("syntax"), CheckOutcome::fail("validation", "empty input accepted")],
            &["lookup is slow"],
        );
        let result = FirstPassStrategy::new(worker).execute(&PassContext::new("t", "i")).await.unwrap();

        assert_eq!(result.pass_name, FIRST_PASS);
        assert_eq!(result.quality_score, 0.5);
        assert!(result.success);
        assert_eq!(
            result.learnings,
            vec![
                "validation check failed: empty input accepted".to_string(),
                "lookup is slow".to_string()
            ]
        );
        assert_eq!(result.insights["checks_total"], json!(2));
    }

    #[tokio::test]
    async fn failed_checks_yield_typed_refinements() {
        let first = recorder(
            vec![
                CheckOutcome::fail("perf", "p99 latency too slow"),
                CheckOutcome::fail("style", "naming is inconsistent"),
            ],
            &[],
        );
        let result = FirstPassStrategy::new(first).execute(&PassContext::new("t", "i")).await.unwrap();

        let second = recorder(vec![CheckOutcome::pass("perf")], &[]);
        let mut ctx = PassContext::new("t", "i");
        ctx.prior_learnings = result.learnings;
        SecondPassStrategy::new(second.clone()).execute(&ctx).await.unwrap();

        let kinds: Vec<LearningKind> = second.refinements.lock().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![LearningKind::Performance, LearningKind::Quality]);
    }

    #[tokio::test]
    async fn second_pass_applies_refinements_with_capped_bonus() {
        let worker = recorder(vec![CheckOutcome::pass("a"), CheckOutcome::pass("b"), CheckOutcome::fail("c", "x"), CheckOutcome::pass("d")], &[]);
        let mut ctx = PassContext::new("t", "i");
        ctx.prior_learnings = (0..8).map(|i| format!("learning {i}")).collect();

        let strategy = SecondPassStrategy::new(worker.clone());
        let result = strategy.execute(&ctx).await.unwrap();

        assert_eq!(worker.refinements.lock().len(), 8);
        assert!((result.quality_score - 0.85).abs() < 1e-9);
        assert_eq!(result.insights["refinements_applied"], json!(8));
        assert!((strategy.bonus(3) - 0.06).abs() < 1e-9);
    }
}
