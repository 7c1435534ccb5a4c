//! Two-pass executor
//!
//! ```text
//! first pass (retry policy)
//!   -> memento
//!   -> second-pass context = context.with_memento(memento)
//!   -> second pass (retry policy)
//!   -> compare
//!   -> rollback to first pass if quality regressed past the threshold
//!   -> history record
//! ```
//!
//! Either pass exhausting its retries aborts the execution with
//! `EngineError::PassExecution`. Rollback cannot fail: once the first pass
//! succeeded, its memento is always available.

use crate::compare::{PassComparator, RollbackManager};
use crate::policy::PassRetryPolicy;
use crate::strategy::{FirstPassStrategy, PassStrategy, SecondPassStrategy};
use crate::types::{PassContext, PassDelta, PassMemento, PassResult};
use crate::worker::PassWorker;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rae_core::{EngineError, EventKind, EventSink, ExecutionId, NullSink, TwoPassConfig};
use serde::Serialize;
use std::sync::Arc;

/// Caller-facing result of one two-pass execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TwoPassOutcome {
    pub execution_id: ExecutionId,
    /// First pass on rollback, second pass otherwise
    pub final_result: PassResult,
    pub first: PassResult,
    pub second: PassResult,
    pub delta: PassDelta,
    pub rolled_back: bool,
    pub rollback_reason: Option<String>,
    /// Attempts the first pass took, retries included
    pub first_attempts: u32,
    pub second_attempts: u32,
}

impl TwoPassOutcome {
    /// Pass attempts across both passes
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.first_attempts + self.second_attempts
    }
}

/// Audit entry for one execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRecord {
    pub execution_id: ExecutionId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub first_quality: f64,
    pub second_quality: f64,
    pub quality_delta: f64,
    /// Name of the pass whose result was returned
    pub winner: String,
    pub rolled_back: bool,
}

/// Runs first pass, memento, second pass, compare, optional rollback
pub struct TwoPassExecutor {
    first: Arc<dyn PassStrategy>,
    second: Arc<dyn PassStrategy>,
    comparator: PassComparator,
    rollback: RollbackManager,
    policy: PassRetryPolicy,
    auto_rollback: bool,
    history: Mutex<Vec<ExecutionRecord>>,
    sink: Arc<dyn EventSink>,
}

impl TwoPassExecutor {
    /// Executor over explicit strategies
    #[must_use]
    pub fn new(
        first: Arc<dyn PassStrategy>,
        second: Arc<dyn PassStrategy>,
        config: &TwoPassConfig,
    ) -> Self {
        Self {
            first,
            second,
            comparator: PassComparator,
            rollback: RollbackManager::new(config.rollback_threshold),
            policy: PassRetryPolicy::from_config(config),
            auto_rollback: config.auto_rollback,
            history: Mutex::new(Vec::new()),
            sink: Arc::new(NullSink),
        }
    }

    /// Executor whose strategies share one worker
    #[must_use]
    pub fn with_worker(worker: Arc<dyn PassWorker>, config: &TwoPassConfig) -> Self {
        let first = Arc::new(FirstPassStrategy::new(Arc::clone(&worker)));
        let second = Arc::new(
            SecondPassStrategy::new(worker)
                .with_bonus(config.refinement_bonus_per_item, config.refinement_bonus_cap),
        );
        Self::new(first, second, config)
    }

    /// With event sink
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// With retry policy
    #[must_use]
    pub fn with_policy(mut self, policy: PassRetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Execution history, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<ExecutionRecord> {
        self.history.lock().clone()
    }

    /// Run both passes over `ctx`
    ///
    /// # Errors
    /// `EngineError::PassExecution` when either pass exhausts its retries.
    pub async fn execute(&self, ctx: &PassContext) -> Result<TwoPassOutcome, EngineError> {
        let execution_id = ExecutionId::new();
        let started_at = Utc::now();
        tracing::info!(execution = %execution_id, task = %ctx.task_id, "two-pass execution started");

        let (first, first_attempts) = self
            .policy
            .run(self.first.name(), || self.first.execute(ctx))
            .await?;
        self.pass_completed(execution_id, &first);

        let memento = PassMemento::capture(&first);
        self.sink.record(EventKind::MementoCreated {
            execution_id,
            learnings: memento.learnings.len(),
        });

        let second_ctx = ctx.with_memento(&memento);
        let (second, second_attempts) = self
            .policy
            .run(self.second.name(), || self.second.execute(&second_ctx))
            .await?;
        self.pass_completed(execution_id, &second);

        let delta = self.comparator.compare(&first, &second);

        // Inclusive boundary: a drop equal to the threshold rolls back
        let (final_result, rollback_reason) =
            if self.auto_rollback && self.rollback.should_rollback(&delta) {
                let (restored, reason) = self.rollback.rollback(&memento, &delta);
                tracing::warn!(
                    execution = %execution_id,
                    quality_delta = delta.quality_delta,
                    reason = %reason,
                    "rolling back to first pass"
                );
                self.sink.record(EventKind::RollbackPerformed {
                    execution_id,
                    reason: reason.clone(),
                    quality_delta: delta.quality_delta,
                });
                (restored, Some(reason))
            } else {
                (second.clone(), None)
            };

        let rolled_back = rollback_reason.is_some();
        self.history.lock().push(ExecutionRecord {
            execution_id,
            started_at,
            finished_at: Utc::now(),
            first_quality: first.quality_score,
            second_quality: second.quality_score,
            quality_delta: delta.quality_delta,
            winner: final_result.pass_name.clone(),
            rolled_back,
        });

        tracing::info!(
            execution = %execution_id,
            winner = %final_result.pass_name,
            quality = final_result.quality_score,
            rolled_back,
            "two-pass execution finished"
        );

        Ok(TwoPassOutcome {
            execution_id,
            final_result,
            first,
            second,
            delta,
            rolled_back,
            rollback_reason,
            first_attempts,
            second_attempts,
        })
    }

    fn pass_completed(&self, execution_id: ExecutionId, result: &PassResult) {
        tracing::debug!(
            execution = %execution_id,
            pass = %result.pass_name,
            quality = result.quality_score,
            success = result.success,
            "pass completed"
        );
        self.sink.record(EventKind::PassCompleted {
            execution_id,
            pass: result.pass_name.clone(),
            quality: result.quality_score,
            success: result.success,
        });
    }
}

impl std::fmt::Debug for TwoPassExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoPassExecutor")
            .field("first", &self.first.name())
            .field("second", &self.second.name())
            .field("rollback", &self.rollback)
            .field("policy", &self.policy)
            .field("auto_rollback", &self.auto_rollback)
            .finish_non_exhaustive()
    }
}
