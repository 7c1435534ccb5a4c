//! Pipeline scheduler
//!
//! ```text
//! task -> classifier -> selector (capped by allocation) -> plan
//! plan.batches in order:
//!   batch members concurrently (join_all), each stage:
//!     supervision(heartbeat)
//!       two-pass executor   when a pass worker is registered
//!       retry coordinator   when the stage policy retries
//!       direct call         otherwise
//!     every collaborator call behind breaker "stage:<name>" with the policy timeout
//! completed outputs feed later stages as upstream data
//! ```
//!
//! A failed optional stage is recorded and the run goes on. A failed required
//! stage ends the run; its error is available from [`TaskReport::error`].

use crate::allocator::{ResourceAllocation, ResourceAllocator};
use crate::catalog::StageKind;
use crate::complexity::{developers_for, Task, TaskComplexityClassifier};
use crate::selector::{ExecutionPlan, Requirement, StageSelector};
use crate::supervision::{supervise, Supervision};
use futures::future::join_all;
use rae_core::{
    CollaboratorError, EngineConfig, EngineError, EventKind, EventSink, Generator, PlatformProbe,
    StageContext, StageExecutor, StageResult, StageStatus, TracingSink, ValidationResult,
    Validator,
};
use rae_resilience::{call_with_timeout, BreakerError, BreakerRegistry, CircuitBreaker, RetryCoordinator};
use rae_twopass::{PassContext, PassWorker, TwoPassExecutor};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Per-stage execution settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePolicy {
    /// Route the stage through the retry coordinator
    pub retry: bool,
    /// Deadline for one collaborator call; always finite
    pub timeout: Duration,
    pub heartbeat: Duration,
}

impl StagePolicy {
    /// Policy derived from configuration and stage cost
    #[must_use]
    pub fn for_stage(stage: StageKind, config: &EngineConfig) -> Self {
        let scheduler = &config.scheduler;
        Self {
            retry: scheduler.retry_stages,
            timeout: scheduler
                .stage_timeout_secs
                .map_or_else(|| stage.cost().default_timeout(), Duration::from_secs),
            heartbeat: scheduler
                .heartbeat_secs
                .map_or_else(|| stage.cost().heartbeat(), Duration::from_secs),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }
}

/// Result of one scheduled stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageOutcome {
    pub stage: StageKind,
    pub requirement: Requirement,
    pub status: StageStatus,
    pub duration_ms: u64,
    /// Collaborator attempts made (retry session or pass attempts)
    pub attempts: u32,
    pub error: Option<String>,
    pub data: Value,
}

impl StageOutcome {
    #[inline]
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == StageStatus::Failed
    }
}

/// Summary of one task run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskReport {
    pub task_id: String,
    pub plan: ExecutionPlan,
    /// Outcomes of the stages that ran, in completion order per batch
    pub outcomes: Vec<StageOutcome>,
    pub success: bool,
    /// First required stage that failed
    pub failed_stage: Option<StageKind>,
    pub duration_ms: u64,
}

impl TaskReport {
    /// Outcome for `stage`, if it ran
    #[must_use]
    pub fn outcome(&self, stage: StageKind) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.stage == stage)
    }

    /// Stage error for a failed run
    #[must_use]
    pub fn error(&self) -> Option<EngineError> {
        let stage = self.failed_stage?;
        let message = self
            .outcome(stage)
            .and_then(|o| o.error.clone())
            .unwrap_or_else(|| "stage failed".to_string());
        Some(EngineError::StageExecution {
            stage: stage.name().to_string(),
            message,
        })
    }

    /// The report, or the failing stage's error
    ///
    /// # Errors
    /// `EngineError::StageExecution` when a required stage failed.
    pub fn into_result(self) -> Result<Self, EngineError> {
        match self.error() {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }
}

/// Top-level orchestrator
pub struct PipelineScheduler {
    executor: Arc<dyn StageExecutor>,
    allocator: Arc<ResourceAllocator>,
    classifier: TaskComplexityClassifier,
    registry: Arc<BreakerRegistry>,
    config: EngineConfig,
    sink: Arc<dyn EventSink>,
    policies: HashMap<StageKind, StagePolicy>,
    pass_workers: HashMap<StageKind, Arc<dyn PassWorker>>,
}

impl PipelineScheduler {
    /// Create scheduler
    ///
    /// # Errors
    /// `EngineError::Configuration` if `config` is invalid.
    pub fn new(
        executor: Arc<dyn StageExecutor>,
        probe: Arc<dyn PlatformProbe>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let sink: Arc<dyn EventSink> = Arc::new(TracingSink);
        Ok(Self {
            executor,
            allocator: Arc::new(ResourceAllocator::new(probe)),
            classifier: TaskComplexityClassifier::new(),
            registry: Arc::new(BreakerRegistry::with_defaults(config.breaker).with_sink(Arc::clone(&sink))),
            config,
            sink,
            policies: HashMap::new(),
            pass_workers: HashMap::new(),
        })
    }

    /// With event sink; also used by the internal breaker registry
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.registry = Arc::new(
            BreakerRegistry::with_defaults(self.config.breaker).with_sink(Arc::clone(&sink)),
        );
        self.sink = sink;
        self
    }

    /// With a shared breaker registry
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<BreakerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Override the policy of one stage
    #[must_use]
    pub fn with_policy(mut self, stage: StageKind, policy: StagePolicy) -> Self {
        self.policies.insert(stage, policy);
        self
    }

    /// Run `stage` through the two-pass executor with `worker`
    #[must_use]
    pub fn with_pass_worker(mut self, stage: StageKind, worker: Arc<dyn PassWorker>) -> Self {
        self.pass_workers.insert(stage, worker);
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<BreakerRegistry> {
        &self.registry
    }

    /// Cached allocation for this host
    #[must_use]
    pub fn allocation(&self) -> ResourceAllocation {
        self.allocator.allocation()
    }

    /// Effective policy for `stage`
    #[must_use]
    pub fn policy(&self, stage: StageKind) -> StagePolicy {
        self.policies
            .get(&stage)
            .copied()
            .unwrap_or_else(|| StagePolicy::for_stage(stage, &self.config))
    }

    /// Plan `task` without running it
    #[must_use]
    pub fn build_plan(&self, task: &Task) -> ExecutionPlan {
        let allocation = self.allocator.allocation();
        let signals = self.classifier.classify(task);
        let producers = self.config.scheduler.competing_producers;
        let developers = developers_for(signals.complexity, &allocation, producers);

        let plan = StageSelector::new(producers, allocation.max_parallel_stages)
            .plan(&task.id, &signals, developers);
        tracing::info!(
            task = %task.id,
            complexity = %plan.complexity,
            developers = plan.developers,
            run = plan.stages_to_run.len(),
            skip = plan.stages_to_skip.len(),
            "execution plan built"
        );
        plan
    }

    /// Plan and run `task`
    pub async fn run(&self, task: &Task) -> TaskReport {
        let started = Instant::now();
        let plan = self.build_plan(task);

        for stage in &plan.stages_to_skip {
            let reason = plan
                .decision(*stage)
                .map(|d| d.justification.clone())
                .unwrap_or_default();
            self.sink.record(EventKind::StageSkipped {
                task_id: task.id.clone(),
                stage: stage.name().to_string(),
                reason,
            });
        }

        let input = task.input();
        let mut upstream: BTreeMap<String, Value> = BTreeMap::new();
        let mut outcomes = Vec::with_capacity(plan.stages_to_run.len());
        let mut failed_stage = None;

        for batch in &plan.batches {
            let results = join_all(batch.iter().map(|&stage| {
                let ctx = StageContext::new(task.id.clone(), stage.name(), input.clone())
                    .with_upstream(upstream.clone());
                self.run_stage(stage, plan.requirement(stage), ctx)
            }))
            .await;

            for outcome in results {
                match outcome.status {
                    StageStatus::Completed => {
                        upstream.insert(outcome.stage.name().to_string(), outcome.data.clone());
                    }
                    StageStatus::Failed
                        if outcome.requirement == Requirement::Required && failed_stage.is_none() =>
                    {
                        failed_stage = Some(outcome.stage);
                    }
                    StageStatus::Failed | StageStatus::Skipped => {}
                }
                outcomes.push(outcome);
            }

            if let Some(stage) = failed_stage {
                tracing::warn!(task = %task.id, stage = %stage, "required stage failed, stopping run");
                break;
            }
        }

        let report = TaskReport {
            task_id: task.id.clone(),
            plan,
            outcomes,
            success: failed_stage.is_none(),
            failed_stage,
            duration_ms: elapsed_ms(started),
        };
        tracing::info!(
            task = %report.task_id,
            success = report.success,
            stages = report.outcomes.len(),
            duration_ms = report.duration_ms,
            "task finished"
        );
        report
    }

    /// Run several tasks, at most `max_parallel_developers` at a time
    pub async fn run_many(&self, tasks: &[Task]) -> Vec<TaskReport> {
        let permits = Semaphore::new(self.allocator.allocation().max_parallel_developers.max(1));
        join_all(tasks.iter().map(|task| {
            let permits = &permits;
            async move {
                // never closed
                let _permit = permits.acquire().await.ok();
                self.run(task).await
            }
        }))
        .await
    }

    async fn run_stage(
        &self,
        stage: StageKind,
        requirement: Requirement,
        ctx: StageContext,
    ) -> StageOutcome {
        let started = Instant::now();
        let policy = self.policy(stage);
        let supervision = Supervision {
            task_id: ctx.task_id.clone(),
            stage: stage.name().to_string(),
            heartbeat: policy.heartbeat,
            stall_after: self.config.scheduler.stall_after_beats,
            sink: Arc::clone(&self.sink),
        };

        tracing::info!(task = %ctx.task_id, stage = %stage, ?requirement, "stage started");
        self.sink.record(EventKind::StageStarted {
            task_id: ctx.task_id.clone(),
            stage: stage.name().to_string(),
        });

        let breaker = self.registry.get_or_create(&format!("stage:{}", stage.name()));
        let attempt = supervise(self.dispatch(stage, &policy, breaker, &ctx), &supervision).await;

        let duration_ms = elapsed_ms(started);
        let (status, data, error, attempts) = match attempt {
            Ok((result, attempts)) => match result.status {
                StageStatus::Failed => (
                    StageStatus::Failed,
                    result.data,
                    Some(result.error.unwrap_or_else(|| "stage reported failure".to_string())),
                    attempts,
                ),
                status => (status, result.data, None, attempts),
            },
            Err((error, attempts)) => {
                let message = match error {
                    EngineError::StageExecution { message, .. } => message,
                    other => other.to_string(),
                };
                (StageStatus::Failed, Value::Null, Some(message), attempts)
            }
        };

        match &error {
            None => self.sink.record(EventKind::StageCompleted {
                task_id: ctx.task_id.clone(),
                stage: stage.name().to_string(),
                duration_ms,
            }),
            Some(message) => {
                tracing::warn!(task = %ctx.task_id, stage = %stage, error = %message, "stage failed");
                self.sink.record(EventKind::StageFailed {
                    task_id: ctx.task_id.clone(),
                    stage: stage.name().to_string(),
                    error: message.clone(),
                    required: requirement == Requirement::Required,
                });
            }
        }

        StageOutcome {
            stage,
            requirement,
            status,
            duration_ms,
            attempts,
            error,
            data,
        }
    }

    /// Pick the execution path; returns the stage result and attempts made
    async fn dispatch(
        &self,
        stage: StageKind,
        policy: &StagePolicy,
        breaker: Arc<CircuitBreaker>,
        ctx: &StageContext,
    ) -> Result<(StageResult, u32), (EngineError, u32)> {
        if let Some(worker) = self.pass_workers.get(&stage) {
            return self.run_two_pass(Arc::clone(worker), &breaker, policy, ctx).await;
        }
        if policy.retry {
            return self.run_with_retry(stage, policy, breaker, ctx).await;
        }

        let result = breaker
            .call(|| call_with_timeout(Some(policy.timeout), self.executor.execute_stage(stage.name(), ctx)))
            .await
            .map_err(|e| (EngineError::from(e), 1))?;
        Ok((result, 1))
    }

    async fn run_with_retry(
        &self,
        stage: StageKind,
        policy: &StagePolicy,
        breaker: Arc<CircuitBreaker>,
        ctx: &StageContext,
    ) -> Result<(StageResult, u32), (EngineError, u32)> {
        let limit = self
            .config
            .retry
            .call_timeout()
            .map_or(policy.timeout, |t| t.min(policy.timeout));
        let retry = self.config.retry.with_call_timeout(limit);
        let coordinator = RetryCoordinator::new(retry)
            .with_breaker(breaker)
            .with_sink(Arc::clone(&self.sink));

        let generator = StageGenerator {
            executor: self.executor.as_ref(),
            stage: stage.name(),
            ctx,
        };
        let session = coordinator
            .execute_with_retry(&generator, &StageResultValidator, &ctx.input)
            .await
            .map_err(|e| (EngineError::from(e), 0))?;

        let attempts = session.total_attempts;
        if let Some(result) = session.final_output {
            return Ok((result, attempts));
        }

        let message = session
            .last_failure()
            .and_then(|a| {
                a.error
                    .clone()
                    .or_else(|| a.validation.as_ref().and_then(|v| v.issues.first().cloned()))
            })
            .unwrap_or_else(|| "no attempt passed the confidence gate".to_string());
        Err((
            EngineError::StageExecution {
                stage: stage.name().to_string(),
                message: format!("{message} after {attempts} attempt(s)"),
            },
            attempts,
        ))
    }

    async fn run_two_pass(
        &self,
        worker: Arc<dyn PassWorker>,
        breaker: &CircuitBreaker,
        policy: &StagePolicy,
        ctx: &StageContext,
    ) -> Result<(StageResult, u32), (EngineError, u32)> {
        let executor =
            TwoPassExecutor::with_worker(worker, &self.config.two_pass).with_sink(Arc::clone(&self.sink));
        let pass_ctx = ctx
            .upstream
            .iter()
            .fold(PassContext::new(ctx.task_id.clone(), ctx.input.clone()), |pc, (k, v)| {
                pc.with_data(k.clone(), v.clone())
            });

        let outcome = breaker
            .call(|| async {
                tokio::time::timeout(policy.timeout, executor.execute(&pass_ctx))
                    .await
                    .unwrap_or_else(|_| Err(EngineError::TransientExternal(CollaboratorError::Timeout(policy.timeout))))
            })
            .await
            .map_err(|e| match e {
                BreakerError::Open {
                    resource,
                    retry_after,
                } => (
                    EngineError::CircuitOpen {
                        resource,
                        retry_after,
                    },
                    0,
                ),
                BreakerError::Inner(error) => {
                    let attempts = match &error {
                        EngineError::PassExecution { attempts, .. } => *attempts,
                        _ => 1,
                    };
                    (error, attempts)
                }
            })?;

        let attempts = outcome.attempts();
        let data = json!({
            "pass": outcome.final_result.pass_name,
            "quality": outcome.final_result.quality_score,
            "artifacts": outcome.final_result.artifacts,
            "learnings": outcome.final_result.learnings,
            "rolled_back": outcome.rolled_back,
            "rollback_reason": outcome.rollback_reason,
        });
        let result = if outcome.final_result.success {
            StageResult::completed(data)
        } else {
            StageResult {
                status: StageStatus::Failed,
                data,
                error: Some(format!(
                    "{} quality {:.2} below acceptance",
                    outcome.final_result.pass_name, outcome.final_result.quality_score
                )),
            }
        };
        Ok((result, attempts))
    }
}

impl std::fmt::Debug for PipelineScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineScheduler")
            .field("allocator", &self.allocator)
            .field("registry", &self.registry)
            .field("policies", &self.policies)
            .field("pass_workers", &self.pass_workers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Stage call seen as a generator; the retry input replaces the context input
struct StageGenerator<'a> {
    executor: &'a dyn StageExecutor,
    stage: &'static str,
    ctx: &'a StageContext,
}

#[async_trait::async_trait]
impl<'a> Generator<StageResult> for StageGenerator<'a> {
    async fn generate(&self, input: &str) -> Result<StageResult, CollaboratorError> {
        self.executor
            .execute_stage(self.stage, &self.ctx.with_input(input))
            .await
    }
}

/// Completed and skipped results pass, failed results fail with their error
struct StageResultValidator;

#[async_trait::async_trait]
impl Validator<StageResult> for StageResultValidator {
    async fn validate(&self, output: &StageResult) -> Result<ValidationResult, CollaboratorError> {
        Ok(match output.status {
            StageStatus::Completed | StageStatus::Skipped => ValidationResult::pass(),
            StageStatus::Failed => ValidationResult::fail([output
                .error
                .clone()
                .unwrap_or_else(|| "stage reported failure".to_string())]),
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
