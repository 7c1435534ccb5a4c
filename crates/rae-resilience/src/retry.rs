//! Confidence-gated retry with input refinement
//!
//! One session runs `generate -> validate -> score` up to `max_retries` times.
//! Attempts are strictly sequential. A failed attempt is analyzed, the input
//! is refined from the original plus every constraint learned so far, and the
//! loop continues. Generation and validation errors are recorded as failed
//! attempts and never escape the loop.
//!
//! A session-local breaker counts consecutive failed attempts; once it opens
//! the session stops with `circuit_tripped = true`.

use crate::breaker::{BreakerError, CircuitBreaker};
use crate::confidence::{ConfidenceScore, ConfidenceScorer, DefaultConfidenceScorer};
use crate::failure::{FailureAnalysis, FailureAnalyzer};
use crate::refiner::{InputRefiner, RefinedInput};
use crate::timeout::call_with_timeout;
use chrono::{DateTime, Utc};
use rae_core::{
    BreakerConfig, CollaboratorError, EngineError, EventKind, EventSink, Generator, NullSink,
    RetryConfig, SessionId, ValidationResult, Validator,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// One generate + validate cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    /// 1-based, strictly increasing within a session
    pub attempt_number: u32,
    /// When the attempt finished
    pub timestamp: DateTime<Utc>,
    /// Input the generator received
    pub input: String,
    /// Validator verdict, absent when a call errored
    pub validation: Option<ValidationResult>,
    /// Scored confidence (0 when a call errored)
    pub confidence: f64,
    /// Diagnosis of a failed attempt
    pub failure: Option<FailureAnalysis>,
    /// Collaborator error, if a call errored
    pub error: Option<String>,
    /// Input prepared for the next attempt
    pub refined: Option<RefinedInput>,
    /// Whether the attempt passed the confidence gate
    pub succeeded: bool,
}

/// Outcome of one retry session
#[derive(Debug, Clone, Serialize)]
pub struct RetrySessionResult<O> {
    /// Session identifier
    pub session_id: SessionId,
    /// Whether some attempt passed the gate
    pub succeeded: bool,
    /// Output of the successful attempt
    pub final_output: Option<O>,
    /// Every attempt, ordered by attempt number
    pub attempts: Vec<Attempt>,
    /// `attempts.len()`
    pub total_attempts: u32,
    /// Session breaker stopped the loop
    pub circuit_tripped: bool,
}

impl<O> RetrySessionResult<O> {
    /// Attempt with the highest confidence (earliest on ties)
    #[must_use]
    pub fn best_attempt(&self) -> Option<&Attempt> {
        self.attempts.iter().reduce(|best, a| {
            if a.confidence > best.confidence {
                a
            } else {
                best
            }
        })
    }

    /// Most recent failed attempt
    #[must_use]
    pub fn last_failure(&self) -> Option<&Attempt> {
        self.attempts.iter().rev().find(|a| !a.succeeded)
    }
}

/// Errors that escape a retry session
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetryError {
    /// The coordinator's external breaker is open
    #[error("circuit open for '{resource}', retry after {retry_after:?}")]
    CircuitOpen {
        /// Guarded resource
        resource: String,
        /// Time until a probe call is admitted
        retry_after: Duration,
    },

    /// Invalid retry configuration
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<RetryError> for EngineError {
    fn from(value: RetryError) -> Self {
        match value {
            RetryError::CircuitOpen {
                resource,
                retry_after,
            } => EngineError::CircuitOpen {
                resource,
                retry_after,
            },
            RetryError::Configuration(message) => EngineError::Configuration(message),
        }
    }
}

/// Orchestrates attempt, validation, scoring, and refinement
pub struct RetryCoordinator {
    config: RetryConfig,
    scorer: Arc<dyn ConfidenceScorer>,
    analyzer: FailureAnalyzer,
    refiner: InputRefiner,
    breaker: Option<Arc<CircuitBreaker>>,
    sink: Arc<dyn EventSink>,
}

impl RetryCoordinator {
    /// Create coordinator with the default scorer
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            scorer: Arc::new(DefaultConfidenceScorer),
            analyzer: FailureAnalyzer::new(),
            refiner: InputRefiner::new(),
            breaker: None,
            sink: Arc::new(NullSink),
        }
    }

    /// With confidence scorer
    #[must_use]
    pub fn with_scorer(mut self, scorer: Arc<dyn ConfidenceScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// With external breaker guarding the generate call
    #[must_use]
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// With event sink
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run one bounded retry session
    ///
    /// # Errors
    /// - `RetryError::Configuration` before any attempt if the config is invalid
    /// - `RetryError::CircuitOpen` if the external breaker rejects an attempt
    pub async fn execute_with_retry<O, G, V>(
        &self,
        generator: &G,
        validator: &V,
        original: &str,
    ) -> Result<RetrySessionResult<O>, RetryError>
    where
        O: Send + Sync,
        G: Generator<O> + ?Sized,
        V: Validator<O> + ?Sized,
    {
        self.config
            .validate()
            .map_err(|e| RetryError::Configuration(e.to_string()))?;

        let session_id = SessionId::new();
        let session_breaker = CircuitBreaker::new(
            format!("retry-session:{session_id}"),
            BreakerConfig::new()
                .with_failure_threshold(self.config.session_failure_threshold)
                .with_timeout_secs(u64::MAX)
                .with_success_threshold(1),
        );
        let call_timeout = self.config.call_timeout();

        let mut attempts: Vec<Attempt> = Vec::new();
        let mut constraints: Vec<String> = Vec::new();
        let mut current_input = original.to_string();
        let mut circuit_tripped = false;

        tracing::info!(
            session = %session_id,
            max_retries = self.config.max_retries,
            threshold = self.config.acceptance_threshold,
            "retry session started"
        );

        for attempt_number in 1..=self.config.max_retries {
            if session_breaker.try_acquire::<()>().is_err() {
                tracing::warn!(session = %session_id, attempt = attempt_number, "session breaker tripped");
                circuit_tripped = true;
                break;
            }

            if let Some(breaker) = &self.breaker {
                if let Err(BreakerError::Open {
                    resource,
                    retry_after,
                }) = breaker.try_acquire::<()>()
                {
                    return Err(RetryError::CircuitOpen {
                        resource,
                        retry_after,
                    });
                }
            }

            let generated =
                call_with_timeout(call_timeout, generator.generate(&current_input)).await;
            if let Some(breaker) = &self.breaker {
                match &generated {
                    Ok(_) => breaker.record_success(),
                    Err(_) => breaker.record_failure(),
                }
            }

            let verdict = match generated {
                Ok(output) => call_with_timeout(call_timeout, validator.validate(&output))
                    .await
                    .map(|validation| (output, validation)),
                Err(e) => Err(e),
            };

            let (score, validation, failure, error, output) = match verdict {
                Ok((output, validation)) => {
                    let score = self
                        .scorer
                        .score(&validation, self.config.acceptance_threshold);
                    let failure =
                        (!score.passed_threshold).then(|| self.analyzer.analyze(&validation));
                    (score, Some(validation), failure, None, Some(output))
                }
                Err(e) => {
                    tracing::debug!(session = %session_id, attempt = attempt_number, error = %e, "attempt errored");
                    (
                        ConfidenceScore::zero(),
                        None,
                        Some(FailureAnalysis::from_error(&e)),
                        Some(e),
                        None,
                    )
                }
            };

            self.sink.record(EventKind::RetryAttempted {
                session_id,
                attempt: attempt_number,
                confidence: score.confidence,
                succeeded: score.passed_threshold,
            });

            if score.passed_threshold {
                session_breaker.record_success();
                attempts.push(Attempt {
                    attempt_number,
                    timestamp: Utc::now(),
                    input: current_input,
                    validation,
                    confidence: score.confidence,
                    failure: None,
                    error: None,
                    refined: None,
                    succeeded: true,
                });
                tracing::info!(
                    session = %session_id,
                    attempt = attempt_number,
                    confidence = score.confidence,
                    "retry session succeeded"
                );
                return Ok(RetrySessionResult {
                    session_id,
                    succeeded: true,
                    final_output: output,
                    total_attempts: attempt_count(&attempts),
                    attempts,
                    circuit_tripped: false,
                });
            }

            session_breaker.record_failure();
            let analysis = failure.unwrap_or_else(|| self.analyzer.analyze(&ValidationResult::default()));
            let refined = self
                .refiner
                .refine(original, &analysis, attempt_number, &constraints);
            constraints.clone_from(&refined.constraints);

            tracing::debug!(
                session = %session_id,
                attempt = attempt_number,
                confidence = score.confidence,
                category = %analysis.category,
                refinement_level = refined.refinement_level,
                "attempt failed, input refined"
            );

            let next_input = refined.text.clone();
            attempts.push(Attempt {
                attempt_number,
                timestamp: Utc::now(),
                input: std::mem::replace(&mut current_input, next_input),
                validation,
                confidence: score.confidence,
                failure: Some(analysis),
                error: error.map(|e: CollaboratorError| e.to_string()),
                refined: Some(refined),
                succeeded: false,
            });
        }

        tracing::warn!(
            session = %session_id,
            attempts = attempts.len(),
            circuit_tripped,
            "retry session exhausted"
        );

        Ok(RetrySessionResult {
            session_id,
            succeeded: false,
            final_output: None,
            total_attempts: attempt_count(&attempts),
            attempts,
            circuit_tripped,
        })
    }
}

impl std::fmt::Debug for RetryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryCoordinator")
            .field("config", &self.config)
            .field("breaker", &self.breaker.as_ref().map(|b| b.name().to_string()))
            .finish_non_exhaustive()
    }
}

fn attempt_count(attempts: &[Attempt]) -> u32 {
    u32::try_from(attempts.len()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rae_core::{FnGenerator, FnValidator, RecordingSink};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn echo() -> FnGenerator<impl Fn(String) -> std::future::Ready<Result<String, CollaboratorError>>> {
        FnGenerator(|input: String| std::future::ready(Ok(input)))
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let coordinator = RetryCoordinator::new(RetryConfig::default());
        let validator = FnValidator(|_: &String| Ok(ValidationResult::pass().with_score(0.9)));

        let result = coordinator
            .execute_with_retry(&echo(), &validator, "task")
            .await
            .unwrap();

        assert!(result.succeeded);
        assert_eq!(result.total_attempts, 1);
        assert_eq!(result.final_output.as_deref(), Some("task"));
        assert!(result.last_failure().is_none());
    }

    #[tokio::test]
    async fn refines_then_succeeds() {
        let sink = Arc::new(RecordingSink::new());
        let coordinator = RetryCoordinator::new(RetryConfig::default()).with_sink(sink.clone());
        let validator = FnValidator(|out: &String| {
            if out.contains("INCOMPLETE OUTPUT") {
                Ok(ValidationResult::pass())
            } else {
                Ok(ValidationResult::fail(["body is a TODO placeholder"]))
            }
        });

        let result = coordinator
            .execute_with_retry(&echo(), &validator, "task")
            .await
            .unwrap();

        assert!(result.succeeded);
        assert_eq!(result.total_attempts, 2);
        assert_eq!(result.attempts[0].refined.as_ref().unwrap().refinement_level, 0.3);
        assert!(result.attempts[1].input.starts_with("task\n\n"));
        assert_eq!(sink.count("RetryAttempted"), 2);
    }

    #[tokio::test]
    async fn generation_errors_become_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let generator = FnGenerator(move |input: String| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(CollaboratorError::transient("503"))
                } else {
                    Ok(input)
                }
            }
        });
        let validator = FnValidator(|_: &String| Ok(ValidationResult::pass()));

        let result = RetryCoordinator::new(RetryConfig::default())
            .execute_with_retry(&generator, &validator, "task")
            .await
            .unwrap();

        assert!(result.succeeded);
        assert_eq!(result.attempts[0].confidence, 0.0);
        assert!(result.attempts[0].error.as_deref().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn session_breaker_trips() {
        let config = RetryConfig::default().with_max_retries(6);
        let validator = FnValidator(|_: &String| Ok(ValidationResult::fail(["missing"])));

        let result = RetryCoordinator::new(config)
            .execute_with_retry(&echo(), &validator, "task")
            .await
            .unwrap();

        assert!(!result.succeeded);
        assert!(result.circuit_tripped);
        assert_eq!(result.total_attempts, 3);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = RetryConfig::default();
        config.max_retries = 0;
        let validator = FnValidator(|_: &String| Ok(ValidationResult::pass()));

        let err = RetryCoordinator::new(config)
            .execute_with_retry(&echo(), &validator, "task")
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::Configuration(_)));
        assert!(EngineError::from(err).is_fatal());
    }

    #[tokio::test]
    async fn open_external_breaker_propagates() {
        let breaker = Arc::new(CircuitBreaker::new(
            "llm",
            BreakerConfig::new().with_failure_threshold(1),
        ));
        breaker.record_failure();
        let validator = FnValidator(|_: &String| Ok(ValidationResult::pass()));

        let err = RetryCoordinator::new(RetryConfig::default())
            .with_breaker(breaker)
            .execute_with_retry(&echo(), &validator, "task")
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::CircuitOpen { ref resource, .. } if resource == "llm"));
    }

    #[tokio::test(start_paused = true)]
    async fn call_timeout_records_failed_attempt() {
        let config = RetryConfig::default()
            .with_max_retries(1)
            .with_call_timeout(Duration::from_millis(100));
        let generator = FnGenerator(|input: String| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, CollaboratorError>(input)
        });
        let validator = FnValidator(|_: &String| Ok(ValidationResult::pass()));

        let result = RetryCoordinator::new(config)
            .execute_with_retry(&generator, &validator, "task")
            .await
            .unwrap();

        assert!(!result.succeeded);
        assert!(result.attempts[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn best_attempt_picks_highest_confidence() {
        let scores = Arc::new(AtomicU32::new(0));
        let validator = FnValidator(move |_: &String| {
            let n = scores.fetch_add(1, Ordering::SeqCst);
            let score = [0.3, 0.6, 0.4][n as usize % 3];
            Ok(ValidationResult::fail(["missing"]).with_score(score))
        });

        let result = RetryCoordinator::new(RetryConfig::default())
            .execute_with_retry(&echo(), &validator, "task")
            .await
            .unwrap();

        assert_eq!(result.best_attempt().unwrap().attempt_number, 2);
        assert_eq!(result.last_failure().unwrap().attempt_number, 3);
    }
}
