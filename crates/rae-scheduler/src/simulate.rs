//! Simulated stage collaborator for demos and soak runs

use parking_lot::Mutex;
use rae_core::{CollaboratorError, StageContext, StageExecutor, StageResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::time::Duration;

/// Stage executor that fails transiently at a fixed rate
pub struct SimulatedExecutor {
    rng: Mutex<StdRng>,
    failure_rate: f64,
    latency: Duration,
}

impl SimulatedExecutor {
    /// Seeded executor; `failure_rate` is clamped to [0, 1]
    #[must_use]
    pub fn new(seed: u64, failure_rate: f64) -> Self {
        let failure_rate = if failure_rate.is_nan() { 0.0 } else { failure_rate.clamp(0.0, 1.0) };
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            failure_rate,
            latency: Duration::from_millis(25),
        }
    }

    /// With per-call latency
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait::async_trait]
impl StageExecutor for SimulatedExecutor {
    async fn execute_stage(
        &self,
        stage: &str,
        ctx: &StageContext,
    ) -> Result<StageResult, CollaboratorError> {
        let (fails, jitter) = {
            let mut rng = self.rng.lock();
            (rng.gen_bool(self.failure_rate), rng.gen_range(0..=10u64))
        };
        tokio::time::sleep(self.latency + Duration::from_millis(jitter)).await;

        if fails {
            tracing::debug!(stage, task = %ctx.task_id, "simulated failure");
            return Err(CollaboratorError::transient(format!("simulated failure in {stage}")));
        }
        Ok(StageResult::completed(json!({
            "stage": stage,
            "input_chars": ctx.input.chars().count(),
            "upstream": ctx.upstream.keys().collect::<Vec<_>>(),
        })))
    }
}

impl std::fmt::Debug for SimulatedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedExecutor")
            .field("failure_rate", &self.failure_rate)
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn zero_rate_always_completes() {
        let executor = SimulatedExecutor::new(7, 0.0);
        let ctx = StageContext::new("t", "intake", "hello");
        for _ in 0..10 {
            let result = executor.execute_stage("intake", &ctx).await.unwrap();
            assert!(result.is_completed());
            assert_eq!(result.data["input_chars"], 5);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_rate_always_fails() {
        let executor = SimulatedExecutor::new(7, 3.0);
        let ctx = StageContext::new("t", "intake", "hello");
        assert!(executor.execute_stage("intake", &ctx).await.is_err());
    }
}
