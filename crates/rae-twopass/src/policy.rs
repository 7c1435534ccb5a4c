//! Bounded retry with exponential backoff for a single pass
//!
//! Only [`PassError::Transient`] is retried. Delay before retry `n` (1-based)
//! is `initial * multiplier^(n-1)`, capped at `max_backoff`.

use crate::worker::PassError;
use rae_core::{EngineError, TwoPassConfig};
use std::future::Future;
use std::time::Duration;

/// Retry policy wrapped around each pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassRetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl PassRetryPolicy {
    /// Policy from two-pass configuration
    #[must_use]
    pub fn from_config(config: &TwoPassConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            multiplier: config.backoff_multiplier,
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Single attempt, no backoff
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            multiplier: 1.0,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based)
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        #[allow(clippy::cast_precision_loss)]
        let ms = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exp);
        #[allow(clippy::cast_precision_loss)]
        let cap = self.max_backoff.as_millis() as f64;
        if !ms.is_finite() || ms >= cap {
            self.max_backoff
        } else {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let ms = ms.max(0.0).round() as u64;
            Duration::from_millis(ms)
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    ///
    /// Returns the value with the number of attempts it took.
    ///
    /// # Errors
    /// `EngineError::PassExecution` naming `pass`, the attempts made and the last error.
    pub async fn run<T, F, Fut>(&self, pass: &str, mut op: F) -> Result<(T, u32), EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PassError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok((value, attempt)),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::debug!(pass, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying pass");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::warn!(pass, attempt, error = %e, "pass failed");
                    return Err(EngineError::PassExecution {
                        pass: pass.to_string(),
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

impl Default for PassRetryPolicy {
    fn default() -> Self {
        Self::from_config(&TwoPassConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_grows_and_caps() {
        let policy = PassRetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(30), Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_only() {
        let calls = AtomicU32::new(0);
        let result = PassRetryPolicy::default()
            .run("FirstPass", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(PassError::Transient("busy".into()))
                } else {
                    Ok(5)
                }
            })
            .await;
        assert_eq!(result.unwrap(), (5, 3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let calls = AtomicU32::new(0);
        let err = PassRetryPolicy::default()
            .run("SecondPass", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(PassError::Permanent("broken".into()))
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, EngineError::PassExecution { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_attempts() {
        let err = PassRetryPolicy::default()
            .run("FirstPass", || async { Err::<(), _>(PassError::Transient("busy".into())) })
            .await
            .unwrap_err();
        match err {
            EngineError::PassExecution { pass, attempts, .. } => {
                assert_eq!(pass, "FirstPass");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
