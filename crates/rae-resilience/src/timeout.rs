//! Call-site deadline for collaborator calls
//!
//! Breakers are timeout-agnostic. A call that never returns never reaches the
//! breaker's failure accounting, so collaborator calls are wrapped here.

use rae_core::CollaboratorError;
use std::future::Future;
use std::time::Duration;

/// Await `fut`, failing with [`CollaboratorError::Timeout`] once `limit` passes
///
/// `None` awaits without a deadline.
///
/// # Errors
/// The future's own error, or `Timeout` on expiry.
pub async fn call_with_timeout<T, Fut>(limit: Option<Duration>, fut: Fut) -> Result<T, CollaboratorError>
where
    Fut: Future<Output = Result<T, CollaboratorError>>,
{
    match limit {
        None => fut.await,
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_ms = limit.as_millis() as u64, "collaborator call timed out");
                Err(CollaboratorError::Timeout(limit))
            }
        },
    }
}
