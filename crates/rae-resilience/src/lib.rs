//! RAE Resilience - fault isolation and confidence-gated retry
//!
//! Provides:
//! - Three-state [`CircuitBreaker`] and the injectable [`BreakerRegistry`]
//! - [`FailureAnalyzer`] and [`InputRefiner`] for diagnosing and correcting failed attempts
//! - Pluggable [`ConfidenceScorer`] with a threshold gate
//! - [`RetryCoordinator`] tying them into bounded retry sessions
//! - [`call_with_timeout`] for call-site deadlines
//!
//! # Example
//!
//! ```rust,ignore
//! use rae_resilience::{BreakerRegistry, RetryCoordinator};
//! use rae_core::RetryConfig;
//!
//! let registry = BreakerRegistry::new();
//! let coordinator = RetryCoordinator::new(RetryConfig::default())
//!     .with_breaker(registry.get_or_create("llm"));
//! let session = coordinator.execute_with_retry(&generator, &validator, "input").await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod breaker;
pub mod confidence;
pub mod failure;
pub mod refiner;
pub mod registry;
pub mod retry;
pub mod timeout;

pub use breaker::{
    allowed_transitions, BreakerError, BreakerStatus, CircuitBreaker, CircuitState, Protected,
};
pub use confidence::{ConfidenceScore, ConfidenceScorer, DefaultConfidenceScorer};
pub use failure::{FailureAnalysis, FailureAnalyzer, FailureCategory};
pub use refiner::{refinement_level, InputRefiner, RefinedInput};
pub use registry::BreakerRegistry;
pub use retry::{Attempt, RetryCoordinator, RetryError, RetrySessionResult};
pub use timeout::call_with_timeout;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
