//! Engine configuration
//!
//! Every section deserializes with `#[serde(default)]`, so a TOML file only
//! needs the keys it overrides. Defaults follow the engine's documented values.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Circuit breaker configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures (while closed) that open the breaker
    pub failure_threshold: u32,
    /// Seconds the breaker stays open before admitting a probe call
    pub timeout_secs: u64,
    /// Successes (while half-open) that close the breaker
    pub success_threshold: u32,
}

impl BreakerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With failure threshold
    #[inline]
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// With open timeout in seconds
    #[inline]
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// With success threshold
    #[inline]
    #[must_use]
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Open timeout as a duration
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reject impossible values
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.failure_threshold == 0 {
            return Err(EngineError::config("breaker.failure_threshold must be >= 1"));
        }
        if self.success_threshold == 0 {
            return Err(EngineError::config("breaker.success_threshold must be >= 1"));
        }
        Ok(())
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_secs: 60,
            success_threshold: 2,
        }
    }
}

/// Retry coordinator configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Upper bound on attempts per session
    pub max_retries: u32,
    /// Minimum confidence accepted as success
    pub acceptance_threshold: f64,
    /// Consecutive failed attempts that trip the session breaker
    pub session_failure_threshold: u32,
    /// Per-call deadline for generate/validate, in milliseconds
    pub call_timeout_ms: Option<u64>,
}

impl RetryConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With max retries
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// With acceptance threshold
    #[inline]
    #[must_use]
    pub fn with_acceptance_threshold(mut self, threshold: f64) -> Self {
        self.acceptance_threshold = threshold;
        self
    }

    /// With session breaker threshold
    #[inline]
    #[must_use]
    pub fn with_session_failure_threshold(mut self, threshold: u32) -> Self {
        self.session_failure_threshold = threshold;
        self
    }

    /// With per-call timeout
    #[inline]
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Per-call timeout as a duration
    #[inline]
    #[must_use]
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    /// Reject impossible values
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_retries < 1 {
            return Err(EngineError::config("retry.max_retries must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.acceptance_threshold) {
            return Err(EngineError::config(
                "retry.acceptance_threshold must be within [0, 1]",
            ));
        }
        if self.session_failure_threshold == 0 {
            return Err(EngineError::config(
                "retry.session_failure_threshold must be >= 1",
            ));
        }
        if self.call_timeout_ms == Some(0) {
            return Err(EngineError::config("retry.call_timeout_ms must be > 0"));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            acceptance_threshold: 0.85,
            session_failure_threshold: 3,
            call_timeout_ms: None,
        }
    }
}

/// Validation cadence of the streaming validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StreamingMode {
    /// Check every 25 chunks
    Lightweight,
    /// Check every 50 chunks
    #[default]
    Standard,
    /// Check every 100 chunks
    Thorough,
}

impl StreamingMode {
    /// Chunks between validation passes
    #[inline]
    #[must_use]
    pub fn interval(&self) -> usize {
        match self {
            Self::Lightweight => 25,
            Self::Standard => 50,
            Self::Thorough => 100,
        }
    }
}

/// Streaming validator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Validation cadence
    pub mode: StreamingMode,
    /// Overrides the mode's interval when set
    pub custom_interval: Option<usize>,
    /// Run placeholder detection
    pub check_placeholders: bool,
    /// Run forbidden-pattern detection
    pub check_forbidden: bool,
    /// Allowed third-party modules; `None` disables the import check
    pub allowed_modules: Option<Vec<String>>,
    /// Characters of buffer tail kept on a stop event
    pub tail_chars: usize,
}

impl StreamingConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With mode
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: StreamingMode) -> Self {
        self.mode = mode;
        self
    }

    /// With a custom interval
    #[inline]
    #[must_use]
    pub fn with_interval(mut self, interval: usize) -> Self {
        self.custom_interval = Some(interval);
        self
    }

    /// With allow-listed modules
    #[must_use]
    pub fn with_allowed_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_modules = Some(modules.into_iter().map(Into::into).collect());
        self
    }

    /// Skip placeholder detection
    #[inline]
    #[must_use]
    pub fn skip_placeholders(mut self) -> Self {
        self.check_placeholders = false;
        self
    }

    /// Skip forbidden-pattern detection
    #[inline]
    #[must_use]
    pub fn skip_forbidden(mut self) -> Self {
        self.check_forbidden = false;
        self
    }

    /// Effective interval
    #[inline]
    #[must_use]
    pub fn interval(&self) -> usize {
        self.custom_interval.unwrap_or_else(|| self.mode.interval())
    }

    /// Reject impossible values
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.interval() == 0 {
            return Err(EngineError::config("streaming interval must be >= 1"));
        }
        Ok(())
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            mode: StreamingMode::Standard,
            custom_interval: None,
            check_placeholders: true,
            check_forbidden: true,
            allowed_modules: None,
            tail_chars: 200,
        }
    }
}

/// Two-pass executor configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwoPassConfig {
    /// Roll back to the first pass when the second regresses
    pub auto_rollback: bool,
    /// Signed quality delta below which a rollback happens
    pub rollback_threshold: f64,
    /// Attempts per pass
    pub max_attempts: u32,
    /// First backoff between pass attempts
    pub initial_backoff_ms: u64,
    /// Backoff growth factor
    pub backoff_multiplier: f64,
    /// Backoff ceiling
    pub max_backoff_ms: u64,
    /// Quality bonus per applied refinement
    pub refinement_bonus_per_item: f64,
    /// Ceiling of the refinement bonus
    pub refinement_bonus_cap: f64,
}

impl TwoPassConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With auto rollback flag
    #[inline]
    #[must_use]
    pub fn with_auto_rollback(mut self, enabled: bool) -> Self {
        self.auto_rollback = enabled;
        self
    }

    /// With rollback threshold
    #[inline]
    #[must_use]
    pub fn with_rollback_threshold(mut self, threshold: f64) -> Self {
        self.rollback_threshold = threshold;
        self
    }

    /// With attempts per pass
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Reject impossible values
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_attempts == 0 {
            return Err(EngineError::config("two_pass.max_attempts must be >= 1"));
        }
        if !(-1.0..=1.0).contains(&self.rollback_threshold) {
            return Err(EngineError::config(
                "two_pass.rollback_threshold must be within [-1, 1]",
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(EngineError::config(
                "two_pass.backoff_multiplier must be >= 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.refinement_bonus_cap) {
            return Err(EngineError::config(
                "two_pass.refinement_bonus_cap must be within [0, 1]",
            ));
        }
        Ok(())
    }
}

impl Default for TwoPassConfig {
    fn default() -> Self {
        Self {
            auto_rollback: true,
            rollback_threshold: -0.10,
            max_attempts: 3,
            initial_backoff_ms: 100,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5_000,
            refinement_bonus_per_item: 0.02,
            refinement_bonus_cap: 0.10,
        }
    }
}

/// Pipeline scheduler configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Competing producers configured for the execution stage
    pub competing_producers: u32,
    /// Route stage calls through the retry coordinator
    pub retry_stages: bool,
    /// Per-stage deadline in seconds; unset uses the stage cost default
    pub stage_timeout_secs: Option<u64>,
    /// Overrides the cost-derived heartbeat interval
    pub heartbeat_secs: Option<u64>,
    /// Silent heartbeats before a stage is reported stalled
    pub stall_after_beats: u32,
}

impl SchedulerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With competing producers
    #[inline]
    #[must_use]
    pub fn with_competing_producers(mut self, producers: u32) -> Self {
        self.competing_producers = producers;
        self
    }

    /// With stage timeout
    #[inline]
    #[must_use]
    pub fn with_stage_timeout_secs(mut self, secs: u64) -> Self {
        self.stage_timeout_secs = Some(secs);
        self
    }

    /// With heartbeat override
    #[inline]
    #[must_use]
    pub fn with_heartbeat_secs(mut self, secs: u64) -> Self {
        self.heartbeat_secs = Some(secs);
        self
    }

    /// Reject impossible values
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.competing_producers == 0 {
            return Err(EngineError::config(
                "scheduler.competing_producers must be >= 1",
            ));
        }
        if self.heartbeat_secs == Some(0) {
            return Err(EngineError::config("scheduler.heartbeat_secs must be > 0"));
        }
        if self.stage_timeout_secs == Some(0) {
            return Err(EngineError::config(
                "scheduler.stage_timeout_secs must be > 0",
            ));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            competing_producers: 1,
            retry_stages: true,
            stage_timeout_secs: None,
            heartbeat_secs: None,
            stall_after_beats: 3,
        }
    }
}

/// Whole-engine configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub breaker: BreakerConfig,
    pub retry: RetryConfig,
    pub streaming: StreamingConfig,
    pub two_pass: TwoPassConfig,
    pub scheduler: SchedulerConfig,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        toml::from_str(text).map_err(|e| EngineError::config(format!("invalid TOML: {e}")))
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded engine configuration");
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String, EngineError> {
        toml::to_string_pretty(self).map_err(|e| EngineError::config(e.to_string()))
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), EngineError> {
        self.breaker.validate()?;
        self.retry.validate()?;
        self.streaming.validate()?;
        self.two_pass.validate()?;
        self.scheduler.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.timeout_secs, 60);
        assert_eq!(config.breaker.success_threshold, 2);
        assert_eq!(config.retry.max_retries, 3);
        assert!((config.retry.acceptance_threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.streaming.interval(), 50);
        assert!(config.two_pass.auto_rollback);
        assert!((config.two_pass.rollback_threshold + 0.10).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn streaming_mode_intervals() {
        assert_eq!(StreamingMode::Lightweight.interval(), 25);
        assert_eq!(StreamingMode::Standard.interval(), 50);
        assert_eq!(StreamingMode::Thorough.interval(), 100);
        assert_eq!(StreamingConfig::new().with_interval(7).interval(), 7);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [retry]
            max_retries = 5

            [streaming]
            mode = "thorough"
            allowed_modules = ["requests"]
            "#,
        )
        .unwrap();

        assert_eq!(config.retry.max_retries, 5);
        assert!((config.retry.acceptance_threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.streaming.interval(), 100);
        assert_eq!(config.streaming.allowed_modules, Some(vec!["requests".to_string()]));
        assert_eq!(config.breaker, BreakerConfig::default());
    }

    #[test]
    fn zero_retries_rejected() {
        let config = RetryConfig::new().with_max_retries(0);
        let err = config.validate().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        assert!(RetryConfig::new().with_acceptance_threshold(1.5).validate().is_err());
        assert!(TwoPassConfig::new().with_rollback_threshold(-2.0).validate().is_err());
        assert!(BreakerConfig::new().with_failure_threshold(0).validate().is_err());
    }

    #[test]
    fn malformed_toml_is_configuration_error() {
        let err = EngineConfig::from_toml_str("[retry\nmax_retries = ").unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn toml_round_trip_preserves_overrides() {
        let mut config = EngineConfig::default();
        config.scheduler = config.scheduler.with_competing_producers(3);
        let text = config.to_toml_string().unwrap();
        let parsed = EngineConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.scheduler.competing_producers, 3);
    }
}
