//! Confidence scoring
//!
//! Only the threshold contract is fixed: `passed_threshold` is exactly
//! `confidence >= threshold`. How confidence is derived is pluggable.

use rae_core::ValidationResult;
use serde::Serialize;

/// Numeric verdict for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceScore {
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// `confidence >= threshold`
    pub passed_threshold: bool,
}

impl ConfidenceScore {
    /// Score `confidence` (clamped) against `threshold`
    #[must_use]
    pub fn new(confidence: f64, threshold: f64) -> Self {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        Self {
            confidence,
            passed_threshold: confidence >= threshold,
        }
    }

    /// Zero-confidence verdict for an attempt that produced nothing
    #[inline]
    #[must_use]
    pub fn zero() -> Self {
        Self {
            confidence: 0.0,
            passed_threshold: false,
        }
    }
}

/// Converts a validation result to a confidence value
pub trait ConfidenceScorer: Send + Sync {
    /// Raw confidence for `result`; clamped by the caller
    fn confidence(&self, result: &ValidationResult) -> f64;

    /// Score against `threshold`
    fn score(&self, result: &ValidationResult, threshold: f64) -> ConfidenceScore {
        ConfidenceScore::new(self.confidence(result), threshold)
    }
}

/// Validator score when present, otherwise derived from the verdict
///
/// Derived values: passed -> 1.0, failed without issues -> 0.5,
/// failed with `n` issues -> `0.5 / (1 + n)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfidenceScorer;

impl ConfidenceScorer for DefaultConfidenceScorer {
    fn confidence(&self, result: &ValidationResult) -> f64 {
        if let Some(score) = result.score {
            return score;
        }
        if result.passed {
            1.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let n = result.issues.len() as f64;
            if n == 0.0 {
                0.5
            } else {
                0.5 / (1.0 + n)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validator_score_wins() {
        let result = ValidationResult::pass().with_score(0.2);
        let score = DefaultConfidenceScorer.score(&result, 0.85);
        assert_eq!(score.confidence, 0.2);
        assert!(!score.passed_threshold);
    }

    #[test]
    fn derived_scores() {
        assert_eq!(DefaultConfidenceScorer.confidence(&ValidationResult::pass()), 1.0);
        assert_eq!(
            DefaultConfidenceScorer.confidence(&ValidationResult::fail(Vec::<String>::new())),
            0.5
        );
        assert_eq!(DefaultConfidenceScorer.confidence(&ValidationResult::fail(["a"])), 0.25);
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(ConfidenceScore::new(0.85, 0.85).passed_threshold);
        assert!(!ConfidenceScore::new(0.849, 0.85).passed_threshold);
    }

    #[test]
    fn clamps_out_of_range() {
        assert_eq!(ConfidenceScore::new(1.7, 0.5).confidence, 1.0);
        assert_eq!(ConfidenceScore::new(f64::NAN, 0.5).confidence, 0.0);
    }
}
