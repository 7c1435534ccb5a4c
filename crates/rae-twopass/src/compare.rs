//! Pass comparison and rollback decision

use crate::types::{PassDelta, PassMemento, PassResult};
use std::collections::BTreeSet;

/// Float slack on the rollback boundary; a delta landing on the threshold
/// rolls back whichever way subtraction rounded it
pub const ROLLBACK_EPSILON: f64 = 1e-9;

/// Compares two pass results
#[derive(Debug, Clone, Copy, Default)]
pub struct PassComparator;

impl PassComparator {
    /// `second` relative to `first`
    #[must_use]
    pub fn compare(&self, first: &PassResult, second: &PassResult) -> PassDelta {
        let keys: BTreeSet<&String> = first.artifacts.keys().chain(second.artifacts.keys()).collect();
        let changed_artifact_keys = keys
            .into_iter()
            .filter(|k| first.artifacts.get(*k) != second.artifacts.get(*k))
            .cloned()
            .collect();

        PassDelta {
            quality_delta: second.quality_score - first.quality_score,
            changed_artifact_keys,
        }
    }
}

/// Decides on and performs rollback to the first pass
#[derive(Debug, Clone, Copy)]
pub struct RollbackManager {
    threshold: f64,
}

impl RollbackManager {
    /// `threshold` is a signed quality delta, e.g. `-0.10`
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    #[inline]
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Second pass regressed to or past the threshold
    ///
    /// With the default `-0.10`, a drop of exactly ten points rolls back.
    #[must_use]
    pub fn should_rollback(&self, delta: &PassDelta) -> bool {
        delta.quality_delta < self.threshold + ROLLBACK_EPSILON
    }

    /// Restore the first-pass result held by `memento`
    #[must_use]
    pub fn rollback(&self, memento: &PassMemento, delta: &PassDelta) -> (PassResult, String) {
        let reason = format!(
            "second pass quality changed by {:+.2}, at or below rollback threshold {:+.2}",
            delta.quality_delta, self.threshold
        );
        (memento.snapshot.clone(), reason)
    }
}

impl Default for RollbackManager {
    fn default() -> Self {
        Self::new(-0.10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn result(quality: f64, artifacts: &[(&str, i32)]) -> PassResult {
        PassResult {
            pass_name: "p".to_string(),
            success: true,
            artifacts: artifacts.iter().map(|(k, v)| ((*k).to_string(), json!(v))).collect(),
            quality_score: quality,
            execution_time_secs: 0.0,
            learnings: Vec::new(),
            insights: BTreeMap::new(),
        }
    }

    #[test]
    fn delta_and_changed_keys() {
        let first = result(0.6, &[("a", 1), ("b", 2)]);
        let second = result(0.8, &[("b", 3), ("c", 4)]);
        let delta = PassComparator.compare(&first, &second);
        assert!((delta.quality_delta - 0.2).abs() < 1e-9);
        assert_eq!(delta.changed_artifact_keys, vec!["a", "b", "c"]);
        assert!(delta.improved());
    }

    #[test]
    fn rollback_threshold_is_inclusive() {
        let manager = RollbackManager::default();
        let delta = |d: f64| PassDelta {
            quality_delta: d,
            changed_artifact_keys: Vec::new(),
        };
        assert!(manager.should_rollback(&delta(-0.15)));
        assert!(!manager.should_rollback(&delta(-0.05)));
        assert!(!manager.should_rollback(&delta(0.3)));
        assert!(!manager.should_rollback(&delta(-0.0999)));
    }

    #[test]
    fn equal_drops_decide_alike() {
        let manager = RollbackManager::default();
        // 0.70 - 0.80 and 0.60 - 0.70 round to opposite sides of -0.10
        for (first, second) in [(0.80, 0.70), (0.70, 0.60), (0.30, 0.20)] {
            let delta = PassComparator.compare(&result(first, &[]), &result(second, &[]));
            assert!(manager.should_rollback(&delta), "{first} -> {second}");
        }
    }
}
