//! Fixed, ordered stage catalog
//!
//! Declaration order is dependency order. Members of a parallel group are
//! adjacent and never read each other's output.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stage in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    Intake,
    Planning,
    Analysis,
    Design,
    ReviewGate,
    DependencyCheck,
    Execution,
    Arbitration,
    QualityReview,
    UxReview,
    Validation,
    Integration,
    Verification,
    Notebook,
}

impl StageKind {
    /// Catalog in dependency order
    pub const ALL: [StageKind; 14] = [
        Self::Intake,
        Self::Planning,
        Self::Analysis,
        Self::Design,
        Self::ReviewGate,
        Self::DependencyCheck,
        Self::Execution,
        Self::Arbitration,
        Self::QualityReview,
        Self::UxReview,
        Self::Validation,
        Self::Integration,
        Self::Verification,
        Self::Notebook,
    ];

    /// Stages that always run
    pub const CORE: [StageKind; 5] = [
        Self::Execution,
        Self::QualityReview,
        Self::Validation,
        Self::Integration,
        Self::Verification,
    ];

    /// Name used in events, breaker names and stage contexts
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Planning => "planning",
            Self::Analysis => "analysis",
            Self::Design => "design",
            Self::ReviewGate => "review-gate",
            Self::DependencyCheck => "dependency-check",
            Self::Execution => "execution",
            Self::Arbitration => "arbitration",
            Self::QualityReview => "quality-review",
            Self::UxReview => "ux-review",
            Self::Validation => "validation",
            Self::Integration => "integration",
            Self::Verification => "verification",
            Self::Notebook => "notebook",
        }
    }

    /// Look up by name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    #[inline]
    #[must_use]
    pub fn is_core(&self) -> bool {
        Self::CORE.contains(self)
    }

    #[must_use]
    pub fn cost(&self) -> StageCost {
        match self {
            Self::Intake | Self::ReviewGate | Self::DependencyCheck | Self::Notebook => {
                StageCost::Light
            }
            Self::Execution | Self::Integration => StageCost::Heavy,
            _ => StageCost::Standard,
        }
    }

    /// Parallel group, if the stage may run beside its neighbours
    #[must_use]
    pub fn group(&self) -> Option<&'static str> {
        match self {
            Self::ReviewGate | Self::DependencyCheck => Some("gate"),
            Self::QualityReview | Self::UxReview => Some("review"),
            _ => None,
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Relative cost of a stage; sets the heartbeat period and default deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageCost {
    Light,
    Standard,
    Heavy,
}

impl StageCost {
    /// Heartbeat period: 10s, 20s or 30s
    #[must_use]
    pub fn heartbeat(&self) -> Duration {
        match self {
            Self::Light => Duration::from_secs(10),
            Self::Standard => Duration::from_secs(20),
            Self::Heavy => Duration::from_secs(30),
        }
    }

    /// Deadline for one call when none is configured: 2, 5 or 10 minutes
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        match self {
            Self::Light => Duration::from_secs(120),
            Self::Standard => Duration::from_secs(300),
            Self::Heavy => Duration::from_secs(600),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for stage in StageKind::ALL {
            assert_eq!(StageKind::from_name(stage.name()), Some(stage));
        }
        assert_eq!(StageKind::from_name("nope"), None);
    }

    #[test]
    fn serde_uses_stage_names() {
        let json = serde_json::to_string(&StageKind::ReviewGate).unwrap();
        assert_eq!(json, "\"review-gate\"");
    }

    #[test]
    fn catalog_is_ordered() {
        let mut sorted = StageKind::ALL;
        sorted.sort();
        assert_eq!(sorted, StageKind::ALL);
    }

    #[test]
    fn group_members_are_adjacent() {
        for pair in StageKind::ALL.windows(3) {
            if let (Some(a), Some(c)) = (pair[0].group(), pair[2].group()) {
                assert!(a != c || pair[1].group() == Some(a));
            }
        }
    }

    #[test]
    fn heartbeat_follows_cost() {
        assert_eq!(StageKind::Intake.cost().heartbeat(), Duration::from_secs(10));
        assert_eq!(StageKind::Planning.cost().heartbeat(), Duration::from_secs(20));
        assert_eq!(StageKind::Execution.cost().heartbeat(), Duration::from_secs(30));
    }

    #[test]
    fn every_stage_has_a_finite_default_deadline() {
        for stage in StageKind::ALL {
            let cost = stage.cost();
            assert!(cost.default_timeout() > cost.heartbeat() * 3);
        }
        assert_eq!(StageKind::Execution.cost().default_timeout(), Duration::from_secs(600));
    }
}
