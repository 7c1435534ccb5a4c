//! Stage selection and execution plans
//!
//! Core stages are always required. Every other stage has an independent
//! guard rule over the task signals; a firing guard makes it optional, a
//! silent one skips it. Arbitration is the exception: once selected it is
//! required, since competing outputs without a winner leave nothing to
//! integrate. Each decision carries its justification.

use crate::catalog::StageKind;
use crate::complexity::{Complexity, TaskSignals};
use serde::Serialize;

/// How a stage participates in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    /// Core stage; failure fails the task
    Required,
    /// Guard fired; failure is recorded and the run continues
    Optional,
    /// Not run
    Skipped,
}

impl Requirement {
    #[inline]
    #[must_use]
    pub fn runs(&self) -> bool {
        !matches!(self, Self::Skipped)
    }
}

/// Selection verdict for one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageDecision {
    pub stage: StageKind,
    pub requirement: Requirement,
    pub justification: String,
}

/// What the scheduler will run for one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    pub task_id: String,
    pub complexity: Complexity,
    pub developers: usize,
    /// Catalog order
    pub stages_to_run: Vec<StageKind>,
    pub stages_to_skip: Vec<StageKind>,
    /// Run order as batches; stages in one batch run concurrently
    pub batches: Vec<Vec<StageKind>>,
    /// One entry per catalog stage
    pub decisions: Vec<StageDecision>,
}

impl ExecutionPlan {
    /// Decision recorded for `stage`
    #[must_use]
    pub fn decision(&self, stage: StageKind) -> Option<&StageDecision> {
        self.decisions.iter().find(|d| d.stage == stage)
    }

    /// Requirement of `stage`, `Skipped` when absent
    #[must_use]
    pub fn requirement(&self, stage: StageKind) -> Requirement {
        self.decision(stage).map_or(Requirement::Skipped, |d| d.requirement)
    }

    #[must_use]
    pub fn is_required(&self, stage: StageKind) -> bool {
        self.requirement(stage) == Requirement::Required
    }
}

/// Filters the catalog for one task
#[derive(Debug, Clone, Copy)]
pub struct StageSelector {
    producers: u32,
    max_parallel_stages: usize,
}

impl StageSelector {
    /// Selector for `producers` competing producers and a stage concurrency cap
    #[must_use]
    pub fn new(producers: u32, max_parallel_stages: usize) -> Self {
        Self {
            producers,
            max_parallel_stages: max_parallel_stages.max(1),
        }
    }

    /// Decide one stage
    #[must_use]
    pub fn decide(&self, stage: StageKind, signals: &TaskSignals) -> StageDecision {
        if stage.is_core() {
            return StageDecision {
                stage,
                requirement: Requirement::Required,
                justification: "core stage, always required".to_string(),
            };
        }

        let (fires, justification) = self.guard(stage, signals);
        StageDecision {
            stage,
            requirement: match (fires, stage) {
                (false, _) => Requirement::Skipped,
                (true, StageKind::Arbitration) => Requirement::Required,
                (true, _) => Requirement::Optional,
            },
            justification,
        }
    }

    /// Build the plan for `task_id`
    #[must_use]
    pub fn plan(&self, task_id: &str, signals: &TaskSignals, developers: usize) -> ExecutionPlan {
        let decisions: Vec<StageDecision> = StageKind::ALL
            .into_iter()
            .map(|stage| self.decide(stage, signals))
            .collect();

        let (run, skip): (Vec<&StageDecision>, Vec<&StageDecision>) =
            decisions.iter().partition(|d| d.requirement.runs());
        let stages_to_run: Vec<StageKind> = run.iter().map(|d| d.stage).collect();
        let stages_to_skip: Vec<StageKind> = skip.iter().map(|d| d.stage).collect();
        let batches = self.batch(&stages_to_run);

        ExecutionPlan {
            task_id: task_id.to_string(),
            complexity: signals.complexity,
            developers,
            stages_to_run,
            stages_to_skip,
            batches,
            decisions,
        }
    }

    /// Merge adjacent group members into batches of at most `max_parallel_stages`
    fn batch(&self, stages: &[StageKind]) -> Vec<Vec<StageKind>> {
        let mut batches: Vec<Vec<StageKind>> = Vec::new();
        for &stage in stages {
            let joins_last = match (stage.group(), batches.last()) {
                (Some(group), Some(last)) => {
                    last.len() < self.max_parallel_stages
                        && last.iter().all(|s| s.group() == Some(group))
                }
                _ => false,
            };
            match batches.last_mut() {
                Some(last) if joins_last => last.push(stage),
                _ => batches.push(vec![stage]),
            }
        }
        batches
    }

    fn guard(&self, stage: StageKind, s: &TaskSignals) -> (bool, String) {
        let c = s.complexity;
        match stage {
            StageKind::Intake => (true, "every task is taken in".to_string()),
            StageKind::Planning => (
                c >= Complexity::Medium,
                format!("complexity is {c}; planning needs medium or above"),
            ),
            StageKind::Analysis => (
                c >= Complexity::Medium || s.is_data_task,
                format!("complexity is {c}, data task: {}", s.is_data_task),
            ),
            StageKind::Design => (
                c == Complexity::Complex || s.touches_ui,
                format!("complexity is {c}, touches UI: {}", s.touches_ui),
            ),
            StageKind::ReviewGate => (
                c == Complexity::Complex,
                format!("complexity is {c}; gate reserved for complex tasks"),
            ),
            StageKind::DependencyCheck => (
                s.has_external_deps,
                format!("external dependencies referenced: {}", s.has_external_deps),
            ),
            StageKind::Arbitration => (
                self.producers >= 2,
                format!("{} competing producer(s) configured", self.producers),
            ),
            StageKind::UxReview => (s.touches_ui, format!("touches UI: {}", s.touches_ui)),
            StageKind::Notebook => (s.is_data_task, format!("data task: {}", s.is_data_task)),
            StageKind::Execution
            | StageKind::QualityReview
            | StageKind::Validation
            | StageKind::Integration
            | StageKind::Verification => (true, "core stage, always required".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(complexity: Complexity) -> TaskSignals {
        TaskSignals::new(complexity)
    }

    #[test]
    fn simple_task_runs_intake_and_core() {
        let plan = StageSelector::new(1, 2).plan("t", &signals(Complexity::Simple), 1);
        assert_eq!(
            plan.stages_to_run,
            vec![
                StageKind::Intake,
                StageKind::Execution,
                StageKind::QualityReview,
                StageKind::Validation,
                StageKind::Integration,
                StageKind::Verification,
            ]
        );
        assert_eq!(plan.requirement(StageKind::Intake), Requirement::Optional);
        assert!(plan.is_required(StageKind::Execution));
        assert_eq!(plan.requirement(StageKind::Arbitration), Requirement::Skipped);
    }

    #[test]
    fn arbitration_is_required_with_two_producers() {
        let s = signals(Complexity::Simple);
        assert_eq!(
            StageSelector::new(2, 2).decide(StageKind::Arbitration, &s).requirement,
            Requirement::Required
        );
        let skipped = StageSelector::new(1, 2).decide(StageKind::Arbitration, &s);
        assert_eq!(skipped.requirement, Requirement::Skipped);
        assert!(skipped.justification.contains("1 competing"));
    }

    #[test]
    fn groups_are_batched() {
        let mut s = signals(Complexity::Complex);
        s.touches_ui = true;
        s.has_external_deps = true;
        let plan = StageSelector::new(1, 2).plan("t", &s, 3);

        assert!(plan.batches.contains(&vec![StageKind::ReviewGate, StageKind::DependencyCheck]));
        assert!(plan.batches.contains(&vec![StageKind::QualityReview, StageKind::UxReview]));
        let flattened: Vec<StageKind> = plan.batches.concat();
        assert_eq!(flattened, plan.stages_to_run);
    }

    #[test]
    fn single_stage_cap_disables_grouping() {
        let mut s = signals(Complexity::Complex);
        s.has_external_deps = true;
        let plan = StageSelector::new(1, 1).plan("t", &s, 1);
        assert!(plan.batches.iter().all(|b| b.len() == 1));
    }
}
