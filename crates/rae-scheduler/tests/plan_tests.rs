//! Execution plan tests

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rae_core::EngineConfig;
use rae_scheduler::{
    Complexity, PipelineScheduler, Requirement, StageKind, StageSelector, Task, TaskSignals,
};
use rae_test_utils::{platform, FixedProbe, ScriptedStageExecutor};
use std::sync::Arc;

fn scheduler(cores: usize, producers: u32) -> PipelineScheduler {
    let mut config = EngineConfig::default();
    config.scheduler = config.scheduler.with_competing_producers(producers);
    PipelineScheduler::new(
        Arc::new(ScriptedStageExecutor::new()),
        Arc::new(FixedProbe(platform(cores, 16.0, 12.0))),
        config,
    )
    .unwrap()
}

#[test]
fn complex_ui_task_plan() {
    let task = Task::new(
        "t-1",
        "Redesign checkout page",
        "distributed architecture with a third-party sdk, accessibility review",
    );
    let plan = scheduler(8, 1).build_plan(&task);

    assert_eq!(plan.complexity, Complexity::Complex);
    assert_eq!(plan.developers, 1);
    assert_eq!(
        plan.stages_to_run,
        vec![
            StageKind::Intake,
            StageKind::Planning,
            StageKind::Analysis,
            StageKind::Design,
            StageKind::ReviewGate,
            StageKind::DependencyCheck,
            StageKind::Execution,
            StageKind::QualityReview,
            StageKind::UxReview,
            StageKind::Validation,
            StageKind::Integration,
            StageKind::Verification,
        ]
    );
    assert_eq!(plan.stages_to_skip, vec![StageKind::Arbitration, StageKind::Notebook]);
    assert_eq!(plan.batches.len(), 10);
}

#[test]
fn producers_drive_arbitration_and_developers() {
    let task = Task::new("t-2", "Refactor", "security migration").with_story_points(13);

    let single = scheduler(8, 1).build_plan(&task);
    assert_eq!(single.requirement(StageKind::Arbitration), Requirement::Skipped);
    assert_eq!(single.developers, 1);

    let competing = scheduler(8, 3).build_plan(&task);
    assert_eq!(competing.requirement(StageKind::Arbitration), Requirement::Required);
    assert_eq!(competing.developers, 3);

    let small_host = scheduler(2, 3).build_plan(&task);
    assert_eq!(small_host.developers, 1);
}

#[test]
fn every_decision_is_justified() {
    let plan = scheduler(4, 1).build_plan(&Task::new("t-3", "Fix typo", ""));
    assert_eq!(plan.decisions.len(), StageKind::ALL.len());
    assert!(plan.decisions.iter().all(|d| !d.justification.is_empty()));
}

fn signals_strategy() -> impl Strategy<Value = TaskSignals> {
    (
        prop_oneof![
            Just(Complexity::Simple),
            Just(Complexity::Medium),
            Just(Complexity::Complex)
        ],
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(complexity, ui, external, data)| TaskSignals {
            touches_ui: ui,
            has_external_deps: external,
            is_data_task: data,
            ..TaskSignals::new(complexity)
        })
}

proptest! {
    #[test]
    fn plan_invariants(
        signals in signals_strategy(),
        producers in 1u32..5,
        max_stages in 1usize..4,
    ) {
        let plan = StageSelector::new(producers, max_stages).plan("t", &signals, 1);

        for core in StageKind::CORE {
            prop_assert!(plan.stages_to_run.contains(&core));
            prop_assert_eq!(plan.requirement(core), Requirement::Required);
        }
        for stage in &plan.stages_to_run {
            prop_assert!(!plan.stages_to_skip.contains(stage));
        }
        prop_assert_eq!(plan.stages_to_run.len() + plan.stages_to_skip.len(), StageKind::ALL.len());
        prop_assert_eq!(plan.stages_to_run.contains(&StageKind::Arbitration), producers >= 2);
        prop_assert_eq!(plan.is_required(StageKind::Arbitration), producers >= 2);
        prop_assert!(plan.stages_to_run.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(plan.batches.concat(), plan.stages_to_run.clone());
        prop_assert!(plan.batches.iter().all(|b| !b.is_empty() && b.len() <= max_stages));
    }
}
