use proptest::prelude::*;
use rae_core::{RetryConfig, ValidationResult};
use rae_resilience::{
    FailureAnalysis, FailureCategory, InputRefiner, RetryCoordinator,
};
use rae_test_utils::{RecordingSink, ScriptedGenerator, ScriptedValidator};
use std::sync::Arc;

#[tokio::test]
async fn test_always_bad_output_exhausts_attempts() {
    let generator = ScriptedGenerator::always("same bad output".to_string());
    let validator = ScriptedValidator::always_score(0.2);
    let sink = Arc::new(RecordingSink::new());

    let coordinator = RetryCoordinator::new(
        RetryConfig::default()
            .with_max_retries(3)
            .with_acceptance_threshold(0.85),
    )
    .with_sink(sink.clone());

    let result = coordinator
        .execute_with_retry(&generator, &validator, "build the thing")
        .await
        .unwrap();

    assert!(!result.succeeded);
    assert_eq!(result.total_attempts, 3);
    assert_eq!(result.attempts.len(), 3);
    assert!(!result.circuit_tripped);
    assert!(result.final_output.is_none());
    for (i, attempt) in result.attempts.iter().enumerate() {
        assert_eq!(attempt.attempt_number as usize, i + 1);
        assert_eq!(attempt.confidence, 0.2);
        assert!(!attempt.succeeded);
        assert_eq!(attempt.failure.as_ref().unwrap().category, FailureCategory::MissingElements);
    }
    assert_eq!(generator.calls(), 3);
    assert_eq!(sink.count("RetryAttempted"), 3);
}

#[tokio::test]
async fn test_refined_inputs_reach_generator() {
    let generator = ScriptedGenerator::always("out".to_string());
    let validator = ScriptedValidator::new(vec![
        ValidationResult::fail(["missing docstring"]),
        ValidationResult::fail(["uses forbidden eval"]),
        ValidationResult::pass(),
    ]);

    let result = RetryCoordinator::new(RetryConfig::default().with_max_retries(5))
        .execute_with_retry(&generator, &validator, "original")
        .await
        .unwrap();

    assert!(result.succeeded);
    assert_eq!(result.total_attempts, 3);

    let inputs = generator.inputs();
    assert_eq!(inputs[0], "original");
    assert!(inputs[1].contains("Resolve: missing docstring"));
    // Second refinement carries the first constraint forward
    assert!(inputs[2].contains("Resolve: missing docstring"));
    assert!(inputs[2].contains("Resolve: uses forbidden eval"));
    assert_eq!(
        result.attempts[1].refined.as_ref().unwrap().constraints_added,
        vec!["Resolve: uses forbidden eval".to_string()]
    );
}

proptest! {
    #[test]
    fn prop_refinement_level_escalates(issues in prop::collection::vec("[a-z ]{1,20}", 1..4)) {
        let refiner = InputRefiner::new();
        let analysis = FailureAnalysis {
            category: FailureCategory::Unknown,
            constraints: issues,
            evidence: Vec::new(),
        };

        let levels: Vec<f64> = (1..=3)
            .map(|attempt| refiner.refine("input", &analysis, attempt, &[]).refinement_level)
            .collect();

        prop_assert!(levels.windows(2).all(|w| w[0] <= w[1]));
        prop_assert!(levels.windows(2).any(|w| w[0] < w[1]));
        prop_assert!(levels.iter().all(|l| (0.0..=1.0).contains(l)));
    }

    #[test]
    fn prop_retry_terminates_within_bound(max in 1u32..8, score in 0.0f64..0.84) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let result = runtime.block_on(async {
            let generator = ScriptedGenerator::always(0u8);
            let validator = ScriptedValidator::always_score(score);
            RetryCoordinator::new(
                RetryConfig::default()
                    .with_max_retries(max)
                    .with_session_failure_threshold(max + 1),
            )
            .execute_with_retry(&generator, &validator, "x")
            .await
            .unwrap()
        });
        prop_assert!(!result.succeeded);
        prop_assert_eq!(result.total_attempts, max);
    }
}
