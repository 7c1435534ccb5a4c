use proptest::prelude::*;
use rae_core::{StreamingConfig, StreamingMode};
use rae_streaming::{consume_stream, CheckKind, StreamingValidator};
use rae_test_utils::RecordingSink;
use std::sync::Arc;

fn split_into_chunks(text: &str, size: usize) -> Vec<String> {
    text.chars()
        .collect::<Vec<_>>()
        .chunks(size)
        .map(|c| c.iter().collect())
        .collect()
}

#[tokio::test]
async fn test_forbidden_before_placeholder_cites_forbidden() {
    let text = "import os\nresult = eval(user_input)\nx = 1\n# TODO: handle errors\n";
    let sink = Arc::new(RecordingSink::new());
    let mut validator = StreamingValidator::new(
        &StreamingConfig::new().with_mode(StreamingMode::Lightweight),
    )
    .unwrap()
    .with_sink(sink.clone());

    let outcome = consume_stream(futures::stream::iter(split_into_chunks(text, 1)), &mut validator).await;

    assert!(!outcome.completed());
    let reason = outcome.decision.reason.unwrap();
    assert!(reason.contains("forbidden"), "reason: {reason}");
    assert_eq!(validator.stop_events()[0].violation.kind, CheckKind::Forbidden);
    assert_eq!(sink.count("StreamStopped"), 1);
}

#[tokio::test]
async fn test_stream_not_polled_after_stop() {
    let chunks: Vec<String> = std::iter::once("eval(x)\n".to_string())
        .chain(std::iter::repeat("ok\n".to_string()).take(99))
        .collect();
    let mut validator = StreamingValidator::new(&StreamingConfig::new().with_interval(1)).unwrap();

    let outcome = consume_stream(futures::stream::iter(chunks), &mut validator).await;
    assert_eq!(outcome.chunks, 1);
    assert_eq!(validator.stats().chunk_count, 1);
}

#[tokio::test]
async fn test_single_line_stream_stops_at_first_pass() {
    let chunks: Vec<String> = (1..=1000)
        .map(|i| if i == 3 { "eval(user_input) ".to_string() } else { format!("v{i} + ") })
        .collect();
    let mut validator = StreamingValidator::new(&StreamingConfig::new().with_interval(25)).unwrap();

    let outcome = consume_stream(futures::stream::iter(chunks), &mut validator).await;

    assert!(!outcome.completed());
    assert_eq!(outcome.chunks, 25);
    assert_eq!(validator.stop_events()[0].violation.kind, CheckKind::Forbidden);
}

#[tokio::test]
async fn test_disallowed_import() {
    let config = StreamingConfig::new()
        .with_interval(1)
        .with_allowed_modules(["requests"]);
    let mut validator = StreamingValidator::new(&config).unwrap();

    assert!(validator.on_chunk("import requests.sessions\n").should_continue);
    assert!(validator.on_chunk("import json\n").should_continue);
    let decision = validator.on_chunk("from pandas import DataFrame\n");
    assert!(!decision.should_continue);
    assert!(decision.reason.unwrap().contains("pandas"));
}

#[test]
fn test_skipped_checks_let_stream_through() {
    let config = StreamingConfig::new().with_interval(1).skip_placeholders();
    let mut validator = StreamingValidator::new(&config).unwrap();
    assert!(validator.on_chunk("# TODO later\n").should_continue);
    assert!(!validator.on_chunk("exec(code)\n").should_continue);
}

proptest! {
    #[test]
    fn prop_earliest_violation_wins(
        clean_before in prop::collection::vec("[a-z]{1,8} = [0-9]{1,3}", 0..10),
        clean_between in prop::collection::vec("[a-z]{1,8} = [0-9]{1,3}", 0..10),
        chunk_size in 1usize..16,
        interval in 1usize..60,
    ) {
        let mut lines = clean_before;
        lines.push("value = eval(payload)".to_string());
        lines.extend(clean_between);
        lines.push("# TODO: finish".to_string());
        let text = lines.join("\n") + "\n";

        let mut validator = StreamingValidator::new(&StreamingConfig::new().with_interval(interval)).unwrap();
        let mut decision = None;
        for chunk in split_into_chunks(&text, chunk_size) {
            let d = validator.on_chunk(&chunk);
            if !d.should_continue {
                decision = Some(d);
                break;
            }
        }
        let decision = decision.unwrap_or_else(|| validator.finish());

        prop_assert!(!decision.should_continue);
        prop_assert_eq!(validator.stop_events()[0].violation.kind, CheckKind::Forbidden);
    }

    #[test]
    fn prop_checks_happen_only_at_interval(chunks in 1usize..300, interval in 1usize..120) {
        let mut validator = StreamingValidator::new(&StreamingConfig::new().with_interval(interval)).unwrap();
        for _ in 0..chunks {
            validator.on_chunk("a = 1\n");
        }
        prop_assert_eq!(validator.stats().check_count as usize, chunks / interval);
    }
}
