//! Loading engine configuration from disk.

use rae_core::{EngineConfig, EngineError, StreamingMode};
use std::io::Write;

#[test]
fn load_valid_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[breaker]
failure_threshold = 3
timeout_secs = 30

[streaming]
mode = "lightweight"

[two_pass]
auto_rollback = false
"#
    )
    .unwrap();

    let config = EngineConfig::load(file.path()).unwrap();
    assert_eq!(config.breaker.failure_threshold, 3);
    assert_eq!(config.breaker.timeout_secs, 30);
    assert_eq!(config.breaker.success_threshold, 2);
    assert_eq!(config.streaming.mode, StreamingMode::Lightweight);
    assert!(!config.two_pass.auto_rollback);
}

#[test]
fn load_rejects_invalid_values() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[retry]\nmax_retries = 0").unwrap();

    let err = EngineConfig::load(file.path()).unwrap_err();
    match err {
        EngineError::Configuration(message) => assert!(message.contains("max_retries")),
        other => panic!("expected Configuration, got {other:?}"),
    }
}

#[test]
fn load_missing_file_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = EngineConfig::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(err.is_fatal());
}
