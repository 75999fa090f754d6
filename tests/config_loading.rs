use std::io::Write;

use stepwise_core::config::StepwiseConfig;
use stepwise_core::error::StepwiseError;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(content.as_bytes()).expect("write toml");
    tmp
}

#[test]
fn test_load_full_config_from_file() {
    let tmp = write_config(
        r#"
[engine]
max_iterations = 50
snapshot_state = false
event_capacity = 64

[log]
enabled = true
log_dir = "/tmp/stepwise-test-logs"
level = 3
"#,
    );

    let config = StepwiseConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.max_iterations, 50);
    assert!(!config.engine.snapshot_state);
    assert_eq!(config.engine.event_capacity, 64);

    let log = config.log.expect("log present");
    assert!(log.enabled);
    assert_eq!(log.level, 3);
    assert_eq!(
        log.resolved_log_dir(),
        std::path::PathBuf::from("/tmp/stepwise-test-logs")
    );
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("STEPWISE_TEST_LOG_DIR", "/var/tmp/stepwise-expanded");

    let tmp = write_config(
        r#"
[log]
log_dir = "${STEPWISE_TEST_LOG_DIR}"
"#,
    );

    let config = StepwiseConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.log.unwrap().log_dir, "/var/tmp/stepwise-expanded");

    std::env::remove_var("STEPWISE_TEST_LOG_DIR");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let tmp = write_config("[engine]\n");

    let config = StepwiseConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.max_iterations, 1000);
    assert!(config.engine.snapshot_state);
    assert!(config.log.is_none());
}

#[test]
fn test_missing_file_is_not_found() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let err = StepwiseConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, StepwiseError::ConfigNotFound(_)));
}

#[test]
fn test_malformed_toml_is_config_error() {
    let tmp = write_config("[engine\nmax_iterations = ");
    let err = StepwiseConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, StepwiseError::Config(_)));
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = StepwiseConfig::default();
    let text = toml::to_string_pretty(&config).expect("serialize config");
    let parsed = StepwiseConfig::parse(&text).expect("parse config");
    assert_eq!(parsed.engine.max_iterations, config.engine.max_iterations);
}
