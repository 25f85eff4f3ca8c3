use concierge_core::SuccessPolicy;
use concierge_resilience::observability::LogFormat;
use concierge_resilience::{ConfigError, ResilienceContext, ResilienceSettings};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

// ===== Test Helper Functions =====

fn config_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, contents) in files {
        fs::write(dir.path().join(name), contents).unwrap();
    }
    dir
}

const BASE: &str = r#"
[circuit_breaker]
failure_threshold = 3
recovery_timeout_secs = 10
success_policy = "reset"

[retry]
max_retries = 5
base_delay_ms = 250
jitter = false

[dead_letter]
max_size = 200
max_replay_attempts = 5

[logging]
format = "json"
level = "debug"
"#;

// ===== File Loading =====

#[test]
#[serial]
fn test_missing_files_yield_defaults() {
    let dir = config_dir(&[]);
    let settings = ResilienceSettings::load_from_dir(dir.path()).unwrap();

    assert_eq!(settings.circuit_breaker.failure_threshold, 5);
    assert_eq!(settings.retry.max_retries, 3);
    assert_eq!(settings.dead_letter.max_size, 1000);
    assert_eq!(settings.dead_letter.display_limit, 50);
    assert_eq!(settings.idempotency.capacity, 10_000);
}

#[test]
#[serial]
fn test_file_values_override_defaults() {
    let dir = config_dir(&[("resilience.toml", BASE)]);
    let settings = ResilienceSettings::load_from_dir(dir.path()).unwrap();

    let breaker = settings.circuit_breaker.to_config();
    assert_eq!(breaker.failure_threshold, 3);
    assert_eq!(breaker.recovery_timeout, Duration::from_secs(10));
    assert_eq!(breaker.half_open_max_calls, 3);
    assert_eq!(breaker.success_policy, SuccessPolicy::Reset);

    let retry = settings.retry.to_config();
    assert_eq!(retry.max_retries, 5);
    assert_eq!(retry.base_delay, Duration::from_millis(250));
    assert_eq!(retry.max_delay, Duration::from_secs(60));
    assert!(!retry.jitter);

    assert_eq!(settings.dead_letter.max_replay_attempts, Some(5));
    assert_eq!(settings.logging.format, LogFormat::Json);
    assert_eq!(settings.logging.level, "debug");
}

#[test]
#[serial]
fn test_local_file_overrides_base_file() {
    let dir = config_dir(&[
        ("resilience.toml", BASE),
        ("resilience.local.toml", "[retry]\nmax_retries = 1\n"),
    ]);
    let settings = ResilienceSettings::load_from_dir(dir.path()).unwrap();

    assert_eq!(settings.retry.max_retries, 1);
    assert_eq!(settings.retry.base_delay_ms, 250);
}

#[test]
#[serial]
fn test_environment_overrides_files() {
    let dir = config_dir(&[("resilience.toml", BASE)]);
    std::env::set_var("CONCIERGE__CIRCUIT_BREAKER__FAILURE_THRESHOLD", "9");
    let loaded = ResilienceSettings::load_from_dir(dir.path());
    std::env::remove_var("CONCIERGE__CIRCUIT_BREAKER__FAILURE_THRESHOLD");

    let settings = loaded.unwrap();
    assert_eq!(settings.circuit_breaker.failure_threshold, 9);
    assert_eq!(settings.circuit_breaker.recovery_timeout_secs, 10);
}

// ===== Validation =====

#[test]
#[serial]
fn test_out_of_range_value_fails_to_load() {
    let dir = config_dir(&[("resilience.toml", "[dead_letter]\nmax_size = 0\n")]);

    let err = ResilienceSettings::load_from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
#[serial]
fn test_malformed_value_fails_to_load() {
    let dir = config_dir(&[("resilience.toml", "[retry]\nmax_retries = \"many\"\n")]);

    let err = ResilienceSettings::load_from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));
}

#[test]
#[serial]
fn test_loaded_settings_drive_context() {
    let dir = config_dir(&[("resilience.toml", BASE)]);
    let context = ResilienceContext::new(ResilienceSettings::load_from_dir(dir.path()).unwrap());

    assert_eq!(context.breaker("ai").config().failure_threshold, 3);
    assert_eq!(context.dead_letter_queue("outbound").max_size(), 200);
    assert_eq!(context.retry_policy().max_retries(), 5);
}
