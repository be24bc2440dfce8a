//! logroute.toml 통합 설정 테스트
//!
//! - logroute.toml.example 파싱 테스트
//! - 부분 설정 로딩 테스트
//! - 환경변수 우선순위 테스트

use logroute_core::config::LogrouteConfig;
use logroute_core::error::{ConfigError, LogrouteError};

// =============================================================================
// logroute.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let content = include_str!("../../../logroute.toml.example");
    let config = LogrouteConfig::parse(content).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
    assert_eq!(config.output.log_root, "/var/log");
    assert_eq!(config.output.module_dir, "/etc/asl");
}

#[test]
fn example_config_passes_validation() {
    let content = include_str!("../../../logroute.toml.example");
    let config = LogrouteConfig::parse(content).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_code_defaults() {
    let content = include_str!("../../../logroute.toml.example");
    let parsed = LogrouteConfig::parse(content).expect("should parse");
    let defaults = LogrouteConfig::default();

    assert_eq!(parsed.output.primary_module, defaults.output.primary_module);
    assert_eq!(parsed.output.default_ttl_days, defaults.output.default_ttl_days);
    assert_eq!(
        parsed.output.checkpoint_interval_secs,
        defaults.output.checkpoint_interval_secs
    );
    assert_eq!(parsed.output.max_dup_time_secs, defaults.output.max_dup_time_secs);
    assert_eq!(parsed.output.queue_capacity, defaults.output.queue_capacity);
    assert_eq!(parsed.metrics.port, defaults.metrics.port);
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_metrics_only() {
    let toml = r#"
[metrics]
enabled = true
port = 9200
"#;
    let config = LogrouteConfig::parse(toml).expect("should parse");
    assert!(config.metrics.enabled);
    assert_eq!(config.metrics.port, 9200);
    assert_eq!(config.output.log_root, "/var/log");
}

#[test]
fn partial_config_invalid_value_is_reported_by_field() {
    let toml = r#"
[output]
log_root = "relative/dir"
"#;
    let config = LogrouteConfig::parse(toml).expect("should parse");
    let err = config.validate().unwrap_err();
    assert!(matches!(
        err,
        LogrouteError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "output.log_root"
    ));
}

#[tokio::test]
async fn load_missing_file_returns_file_not_found() {
    let err = LogrouteConfig::load("/nonexistent/logroute.toml")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LogrouteError::Config(ConfigError::FileNotFound { .. })
    ));
}

#[tokio::test]
async fn from_file_reads_written_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("logroute.toml");
    std::fs::write(&path, "[output]\ndefault_ttl_days = 3\n").expect("write");
    let config = LogrouteConfig::from_file(&path).await.expect("load");
    assert_eq!(config.output.default_ttl_days, 3);
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[general]
log_level = "info"
"#;

    let original = std::env::var("LOGROUTE_GENERAL_LOG_LEVEL").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("LOGROUTE_GENERAL_LOG_LEVEL", "error");
    }

    let mut config = LogrouteConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let result = config.general.log_level.clone();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("LOGROUTE_GENERAL_LOG_LEVEL", val),
            None => std::env::remove_var("LOGROUTE_GENERAL_LOG_LEVEL"),
        }
    }

    assert_eq!(result, "error");
}

#[test]
#[serial_test::serial]
fn env_override_numeric_field() {
    let original = std::env::var("LOGROUTE_OUTPUT_DEFAULT_TTL_DAYS").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("LOGROUTE_OUTPUT_DEFAULT_TTL_DAYS", "30");
    }

    let mut config = LogrouteConfig::default();
    config.apply_env_overrides();
    let result = config.output.default_ttl_days;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("LOGROUTE_OUTPUT_DEFAULT_TTL_DAYS", val),
            None => std::env::remove_var("LOGROUTE_OUTPUT_DEFAULT_TTL_DAYS"),
        }
    }

    assert_eq!(result, 30);
}

#[test]
#[serial_test::serial]
fn env_override_invalid_number_is_ignored() {
    let original = std::env::var("LOGROUTE_OUTPUT_QUEUE_CAPACITY").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("LOGROUTE_OUTPUT_QUEUE_CAPACITY", "lots");
    }

    let mut config = LogrouteConfig::default();
    config.apply_env_overrides();
    let result = config.output.queue_capacity;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("LOGROUTE_OUTPUT_QUEUE_CAPACITY", val),
            None => std::env::remove_var("LOGROUTE_OUTPUT_QUEUE_CAPACITY"),
        }
    }

    assert_eq!(result, 10_000);
}

#[test]
#[serial_test::serial]
fn env_override_bool_field() {
    let original = std::env::var("LOGROUTE_METRICS_ENABLED").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("LOGROUTE_METRICS_ENABLED", "true");
    }

    let mut config = LogrouteConfig::default();
    config.apply_env_overrides();
    let result = config.metrics.enabled;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("LOGROUTE_METRICS_ENABLED", val),
            None => std::env::remove_var("LOGROUTE_METRICS_ENABLED"),
        }
    }

    assert!(result);
}
