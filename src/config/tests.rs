//! Config module tests

use std::io::Write;

use super::*;

#[test]
fn test_substitute_env_vars_simple() {
    std::env::set_var("TEST_VAR_SIMPLE", "hello");
    let result = substitute_env_vars("value = \"${TEST_VAR_SIMPLE}\"").unwrap();
    assert_eq!(result, "value = \"hello\"");
    std::env::remove_var("TEST_VAR_SIMPLE");
}

#[test]
fn test_substitute_env_vars_with_default() {
    // Unset var should use default
    std::env::remove_var("TEST_VAR_UNSET");
    let result = substitute_env_vars("value = \"${TEST_VAR_UNSET:-default_value}\"").unwrap();
    assert_eq!(result, "value = \"default_value\"");

    // Set var should use env value
    std::env::set_var("TEST_VAR_SET", "env_value");
    let result = substitute_env_vars("value = \"${TEST_VAR_SET:-default_value}\"").unwrap();
    assert_eq!(result, "value = \"env_value\"");
    std::env::remove_var("TEST_VAR_SET");
}

#[test]
fn test_substitute_env_vars_missing_no_default() {
    std::env::remove_var("TEST_VAR_MISSING");
    let result = substitute_env_vars("value = \"${TEST_VAR_MISSING}\"").unwrap();
    assert_eq!(result, "value = \"\"");
}

#[test]
fn test_load_config_with_env_substitution() {
    std::env::set_var("TEST_QUEUE_DEPTH", "64");

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[log]
level = "${{TEST_LOG_LEVEL_UNSET:-debug}}"

[limits]
max_queued_messages = ${{TEST_QUEUE_DEPTH}}
"#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.log.level, "debug");
    assert_eq!(config.limits.max_queued_messages, 64);

    std::env::remove_var("TEST_QUEUE_DEPTH");
}

#[test]
fn test_load_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.mqtt.max_qos, 2);
    assert_eq!(config.limits.max_queued_messages, 1);
}

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.log.level, "info");
    assert!(config.log.filter.is_none());
    assert_eq!(config.mqtt.max_qos, 2);
    assert!(config.mqtt.retain_available);
    assert_eq!(config.limits.max_topic_levels, 0);
    assert_eq!(config.limits.max_queued_messages, 1);
    assert_eq!(config.limits.outbound_channel_capacity, 1024);
}

#[test]
fn test_parse_minimal_config() {
    let toml = r#"
[mqtt]
max_qos = 1
"#;

    let config = Config::parse(toml).unwrap();
    assert_eq!(config.mqtt.max_qos, 1);
    assert_eq!(config.limits.max_queued_messages, 1);
}

#[test]
fn test_parse_full_config() {
    let toml = r#"
[log]
level = "debug"
filter = "vibemq_core::broker=trace"

[mqtt]
max_qos = 1
retain_available = false

[limits]
max_topic_levels = 16
max_queued_messages = 100
outbound_channel_capacity = 64
"#;

    let config = Config::parse(toml).unwrap();
    assert_eq!(config.log.level, "debug");
    assert_eq!(
        config.log.filter.as_deref(),
        Some("vibemq_core::broker=trace")
    );
    assert_eq!(config.mqtt.max_qos, 1);
    assert!(!config.mqtt.retain_available);
    assert_eq!(config.limits.max_topic_levels, 16);
    assert_eq!(config.limits.max_queued_messages, 100);
    assert_eq!(config.limits.outbound_channel_capacity, 64);
}

#[test]
fn test_invalid_max_qos() {
    let toml = r#"
[mqtt]
max_qos = 3
"#;

    let result = Config::parse(toml);
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn test_invalid_log_level() {
    let toml = r#"
[log]
level = "verbose"
"#;

    let result = Config::parse(toml);
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn test_log_level_case_insensitive() {
    let toml = r#"
[log]
level = "WARN"
"#;

    assert!(Config::parse(toml).is_ok());
}

#[test]
fn test_zero_channel_capacity_rejected() {
    let toml = r#"
[limits]
outbound_channel_capacity = 0
"#;

    let result = Config::parse(toml);
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn test_malformed_toml() {
    let result = Config::parse("[mqtt\nmax_qos = 1");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}
