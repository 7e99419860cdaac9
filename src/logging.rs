//! Logging setup
//!
//! Embedders that already install a tracing subscriber can skip this; the
//! broker only emits events.

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::{ConfigError, LogConfig};

/// Map a configured level name to a tracing level, defaulting to warn
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::WARN,
    }
}

/// Build the filter for a log configuration.
///
/// `log.level` sets the default; `log.filter` directives are layered on top.
pub fn env_filter(config: &LogConfig) -> Result<EnvFilter, ConfigError> {
    let level = parse_level(&config.level);
    let mut directives = level.to_string().to_lowercase();
    if let Some(filter) = config.filter.as_deref().filter(|f| !f.is_empty()) {
        directives.push(',');
        directives.push_str(filter);
    }

    EnvFilter::try_new(&directives).map_err(|e| {
        let message = format!("invalid log filter '{}': {}", directives, e);
        ConfigError::Validation(message)
    })
}

/// Install the global tracing subscriber
pub fn init(config: &LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter(config)?)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("error"), Level::ERROR);
        assert_eq!(parse_level("bogus"), Level::WARN);
    }

    #[test]
    fn test_env_filter_with_directives() {
        let config = LogConfig {
            level: "info".to_string(),
            filter: Some("vibemq_core::broker=trace".to_string()),
        };
        let filter = env_filter(&config).unwrap();
        let rendered = filter.to_string();
        assert!(rendered.contains("info"));
        assert!(rendered.contains("vibemq_core::broker=trace"));
    }
}
