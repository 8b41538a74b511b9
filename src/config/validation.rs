//! Configuration validation utilities.

use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Parse a duration string using humantime (`30s`, `1m`, `1h30m`, ...).
///
/// # Examples
///
/// ```
/// use mikrotik_exporter::config::parse_duration;
///
/// assert_eq!(parse_duration("30s").unwrap().as_secs(), 30);
/// assert_eq!(parse_duration("1m30s").unwrap().as_secs(), 90);
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration string is empty".to_string());
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Expand environment variables in a string.
/// Supports ${VAR} and ${VAR:-default} syntax.
pub fn expand_env_vars(input: &str) -> String {
    static ENV_VAR_REGEX: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();

    let regex = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("failed to compile env var regex")
    });

    regex
        .replace_all(input, |caps: &regex::Captures| {
            let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(&caps[1]).unwrap_or_else(|_| default_value.to_string())
        })
        .into_owned()
}

/// Check that `bind` is an IP address.
pub(crate) fn validate_bind(bind: &str) -> Result<(), ConfigError> {
    bind.parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| ConfigError::ValidationError(format!("invalid server bind address: '{bind}'")))
}

/// Check a polling interval against the allowed minimum.
pub(crate) fn validate_interval(interval: Duration, min: Duration) -> Result<(), ConfigError> {
    if interval < min {
        return Err(ConfigError::ValidationError(format!(
            "interval {} is below the minimum of {}",
            humantime::format_duration(interval),
            humantime::format_duration(min)
        )));
    }
    Ok(())
}
