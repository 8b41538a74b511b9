//! Application configuration structures.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collector::GlobalVars;
use crate::device::DeviceConfig;

use super::validation::{ConfigError, expand_env_vars, validate_bind, validate_interval};

// =============================================================================
// Constants
// =============================================================================

/// Default polling interval (30 seconds).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Minimum polling interval accepted from configuration (5 seconds).
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default exposition port.
pub const DEFAULT_PORT: u16 = 9100;

/// Default device alias exported through the `ALIAS` variable.
pub const DEFAULT_ALIAS: &str = "Sample-Router";

/// Default schema directory.
pub const DEFAULT_SCHEMA_PATH: &str = "resources";

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_shutdown_timeout() -> Duration {
    crate::collector::DEFAULT_SHUTDOWN_TIMEOUT
}

fn default_schema_path() -> PathBuf {
    PathBuf::from(DEFAULT_SCHEMA_PATH)
}

fn default_alias() -> String {
    DEFAULT_ALIAS.to_string()
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Exposition server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 9100).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

// =============================================================================
// Device Configuration
// =============================================================================

/// Device connection settings plus the alias shown in labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSection {
    #[serde(flatten)]
    pub connection: DeviceConfig,

    /// Alias exported through the `ALIAS` variable.
    #[serde(default = "default_alias")]
    pub alias: String,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            connection: DeviceConfig::new("", "", ""),
            alias: default_alias(),
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Exposition server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Device to poll.
    #[serde(default)]
    pub device: DeviceSection,

    /// Polling interval for every collection unit (default: 30s, minimum: 5s).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Directory with resource schema documents (default: "resources").
    #[serde(default = "default_schema_path")]
    pub schema_path: PathBuf,

    /// How long shutdown waits for units to stop (default: 5s).
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            device: DeviceSection::default(),
            interval: DEFAULT_INTERVAL,
            schema_path: default_schema_path(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` references are expanded before parsing.
    /// The result is not validated: command-line overrides are usually
    /// applied first, then [`validate`](Self::validate).
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(&expand_env_vars(content))?)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_bind(&self.server.bind)?;

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        self.device
            .connection
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if self.device.connection.username.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "device username must be set".to_string(),
            ));
        }

        validate_interval(self.interval, MIN_POLL_INTERVAL)?;

        if self.schema_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "schema_path must be set".to_string(),
            ));
        }

        Ok(())
    }

    /// Variables that override record fields in dynamic labels.
    ///
    /// `IDENTITY` is added at startup once the device has been queried.
    pub fn global_vars(&self) -> GlobalVars {
        GlobalVars::from([
            ("HOSTURL".to_string(), self.device.connection.url.clone()),
            ("USERNAME".to_string(), self.device.connection.username.clone()),
            ("ALIAS".to_string(), self.device.alias.clone()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        let mut config = AppConfig::default();
        config.device.connection = DeviceConfig::new("https://192.168.88.1", "admin", "secret");
        config
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.port, 9100);
    }

    #[test]
    fn test_from_yaml_full() {
        let config = AppConfig::from_yaml(
            r#"
server:
  port: 9436
device:
  url: apis://router.lan
  username: monitor
  password: ${NONEXISTENT_ROUTER_PASSWORD_98765:-fallback}
  ca_certificate: /etc/ssl/router-ca.pem
  timeout: 3s
  alias: core
interval: 1m
schema_path: /etc/exporter/resources
shutdown_timeout: 10s
"#,
        )
        .unwrap();

        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.server.port, 9436);
        assert_eq!(config.device.connection.url, "apis://router.lan");
        assert_eq!(config.device.connection.password, "fallback");
        assert_eq!(config.device.connection.timeout, Duration::from_secs(3));
        assert_eq!(
            config.device.connection.ca_certificate,
            Some(PathBuf::from("/etc/ssl/router-ca.pem"))
        );
        assert_eq!(config.device.alias, "core");
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_defaults() {
        let config = AppConfig::from_yaml(
            "device:\n  url: https://10.0.0.1\n  username: admin\n",
        )
        .unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.interval, DEFAULT_INTERVAL);
        assert_eq!(config.schema_path, PathBuf::from("resources"));
        assert_eq!(config.device.alias, DEFAULT_ALIAS);
        assert!(!config.device.connection.insecure);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_port() {
        let mut config = valid();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_bind_address() {
        let mut config = valid();
        config.server.bind = "not-an-ip".to_string();
        let result = config.validate();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("invalid server bind address")
        );
    }

    #[test]
    fn test_config_validation_device() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_err(), "missing url");

        config.device.connection = DeviceConfig::new("https://router", "", "");
        assert!(config.validate().unwrap_err().to_string().contains("username"));

        config.device.connection = DeviceConfig::new("https://router", "admin", "")
            .with_insecure(true)
            .with_ca_certificate("/tmp/ca.pem");
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("mutually exclusive")
        );
    }

    #[test]
    fn test_config_validation_interval() {
        let mut config = valid();
        config.interval = Duration::from_secs(2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_global_vars() {
        let mut config = valid();
        config.device.alias = "edge".to_string();
        let vars = config.global_vars();
        assert_eq!(vars.get("HOSTURL").map(String::as_str), Some("https://192.168.88.1"));
        assert_eq!(vars.get("USERNAME").map(String::as_str), Some("admin"));
        assert_eq!(vars.get("ALIAS").map(String::as_str), Some("edge"));
        assert!(!vars.contains_key("IDENTITY"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load("/nonexistent/exporter.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
