//! Configuration module for the exporter.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Device connection (URL, credentials, TLS options, alias)
//! - Polling interval, schema directory and shutdown timeout

mod app;
mod validation;

pub use app::{AppConfig, DeviceSection, ServerConfig};
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use app::{
    DEFAULT_ALIAS, DEFAULT_INTERVAL, DEFAULT_PORT, DEFAULT_SCHEMA_PATH, MIN_POLL_INTERVAL,
};
