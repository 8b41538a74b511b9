//! Transport-independent device client contract.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

use super::api::ApiClient;
use super::error::DeviceError;
use super::record::DeviceRecord;
use super::rest::RestClient;

/// Default per-request timeout (10 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default binary API port.
const API_PORT: u16 = 8728;

/// Default binary API port over TLS.
const API_TLS_PORT: u16 = 8729;

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Wire transport used to reach the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Transport {
    /// Binary API session (`api://`, `apis://`).
    Api,
    /// REST/JSON over HTTP(S) (`https://`, `http://`).
    Rest,
}

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Method {
    /// List all (or filtered) instances of a resource.
    Read,
    /// One-shot sample of ephemeral per-instance fields.
    Monitor,
}

/// Equality filter clause: `name=value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterClause {
    pub name: String,
    pub value: String,
}

impl FilterClause {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Strict string equality against the record field.
    ///
    /// A missing field never matches.
    pub fn matches(&self, record: &DeviceRecord) -> bool {
        record.get(&self.name) == Some(self.value.as_str())
    }
}

impl std::str::FromStr for FilterClause {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok(Self::new(name.trim(), value.trim()))
            }
            _ => Err(format!("invalid filter expression '{s}', expected 'name=value'")),
        }
    }
}

impl std::fmt::Display for FilterClause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// A single device request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Resource path, e.g. `/interface/ethernet`.
    pub path: String,
    /// Equality clauses, AND-combined by the device.
    pub filter: Vec<FilterClause>,
    /// Named arguments (binary API attributes or REST JSON body).
    pub data: BTreeMap<String, String>,
}

impl Request {
    /// Read request for a resource path.
    pub fn read(path: impl Into<String>) -> Self {
        Self {
            method: Method::Read,
            path: path.into(),
            filter: Vec::new(),
            data: BTreeMap::new(),
        }
    }

    /// Monitor request for one resource instance.
    pub fn monitor(path: impl Into<String>, id: impl Into<String>) -> Self {
        let mut data = BTreeMap::new();
        data.insert("numbers".to_string(), id.into());
        data.insert("once".to_string(), String::new());
        Self {
            method: Method::Monitor,
            path: path.into(),
            filter: Vec::new(),
            data,
        }
    }

    /// Add equality filter clauses.
    pub fn with_filter(mut self, filter: impl IntoIterator<Item = FilterClause>) -> Self {
        self.filter.extend(filter);
        self
    }
}

/// Capability shared by both transports.
///
/// Implementations must be safe for concurrent use: collection units share
/// one client.
#[async_trait::async_trait]
pub trait DeviceClient: std::fmt::Debug + Send + Sync + 'static {
    /// Transport this client speaks.
    fn transport(&self) -> Transport;

    /// Send one request and return the flattened response records.
    ///
    /// An empty response yields an empty list.
    async fn send_request(&self, request: Request) -> Result<Vec<DeviceRecord>, DeviceError>;
}

/// Read the full (or filtered) record set of a resource.
pub async fn read(
    client: &dyn DeviceClient,
    path: &str,
    filter: &[FilterClause],
) -> Result<Vec<DeviceRecord>, DeviceError> {
    if path.is_empty() {
        return Err(DeviceError::EmptyPath);
    }
    client
        .send_request(Request::read(path).with_filter(filter.iter().cloned()))
        .await
}

/// Sample the ephemeral fields of one resource instance.
pub async fn monitor(
    client: &dyn DeviceClient,
    path: &str,
    id: &str,
) -> Result<Vec<DeviceRecord>, DeviceError> {
    if path.is_empty() {
        return Err(DeviceError::EmptyPath);
    }
    client.send_request(Request::monitor(path, id)).await
}

/// Device connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device URL; the scheme selects the transport.
    #[serde(default)]
    pub url: String,
    /// Login user.
    #[serde(default)]
    pub username: String,
    /// Login password.
    #[serde(default)]
    pub password: String,
    /// Skip TLS certificate verification.
    #[serde(default)]
    pub insecure: bool,
    /// PEM file with the CA that signed the device certificate.
    #[serde(default)]
    pub ca_certificate: Option<PathBuf>,
    /// Per-request timeout (default: 10s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl DeviceConfig {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            insecure: false,
            ca_certificate: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Skip certificate verification.
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Verify the device against a custom CA.
    pub fn with_ca_certificate(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_certificate = Some(path.into());
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check option consistency.
    pub fn validate(&self) -> Result<(), DeviceError> {
        if self.url.trim().is_empty() {
            return Err(DeviceError::Config("device url must be set".to_string()));
        }
        if self.insecure && self.ca_certificate.is_some() {
            return Err(DeviceError::Config(
                "mutually exclusive options: ca_certificate and insecure connection".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("insecure", &self.insecure)
            .field("ca_certificate", &self.ca_certificate)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Where and how to reach the device, derived from its URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    Rest { base_url: String },
    Api { host: String, port: u16, tls: bool },
}

/// Resolve the device URL. A URL without a scheme defaults to `https://`.
pub(crate) fn parse_target(raw: &str) -> Result<Target, DeviceError> {
    let raw = raw.trim();
    let url = match url::Url::parse(raw) {
        Ok(url) if url.host_str().is_some_and(|h| !h.is_empty()) => url,
        _ => url::Url::parse(&format!("https://{raw}"))
            .map_err(|e| DeviceError::Config(format!("invalid device url '{raw}': {e}")))?,
    };
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| DeviceError::Config(format!("device url '{raw}' has no host")))?
        .to_string();

    match url.scheme() {
        "https" | "http" => {
            let mut base_url = format!("{}://{}", url.scheme(), host);
            if let Some(port) = url.port() {
                base_url.push_str(&format!(":{port}"));
            }
            base_url.push_str(url.path().trim_end_matches('/'));
            Ok(Target::Rest { base_url })
        }
        "api" => Ok(Target::Api {
            host,
            port: url.port().unwrap_or(API_PORT),
            tls: false,
        }),
        "apis" => Ok(Target::Api {
            host,
            port: url.port().unwrap_or(API_TLS_PORT),
            tls: true,
        }),
        other => Err(DeviceError::Config(format!(
            "unsupported transport scheme '{other}' in device url '{raw}'"
        ))),
    }
}

/// Build a client for the configured device.
///
/// The binary transport logs in immediately, so an unreachable device or bad
/// credentials fail here rather than on the first poll.
pub async fn connect(config: &DeviceConfig) -> Result<Arc<dyn DeviceClient>, DeviceError> {
    config.validate()?;
    match parse_target(&config.url)? {
        Target::Rest { base_url } => {
            tracing::info!(url = %base_url, "Using REST transport");
            Ok(Arc::new(RestClient::new(base_url, config)?))
        }
        Target::Api { host, port, tls } => {
            tracing::info!(host = %host, port, tls, "Using binary API transport");
            Ok(Arc::new(ApiClient::connect(host, port, tls, config).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_clause_parse() {
        let clause: FilterClause = "running=true".parse().unwrap();
        assert_eq!(clause, FilterClause::new("running", "true"));
        assert_eq!(clause.to_string(), "running=true");

        let clause: FilterClause = "comment=a=b".parse().unwrap();
        assert_eq!(clause.value, "a=b");

        assert!("running".parse::<FilterClause>().is_err());
        assert!("=true".parse::<FilterClause>().is_err());
    }

    #[test]
    fn test_filter_clause_matches() {
        let record: DeviceRecord = [("name", "ether1"), ("running", "true")]
            .into_iter()
            .collect();
        assert!(FilterClause::new("running", "true").matches(&record));
        assert!(!FilterClause::new("running", "TRUE").matches(&record));
        assert!(!FilterClause::new("disabled", "").matches(&record));
    }

    #[test]
    fn test_monitor_request() {
        let request = Request::monitor("/interface/ethernet", "*1");
        assert_eq!(request.method, Method::Monitor);
        assert_eq!(request.data.get("numbers"), Some(&"*1".to_string()));
        assert_eq!(request.data.get("once"), Some(&String::new()));
    }

    #[test]
    fn test_parse_target_schemes() {
        assert_eq!(
            parse_target("https://192.168.88.1/").unwrap(),
            Target::Rest {
                base_url: "https://192.168.88.1".to_string()
            }
        );
        assert_eq!(
            parse_target("192.168.88.1").unwrap(),
            Target::Rest {
                base_url: "https://192.168.88.1".to_string()
            }
        );
        assert_eq!(
            parse_target("http://127.0.0.1:8080").unwrap(),
            Target::Rest {
                base_url: "http://127.0.0.1:8080".to_string()
            }
        );
        assert_eq!(
            parse_target("api://router.lan").unwrap(),
            Target::Api {
                host: "router.lan".to_string(),
                port: 8728,
                tls: false
            }
        );
        assert_eq!(
            parse_target("apis://router.lan:18729").unwrap(),
            Target::Api {
                host: "router.lan".to_string(),
                port: 18729,
                tls: true
            }
        );
        assert!(parse_target("ftp://router.lan").is_err());
    }

    #[test]
    fn test_device_config_validate() {
        let config = DeviceConfig::new("https://router", "admin", "pw")
            .with_insecure(true)
            .with_ca_certificate("/tmp/ca.pem");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));

        assert!(DeviceConfig::new("", "admin", "pw").validate().is_err());
        assert!(
            DeviceConfig::new("https://router", "admin", "pw")
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_device_config_debug_hides_password() {
        let config = DeviceConfig::new("https://router", "admin", "hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
