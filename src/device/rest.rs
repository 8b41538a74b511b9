//! REST/JSON transport.
//!
//! Stateless: every request is one HTTP round trip with Basic-Auth
//! credentials. `GET /rest<path>?name=value&...` reads, `POST
//! /rest<path>/monitor` with a JSON body samples one instance.

use reqwest::Client;
use serde::Deserialize;

use super::client::{DeviceClient, DeviceConfig, Method, Request, Transport};
use super::error::DeviceError;
use super::record::DeviceRecord;

/// Structured error body returned with non-2xx responses.
#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// REST device client.
pub struct RestClient {
    base_url: String,
    username: String,
    password: String,
    client: Client,
}

impl RestClient {
    /// Create a new REST client for `base_url` (scheme, host, optional port).
    ///
    /// # Errors
    /// Returns `DeviceError::Tls` if the CA file cannot be loaded, or
    /// `DeviceError::Http` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, config: &DeviceConfig) -> Result<Self, DeviceError> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure);

        if let Some(ref path) = config.ca_certificate {
            let pem = std::fs::read(path).map_err(|e| {
                DeviceError::Tls(format!("failed to read CA file '{}': {e}", path.display()))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                DeviceError::Tls(format!("failed to parse CA file '{}': {e}", path.display()))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            client: builder.build()?,
        })
    }

    /// Full request URL: `<base>/rest<path>[/monitor][?clause&clause...]`.
    fn request_url(&self, request: &Request) -> String {
        let mut url = format!("{}/rest{}", self.base_url, request.path);
        if request.method == Method::Monitor {
            url.push_str("/monitor");
        }
        if !request.filter.is_empty() {
            let query = request
                .filter
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("&");
            url.push('?');
            url.push_str(&query);
        }
        url.replace(' ', "%20")
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl DeviceClient for RestClient {
    fn transport(&self) -> Transport {
        Transport::Rest
    }

    async fn send_request(&self, request: Request) -> Result<Vec<DeviceRecord>, DeviceError> {
        let url = self.request_url(&request);
        let http_method = match request.method {
            Method::Read => reqwest::Method::GET,
            Method::Monitor => reqwest::Method::POST,
        };
        tracing::debug!(method = %http_method, url = %url, "REST request");

        let mut builder = self
            .client
            .request(http_method.clone(), &url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .basic_auth(&self.username, Some(&self.password));
        if request.method == Method::Monitor {
            builder = builder.json(&request.data);
        }

        let response = builder.send().await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            tracing::debug!(
                status = status.as_u16(),
                body = %String::from_utf8_lossy(&body),
                "REST error response"
            );
            let error: ErrorResponse = serde_json::from_slice(&body).unwrap_or_default();
            return Err(DeviceError::Status {
                method: http_method.as_str().to_string(),
                url,
                status: status.as_u16(),
                message: error.message,
                detail: error.detail,
            });
        }

        tracing::trace!(body = %String::from_utf8_lossy(&body), "REST response body");
        decode_records(&body)
    }
}

/// Decode a REST response body into records.
///
/// Arrays map to one record per element; a single object becomes a
/// one-element list. If the body fails to parse because of raw control
/// bytes, they are escaped and decoding is retried once.
pub fn decode_records(body: &[u8]) -> Result<Vec<DeviceRecord>, DeviceError> {
    if body.trim_ascii().len() <= 2 {
        return Ok(Vec::new());
    }

    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) if e.is_syntax() => {
            tracing::debug!(
                line = e.line(),
                column = e.column(),
                "Response body syntax error, retrying with escaped control bytes"
            );
            serde_json::from_slice(&escape_control_bytes(body))
                .map_err(|e| DeviceError::Protocol(format!("response body: {e}")))?
        }
        Err(e) => return Err(DeviceError::Protocol(format!("response body: {e}"))),
    };

    match value {
        serde_json::Value::Array(items) => items.into_iter().map(record_from_value).collect(),
        object @ serde_json::Value::Object(_) => Ok(vec![record_from_value(object)?]),
        other => Err(DeviceError::Protocol(format!(
            "expected a JSON object or array, got {other}"
        ))),
    }
}

fn record_from_value(value: serde_json::Value) -> Result<DeviceRecord, DeviceError> {
    let serde_json::Value::Object(map) = value else {
        return Err(DeviceError::Protocol(format!(
            "expected a JSON object, got {value}"
        )));
    };
    Ok(map
        .into_iter()
        .map(|(field, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (field, value)
        })
        .collect())
}

/// Rewrite raw control bytes inside JSON string literals as `\u00XX`.
///
/// Whitespace between tokens is left untouched.
pub fn escape_control_bytes(body: &[u8]) -> Vec<u8> {
    const HEX: &[u8; 16] = b"0123456789abcdef";

    let mut out = Vec::with_capacity(body.len() + 16);
    let mut in_string = false;
    let mut escaped = false;

    for &byte in body {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            } else if byte < 0x20 {
                out.extend_from_slice(b"\\u00");
                out.push(HEX[(byte >> 4) as usize]);
                out.push(HEX[(byte & 0x0f) as usize]);
                continue;
            }
        } else if byte == b'"' {
            in_string = true;
        }
        out.push(byte);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::FilterClause;

    fn client() -> RestClient {
        RestClient::new(
            "https://192.168.88.1/",
            &DeviceConfig::new("https://192.168.88.1", "admin", ""),
        )
        .unwrap()
    }

    #[test]
    fn test_request_url_read() {
        let request = Request::read("/interface/ethernet");
        assert_eq!(
            client().request_url(&request),
            "https://192.168.88.1/rest/interface/ethernet"
        );
    }

    #[test]
    fn test_request_url_filtered_escapes_spaces() {
        let request = Request::read("/ip/address").with_filter([
            FilterClause::new("interface", "bridge lan"),
            FilterClause::new("disabled", "false"),
        ]);
        assert_eq!(
            client().request_url(&request),
            "https://192.168.88.1/rest/ip/address?interface=bridge%20lan&disabled=false"
        );
    }

    #[test]
    fn test_request_url_monitor() {
        let request = Request::monitor("/interface/ethernet", "*1");
        assert_eq!(
            client().request_url(&request),
            "https://192.168.88.1/rest/interface/ethernet/monitor"
        );
    }

    #[test]
    fn test_decode_array() {
        let body = br#"[{"name":"ether1","rx-byte":"100"},{"name":"ether2","rx-byte":"200"}]"#;
        let records = decode_records(body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("name"), Some("ether1"));
        assert_eq!(records[1].get("rx-byte"), Some("200"));
    }

    #[test]
    fn test_decode_single_object() {
        let body = br#"{"name":"MikroTik"}"#;
        let records = decode_records(body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("name"), Some("MikroTik"));
    }

    #[test]
    fn test_decode_empty_bodies() {
        assert!(decode_records(b"").unwrap().is_empty());
        assert!(decode_records(b"[]").unwrap().is_empty());
        assert!(decode_records(b" [] \n").unwrap().is_empty());
    }

    #[test]
    fn test_decode_non_string_values() {
        let body = br#"[{"name":"ether1","mtu":1500,"running":true,"comment":null}]"#;
        let records = decode_records(body).unwrap();
        assert_eq!(records[0].get("mtu"), Some("1500"));
        assert_eq!(records[0].get("running"), Some("true"));
        assert_eq!(records[0].get("comment"), Some(""));
    }

    #[test]
    fn test_decode_control_byte_recovers() {
        let clean = br#"[{"name":"ether1","comment":"uplink\u0001"}]"#;
        let raw = b"[{\"name\":\"ether1\",\"comment\":\"uplink\x01\"}]";
        assert!(serde_json::from_slice::<serde_json::Value>(raw).is_err());

        let recovered = decode_records(raw).unwrap();
        assert_eq!(recovered, decode_records(clean).unwrap());
        assert_eq!(recovered[0].get("comment"), Some("uplink\u{1}"));
    }

    #[test]
    fn test_decode_malformed_is_protocol_error() {
        let err = decode_records(b"[{\"name\": ").unwrap_err();
        assert!(err.is_protocol());

        let err = decode_records(b"\"just a string\"").unwrap_err();
        assert!(err.is_protocol());

        let err = decode_records(b"[1, 2, 3]").unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn test_escape_control_bytes_only_inside_strings() {
        let raw = b"[\n{\"a\":\"x\ty\"}\n]";
        let escaped = escape_control_bytes(raw);
        assert_eq!(escaped, b"[\n{\"a\":\"x\\u0009y\"}\n]".to_vec());
    }

    #[test]
    fn test_escape_control_bytes_respects_escapes() {
        let raw = b"{\"a\":\"q\\\"\x02\"}";
        let escaped = escape_control_bytes(raw);
        assert_eq!(escaped, b"{\"a\":\"q\\\"\\u0002\"}".to_vec());
    }
}
