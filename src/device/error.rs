//! Device-specific error types.
//!
//! Every variant except [`DeviceError::Protocol`] is a transport failure
//! (connection, TLS, authentication, device-reported error). Protocol errors
//! mean the device answered but the payload could not be decoded.

use thiserror::Error;

/// Errors that can occur while talking to the device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Socket I/O failed (connect, read, write).
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error (connect, TLS handshake, timeout).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// TLS setup failed.
    #[error("tls error: {0}")]
    Tls(String),

    /// REST endpoint returned a non-2xx status.
    #[error(
        "{method} '{url}' returned response code: {status}, message: '{}', details: '{}'",
        .message.as_deref().unwrap_or(""),
        .detail.as_deref().unwrap_or("")
    )]
    Status {
        method: String,
        url: String,
        status: u16,
        message: Option<String>,
        detail: Option<String>,
    },

    /// Binary API replied with `!trap`.
    #[error("device trap: {0}")]
    Trap(String),

    /// Binary API replied with `!fatal`; the session is gone.
    #[error("device closed session: {0}")]
    Fatal(String),

    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Request without a resource path.
    #[error("the resource path is not defined")]
    EmptyPath,

    /// Response body could not be decoded.
    #[error("malformed response: {0}")]
    Protocol(String),
}

impl DeviceError {
    /// True when the device answered with an undecodable payload.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// True for connection, TLS, authentication and device-reported failures.
    pub fn is_transport(&self) -> bool {
        !self.is_protocol()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_message() {
        let err = DeviceError::Status {
            method: "GET".to_string(),
            url: "https://router/rest/nope".to_string(),
            status: 404,
            message: Some("Not Found".to_string()),
            detail: Some("no such command or directory (nope)".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("404"));
        assert!(msg.contains("Not Found"));
        assert!(msg.contains("no such command"));
        assert!(err.is_transport());
    }

    #[test]
    fn test_protocol_classification() {
        let err = DeviceError::Protocol("expected value at line 1".to_string());
        assert!(err.is_protocol());
        assert!(!err.is_transport());
        assert!(DeviceError::Trap("invalid user name or password".into()).is_transport());
    }
}
