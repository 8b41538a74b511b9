//! Binary API transport.
//!
//! Holds one authenticated session per client. Requests are serialized over
//! the session; a failed session is dropped and re-established on the next
//! request.

pub mod codec;

use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;
use tokio::io::{AsyncRead, AsyncWrite, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::TlsConnector;

use self::codec::Reply;
use super::client::{DeviceClient, DeviceConfig, Method, Request, Transport};
use super::error::DeviceError;
use super::record::DeviceRecord;
use super::tls;

trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

/// One open, logged-in connection.
struct Session {
    stream: BufStream<Box<dyn Io>>,
}

impl Session {
    /// Send one command and collect its reply up to `!done`.
    ///
    /// A `!trap` is reported after the trailing `!done` has been consumed so
    /// the session stays usable.
    async fn run(&mut self, words: &[String]) -> Result<(Vec<DeviceRecord>, DeviceRecord), DeviceError> {
        codec::write_sentence(&mut self.stream, words).await?;

        let mut records = Vec::new();
        let mut trap = None;
        loop {
            let sentence = codec::read_sentence(&mut self.stream).await?;
            let reply =
                Reply::parse(&sentence).map_err(|e| DeviceError::Protocol(e.to_string()))?;
            match reply {
                Reply::Re(record) => records.push(record),
                Reply::Empty => {}
                Reply::Trap(message) => trap = Some(message),
                Reply::Fatal(message) => return Err(DeviceError::Fatal(message)),
                Reply::Done(attributes) => {
                    return match trap {
                        Some(message) => Err(DeviceError::Trap(message)),
                        None => Ok((records, attributes)),
                    };
                }
            }
        }
    }

    async fn login(&mut self, username: &str, password: &str) -> Result<(), DeviceError> {
        let words = vec![
            "/login".to_string(),
            format!("=name={username}"),
            format!("=password={password}"),
        ];
        let (_, done) = self.run(&words).await?;
        if done.contains("ret") {
            return Err(DeviceError::Config(
                "device requested legacy challenge login, which is not supported".to_string(),
            ));
        }
        Ok(())
    }
}

/// Binary API device client.
pub struct ApiClient {
    host: String,
    port: u16,
    tls: Option<Arc<ClientConfig>>,
    username: String,
    password: String,
    timeout: Duration,
    session: Mutex<Option<Session>>,
}

impl ApiClient {
    /// Open and authenticate a session to `host:port`.
    ///
    /// # Errors
    /// Fails if the device is unreachable, the TLS handshake fails or the
    /// credentials are rejected.
    pub async fn connect(
        host: impl Into<String>,
        port: u16,
        tls: bool,
        config: &DeviceConfig,
    ) -> Result<Self, DeviceError> {
        let tls = if tls {
            Some(tls::client_config(
                config.insecure,
                config.ca_certificate.as_deref(),
            )?)
        } else {
            None
        };

        let client = Self {
            host: host.into(),
            port,
            tls,
            username: config.username.clone(),
            password: config.password.clone(),
            timeout: config.timeout,
            session: Mutex::new(None),
        };

        let session = client.open_session().await?;
        *client.session.lock().await = Some(session);
        Ok(client)
    }

    async fn open_session(&self) -> Result<Session, DeviceError> {
        let open = async {
            let tcp = TcpStream::connect((self.host.as_str(), self.port)).await?;
            tcp.set_nodelay(true)?;

            let io: Box<dyn Io> = match &self.tls {
                Some(config) => {
                    let name = tls::server_name(&self.host)?;
                    let stream = TlsConnector::from(Arc::clone(config))
                        .connect(name, tcp)
                        .await?;
                    Box::new(stream)
                }
                None => Box::new(tcp),
            };

            let mut session = Session {
                stream: BufStream::new(io),
            };
            session.login(&self.username, &self.password).await?;
            Ok::<_, DeviceError>(session)
        };

        let session = tokio::time::timeout(self.timeout, open)
            .await
            .map_err(|_| timed_out("connect", self.timeout))??;

        tracing::debug!(host = %self.host, port = self.port, "API session established");
        Ok(session)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls.is_some())
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl DeviceClient for ApiClient {
    fn transport(&self) -> Transport {
        Transport::Api
    }

    async fn send_request(&self, request: Request) -> Result<Vec<DeviceRecord>, DeviceError> {
        let words = command_words(&request);
        tracing::debug!(command = %words[0], words = words.len(), "API request");

        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(self.open_session().await?);
        }
        let Some(session) = guard.as_mut() else {
            return Err(DeviceError::Fatal("no session available".to_string()));
        };

        let result = tokio::time::timeout(self.timeout, session.run(&words))
            .await
            .unwrap_or_else(|_| Err(timed_out("request", self.timeout)));

        match result {
            Ok((records, _)) => Ok(records),
            Err(e @ DeviceError::Trap(_)) => Err(e),
            Err(e) => {
                tracing::warn!(host = %self.host, error = %e, "Dropping API session");
                *guard = None;
                Err(e)
            }
        }
    }
}

/// Encode a request as API words.
///
/// `<path>/print` or `<path>/monitor`, then `=name=value` arguments, then
/// `?=name=value` query clauses.
fn command_words(request: &Request) -> Vec<String> {
    let verb = match request.method {
        Method::Read => "print",
        Method::Monitor => "monitor",
    };
    let mut words = Vec::with_capacity(1 + request.data.len() + request.filter.len());
    words.push(format!("{}/{verb}", request.path.trim_end_matches('/')));
    words.extend(request.data.iter().map(|(k, v)| format!("={k}={v}")));
    words.extend(
        request
            .filter
            .iter()
            .map(|clause| format!("?={}={}", clause.name, clause.value)),
    );
    words
}

fn timed_out(what: &str, after: Duration) -> DeviceError {
    DeviceError::Io(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!("{what} timed out after {}", humantime::format_duration(after)),
    ))
}
