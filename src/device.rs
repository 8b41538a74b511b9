//! Device Layer
//!
//! Talks to a RouterOS device over one of two transports behind a single
//! request contract:
//!
//! - [`RestClient`]: stateless HTTP(S) + JSON, one round trip per request
//! - [`ApiClient`]: persistent, authenticated binary API session
//!
//! Both return flat [`DeviceRecord`]s. Use [`connect`] to pick the transport
//! from the device URL scheme.
//!
//! # Example
//!
//! ```rust,no_run
//! use mikrotik_exporter::device::{self, DeviceConfig, FilterClause};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DeviceConfig::new("https://192.168.88.1", "admin", "secret");
//! let client = device::connect(&config).await?;
//! let filter = vec![FilterClause::new("running", "true")];
//! let records = device::read(client.as_ref(), "/interface/ethernet", &filter).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
mod client;
mod error;
mod record;
pub mod rest;
mod tls;

pub use api::ApiClient;
pub use client::{
    DeviceClient, DeviceConfig, FilterClause, Method, Request, Transport, connect, monitor, read,
};
pub use error::DeviceError;
pub use record::{DeviceRecord, bool_to_float, parse_duration};
pub use rest::RestClient;
