//! Collector Layer
//!
//! Collection units that poll the device and update metric instruments.
//! Each unit runs in its own Tokio task on its own interval.
//!
//! # Architecture
//!
//! - [`Collector`]: core trait; registers instruments, performs one poll
//! - [`ResourceCollector`]: schema-driven collector for one device resource
//! - [`complex`]: built-in collectors with bespoke logic
//! - [`Scheduler`]: runs units, tracks their state, tears them down
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mikrotik_exporter::collector::{GlobalVars, ResourceCollector, Scheduler};
//! use mikrotik_exporter::device::{self, DeviceConfig};
//! use mikrotik_exporter::exposition::SharedRegistry;
//! use mikrotik_exporter::schema;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = device::connect(&DeviceConfig::new("https://192.168.88.1", "admin", "")).await?;
//! let registry = SharedRegistry::new();
//! let scheduler = Scheduler::new(registry.clone());
//!
//! for schema in schema::load_dir("resources")? {
//!     let collector = ResourceCollector::new(
//!         Arc::new(schema),
//!         Arc::clone(&client),
//!         Arc::new(GlobalVars::new()),
//!     );
//!     scheduler.spawn(Box::new(collector), Duration::from_secs(30)).await?;
//! }
//! scheduler.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod complex;
#[cfg(test)]
mod mock;
mod resource;
mod scheduler;
mod traits;

pub use resource::{ResourceCollector, coerce, resolve_labels};
pub use scheduler::{DEFAULT_SHUTDOWN_TIMEOUT, Scheduler, UnitInfo, UnitState};
pub use traits::{Collector, CollectorError, GlobalVars, MIN_INTERVAL, clamp_interval};
