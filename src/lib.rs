//! MikroTik Exporter - Schema-driven RouterOS metrics
//!
//! This crate polls a RouterOS device over its binary API or its REST API
//! and republishes the returned records as Prometheus metrics. It can be
//! used as a library, or run as a standalone binary with the
//! `mikrotik-exporter` executable.
//!
//! # Architecture
//!
//! - **Device**: dual-transport client (binary API, REST/JSON)
//! - **Schema**: YAML documents compiled into metric definitions
//! - **Collector**: one collection unit per resource, run by the scheduler
//! - **Exposition**: shared Prometheus registry and the `/metrics` server
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mikrotik_exporter::collector::{GlobalVars, ResourceCollector, Scheduler};
//! use mikrotik_exporter::device::{self, DeviceConfig};
//! use mikrotik_exporter::exposition::SharedRegistry;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = device::connect(&DeviceConfig::new("api://192.168.88.1", "admin", "")).await?;
//! let registry = SharedRegistry::new();
//! let scheduler = Scheduler::new(registry.clone());
//!
//! let schema = mikrotik_exporter::schema::load_file(std::path::Path::new("resources/system_resource.yaml"))?;
//! let collector = ResourceCollector::new(Arc::new(schema), client, Arc::new(GlobalVars::new()));
//! scheduler.spawn(Box::new(collector), Duration::from_secs(30)).await?;
//!
//! println!("{}", registry.encode_text()?);
//! scheduler.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod device;
pub mod exposition;
pub mod schema;
pub mod server;
