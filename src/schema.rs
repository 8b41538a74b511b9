//! Schema Layer
//!
//! Declarative resource schemas that describe how the records of one device
//! resource map to metrics. Documents are YAML, one per resource:
//!
//! ```yaml
//! namespace: mikrotik
//! subsystem: interface
//! resource_path: /interface/ethernet
//! resource_filter: { running: "true" }
//! metrics:
//!   - name: rx_bytes
//!     type: counter
//!     field: rx-byte
//!     labels: { name: $name }
//! ```
//!
//! Compilation splits label templates into constant and record-derived
//! labels, merges schema-level templates into every metric (metric-level
//! wins), and rejects anything the collector could not apply.

mod compile;
mod error;
mod loader;
mod types;

pub use compile::{CompiledMetric, CompiledSchema, LabelTemplate, compile};
pub use error::SchemaError;
pub use loader::{load_dir, load_file, parse_str};
pub use types::{FieldType, FilterDocument, MetricDocument, MetricKind, Operation, SchemaDocument};
