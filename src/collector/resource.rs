//! Schema-driven resource collector.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use prometheus::Opts;

use crate::collector::{Collector, CollectorError, GlobalVars};
use crate::device::{self, DeviceClient, DeviceRecord, bool_to_float, parse_duration};
use crate::exposition::{Instrument, RegistryFragment};
use crate::schema::{CompiledMetric, CompiledSchema, FieldType, Operation};

/// Maps the records of one device resource to metrics, as described by a
/// compiled schema.
pub struct ResourceCollector {
    schema: Arc<CompiledSchema>,
    client: Arc<dyn DeviceClient>,
    globals: Arc<GlobalVars>,
    instruments: HashMap<String, Instrument>,
}

impl ResourceCollector {
    pub fn new(
        schema: Arc<CompiledSchema>,
        client: Arc<dyn DeviceClient>,
        globals: Arc<GlobalVars>,
    ) -> Self {
        Self {
            schema,
            client,
            globals,
            instruments: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &CompiledSchema {
        &self.schema
    }

    fn opts(&self, metric: &CompiledMetric) -> Opts {
        Opts::new(metric.name.clone(), metric.help.clone())
            .namespace(self.schema.namespace.clone())
            .subsystem(self.schema.subsystem.clone())
            .const_labels(
                metric
                    .const_labels
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )
    }

    /// Apply one metric definition to one record.
    fn apply(&self, metric: &CompiledMetric, record: &DeviceRecord) {
        let Some(instrument) = self.instruments.get(&metric.name) else {
            return;
        };

        let value = match coerce(metric, record) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    resource_path = %self.schema.resource_path,
                    metric = %metric.name,
                    field = %metric.field,
                    value = %record.get_or_empty(&metric.field),
                    error = %e,
                    "Failed to extract value from resource"
                );
                return;
            }
        };

        let labels = resolve_labels(metric, record, &self.globals);
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();

        let result = match instrument {
            Instrument::Counter(vec) => vec
                .get_metric_with_label_values(&labels)
                .map(|counter| match metric.operation {
                    Operation::Set | Operation::Add if !(value >= 0.0 && value.is_finite()) => {
                        tracing::warn!(
                            resource_path = %self.schema.resource_path,
                            metric = %metric.name,
                            value,
                            "Skipping negative or non-finite counter increment"
                        );
                    }
                    Operation::Set | Operation::Add => counter.inc_by(value),
                    Operation::Inc => counter.inc(),
                    op => tracing::warn!(
                        metric = %metric.name,
                        operation = %op,
                        "Operation not supported by counters"
                    ),
                }),
            Instrument::Gauge(vec) => {
                vec.get_metric_with_label_values(&labels)
                    .map(|gauge| match metric.operation {
                        Operation::Set => gauge.set(value),
                        Operation::Add => gauge.add(value),
                        Operation::Sub => gauge.sub(value),
                        Operation::Inc => gauge.inc(),
                        Operation::Dec => gauge.dec(),
                        Operation::SetToCurrentTime => gauge.set(now_seconds()),
                    })
            }
        };

        if let Err(e) = result {
            tracing::warn!(
                resource_path = %self.schema.resource_path,
                metric = %metric.name,
                error = %e,
                "Failed to update metric"
            );
        }
    }
}

impl std::fmt::Debug for ResourceCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCollector")
            .field("schema", &self.schema.name)
            .field("resource_path", &self.schema.resource_path)
            .field("instruments", &self.instruments.len())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Collector for ResourceCollector {
    fn name(&self) -> &str {
        &self.schema.name
    }

    fn register(&mut self, fragment: &mut RegistryFragment) -> Result<(), CollectorError> {
        for metric in &self.schema.metrics {
            let instrument = Instrument::new(metric.kind, self.opts(metric), &metric.label_names())?;
            fragment.add(instrument.clone())?;
            self.instruments.insert(metric.name.clone(), instrument);
        }
        Ok(())
    }

    async fn collect(&self) -> Result<(), CollectorError> {
        let start = Instant::now();
        let schema = &self.schema;

        let records = device::read(self.client.as_ref(), &schema.resource_path, &schema.filter).await?;
        let received = records.len();
        let records: Vec<DeviceRecord> = records
            .into_iter()
            .filter(|record| schema.filter.iter().all(|clause| clause.matches(record)))
            .collect();

        for metric in schema.metrics.iter().filter(|m| m.reset) {
            if let Some(Instrument::Gauge(gauge)) = self.instruments.get(&metric.name) {
                gauge.reset();
            }
        }

        for record in &records {
            for metric in &schema.metrics {
                self.apply(metric, record);
            }
        }

        tracing::debug!(
            schema = %schema.name,
            resource_path = %schema.resource_path,
            records = records.len(),
            filtered_out = received - records.len(),
            duration_ms = start.elapsed().as_millis(),
            "Resource collected"
        );
        Ok(())
    }
}

/// Coerce the metric's source field to a sample value.
pub fn coerce(metric: &CompiledMetric, record: &DeviceRecord) -> Result<f64, String> {
    let raw = record.get_or_empty(&metric.field);
    match metric.field_type {
        FieldType::Int => match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            Ok(_) => Err(format!("non-finite number '{raw}'")),
            Err(e) => Err(format!("invalid number '{raw}': {e}")),
        },
        FieldType::Time => parse_duration(raw).map(|d| d.as_secs_f64()),
        FieldType::Bool => Ok(bool_to_float(raw)),
        FieldType::Const => Ok(1.0),
    }
}

/// Resolve the metric's dynamic label values, in label-name order.
///
/// A global variable named like the referenced field wins over the record.
pub fn resolve_labels(
    metric: &CompiledMetric,
    record: &DeviceRecord,
    globals: &GlobalVars,
) -> Vec<String> {
    metric
        .dynamic_labels
        .values()
        .map(|field| match globals.get(field) {
            Some(value) => value.clone(),
            None => record.get_or_empty(field).to_string(),
        })
        .collect()
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
