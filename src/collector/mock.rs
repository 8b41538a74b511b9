//! Test doubles shared by collector tests.

use std::sync::Mutex;

use prometheus::proto::MetricType;

use crate::device::{DeviceClient, DeviceError, DeviceRecord, Request, Transport};
use crate::exposition::SharedRegistry;

type Handler = Box<dyn Fn(&Request) -> Result<Vec<DeviceRecord>, DeviceError> + Send + Sync>;

/// Device that answers every request through a closure and records it.
pub(crate) struct MockDevice {
    handler: Handler,
    requests: Mutex<Vec<Request>>,
}

impl MockDevice {
    pub(crate) fn new(
        handler: impl Fn(&Request) -> Result<Vec<DeviceRecord>, DeviceError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

impl std::fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDevice")
            .field("requests", &self.requests.lock().map(|r| r.len()).unwrap_or(0))
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl DeviceClient for MockDevice {
    fn transport(&self) -> Transport {
        Transport::Rest
    }

    async fn send_request(&self, request: Request) -> Result<Vec<DeviceRecord>, DeviceError> {
        let result = (self.handler)(&request);
        self.requests.lock().unwrap().push(request);
        result
    }
}

pub(crate) fn record(fields: &[(&str, &str)]) -> DeviceRecord {
    fields.iter().copied().collect()
}

/// Value of the series `name{labels}`, if exported.
pub(crate) fn sample(registry: &SharedRegistry, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    registry
        .gather()
        .into_iter()
        .filter(|family| family.get_name() == name)
        .flat_map(|family| {
            let kind = family.get_field_type();
            family
                .get_metric()
                .iter()
                .filter(|metric| {
                    let pairs = metric.get_label();
                    pairs.len() == labels.len()
                        && labels.iter().all(|(k, v)| {
                            pairs
                                .iter()
                                .any(|pair| pair.get_name() == *k && pair.get_value() == *v)
                        })
                })
                .map(|metric| match kind {
                    MetricType::COUNTER => metric.get_counter().get_value(),
                    _ => metric.get_gauge().get_value(),
                })
                .collect::<Vec<_>>()
        })
        .next()
}

/// Number of exported series for `name`.
pub(crate) fn series_count(registry: &SharedRegistry, name: &str) -> usize {
    registry
        .gather()
        .iter()
        .filter(|family| family.get_name() == name)
        .map(|family| family.get_metric().len())
        .sum()
}
