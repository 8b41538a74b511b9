//! Built-in collectors with device-specific logic that a schema cannot
//! express (per-instance monitor requests).

mod interface_status;
mod poe_status;

use std::sync::Arc;

use prometheus::{GaugeVec, Opts};

pub use interface_status::InterfaceStatus;
pub use poe_status::PoeStatus;

use crate::collector::{Collector, CollectorError};
use crate::device::{DeviceClient, DeviceRecord};
use crate::exposition::{Instrument, RegistryFragment};

const NAMESPACE: &str = "mikrotik";
const SUBSYSTEM: &str = "interface";

/// Every built-in collector, bound to `client`.
pub fn builtin(client: Arc<dyn DeviceClient>) -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(InterfaceStatus::new(Arc::clone(&client))),
        Box::new(PoeStatus::new(client)),
    ]
}

/// Create a `mikrotik_interface_*` gauge and add it to the fragment.
fn register_gauge(
    fragment: &mut RegistryFragment,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<GaugeVec, CollectorError> {
    let gauge = GaugeVec::new(
        Opts::new(name, help).namespace(NAMESPACE).subsystem(SUBSYSTEM),
        labels,
    )?;
    fragment.add(Instrument::Gauge(gauge.clone()))?;
    Ok(gauge)
}

/// Interface label: the comment when set, otherwise the name.
fn display_name(record: &DeviceRecord) -> &str {
    match record.get("comment") {
        Some(comment) if !comment.is_empty() => comment,
        _ => record.get_or_empty("name"),
    }
}

/// Parse a link rate such as `100Mbps` or `2.5Gbps` into Mbps.
fn parse_rate(rate: &str) -> Option<f64> {
    let value = rate.strip_suffix("bps")?;
    let (number, factor) = if let Some(n) = value.strip_suffix('G') {
        (n, 1000.0)
    } else if let Some(n) = value.strip_suffix('M') {
        (n, 1.0)
    } else {
        return None;
    };
    number.parse::<f64>().ok().map(|n| n * factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::record;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("10Mbps"), Some(10.0));
        assert_eq!(parse_rate("100Mbps"), Some(100.0));
        assert_eq!(parse_rate("1Gbps"), Some(1000.0));
        assert_eq!(parse_rate("2.5Gbps"), Some(2500.0));
        assert_eq!(parse_rate("40Gbps"), Some(40_000.0));
        assert_eq!(parse_rate("auto"), None);
        assert_eq!(parse_rate(""), None);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(&record(&[("name", "ether1")])), "ether1");
        assert_eq!(
            display_name(&record(&[("name", "ether1"), ("comment", "uplink")])),
            "uplink"
        );
        assert_eq!(
            display_name(&record(&[("name", "ether1"), ("comment", "")])),
            "ether1"
        );
    }

    #[test]
    fn test_builtin_names() {
        let client = Arc::new(crate::collector::mock::MockDevice::new(|_| Ok(Vec::new())));
        let names: Vec<String> = builtin(client)
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["interface_status", "poe_status"]);
    }
}
