//! PoE output state via `/interface/ethernet/poe/monitor`.

use std::sync::Arc;

use prometheus::GaugeVec;

use super::{display_name, register_gauge};
use crate::collector::{Collector, CollectorError};
use crate::device::{self, DeviceClient, DeviceRecord};
use crate::exposition::RegistryFragment;

const PATH: &str = "/interface/ethernet/poe";

struct Gauges {
    status: GaugeVec,
    current: GaugeVec,
    power: GaugeVec,
    voltage: GaugeVec,
}

/// PoE status, current, power and voltage of every PoE-capable port.
pub struct PoeStatus {
    client: Arc<dyn DeviceClient>,
    gauges: Option<Gauges>,
}

impl PoeStatus {
    pub fn new(client: Arc<dyn DeviceClient>) -> Self {
        Self {
            client,
            gauges: None,
        }
    }
}

/// Numeric monitor field; absent means 0.
fn reading(state: &DeviceRecord, field: &str) -> Result<f64, String> {
    match state.get(field) {
        None => Ok(0.0),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid number '{raw}': {e}")),
    }
}

#[async_trait::async_trait]
impl Collector for PoeStatus {
    fn name(&self) -> &str {
        "poe_status"
    }

    fn register(&mut self, fragment: &mut RegistryFragment) -> Result<(), CollectorError> {
        self.gauges = Some(Gauges {
            status: register_gauge(
                fragment,
                "ethernet_poe_status",
                "PoE status",
                &["name", "poe_out", "poe_priority"],
            )?,
            current: register_gauge(fragment, "ethernet_poe_current", "Current (mA)", &["name"])?,
            power: register_gauge(fragment, "ethernet_poe_power", "Power (W)", &["name"])?,
            voltage: register_gauge(fragment, "ethernet_poe_voltage", "Voltage (V)", &["name"])?,
        });
        Ok(())
    }

    async fn collect(&self) -> Result<(), CollectorError> {
        let gauges = self
            .gauges
            .as_ref()
            .ok_or_else(|| CollectorError::Registration("poe_status not registered".into()))?;

        let ports = device::read(self.client.as_ref(), PATH, &[]).await?;
        for port in &ports {
            let Some(id) = port.get(".id") else {
                continue;
            };
            let name = display_name(port);

            let replies = device::monitor(self.client.as_ref(), PATH, id).await?;
            let Some(state) = replies.first() else {
                tracing::warn!(id = %id, "Monitor returned an empty response");
                continue;
            };

            let powered = state.get("poe-out-status") == Some("powered-on");
            gauges
                .status
                .with_label_values(&[
                    name,
                    state.get_or_empty("poe-out"),
                    port.get_or_empty("poe-priority"),
                ])
                .set(if powered { 1.0 } else { 0.0 });

            for (field, gauge) in [
                ("poe-out-current", &gauges.current),
                ("poe-out-power", &gauges.power),
                ("poe-out-voltage", &gauges.voltage),
            ] {
                match reading(state, field) {
                    Ok(value) => gauge.with_label_values(&[name]).set(value),
                    Err(e) => tracing::warn!(
                        field,
                        error = %e,
                        "Failed to extract value from resource"
                    ),
                }
            }
        }

        tracing::debug!(ports = ports.len(), "PoE status collected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockDevice, record, sample};
    use crate::device::Method;
    use crate::exposition::SharedRegistry;

    #[tokio::test]
    async fn test_collect_poe_status() {
        let device = Arc::new(MockDevice::new(|request| match request.method {
            Method::Read => Ok(vec![
                record(&[(".id", "*1"), ("name", "ether2"), ("poe-priority", "10")]),
                record(&[(".id", "*2"), ("name", "ether3"), ("comment", "camera")]),
            ]),
            Method::Monitor if request.data["numbers"] == "*1" => Ok(vec![record(&[
                ("poe-out", "auto-on"),
                ("poe-out-status", "powered-on"),
                ("poe-out-current", "120"),
                ("poe-out-power", "2.9"),
                ("poe-out-voltage", "24.1"),
            ])]),
            Method::Monitor => Ok(vec![record(&[
                ("poe-out", "off"),
                ("poe-out-status", "disabled"),
                ("poe-out-voltage", "bogus"),
            ])]),
        }));

        let mut collector = PoeStatus::new(device.clone());
        let mut fragment = RegistryFragment::new("poe_status");
        collector.register(&mut fragment).unwrap();
        let shared = SharedRegistry::new();
        let _merged = shared.merge(fragment).unwrap();

        collector.collect().await.unwrap();

        assert_eq!(
            sample(
                &shared,
                "mikrotik_interface_ethernet_poe_status",
                &[("name", "ether2"), ("poe_out", "auto-on"), ("poe_priority", "10")]
            ),
            Some(1.0)
        );
        assert_eq!(
            sample(&shared, "mikrotik_interface_ethernet_poe_current", &[("name", "ether2")]),
            Some(120.0)
        );
        assert_eq!(
            sample(&shared, "mikrotik_interface_ethernet_poe_power", &[("name", "ether2")]),
            Some(2.9)
        );

        assert_eq!(
            sample(
                &shared,
                "mikrotik_interface_ethernet_poe_status",
                &[("name", "camera"), ("poe_out", "off"), ("poe_priority", "")]
            ),
            Some(0.0)
        );
        assert_eq!(
            sample(&shared, "mikrotik_interface_ethernet_poe_current", &[("name", "camera")]),
            Some(0.0)
        );
        assert_eq!(
            sample(&shared, "mikrotik_interface_ethernet_poe_voltage", &[("name", "camera")]),
            None
        );

        // One monitor request per port.
        let monitors: Vec<_> = device
            .requests()
            .into_iter()
            .filter(|r| r.method == Method::Monitor)
            .collect();
        assert_eq!(monitors.len(), 2);
        assert_eq!(monitors[0].path, "/interface/ethernet/poe");
    }
}
