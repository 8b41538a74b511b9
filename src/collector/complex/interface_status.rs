//! Ethernet link status via `/interface/ethernet/monitor`.

use std::sync::Arc;

use prometheus::GaugeVec;

use super::{display_name, parse_rate, register_gauge};
use crate::collector::{Collector, CollectorError};
use crate::device::{self, DeviceClient};
use crate::exposition::RegistryFragment;

const PATH: &str = "/interface/ethernet";

struct Gauges {
    status: GaugeVec,
    rate: GaugeVec,
    full_duplex: GaugeVec,
    sfp_temperature: GaugeVec,
}

/// Link status, rate, duplex and SFP temperature of every ethernet port.
pub struct InterfaceStatus {
    client: Arc<dyn DeviceClient>,
    gauges: Option<Gauges>,
}

impl InterfaceStatus {
    pub fn new(client: Arc<dyn DeviceClient>) -> Self {
        Self {
            client,
            gauges: None,
        }
    }
}

#[async_trait::async_trait]
impl Collector for InterfaceStatus {
    fn name(&self) -> &str {
        "interface_status"
    }

    fn register(&mut self, fragment: &mut RegistryFragment) -> Result<(), CollectorError> {
        self.gauges = Some(Gauges {
            full_duplex: register_gauge(
                fragment,
                "full_duplex",
                "Full duplex data transmission",
                &["name"],
            )?,
            rate: register_gauge(
                fragment,
                "rate",
                "Actual interface connection data rate",
                &["name"],
            )?,
            status: register_gauge(fragment, "status", "Current interface link status", &["name"])?,
            sfp_temperature: register_gauge(
                fragment,
                "sfp_temperature",
                "Current SFP temperature",
                &["name"],
            )?,
        });
        Ok(())
    }

    async fn collect(&self) -> Result<(), CollectorError> {
        let gauges = self
            .gauges
            .as_ref()
            .ok_or_else(|| CollectorError::Registration("interface_status not registered".into()))?;

        let interfaces = device::read(self.client.as_ref(), PATH, &[]).await?;
        for iface in &interfaces {
            let Some(id) = iface.get(".id") else {
                continue;
            };
            let name = display_name(iface);

            let replies = device::monitor(self.client.as_ref(), PATH, id).await?;
            let Some(state) = replies.first() else {
                tracing::warn!(id = %id, "Monitor returned an empty response");
                continue;
            };

            let link_ok = state.get("status") == Some("link-ok");
            gauges
                .status
                .with_label_values(&[name])
                .set(if link_ok { 1.0 } else { 0.0 });

            gauges
                .rate
                .with_label_values(&[name])
                .set(parse_rate(state.get_or_empty("rate")).unwrap_or(0.0));

            let duplex = state.get("full-duplex") == Some("true");
            gauges
                .full_duplex
                .with_label_values(&[name])
                .set(if duplex { 1.0 } else { 0.0 });

            if let Some(temp) = state.get("sfp-temperature") {
                match temp.trim().parse::<f64>() {
                    Ok(value) => gauges.sfp_temperature.with_label_values(&[name]).set(value),
                    Err(e) => tracing::warn!(
                        field = "sfp-temperature",
                        value = %temp,
                        error = %e,
                        "Failed to extract value from resource"
                    ),
                }
            }
        }

        tracing::debug!(interfaces = interfaces.len(), "Interface status collected");
        Ok(())
    }
}
