//! Bonding Tunnel Metrics Collector
//!
//! Hybrid routers bond the DSL and LTE links into one tunnel. `bonding_tunnel.json`
//! exposes per-link traffic counters and latency.
//!
//! # Metrics Produced
//! - `speedport_bonding_tunnel_bytes` - Labels: link (dsl, lte), direction (rx, tx)
//! - `speedport_bonding_tunnel_rtt_milliseconds` - Labels: link
//! - `speedport_bonding_tunnel_up` - Tunnel state (1=up, 0=otherwise)

use super::fields::{as_object, number, text};
use super::Collector;
use crate::metrics::Metrics;
use crate::speedport::RawDeviceDocument;
use anyhow::Result;
use prometheus::{Gauge, GaugeVec};

pub const SUBSYSTEM: &str = "bonding_tunnel";

const LINKS: &[&str] = &["dsl", "lte"];

struct LinkSample {
    rx_bytes: f64,
    tx_bytes: f64,
    rtt_ms: f64,
}

pub struct BondingTunnelCollector {
    bytes: GaugeVec,
    rtt: GaugeVec,
    up: Gauge,
}

impl BondingTunnelCollector {
    pub fn new(metrics: &Metrics) -> Result<Self> {
        Ok(Self {
            bytes: metrics.gauge_vec(
                SUBSYSTEM,
                "bytes",
                "Bytes transferred through the tunnel per link",
                &["link", "direction"],
            )?,
            rtt: metrics.gauge_vec(
                SUBSYSTEM,
                "rtt_milliseconds",
                "Round-trip time per link",
                &["link"],
            )?,
            up: metrics.gauge(SUBSYSTEM, "up", "Tunnel state (1=up, 0=otherwise)")?,
        })
    }
}

impl Collector for BondingTunnelCollector {
    fn subsystem(&self) -> &'static str {
        SUBSYSTEM
    }

    fn parse(&self, document: &RawDeviceDocument) -> Result<()> {
        let data = as_object(document)?;
        let links = LINKS
            .iter()
            .map(|link| {
                Ok(LinkSample {
                    rx_bytes: number(data, &format!("{}_rx_bytes", link))?,
                    tx_bytes: number(data, &format!("{}_tx_bytes", link))?,
                    rtt_ms: number(data, &format!("{}_rtt_ms", link))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let up = text(data, "tunnel_state")?.eq_ignore_ascii_case("up");

        for (link, sample) in LINKS.iter().zip(&links) {
            self.bytes
                .with_label_values(&[*link, "rx"])
                .set(sample.rx_bytes);
            self.bytes
                .with_label_values(&[*link, "tx"])
                .set(sample.tx_bytes);
            self.rtt.with_label_values(&[*link]).set(sample.rtt_ms);
        }
        self.up.set(if up { 1.0 } else { 0.0 });
        Ok(())
    }
}
