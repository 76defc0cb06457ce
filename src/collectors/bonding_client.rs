//! Bonding Configuration Metrics Collector
//!
//! Reads the bonding client configuration from `bonding_client.json`.
//!
//! # Metrics Produced
//! - `speedport_bonding_client_enabled` - Labels: feature (bonding, dsl, lte)
//! - `speedport_bonding_client_server_info` - Labels: server

use super::fields::{as_object, flag, optional_text};
use super::Collector;
use crate::metrics::{set_bool, Metrics};
use crate::speedport::RawDeviceDocument;
use anyhow::Result;
use prometheus::{GaugeVec, IntGaugeVec};

pub const SUBSYSTEM: &str = "bonding_client";

/// Feature label and document field
const FEATURES: &[(&str, &str)] = &[
    ("bonding", "bonding"),
    ("dsl", "dsl_enabled"),
    ("lte", "lte_enabled"),
];

pub struct BondingClientCollector {
    enabled: GaugeVec,
    server: IntGaugeVec,
}

impl BondingClientCollector {
    pub fn new(metrics: &Metrics) -> Result<Self> {
        Ok(Self {
            enabled: metrics.gauge_vec(
                SUBSYSTEM,
                "enabled",
                "Bonding feature state (1=enabled, 0=disabled)",
                &["feature"],
            )?,
            server: metrics.info_vec(SUBSYSTEM, "server", "Bonding tunnel server", &["server"])?,
        })
    }
}

impl Collector for BondingClientCollector {
    fn subsystem(&self) -> &'static str {
        SUBSYSTEM
    }

    fn parse(&self, document: &RawDeviceDocument) -> Result<()> {
        let data = as_object(document)?;
        let states = FEATURES
            .iter()
            .map(|(_, field)| flag(data, field))
            .collect::<Result<Vec<_>>>()?;
        let server = optional_text(data, "server");

        for ((feature, _), state) in FEATURES.iter().zip(states) {
            set_bool(&self.enabled, &[*feature], state);
        }
        self.server.reset();
        if !server.is_empty() {
            self.server.with_label_values(&[server.as_str()]).set(1);
        }
        Ok(())
    }
}
