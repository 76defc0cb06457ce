//! Module / Firmware Metrics Collector
//!
//! `Module.json` is a typed variable list (`varid`/`varvalue`) describing the
//! firmware and hardware modules of the router. It is folded into a flat map
//! before extraction.
//!
//! # Metrics Produced
//! - `speedport_module_module_info` - One series per scalar variable (value is always 1)
//!   - Labels: key, value
//! - `speedport_module_uptime_seconds` - Device uptime, when reported

use super::fields::{optional_number, scalar_pairs};
use super::Collector;
use crate::metrics::Metrics;
use crate::speedport::{fold_variables, RawDeviceDocument};
use anyhow::Result;
use prometheus::{Gauge, IntGaugeVec};

pub const SUBSYSTEM: &str = "module";
const ENDPOINT: &str = "Module";
const UPTIME_KEY: &str = "uptime";

pub struct ModuleCollector {
    info: IntGaugeVec,
    uptime: Gauge,
}

impl ModuleCollector {
    pub fn new(metrics: &Metrics) -> Result<Self> {
        Ok(Self {
            info: metrics.info_vec(
                SUBSYSTEM,
                "module",
                "Firmware and module information",
                &["key", "value"],
            )?,
            uptime: metrics.gauge(SUBSYSTEM, "uptime_seconds", "Device uptime in seconds")?,
        })
    }
}

impl Collector for ModuleCollector {
    fn subsystem(&self) -> &'static str {
        SUBSYSTEM
    }

    fn endpoint(&self) -> &str {
        ENDPOINT
    }

    fn parse(&self, document: &RawDeviceDocument) -> Result<()> {
        let folded = fold_variables(ENDPOINT, document)?;
        let uptime = optional_number(&folded, UPTIME_KEY);
        let pairs: Vec<_> = scalar_pairs(&folded)
            .into_iter()
            .filter(|(key, _)| key != UPTIME_KEY)
            .collect();

        self.info.reset();
        for (key, value) in &pairs {
            self.info
                .with_label_values(&[key.as_str(), value.as_str()])
                .set(1);
        }
        if let Some(uptime) = uptime {
            self.uptime.set(uptime);
        }
        Ok(())
    }
}
