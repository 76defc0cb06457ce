//! Memory and CPU Metrics Collector
//!
//! # Metrics Produced
//! - `speedport_memory_total_bytes` - Total memory (reported in kB by the device)
//! - `speedport_memory_free_bytes` - Free memory
//! - `speedport_memory_cpu_load_percent` - CPU load

use super::fields::{as_object, number};
use super::Collector;
use crate::metrics::Metrics;
use crate::speedport::RawDeviceDocument;
use anyhow::Result;
use prometheus::Gauge;

pub const SUBSYSTEM: &str = "memory";

const KIB: f64 = 1024.0;

pub struct MemoryCollector {
    total: Gauge,
    free: Gauge,
    cpu_load: Gauge,
}

impl MemoryCollector {
    pub fn new(metrics: &Metrics) -> Result<Self> {
        Ok(Self {
            total: metrics.gauge(SUBSYSTEM, "total_bytes", "Total memory in bytes")?,
            free: metrics.gauge(SUBSYSTEM, "free_bytes", "Free memory in bytes")?,
            cpu_load: metrics.gauge(SUBSYSTEM, "cpu_load_percent", "CPU load in percent")?,
        })
    }
}

impl Collector for MemoryCollector {
    fn subsystem(&self) -> &'static str {
        SUBSYSTEM
    }

    fn parse(&self, document: &RawDeviceDocument) -> Result<()> {
        let data = as_object(document)?;
        let total = number(data, "mem_total")? * KIB;
        let free = number(data, "mem_free")? * KIB;
        let cpu_load = number(data, "cpu_load")?;

        self.total.set(total);
        self.free.set(free);
        self.cpu_load.set(cpu_load);
        Ok(())
    }
}
