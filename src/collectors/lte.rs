//! LTE Metrics Collector
//!
//! Collects LTE modem and cell information from `lteinfo.json`.
//!
//! # Metrics Produced
//! - `speedport_lte_device_info` - Labels: imei, imsi, device_status, card_status, antenna_mode
//! - `speedport_lte_connection_info` - Labels: phycellid, cellid, tac, service_status, eps
//! - `speedport_lte_rsrp` - Reference signal received power
//! - `speedport_lte_rsrq` - Reference signal received quality

use super::fields::{as_object, number, text, Object};
use super::Collector;
use crate::metrics::Metrics;
use crate::speedport::RawDeviceDocument;
use anyhow::Result;
use prometheus::{Gauge, IntGaugeVec};

pub const SUBSYSTEM: &str = "lte";
const ENDPOINT: &str = "lteinfo";

const DEVICE_LABELS: &[&str] = &["imei", "imsi", "device_status", "card_status", "antenna_mode"];
const CONNECTION_LABELS: &[&str] = &["phycellid", "cellid", "tac", "service_status", "eps"];

pub struct LteCollector {
    device_info: IntGaugeVec,
    connection_info: IntGaugeVec,
    rsrp: Gauge,
    rsrq: Gauge,
}

impl LteCollector {
    pub fn new(metrics: &Metrics) -> Result<Self> {
        Ok(Self {
            device_info: metrics.info_vec(
                SUBSYSTEM,
                "device",
                "LTE device information",
                DEVICE_LABELS,
            )?,
            connection_info: metrics.info_vec(
                SUBSYSTEM,
                "connection",
                "LTE cell information",
                CONNECTION_LABELS,
            )?,
            rsrp: metrics.gauge(SUBSYSTEM, "rsrp", "LTE RSRP")?,
            rsrq: metrics.gauge(SUBSYSTEM, "rsrq", "LTE RSRQ")?,
        })
    }
}

fn label_values(data: &Object, keys: &[&str]) -> Result<Vec<String>> {
    keys.iter().map(|key| text(data, key)).collect()
}

fn as_refs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

impl Collector for LteCollector {
    fn subsystem(&self) -> &'static str {
        SUBSYSTEM
    }

    fn endpoint(&self) -> &str {
        ENDPOINT
    }

    fn parse(&self, document: &RawDeviceDocument) -> Result<()> {
        let data = as_object(document)?;
        let device = label_values(data, DEVICE_LABELS)?;
        let connection = label_values(data, CONNECTION_LABELS)?;
        let rsrp = number(data, "rsrp")?;
        let rsrq = number(data, "rsrq")?;

        self.device_info.reset();
        self.device_info.with_label_values(&as_refs(&device)).set(1);
        self.connection_info.reset();
        self.connection_info
            .with_label_values(&as_refs(&connection))
            .set(1);
        self.rsrp.set(rsrp);
        self.rsrq.set(rsrq);
        Ok(())
    }
}
