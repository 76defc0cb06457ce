//! PPPoE Session Metrics Collector
//!
//! # Metrics Produced
//! - `speedport_pppoe_session_up` - Session state (1=connected, 0=otherwise)
//! - `speedport_pppoe_session_uptime_seconds` - Session uptime
//! - `speedport_pppoe_session_session_info` - Labels: session_id

use super::fields::{as_object, number, optional_text, text};
use super::Collector;
use crate::metrics::Metrics;
use crate::speedport::RawDeviceDocument;
use anyhow::Result;
use prometheus::{Gauge, IntGaugeVec};

pub const SUBSYSTEM: &str = "pppoe_session";
const ENDPOINT: &str = "PPPoE_Session";

pub struct PppoeSessionCollector {
    up: Gauge,
    uptime: Gauge,
    info: IntGaugeVec,
}

impl PppoeSessionCollector {
    pub fn new(metrics: &Metrics) -> Result<Self> {
        Ok(Self {
            up: metrics.gauge(SUBSYSTEM, "up", "PPPoE session state (1=connected, 0=otherwise)")?,
            uptime: metrics.gauge(SUBSYSTEM, "uptime_seconds", "PPPoE session uptime")?,
            info: metrics.info_vec(SUBSYSTEM, "session", "PPPoE session", &["session_id"])?,
        })
    }
}

impl Collector for PppoeSessionCollector {
    fn subsystem(&self) -> &'static str {
        SUBSYSTEM
    }

    fn endpoint(&self) -> &str {
        ENDPOINT
    }

    fn parse(&self, document: &RawDeviceDocument) -> Result<()> {
        let data = as_object(document)?;
        let connected = text(data, "state")?.eq_ignore_ascii_case("connected");
        let uptime = number(data, "uptime")?;
        let session_id = optional_text(data, "session_id");

        self.up.set(if connected { 1.0 } else { 0.0 });
        self.uptime.set(uptime);
        self.info.reset();
        self.info.with_label_values(&[session_id.as_str()]).set(1);
        Ok(())
    }
}
