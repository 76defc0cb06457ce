//! Network Interface Metrics Collector
//!
//! Collects per-port link speed, packet and error counters from `interfaces.json`.
//!
//! # Metrics Produced
//! - `speedport_interface_link_info` - Interface information (value is always 1)
//!   - Labels: interface, media
//! - `speedport_interface_speed_kbps` - Link speed, -1 when unknown
//!   - Labels: interface, direction (rx, tx)
//! - `speedport_interface_packets` - Packet counters
//!   - Labels: interface, direction (rx, tx)
//! - `speedport_interface_errors` - Error counters
//!   - Labels: interface, direction (rx, tx)
//! - `speedport_interface_up` - Link status (1=Up, 0=otherwise)
//!   - Labels: interface

use super::fields::{array, as_object, optional_number, optional_text, text, Object};
use super::Collector;
use crate::metrics::{set_bool, Metrics};
use crate::speedport::RawDeviceDocument;
use anyhow::{anyhow, Result};
use prometheus::{GaugeVec, IntGaugeVec};
use regex::Regex;
use std::sync::LazyLock;

pub const SUBSYSTEM: &str = "interface";
const ENDPOINT: &str = "interfaces";

/// Speed reported when the media type has no known speed format
pub const UNKNOWN_SPEED: f64 = -1.0;

static WLAN_SPEED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*Mbps\s*$").expect("valid WLAN speed pattern"));
static DSL_SPEED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"DownStream:\s*(\d+(?:\.\d+)?)\s*kbps\s+UpStream:\s*(\d+(?:\.\d+)?)\s*kbps")
        .expect("valid DSL speed pattern")
});

/// Receive and transmit speed in kbps for a `media`/`speed` pair.
///
/// - `WLAN` with `"866Mbps"` → (866000, 866000)
/// - `DSL` with `"DownStream:50000kbps UpStream:10000kbps"` → (50000, 10000)
/// - anything else, or an unparseable speed → (-1, -1)
pub fn link_speed_kbps(media: &str, speed: &str) -> (f64, f64) {
    let unknown = (UNKNOWN_SPEED, UNKNOWN_SPEED);
    match media {
        "WLAN" => WLAN_SPEED
            .captures(speed)
            .and_then(|c| c[1].parse::<f64>().ok())
            .map(|mbps| (mbps * 1000.0, mbps * 1000.0))
            .unwrap_or(unknown),
        "DSL" => DSL_SPEED
            .captures(speed)
            .and_then(|c| Some((c[1].parse::<f64>().ok()?, c[2].parse::<f64>().ok()?)))
            .unwrap_or(unknown),
        _ => unknown,
    }
}

struct InterfaceSample {
    name: String,
    media: String,
    speed: (f64, f64),
    packets: Option<(f64, f64)>,
    errors: Option<(f64, f64)>,
    up: bool,
}

fn pair(entry: &Object, rx: &str, tx: &str) -> Option<(f64, f64)> {
    Some((optional_number(entry, rx)?, optional_number(entry, tx)?))
}

fn sample(entry: &serde_json::Value) -> Result<InterfaceSample> {
    let entry = entry
        .as_object()
        .ok_or_else(|| anyhow!("interface entry is not an object"))?;
    let name = text(entry, "interface")?;
    let media = optional_text(entry, "media");
    let speed = link_speed_kbps(&media, &optional_text(entry, "speed"));
    Ok(InterfaceSample {
        media,
        speed,
        packets: pair(entry, "rx_packets", "tx_packets"),
        errors: pair(entry, "rx_errors", "tx_errors"),
        up: optional_text(entry, "status").eq_ignore_ascii_case("up"),
        name,
    })
}

pub struct InterfaceCollector {
    info: IntGaugeVec,
    speed: GaugeVec,
    packets: GaugeVec,
    errors: GaugeVec,
    up: GaugeVec,
}

impl InterfaceCollector {
    pub fn new(metrics: &Metrics) -> Result<Self> {
        let labels = &["interface", "direction"];
        Ok(Self {
            info: metrics.info_vec(
                SUBSYSTEM,
                "link",
                "Network interface information (value is always 1)",
                &["interface", "media"],
            )?,
            speed: metrics.gauge_vec(SUBSYSTEM, "speed_kbps", "Link speed, -1 when unknown", labels)?,
            packets: metrics.gauge_vec(SUBSYSTEM, "packets", "Packets transferred", labels)?,
            errors: metrics.gauge_vec(SUBSYSTEM, "errors", "Transfer errors", labels)?,
            up: metrics.gauge_vec(
                SUBSYSTEM,
                "up",
                "Link status (1=Up, 0=otherwise)",
                &["interface"],
            )?,
        })
    }
}

impl Collector for InterfaceCollector {
    fn subsystem(&self) -> &'static str {
        SUBSYSTEM
    }

    fn endpoint(&self) -> &str {
        ENDPOINT
    }

    fn parse(&self, document: &RawDeviceDocument) -> Result<()> {
        let samples = array(as_object(document)?, "line_status")?
            .iter()
            .map(sample)
            .collect::<Result<Vec<_>>>()?;

        self.info.reset();
        for s in &samples {
            let name = s.name.as_str();
            self.info.with_label_values(&[name, s.media.as_str()]).set(1);
            self.speed.with_label_values(&[name, "rx"]).set(s.speed.0);
            self.speed.with_label_values(&[name, "tx"]).set(s.speed.1);
            if let Some((rx, tx)) = s.packets {
                self.packets.with_label_values(&[name, "rx"]).set(rx);
                self.packets.with_label_values(&[name, "tx"]).set(tx);
            }
            if let Some((rx, tx)) = s.errors {
                self.errors.with_label_values(&[name, "rx"]).set(rx);
                self.errors.with_label_values(&[name, "tx"]).set(tx);
            }
            set_bool(&self.up, &[name], s.up);
        }
        Ok(())
    }
}
