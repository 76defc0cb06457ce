//! DSL Line Metrics Collector
//!
//! Collects DSL connection information and line statistics from `dsl.json`.
//!
//! # Metrics Produced
//! - `speedport_dsl_connection_info` - Connection attributes (value is always 1)
//!   - Labels: key, value
//! - `speedport_dsl_actual_data_rate_kbps`, `speedport_dsl_attainable_data_rate_kbps`
//! - `speedport_dsl_snr`, `speedport_dsl_signal`, `speedport_dsl_line`
//! - `speedport_dsl_fec_size`, `speedport_dsl_codeword_size`, `speedport_dsl_interleave`
//! - `speedport_dsl_crc_error_count`, `speedport_dsl_hec_error_count`, `speedport_dsl_fec_error_count`
//!
//! All line gauges carry the label `direction` (upload, download).

use super::fields::{as_object, number, object, scalar_pairs};
use super::Collector;
use crate::metrics::Metrics;
use crate::speedport::RawDeviceDocument;
use anyhow::Result;
use prometheus::{GaugeVec, IntGaugeVec};

pub const SUBSYSTEM: &str = "dsl";

/// Line gauges: metric name, help, upload field, download field
const LINE_FIELDS: &[(&str, &str, &str, &str)] = &[
    ("actual_data_rate_kbps", "Actual data rate", "uactual", "dactual"),
    (
        "attainable_data_rate_kbps",
        "Attainable data rate",
        "uattainable",
        "dattainable",
    ),
    ("snr", "SNR margin", "uSNR", "dSNR"),
    ("signal", "Signal level", "uSignal", "dSignal"),
    ("line", "Line attenuation", "uLine", "dLine"),
    ("fec_size", "FEC size", "uFEC_size", "dFEC_size"),
    ("codeword_size", "Codeword size", "uCodeword", "dCodeword"),
    ("interleave", "Interleave delay", "uInterleave", "dInterleave"),
    (
        "crc_error_count",
        "CRC (Cyclic Redundancy Check) error count",
        "uCRC",
        "dCRC",
    ),
    (
        "hec_error_count",
        "HEC (Header Error Correction) error count",
        "uHEC",
        "dHEC",
    ),
    (
        "fec_error_count",
        "FEC (Forward Error Correction) error count",
        "uFEC",
        "dFEC",
    ),
];

pub struct DslCollector {
    connection_info: IntGaugeVec,
    line: Vec<GaugeVec>,
}

impl DslCollector {
    pub fn new(metrics: &Metrics) -> Result<Self> {
        let connection_info = metrics.info_vec(
            SUBSYSTEM,
            "connection",
            "DSL connection information",
            &["key", "value"],
        )?;
        let line = LINE_FIELDS
            .iter()
            .map(|(name, help, _, _)| metrics.gauge_vec(SUBSYSTEM, name, help, &["direction"]))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            connection_info,
            line,
        })
    }
}

impl Collector for DslCollector {
    fn subsystem(&self) -> &'static str {
        SUBSYSTEM
    }

    fn parse(&self, document: &RawDeviceDocument) -> Result<()> {
        let root = as_object(document)?;
        let connection = scalar_pairs(object(root, "Connection")?);
        let line = object(root, "Line")?;

        let values = LINE_FIELDS
            .iter()
            .map(|(_, _, up, down)| Ok((number(line, up)?, number(line, down)?)))
            .collect::<Result<Vec<_>>>()?;

        self.connection_info.reset();
        for (key, value) in &connection {
            self.connection_info
                .with_label_values(&[key.as_str(), value.as_str()])
                .set(1);
        }
        for (gauge, (upload, download)) in self.line.iter().zip(values) {
            gauge.with_label_values(&["upload"]).set(upload);
            gauge.with_label_values(&["download"]).set(download);
        }
        Ok(())
    }
}
