//! Prometheus Metrics Definitions
//!
//! This module owns the Prometheus [`Registry`] and the instruments shared by the
//! exporter's plumbing. Subsystem collectors do not look metrics up through
//! global state: each collector builds its own instruments through
//! [`Metrics::gauge_vec`] / [`Metrics::gauge`] at startup and keeps the handles.
//!
//! # Metric Categories
//!
//! ## Client
//! - Login, heartbeat, and per-file fetch durations and failure counts
//!
//! ## Collection
//! - Per-subsystem collection duration, failures, and last successful collection
//! - `speedport_up` and `speedport_session_authenticated`
//!
//! ## Subsystems
//! - DSL, LTE, interfaces, module, bonding, memory, PPPoE (see [`crate::collectors`])
//!
//! All metrics use the `speedport_` namespace prefix.

use prometheus::{
    Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

pub const NAMESPACE: &str = "speedport";

/// Instruments recorded by the device client
#[derive(Clone)]
pub struct ClientMetrics {
    pub login_duration: Histogram,
    pub login_failures: IntCounter,
    pub heartbeat_duration: Histogram,
    pub heartbeat_failures: IntCounter,
    pub fetch_duration: HistogramVec,
    pub fetch_failures: IntCounterVec,
}

/// Instruments recorded by the collector registry
#[derive(Clone)]
pub struct CollectionMetrics {
    pub duration: HistogramVec,
    pub failures: IntCounterVec,
    pub last_success: GaugeVec,
}

/// Metrics registry for the Speedport exporter
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    pub client: ClientMetrics,
    pub collection: CollectionMetrics,

    pub up: Gauge,
    pub session_authenticated: IntGauge,
    pub exporter_info: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let client_ns = format!("{}_client", NAMESPACE);

        let login_duration = Histogram::with_opts(
            HistogramOpts::new("login_processing_seconds", "Time spent in the login method")
                .namespace(client_ns.as_str()),
        )?;
        let login_failures = IntCounter::with_opts(
            Opts::new("login_exceptions_total", "Failures in the login method")
                .namespace(client_ns.as_str()),
        )?;
        let heartbeat_duration = Histogram::with_opts(
            HistogramOpts::new(
                "heartbeat_processing_seconds",
                "Time spent in the heartbeat method",
            )
            .namespace(client_ns.as_str()),
        )?;
        let heartbeat_failures = IntCounter::with_opts(
            Opts::new("heartbeat_exceptions_total", "Failures in the heartbeat method")
                .namespace(client_ns.as_str()),
        )?;
        let fetch_duration = HistogramVec::new(
            HistogramOpts::new(
                "fetching_processing_seconds",
                "Time spent fetching a data file",
            )
            .namespace(client_ns.as_str()),
            &["file"],
        )?;
        let fetch_failures = IntCounterVec::new(
            Opts::new("fetching_exceptions_total", "Failures fetching a data file")
                .namespace(client_ns.as_str()),
            &["file"],
        )?;

        let collection_duration = HistogramVec::new(
            HistogramOpts::new(
                "collection_duration_seconds",
                "Duration of one subsystem collection",
            )
            .namespace(NAMESPACE),
            &["subsystem"],
        )?;
        let collection_failures = IntCounterVec::new(
            Opts::new(
                "collection_exceptions_total",
                "Failures occurring during the collection",
            )
            .namespace(NAMESPACE),
            &["subsystem"],
        )?;
        let last_success = GaugeVec::new(
            Opts::new(
                "collect_time_seconds",
                "Unix time of the last successful collection",
            )
            .namespace(NAMESPACE),
            &["subsystem"],
        )?;

        let up = Gauge::new(
            "speedport_up",
            "Whether the last collection pass reached the Speedport (1=up, 0=down)",
        )?;
        let session_authenticated = IntGauge::new(
            "speedport_session_authenticated",
            "Whether the exporter holds an authenticated session (1=yes, 0=no)",
        )?;
        let exporter_info = IntGaugeVec::new(
            Opts::new(
                "exporter_info",
                "Version information about the speedport exporter",
            )
            .namespace(NAMESPACE),
            &["version"],
        )?;
        exporter_info
            .with_label_values(&[env!("CARGO_PKG_VERSION")])
            .set(1);

        registry.register(Box::new(login_duration.clone()))?;
        registry.register(Box::new(login_failures.clone()))?;
        registry.register(Box::new(heartbeat_duration.clone()))?;
        registry.register(Box::new(heartbeat_failures.clone()))?;
        registry.register(Box::new(fetch_duration.clone()))?;
        registry.register(Box::new(fetch_failures.clone()))?;
        registry.register(Box::new(collection_duration.clone()))?;
        registry.register(Box::new(collection_failures.clone()))?;
        registry.register(Box::new(last_success.clone()))?;
        registry.register(Box::new(up.clone()))?;
        registry.register(Box::new(session_authenticated.clone()))?;
        registry.register(Box::new(exporter_info.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            client: ClientMetrics {
                login_duration,
                login_failures,
                heartbeat_duration,
                heartbeat_failures,
                fetch_duration,
                fetch_failures,
            },
            collection: CollectionMetrics {
                duration: collection_duration,
                failures: collection_failures,
                last_success,
            },
            up,
            session_authenticated,
            exporter_info,
        })
    }

    /// Create and register a labelled gauge named `speedport_{subsystem}_{name}`
    pub fn gauge_vec(
        &self,
        subsystem: &str,
        name: &str,
        help: &str,
        labels: &[&str],
    ) -> anyhow::Result<GaugeVec> {
        let gauge = GaugeVec::new(
            Opts::new(name, help)
                .namespace(NAMESPACE)
                .subsystem(subsystem),
            labels,
        )?;
        self.registry.register(Box::new(gauge.clone()))?;
        Ok(gauge)
    }

    /// Create and register an unlabelled gauge named `speedport_{subsystem}_{name}`
    pub fn gauge(&self, subsystem: &str, name: &str, help: &str) -> anyhow::Result<Gauge> {
        let gauge = Gauge::with_opts(
            Opts::new(name, help)
                .namespace(NAMESPACE)
                .subsystem(subsystem),
        )?;
        self.registry.register(Box::new(gauge.clone()))?;
        Ok(gauge)
    }

    /// Create and register an info-style gauge (value is always 1)
    pub fn info_vec(
        &self,
        subsystem: &str,
        name: &str,
        help: &str,
        labels: &[&str],
    ) -> anyhow::Result<IntGaugeVec> {
        let info = IntGaugeVec::new(
            Opts::new(format!("{}_info", name), help)
                .namespace(NAMESPACE)
                .subsystem(subsystem),
            labels,
        )?;
        self.registry.register(Box::new(info.clone()))?;
        Ok(info)
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Runs `operation`, observing its duration on `duration` and counting an
/// `Err` outcome on `failures`.
pub async fn instrumented<T, E, F>(
    duration: &Histogram,
    failures: &IntCounter,
    operation: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let result = operation.await;
    duration.observe(started.elapsed().as_secs_f64());
    if result.is_err() {
        failures.inc();
    }
    result
}

/// Set a gauge to 1 or 0
pub fn set_bool(gauge: &GaugeVec, labels: &[&str], value: bool) {
    gauge
        .with_label_values(labels)
        .set(if value { 1.0 } else { 0.0 });
}
