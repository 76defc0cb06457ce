//! Metrics Collectors
//!
//! Each subsystem of the Speedport web interface (DSL line, LTE radio,
//! interfaces, ...) is served by one [`Collector`] bound to one
//! `/data/{endpoint}.json` resource.
//!
//! # Architecture
//!
//! Collectors follow a consistent pattern:
//! - Build their own Prometheus instruments from [`Metrics`] at startup
//! - Receive the decoded document of their endpoint
//! - Extract every value first, then write the metrics
//!
//! Extraction before writing means a document that fails to parse leaves the
//! previously published values untouched.
//!
//! # Error Handling
//!
//! [`CollectorRegistry::collect_all`] runs all collectors concurrently, each in
//! its own task. A fetch error, parse error, or panic in one collector is
//! logged with its subsystem name and reported as a failed
//! [`CollectionResult`]; siblings are never affected.

use crate::config::CollectorsConfig;
use crate::metrics::{CollectionMetrics, Metrics};
use crate::speedport::{EndpointFetcher, RawDeviceDocument};
use anyhow::anyhow;
use futures_util::future::join_all;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

pub mod bonding_client;
pub mod bonding_tunnel;
pub mod dsl;
pub mod fields;
pub mod interface;
pub mod lte;
pub mod memory;
pub mod module;
pub mod pppoe_session;

pub use bonding_client::BondingClientCollector;
pub use bonding_tunnel::BondingTunnelCollector;
pub use dsl::DslCollector;
pub use interface::InterfaceCollector;
pub use lte::LteCollector;
pub use memory::MemoryCollector;
pub use module::ModuleCollector;
pub use pppoe_session::PppoeSessionCollector;

/// Every subsystem the exporter knows, in registration order
pub const SUBSYSTEMS: &[&str] = &[
    dsl::SUBSYSTEM,
    lte::SUBSYSTEM,
    interface::SUBSYSTEM,
    module::SUBSYSTEM,
    bonding_tunnel::SUBSYSTEM,
    bonding_client::SUBSYSTEM,
    memory::SUBSYSTEM,
    pppoe_session::SUBSYSTEM,
];

/// A metric subsystem bound to one device endpoint
pub trait Collector: Send + Sync {
    /// Stable subsystem name used in logs and the `subsystem` label
    fn subsystem(&self) -> &'static str;

    /// Name of the `/data/{endpoint}.json` resource
    fn endpoint(&self) -> &str {
        self.subsystem()
    }

    /// Write the values of `document` into this collector's instruments.
    ///
    /// Implementations must not write anything when they return an error.
    fn parse(&self, document: &RawDeviceDocument) -> anyhow::Result<()>;
}

/// Status of one collector in a collection pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    /// Metrics were successfully collected and updated
    Success,
    /// Collection failed; previously published values are kept
    Failed,
}

/// Outcome of one collector in a collection pass
#[derive(Debug, Clone)]
pub struct CollectionResult {
    pub subsystem: &'static str,
    pub status: CollectionStatus,
    pub duration: Duration,
    pub finished_at: SystemTime,
    pub error: Option<String>,
}

impl CollectionResult {
    pub fn is_success(&self) -> bool {
        self.status == CollectionStatus::Success
    }
}

/// Fixed set of collectors sharing one endpoint fetcher
pub struct CollectorRegistry {
    collectors: Vec<Arc<dyn Collector>>,
    fetcher: Arc<EndpointFetcher>,
    metrics: CollectionMetrics,
}

impl CollectorRegistry {
    pub fn new(
        collectors: Vec<Arc<dyn Collector>>,
        fetcher: Arc<EndpointFetcher>,
        metrics: CollectionMetrics,
    ) -> Self {
        Self {
            collectors,
            fetcher,
            metrics,
        }
    }

    pub fn subsystems(&self) -> Vec<&'static str> {
        self.collectors.iter().map(|c| c.subsystem()).collect()
    }

    /// Run every collector concurrently and wait until all of them finished.
    ///
    /// Each collector is timed and recorded inside its own task, so dropping
    /// the returned future does not cancel a pass that is already running.
    /// Results are returned in registration order.
    pub async fn collect_all(&self) -> Vec<CollectionResult> {
        let passes = self.collectors.iter().map(|collector| {
            let collector = Arc::clone(collector);
            let fetcher = Arc::clone(&self.fetcher);
            let metrics = self.metrics.clone();
            let subsystem = collector.subsystem();
            let task = tokio::spawn(run_collector(collector, fetcher, metrics.clone()));
            async move {
                let started = Instant::now();
                task.await.unwrap_or_else(|e| {
                    record(
                        &metrics,
                        subsystem,
                        started.elapsed(),
                        Err(anyhow!("collector task aborted: {}", e)),
                    )
                })
            }
        });

        join_all(passes).await
    }
}

/// Fetch, parse, and record one collector
async fn run_collector(
    collector: Arc<dyn Collector>,
    fetcher: Arc<EndpointFetcher>,
    metrics: CollectionMetrics,
) -> CollectionResult {
    let subsystem = collector.subsystem();
    let started = Instant::now();
    let outcome = AssertUnwindSafe(async {
        let document = fetcher.fetch(collector.endpoint()).await?;
        collector.parse(&document)
    })
    .catch_unwind()
    .await
    .unwrap_or_else(|panic| Err(anyhow!("collector panicked: {}", panic_message(&*panic))));
    record(&metrics, subsystem, started.elapsed(), outcome)
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn record(
    metrics: &CollectionMetrics,
    subsystem: &'static str,
    duration: Duration,
    outcome: anyhow::Result<()>,
) -> CollectionResult {
    metrics
        .duration
        .with_label_values(&[subsystem])
        .observe(duration.as_secs_f64());
    let finished_at = SystemTime::now();

    match outcome {
        Ok(()) => {
            let timestamp = finished_at
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs_f64();
            metrics
                .last_success
                .with_label_values(&[subsystem])
                .set(timestamp);
            debug!("Updated {} metrics in {:?}", subsystem, duration);
            CollectionResult {
                subsystem,
                status: CollectionStatus::Success,
                duration,
                finished_at,
                error: None,
            }
        }
        Err(e) => {
            metrics.failures.with_label_values(&[subsystem]).inc();
            warn!("Failed to collect {} metrics: {:#}", subsystem, e);
            CollectionResult {
                subsystem,
                status: CollectionStatus::Failed,
                duration,
                finished_at,
                error: Some(format!("{:#}", e)),
            }
        }
    }
}

/// Build the collectors enabled in `config`, registering their instruments
pub fn build_collectors(
    metrics: &Metrics,
    config: &CollectorsConfig,
) -> anyhow::Result<Vec<Arc<dyn Collector>>> {
    let mut collectors: Vec<Arc<dyn Collector>> = Vec::new();
    for subsystem in SUBSYSTEMS {
        if !config.is_enabled(subsystem) {
            continue;
        }
        let collector: Arc<dyn Collector> = match *subsystem {
            dsl::SUBSYSTEM => Arc::new(DslCollector::new(metrics)?),
            lte::SUBSYSTEM => Arc::new(LteCollector::new(metrics)?),
            interface::SUBSYSTEM => Arc::new(InterfaceCollector::new(metrics)?),
            module::SUBSYSTEM => Arc::new(ModuleCollector::new(metrics)?),
            bonding_tunnel::SUBSYSTEM => Arc::new(BondingTunnelCollector::new(metrics)?),
            bonding_client::SUBSYSTEM => Arc::new(BondingClientCollector::new(metrics)?),
            memory::SUBSYSTEM => Arc::new(MemoryCollector::new(metrics)?),
            pppoe_session::SUBSYSTEM => Arc::new(PppoeSessionCollector::new(metrics)?),
            other => anyhow::bail!("unknown collector '{}'", other),
        };
        collectors.push(collector);
    }
    Ok(collectors)
}
