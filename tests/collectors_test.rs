//! Collector registry and subsystem collector tests

mod common;

use anyhow::anyhow;
use common::*;
use serde_json::json;
use speedport_exporter::collectors::{
    build_collectors, Collector, CollectionStatus, CollectorRegistry, DslCollector,
    InterfaceCollector, LteCollector, MemoryCollector, ModuleCollector, SUBSYSTEMS,
};
use speedport_exporter::config::CollectorsConfig;
use speedport_exporter::metrics::Metrics;
use speedport_exporter::speedport::{EndpointFetcher, RawDeviceDocument};
use std::sync::Arc;
use std::time::Duration;

fn create_test_metrics() -> Metrics {
    Metrics::new().expect("Failed to create metrics")
}

/// Value of the first sample of `name` carrying all `labels`
fn metric_value(rendered: &str, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    rendered
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter(|line| {
            line.strip_prefix(name)
                .is_some_and(|rest| rest.starts_with('{') || rest.starts_with(' '))
        })
        .find(|line| {
            labels
                .iter()
                .all(|(k, v)| line.contains(&format!("{}=\"{}\"", k, v)))
        })
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}

fn dsl_document() -> String {
    json!({
        "Connection": {"state": "Up", "mode": "VDSL2"},
        "Line": {
            "uactual": 10000, "dactual": 50000,
            "uattainable": 12000, "dattainable": "61000",
            "uSNR": 9, "dSNR": 7, "uSignal": 1, "dSignal": 2,
            "uLine": 3, "dLine": 4, "uFEC_size": 5, "dFEC_size": 6,
            "uCodeword": 7, "dCodeword": 8, "uInterleave": 9, "dInterleave": 10,
            "uCRC": 11, "dCRC": 12, "uHEC": 13, "dHEC": 14, "uFEC": 15, "dFEC": 16
        }
    })
    .to_string()
}

fn lte_document() -> String {
    // Near-JSON as served by the device
    "{imei: '123456789012345', imsi: '262011234567890', device_status: 'Ready', \
     card_status: 'OK', antenna_mode: 'internal', phycellid: 42, cellid: '0x1A2B', \
     tac: 4711, service_status: 'normal', eps: 'registered', rsrp: '-92', rsrq: -11,}"
        .to_string()
}

fn memory_document(total_kb: u64) -> String {
    json!({"mem_total": total_kb, "mem_free": 500, "cpu_load": "12.5"}).to_string()
}

/// Authenticated session, fetcher, and registry for `collectors`
async fn registry_with(
    transport: Arc<MockTransport>,
    metrics: &Metrics,
    collectors: Vec<Arc<dyn Collector>>,
) -> CollectorRegistry {
    let session = Arc::new(session_manager(transport, metrics));
    session.login().await.expect("login");
    let fetcher = Arc::new(EndpointFetcher::new(session, metrics.client.clone()));
    CollectorRegistry::new(collectors, fetcher, metrics.collection.clone())
}

struct FailingCollector;

impl Collector for FailingCollector {
    fn subsystem(&self) -> &'static str {
        "failing"
    }

    fn endpoint(&self) -> &str {
        "dsl"
    }

    fn parse(&self, _document: &RawDeviceDocument) -> anyhow::Result<()> {
        Err(anyhow!("schema changed"))
    }
}

struct PanickingCollector;

impl Collector for PanickingCollector {
    fn subsystem(&self) -> &'static str {
        "panicking"
    }

    fn endpoint(&self) -> &str {
        "dsl"
    }

    fn parse(&self, _document: &RawDeviceDocument) -> anyhow::Result<()> {
        panic!("unexpected document")
    }
}

#[tokio::test]
async fn test_one_failing_collector_does_not_affect_siblings() {
    // Given: Three working collectors and one whose parser fails
    let transport = MockTransport::new().with_device("1");
    transport.reply("/data/dsl.json", 200, dsl_document());
    transport.reply("/data/lteinfo.json", 200, lte_document());
    transport.reply("/data/memory.json", 200, memory_document(1000));
    let metrics = create_test_metrics();
    let collectors: Vec<Arc<dyn Collector>> = vec![
        Arc::new(DslCollector::new(&metrics).unwrap()),
        Arc::new(FailingCollector),
        Arc::new(LteCollector::new(&metrics).unwrap()),
        Arc::new(MemoryCollector::new(&metrics).unwrap()),
    ];
    let registry = registry_with(transport, &metrics, collectors).await;

    // When: Running a collection pass
    let results = registry.collect_all().await;

    // Then: Every collector reports, exactly one failed
    assert_eq!(results.len(), 4);
    let failed: Vec<_> = results
        .iter()
        .filter(|r| r.status == CollectionStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].subsystem, "failing");
    assert!(failed[0].error.as_deref().unwrap().contains("schema changed"));

    // And: The other subsystems published their values
    let rendered = metrics.render().unwrap();
    assert_eq!(
        metric_value(
            &rendered,
            "speedport_dsl_actual_data_rate_kbps",
            &[("direction", "download")]
        ),
        Some(50000.0)
    );
    assert_eq!(
        metric_value(
            &rendered,
            "speedport_dsl_attainable_data_rate_kbps",
            &[("direction", "download")]
        ),
        Some(61000.0)
    );
    assert_eq!(
        metric_value(
            &rendered,
            "speedport_dsl_hec_error_count",
            &[("direction", "download")]
        ),
        Some(14.0)
    );
    assert_eq!(metric_value(&rendered, "speedport_lte_rsrp", &[]), Some(-92.0));
    assert_eq!(metric_value(&rendered, "speedport_lte_rsrq", &[]), Some(-11.0));
    assert_eq!(
        metric_value(
            &rendered,
            "speedport_lte_device_info",
            &[("imei", "123456789012345"), ("card_status", "OK")]
        ),
        Some(1.0)
    );
    assert_eq!(
        metric_value(&rendered, "speedport_memory_total_bytes", &[]),
        Some(1_024_000.0)
    );
    assert_eq!(
        metric_value(&rendered, "speedport_memory_cpu_load_percent", &[]),
        Some(12.5)
    );

    // And: Failures and last successes are recorded per subsystem
    assert_eq!(
        metrics
            .collection
            .failures
            .with_label_values(&["failing"])
            .get(),
        1
    );
    assert_eq!(
        metrics
            .collection
            .last_success
            .with_label_values(&["failing"])
            .get(),
        0.0
    );
    assert!(
        metrics
            .collection
            .last_success
            .with_label_values(&["dsl"])
            .get()
            > 0.0
    );
}

#[tokio::test]
async fn test_panicking_collector_is_contained() {
    let transport = MockTransport::new().with_device("1");
    transport.reply("/data/dsl.json", 200, dsl_document());
    let metrics = create_test_metrics();
    let collectors: Vec<Arc<dyn Collector>> = vec![
        Arc::new(PanickingCollector),
        Arc::new(DslCollector::new(&metrics).unwrap()),
    ];
    let registry = registry_with(transport, &metrics, collectors).await;

    let results = registry.collect_all().await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].subsystem, "panicking");
    assert_eq!(results[0].status, CollectionStatus::Failed);
    assert!(results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("unexpected document"));
    assert_eq!(
        metrics
            .collection
            .failures
            .with_label_values(&["panicking"])
            .get(),
        1
    );
    assert_eq!(results[1].subsystem, "dsl");
    assert_eq!(results[1].status, CollectionStatus::Success);
}

#[tokio::test]
async fn test_failed_collection_keeps_previous_values() {
    // Given: A memory document that is valid once and broken afterwards
    let transport = MockTransport::new().with_device("1");
    transport.reply("/data/memory.json", 200, memory_document(2000));
    transport.reply(
        "/data/memory.json",
        200,
        json!({"mem_total": 4000, "cpu_load": 50}).to_string(),
    );
    let metrics = create_test_metrics();
    let collectors: Vec<Arc<dyn Collector>> =
        vec![Arc::new(MemoryCollector::new(&metrics).unwrap())];
    let registry = registry_with(transport, &metrics, collectors).await;

    // When: The first pass succeeds and the second fails
    let first = registry.collect_all().await;
    let second = registry.collect_all().await;

    // Then: The values of the first pass are still published
    assert!(first[0].is_success());
    assert!(!second[0].is_success());
    let rendered = metrics.render().unwrap();
    assert_eq!(
        metric_value(&rendered, "speedport_memory_total_bytes", &[]),
        Some(2_048_000.0)
    );
    assert_eq!(
        metric_value(&rendered, "speedport_memory_cpu_load_percent", &[]),
        Some(12.5)
    );
}

#[tokio::test]
async fn test_dropped_pass_still_records_collection() {
    // Given: A slow memory endpoint
    let transport = MockTransport::new().with_device("1");
    transport.reply("/data/memory.json", 200, memory_document(1000));
    transport.delay("/data/memory.json", Duration::from_millis(100));
    let metrics = create_test_metrics();
    let collectors: Vec<Arc<dyn Collector>> =
        vec![Arc::new(MemoryCollector::new(&metrics).unwrap())];
    let registry = Arc::new(registry_with(transport, &metrics, collectors).await);

    // When: The scrape waiting for the pass goes away mid-flight
    let pass = tokio::spawn({
        let registry = registry.clone();
        async move { registry.collect_all().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    pass.abort();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Then: The collector still finished and its bookkeeping was recorded
    let rendered = metrics.render().unwrap();
    assert_eq!(
        metric_value(&rendered, "speedport_memory_total_bytes", &[]),
        Some(1_024_000.0)
    );
    assert_eq!(
        metrics
            .collection
            .duration
            .with_label_values(&["memory"])
            .get_sample_count(),
        1
    );
    assert!(
        metrics
            .collection
            .last_success
            .with_label_values(&["memory"])
            .get()
            > 0.0
    );
}

#[tokio::test]
async fn test_fetch_errors_are_counted_per_file() {
    let transport = MockTransport::new().with_device("1");
    transport.reply("/data/dsl.json", 500, "Internal Server Error");
    let metrics = create_test_metrics();
    let collectors: Vec<Arc<dyn Collector>> =
        vec![Arc::new(DslCollector::new(&metrics).unwrap())];
    let registry = registry_with(transport, &metrics, collectors).await;

    let results = registry.collect_all().await;

    assert_eq!(results[0].status, CollectionStatus::Failed);
    assert!(results[0].error.as_deref().unwrap().contains("500"));
    assert_eq!(
        metrics
            .client
            .fetch_failures
            .with_label_values(&["dsl"])
            .get(),
        1
    );
    assert_eq!(
        metrics
            .client
            .fetch_duration
            .with_label_values(&["dsl"])
            .get_sample_count(),
        1
    );
}

#[tokio::test]
async fn test_no_fetch_without_authentication() {
    // Given: A session that never logged in
    let transport = MockTransport::new();
    transport.reply("/data/dsl.json", 200, dsl_document());
    let metrics = create_test_metrics();
    let session = Arc::new(session_manager(transport.clone(), &metrics));
    let fetcher = Arc::new(EndpointFetcher::new(session, metrics.client.clone()));
    let collectors: Vec<Arc<dyn Collector>> =
        vec![Arc::new(DslCollector::new(&metrics).unwrap())];
    let registry = CollectorRegistry::new(collectors, fetcher, metrics.collection.clone());

    // When: Running a collection pass
    let results = registry.collect_all().await;

    // Then: The collector fails without contacting the device
    assert_eq!(results[0].status, CollectionStatus::Failed);
    assert_eq!(transport.count("GET", "/data/dsl.json"), 0);
}

#[tokio::test]
async fn test_interface_speeds() {
    // Given: WLAN, DSL, and Ethernet ports
    let transport = MockTransport::new().with_device("1");
    transport.reply(
        "/data/interfaces.json",
        200,
        json!({"line_status": [
            {"interface": "wlan0", "media": "WLAN", "speed": "866Mbps", "status": "Up",
             "rx_packets": 10, "tx_packets": "20", "rx_errors": 0, "tx_errors": 1},
            {"interface": "ptm0", "media": "DSL",
             "speed": "DownStream:50000kbps UpStream:10000kbps", "status": "Up"},
            {"interface": "eth1", "media": "Ethernet", "speed": "1000Mbps", "status": "Down"}
        ]})
        .to_string(),
    );
    let metrics = create_test_metrics();
    let collectors: Vec<Arc<dyn Collector>> =
        vec![Arc::new(InterfaceCollector::new(&metrics).unwrap())];
    let registry = registry_with(transport, &metrics, collectors).await;

    // When: Collecting
    let results = registry.collect_all().await;
    assert!(results[0].is_success());

    // Then: Speeds follow the media rules
    let rendered = metrics.render().unwrap();
    let speed = |iface: &str, dir: &str| {
        metric_value(
            &rendered,
            "speedport_interface_speed_kbps",
            &[("interface", iface), ("direction", dir)],
        )
    };
    assert_eq!(speed("wlan0", "rx"), Some(866000.0));
    assert_eq!(speed("wlan0", "tx"), Some(866000.0));
    assert_eq!(speed("ptm0", "rx"), Some(50000.0));
    assert_eq!(speed("ptm0", "tx"), Some(10000.0));
    assert_eq!(speed("eth1", "rx"), Some(-1.0));
    assert_eq!(speed("eth1", "tx"), Some(-1.0));
    assert_eq!(
        metric_value(
            &rendered,
            "speedport_interface_packets",
            &[("interface", "wlan0"), ("direction", "tx")]
        ),
        Some(20.0)
    );
    assert_eq!(
        metric_value(&rendered, "speedport_interface_up", &[("interface", "eth1")]),
        Some(0.0)
    );
}

#[tokio::test]
async fn test_module_collector_folds_variables() {
    let transport = MockTransport::new().with_device("1");
    transport.reply(
        "/data/Module.json",
        200,
        json!([
            {"vartype": "value", "varid": "firmware_version", "varvalue": "050124.04.00.007"},
            {"vartype": "value", "varid": "serial_number", "varvalue": "S123"},
            {"vartype": "value", "varid": "uptime", "varvalue": "3600"}
        ])
        .to_string(),
    );
    let metrics = create_test_metrics();
    let collectors: Vec<Arc<dyn Collector>> =
        vec![Arc::new(ModuleCollector::new(&metrics).unwrap())];
    let registry = registry_with(transport, &metrics, collectors).await;

    let results = registry.collect_all().await;

    assert!(results[0].is_success());
    let rendered = metrics.render().unwrap();
    assert_eq!(
        metric_value(
            &rendered,
            "speedport_module_module_info",
            &[("key", "firmware_version"), ("value", "050124.04.00.007")]
        ),
        Some(1.0)
    );
    assert_eq!(
        metric_value(&rendered, "speedport_module_uptime_seconds", &[]),
        Some(3600.0)
    );
}

#[tokio::test]
async fn test_remaining_subsystems_parse_their_documents() {
    let transport = MockTransport::new().with_device("1");
    transport.reply(
        "/data/bonding_tunnel.json",
        200,
        json!({
            "dsl_rx_bytes": 100, "dsl_tx_bytes": 200, "dsl_rtt_ms": 12,
            "lte_rx_bytes": 300, "lte_tx_bytes": 400, "lte_rtt_ms": 35,
            "tunnel_state": "up"
        })
        .to_string(),
    );
    transport.reply(
        "/data/bonding_client.json",
        200,
        json!({"bonding": "1", "dsl_enabled": "1", "lte_enabled": "0", "server": "tunnel.example"})
            .to_string(),
    );
    transport.reply(
        "/data/PPPoE_Session.json",
        200,
        json!({"state": "connected", "uptime": 86400, "session_id": "4711"}).to_string(),
    );
    let metrics = create_test_metrics();
    let config = CollectorsConfig {
        enabled: vec![
            "bonding_tunnel".to_string(),
            "bonding_client".to_string(),
            "pppoe_session".to_string(),
        ],
    };
    let collectors = build_collectors(&metrics, &config).unwrap();
    let registry = registry_with(transport, &metrics, collectors).await;

    let results = registry.collect_all().await;

    assert!(results.iter().all(|r| r.is_success()), "{:?}", results);
    let rendered = metrics.render().unwrap();
    assert_eq!(
        metric_value(
            &rendered,
            "speedport_bonding_tunnel_bytes",
            &[("link", "lte"), ("direction", "tx")]
        ),
        Some(400.0)
    );
    assert_eq!(metric_value(&rendered, "speedport_bonding_tunnel_up", &[]), Some(1.0));
    assert_eq!(
        metric_value(
            &rendered,
            "speedport_bonding_client_enabled",
            &[("feature", "lte")]
        ),
        Some(0.0)
    );
    assert_eq!(
        metric_value(&rendered, "speedport_pppoe_session_uptime_seconds", &[]),
        Some(86400.0)
    );
    assert_eq!(metric_value(&rendered, "speedport_pppoe_session_up", &[]), Some(1.0));
}

#[test]
fn test_build_collectors_respects_config() {
    let metrics = create_test_metrics();

    let all = build_collectors(&metrics, &CollectorsConfig::default()).unwrap();
    let names: Vec<_> = all.iter().map(|c| c.subsystem()).collect();
    assert_eq!(names, SUBSYSTEMS.to_vec());

    let endpoints: Vec<_> = all.iter().map(|c| c.endpoint().to_string()).collect();
    assert!(endpoints.contains(&"lteinfo".to_string()));
    assert!(endpoints.contains(&"dsl".to_string()));
}
