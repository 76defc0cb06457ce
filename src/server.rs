//! HTTP Server and Scrape Handling
//!
//! This module wires the exporter together and serves it over HTTP.
//!
//! # Architecture
//!
//! - **HTTP Server**: Axum-based server exposing `/metrics`, `/health`, and `/` endpoints
//! - **Keepalive Loop**: Background task keeping the Speedport session authenticated
//! - **Collection Pass**: Each scrape of `/metrics` runs every collector concurrently
//!   before the registry is rendered
//!
//! # Endpoints
//!
//! - `GET /` - HTML landing page with links to metrics and health
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /health` - Health check (returns 200 while the session is authenticated, 503 otherwise)
//!
//! # Error Handling
//!
//! Individual collector failures are logged as warnings and never fail the scrape.
//! Values of a failed subsystem stay at their last successful collection.

use crate::collectors::{build_collectors, CollectionResult, CollectorRegistry};
use crate::config::Config;
use crate::metrics::Metrics;
use crate::speedport::{EndpointFetcher, HttpTransport, SessionManager, Transport};
use anyhow::Context;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared state of the running exporter
#[derive(Clone)]
pub struct AppState {
    pub metrics: Metrics,
    pub session: Arc<SessionManager>,
    pub collectors: Arc<CollectorRegistry>,
}

impl AppState {
    /// Construct metrics, session, and collectors on top of `transport`
    pub fn build(config: &Config, transport: Arc<dyn Transport>) -> anyhow::Result<Self> {
        let metrics = Metrics::new()?;

        let mut session = SessionManager::new(
            transport,
            config.speedport.password.clone(),
            metrics.client.clone(),
        )
        .with_authenticated_gauge(metrics.session_authenticated.clone());
        if let Some(path) = &config.speedport.session_path {
            session = session.with_session_path(path);
        }
        let session = Arc::new(session);

        let fetcher = Arc::new(EndpointFetcher::new(
            session.clone(),
            metrics.client.clone(),
        ));
        let collectors = build_collectors(&metrics, &config.collectors)?;
        let registry = CollectorRegistry::new(collectors, fetcher, metrics.collection.clone());

        Ok(Self {
            metrics,
            session,
            collectors: Arc::new(registry),
        })
    }
}

pub async fn start(config: Config) -> anyhow::Result<()> {
    let transport = Arc::new(
        HttpTransport::new(&config.speedport.host, config.speedport.request_timeout())
            .context("Failed to create HTTP transport")?,
    );
    let state = AppState::build(&config, transport)?;
    info!(
        "Enabled collectors: {}",
        state.collectors.subsystems().join(", ")
    );

    // Initial login, fatal after the configured number of attempts
    state
        .session
        .start(
            config.speedport.startup_login_attempts,
            config.speedport.startup_retry_delay(),
        )
        .await
        .context("Failed to log in to the Speedport")?;

    // Start the keepalive loop
    let session = state.session.clone();
    let interval = config.speedport.keepalive_interval();
    let keepalive = tokio::spawn(async move {
        session.run_keepalive(interval).await;
    });

    // Build the router
    let app = router(state);

    // Start the server
    let addr = format!("{}:{}", config.server.addr, config.server.port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on {}", addr);
    info!("Metrics available at http://{}/metrics", addr);

    serve(listener, app, keepalive).await
}

/// Serve `app` until the server fails or the keepalive task stops.
///
/// Without the keepalive loop the session is never renewed, so its end is an
/// error that terminates the process.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    keepalive: JoinHandle<()>,
) -> anyhow::Result<()> {
    tokio::select! {
        served = axum::serve(listener, app).into_future() => {
            served.context("HTTP server failed")
        }
        stopped = keepalive => match stopped {
            Ok(()) => anyhow::bail!("Keepalive loop exited"),
            Err(e) => anyhow::bail!("Keepalive loop failed: {}", e),
        },
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run one collection pass and render the registry
pub async fn scrape(state: &AppState) -> anyhow::Result<String> {
    let results = state.collectors.collect_all().await;
    update_up(&state.metrics, &results);
    state.metrics.render()
}

fn update_up(metrics: &Metrics, results: &[CollectionResult]) {
    let any_success = results.iter().any(CollectionResult::is_success);
    metrics.up.set(if any_success { 1.0 } else { 0.0 });
}

async fn root_handler() -> impl IntoResponse {
    axum::response::Html(
        r#"<html>
<head><title>Speedport Exporter</title></head>
<body>
<h1>Speedport Prometheus Exporter</h1>
<p><a href="/metrics">Metrics</a></p>
<p><a href="/health">Health</a></p>
</body>
</html>"#,
    )
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match scrape(&state).await {
        Ok(metrics) => metrics.into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error rendering metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.session.is_authenticated() {
        (axum::http::StatusCode::OK, "OK")
    } else {
        (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            "Speedport session not authenticated",
        )
    }
}
