//! Authenticated retrieval of `/data/{name}.json` resources

use crate::error::{ExporterError, Result};
use crate::metrics::{instrumented, ClientMetrics};
use crate::speedport::document::{parse_lenient, RawDeviceDocument};
use crate::speedport::session::SessionManager;
use std::sync::Arc;
use tracing::debug;

pub struct EndpointFetcher {
    session: Arc<SessionManager>,
    metrics: ClientMetrics,
}

impl EndpointFetcher {
    pub fn new(session: Arc<SessionManager>, metrics: ClientMetrics) -> Self {
        Self { session, metrics }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Fetch and decode one named resource through the current session.
    ///
    /// Duration is recorded for every call and failures are counted per
    /// `file` label. No request is issued while the session is unauthenticated.
    pub async fn fetch(&self, endpoint: &str) -> Result<RawDeviceDocument> {
        let duration = self.metrics.fetch_duration.with_label_values(&[endpoint]);
        let failures = self.metrics.fetch_failures.with_label_values(&[endpoint]);
        instrumented(&duration, &failures, self.fetch_inner(endpoint)).await
    }

    async fn fetch_inner(&self, endpoint: &str) -> Result<RawDeviceDocument> {
        if !self.session.is_authenticated() {
            return Err(ExporterError::NotAuthenticated);
        }

        let path = format!("/data/{}.json", endpoint);
        let response = self.session.transport().get(&path, &[]).await?;
        if !response.is_success() {
            return Err(ExporterError::UnexpectedStatus {
                resource: path,
                status: response.status,
            });
        }
        debug!("Fetched {} ({} bytes)", path, response.body.len());
        parse_lenient(endpoint, &response.body)
    }
}
