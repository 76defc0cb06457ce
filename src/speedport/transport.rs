//! HTTP transport to the Speedport web interface
//!
//! The session manager and fetcher only talk to the device through the
//! [`Transport`] trait. [`HttpTransport`] is the production implementation on top
//! of `reqwest`, holding the cookie jar that carries the session across calls.

use crate::error::{ExporterError, Result};
use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Status and body of a device response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `path` (absolute, e.g. `/data/dsl.json`) with query parameters
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<HttpResponse>;

    /// POST an `application/x-www-form-urlencoded` body
    async fn post_form(
        &self,
        path: &str,
        form: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> Result<HttpResponse>;

    /// Install a cookie scoped to the device host
    fn set_cookie(&self, name: &str, value: &str) -> Result<()>;

    /// Every cookie currently sent to the device host, as name/value pairs
    fn cookies(&self) -> Vec<(String, String)>;

    /// Absolute URL for `path`, used for headers such as `Referer`
    fn url(&self, path: &str) -> String;
}

/// `reqwest` backed transport with a persistent cookie jar
pub struct HttpTransport {
    client: reqwest::Client,
    jar: Arc<Jar>,
    base: Url,
}

impl HttpTransport {
    pub fn new(host: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(&format!("http://{}/", host))
            .map_err(|e| ExporterError::Config(format!("invalid host '{}': {}", host, e)))?;
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .timeout(timeout)
            .build()?;
        Ok(Self { client, jar, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| ExporterError::Config(format!("invalid path '{}': {}", path, e)))
    }

    async fn into_response(response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<HttpResponse> {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);
        let response = self.client.get(url).query(query).send().await?;
        Self::into_response(response).await
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> Result<HttpResponse> {
        let url = self.endpoint(path)?;
        debug!("POST {}", url);
        let mut request = self.client.post(url).form(form);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }
        let response = request.send().await?;
        Self::into_response(response).await
    }

    fn set_cookie(&self, name: &str, value: &str) -> Result<()> {
        self.jar
            .add_cookie_str(&format!("{}={}; Path=/", name, value), &self.base);
        Ok(())
    }

    fn cookies(&self) -> Vec<(String, String)> {
        self.jar
            .cookies(&self.base)
            .and_then(|header| header.to_str().ok().map(parse_cookie_header))
            .unwrap_or_default()
    }

    fn url(&self, path: &str) -> String {
        self.endpoint(path)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| format!("{}{}", self.base, path.trim_start_matches('/')))
    }
}

/// Split a `Cookie` request header (`a=1; b=2`) into name/value pairs
fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}
