//! Scripted in-memory transport shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use secrecy::SecretString;
use speedport_exporter::error::{ExporterError, Result};
use speedport_exporter::metrics::Metrics;
use speedport_exporter::speedport::{HttpResponse, SessionManager, Transport};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CHALLENGE: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90";
pub const PASSWORD: &str = "secret";
pub const SESSION_ID: &str = "3f2a9c0d";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
enum Reply {
    /// Response plus the cookies its `Set-Cookie` headers would install
    Response(HttpResponse, Vec<(String, String)>),
    Unreachable,
}

/// Serves scripted replies per path. Replies queued for a path are consumed
/// in order; the last one keeps being served.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    cookies: Mutex<BTreeMap<String, String>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, path: &str, status: u16, body: impl Into<String>) {
        self.reply_with_cookies(path, status, body, &[]);
    }

    /// Queue a reply that sets `cookies` on the host when served
    pub fn reply_with_cookies(
        &self,
        path: &str,
        status: u16,
        body: impl Into<String>,
        cookies: &[(&str, &str)],
    ) {
        self.push(
            path,
            Reply::Response(
                HttpResponse {
                    status,
                    body: body.into(),
                },
                cookies
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
        );
    }

    /// Queue a successful login that issues the device session cookie
    pub fn accept_login(&self) {
        self.reply_with_cookies(
            "/data/Login.json",
            200,
            login_response("success"),
            &[("SessionID_R3", SESSION_ID)],
        );
    }

    /// Answer requests for `path` only after `delay`
    pub fn delay(&self, path: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(path.to_string(), delay);
    }

    pub fn unreachable(&self, path: &str) {
        self.push(path, Reply::Unreachable);
    }

    fn push(&self, path: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Script a device that accepts the login and reports `loginstate`
    pub fn with_device(self: Arc<Self>, loginstate: &str) -> Arc<Self> {
        self.reply("/html/login/index.html", 200, login_page(CHALLENGE));
        self.accept_login();
        self.reply("/data/heartbeat.json", 200, heartbeat_response(loginstate));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn login_count(&self) -> usize {
        self.count("POST", "/data/Login.json")
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.lock().unwrap().get(name).cloned()
    }

    async fn wait(&self, path: &str) {
        let delay = self.delays.lock().unwrap().get(path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn next(&self, path: &str) -> Result<HttpResponse> {
        let mut replies = self.replies.lock().unwrap();
        let queue = replies.get_mut(path);
        let reply = match queue {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        match reply {
            Some(Reply::Response(response, cookies)) => {
                self.cookies.lock().unwrap().extend(cookies);
                Ok(response)
            }
            Some(Reply::Unreachable) => Err(ExporterError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "device unreachable",
            ))),
            None => Ok(HttpResponse {
                status: 404,
                body: "Not Found".to_string(),
            }),
        }
    }

    fn record(
        &self,
        method: &'static str,
        path: &str,
        query: &[(&str, String)],
        form: &[(&str, String)],
        headers: &[(&str, String)],
    ) {
        let owned = |pairs: &[(&str, String)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<Vec<_>>()
        };
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            path: path.to_string(),
            query: owned(query),
            form: owned(form),
            headers: owned(headers),
        });
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<HttpResponse> {
        self.record("GET", path, query, &[], &[]);
        self.wait(path).await;
        self.next(path)
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> Result<HttpResponse> {
        self.record("POST", path, &[], form, headers);
        self.wait(path).await;
        self.next(path)
    }

    fn set_cookie(&self, name: &str, value: &str) -> Result<()> {
        self.cookies
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn cookies(&self) -> Vec<(String, String)> {
        self.cookies
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn url(&self, path: &str) -> String {
        format!("http://speedport.test{}", path)
    }
}

pub fn login_page(challenge: &str) -> String {
    format!(
        "<html><head><script>var challenge = \"{}\";</script></head><body></body></html>",
        challenge
    )
}

pub fn login_response(login: &str) -> String {
    format!(
        r#"[{{"vartype":"status","varid":"login","varvalue":"{}"}}]"#,
        login
    )
}

pub fn heartbeat_response(loginstate: &str) -> String {
    format!(
        r#"[{{"vartype":"value","varid":"loginstate","varvalue":"{}"}}]"#,
        loginstate
    )
}

pub fn session_manager(transport: Arc<MockTransport>, metrics: &Metrics) -> SessionManager {
    SessionManager::new(
        transport,
        SecretString::from(PASSWORD),
        metrics.client.clone(),
    )
}
