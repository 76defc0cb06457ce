//! Speedport session management
//!
//! The web interface uses a challenge-response login:
//!
//! 1. `GET /html/login/index.html` embeds a 64 character challenge
//! 2. The client posts `sha256(challenge + ":" + password)` to `/data/Login.json`
//! 3. A successful response sets the device session cookie `SessionID_R3`;
//!    the client then installs `challengev` (the raw challenge) and
//!    `derivedk`, a PBKDF2 key derived from `sha256(password)` salted with the
//!    first 16 characters of the challenge
//!
//! A session expires on the device side without notice, so [`SessionManager::run_keepalive`]
//! polls `/data/heartbeat.json` and logs in again whenever `loginstate` is not `"1"`.
//! This loop is the only place that re-authenticates.

use crate::error::{ExporterError, Result};
use crate::metrics::{instrumented, ClientMetrics};
use crate::speedport::document::{fold_variables, parse_lenient};
use crate::speedport::transport::{HttpResponse, Transport};
use prometheus::IntGauge;
use rand::Rng;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

pub const LOGIN_PAGE_PATH: &str = "/html/login/index.html";
pub const LOGIN_PATH: &str = "/data/Login.json";
pub const HEARTBEAT_PATH: &str = "/data/heartbeat.json";

pub const CHALLENGE_COOKIE: &str = "challengev";
pub const DERIVED_KEY_COOKIE: &str = "derivedk";
pub const SESSION_COOKIE: &str = "SessionID_R3";

const CSRF_PLACEHOLDER: &str = "nulltoken";
const PBKDF2_ROUNDS: u32 = 1000;
const DERIVED_KEY_LEN: usize = 16;
const SALT_LEN: usize = 16;

static CHALLENGE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9a-zA-Z]{64}").expect("valid challenge pattern"));

/// Credentials of the current device session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub challenge: String,
    pub derived_key: String,
    /// Every host cookie after the last install, including `SessionID_R3`
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    #[serde(skip)]
    pub authenticated: bool,
}

/// Result of a single keepalive iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveOutcome {
    /// Heartbeat confirmed the session
    Alive,
    /// Heartbeat failed and a fresh login succeeded
    Relogged,
    /// Heartbeat failed and so did the login; retried next iteration
    ReloginFailed,
}

/// Extract the login challenge from the login page
pub fn extract_challenge(page: &str) -> Result<&str> {
    CHALLENGE_PATTERN
        .find(page)
        .map(|m| m.as_str())
        .ok_or(ExporterError::ChallengeNotFound)
}

/// `hex(sha256(challenge + ":" + password))`
pub fn encrypt_password(challenge: &str, password: &str) -> String {
    hex::encode(Sha256::digest(format!("{}:{}", challenge, password).as_bytes()))
}

/// `hex(pbkdf2_hmac_sha1(hex(sha256(password)), challenge[..16], 1000, 16))`
pub fn derive_key(challenge: &str, password: &str) -> String {
    let hashed_password = hex::encode(Sha256::digest(password.as_bytes()));
    let salt: String = challenge.chars().take(SALT_LEN).collect();
    let mut key = [0u8; DERIVED_KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha1>(
        hashed_password.as_bytes(),
        salt.as_bytes(),
        PBKDF2_ROUNDS,
        &mut key,
    );
    hex::encode(key)
}

/// Whether a folded heartbeat response reports a logged-in session
pub fn is_logged_in(folded: &serde_json::Map<String, serde_json::Value>) -> bool {
    folded.get("loginstate").and_then(|v| v.as_str()) == Some("1")
}

/// Owns the device session: login, heartbeat, and the keepalive loop.
///
/// The cookie pair is installed on the shared [`Transport`] and only ever
/// written from here; fetches read it through the transport.
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    password: SecretString,
    session: RwLock<Session>,
    metrics: ClientMetrics,
    authenticated_gauge: Option<IntGauge>,
    session_path: Option<PathBuf>,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn Transport>, password: SecretString, metrics: ClientMetrics) -> Self {
        Self {
            transport,
            password,
            session: RwLock::new(Session::default()),
            metrics,
            authenticated_gauge: None,
            session_path: None,
        }
    }

    /// Persist credentials to `path` after every successful login
    pub fn with_session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = Some(path.into());
        self
    }

    /// Mirror the authentication state into `gauge`
    pub fn with_authenticated_gauge(mut self, gauge: IntGauge) -> Self {
        gauge.set(0);
        self.authenticated_gauge = Some(gauge);
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.read().map(|s| s.authenticated).unwrap_or(false)
    }

    /// Snapshot of the current credentials
    pub fn session(&self) -> Session {
        self.session
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn set_authenticated(&self, authenticated: bool) {
        if let Ok(mut session) = self.session.write() {
            session.authenticated = authenticated;
        }
        if let Some(gauge) = &self.authenticated_gauge {
            gauge.set(i64::from(authenticated));
        }
    }

    fn install(&self, challenge: &str, derived_key: &str, authenticated: bool) -> Result<()> {
        self.transport.set_cookie(CHALLENGE_COOKIE, challenge)?;
        self.transport.set_cookie(DERIVED_KEY_COOKIE, derived_key)?;
        let cookies = self.transport.cookies().into_iter().collect();
        if let Ok(mut session) = self.session.write() {
            *session = Session {
                challenge: challenge.to_string(),
                derived_key: derived_key.to_string(),
                cookies,
                authenticated,
            };
        }
        if let Some(gauge) = &self.authenticated_gauge {
            gauge.set(i64::from(authenticated));
        }
        Ok(())
    }

    /// Log in through the challenge-response scheme.
    ///
    /// On error the session keeps its prior credentials and state.
    pub async fn login(&self) -> Result<()> {
        instrumented(
            &self.metrics.login_duration,
            &self.metrics.login_failures,
            self.login_inner(),
        )
        .await
    }

    async fn login_inner(&self) -> Result<()> {
        let page = self.transport.get(LOGIN_PAGE_PATH, &[]).await?;
        ensure_success(LOGIN_PAGE_PATH, &page)?;
        let challenge = extract_challenge(&page.body)?.to_string();

        let password = self.password.expose_secret();
        let form = [
            ("password", encrypt_password(&challenge, password)),
            ("csrf_token", CSRF_PLACEHOLDER.to_string()),
            ("showpw", "0".to_string()),
            ("challengev", challenge.clone()),
        ];
        let headers = [
            ("X-Requested-With", "XMLHttpRequest".to_string()),
            ("Referer", self.transport.url(LOGIN_PAGE_PATH)),
        ];

        let response = self.transport.post_form(LOGIN_PATH, &form, &headers).await?;
        ensure_success(LOGIN_PATH, &response)?;
        let folded = fold_variables(LOGIN_PATH, &parse_lenient(LOGIN_PATH, &response.body)?)?;
        match folded.get("login").and_then(|v| v.as_str()) {
            Some("success") => {}
            other => {
                return Err(ExporterError::LoginRejected(format!(
                    "login = {}",
                    other.unwrap_or("<missing>")
                )))
            }
        }
        if !self
            .transport
            .cookies()
            .iter()
            .any(|(name, _)| name == SESSION_COOKIE)
        {
            return Err(ExporterError::LoginRejected(format!(
                "no {} cookie in the login response",
                SESSION_COOKIE
            )));
        }

        let derived_key = derive_key(&challenge, password);
        self.install(&challenge, &derived_key, true)?;
        info!("Logged in to Speedport");
        self.persist();
        Ok(())
    }

    /// Ask the device whether the session is still logged in.
    pub async fn heartbeat(&self) -> Result<bool> {
        instrumented(
            &self.metrics.heartbeat_duration,
            &self.metrics.heartbeat_failures,
            self.heartbeat_inner(),
        )
        .await
    }

    async fn heartbeat_inner(&self) -> Result<bool> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let nonce: u32 = rand::thread_rng().gen_range(1..=1000);
        let query = [("_time", now.to_string()), ("_rand", nonce.to_string())];

        let response = self.transport.get(HEARTBEAT_PATH, &query).await?;
        ensure_success(HEARTBEAT_PATH, &response)?;
        let folded = fold_variables(HEARTBEAT_PATH, &parse_lenient(HEARTBEAT_PATH, &response.body)?)?;
        Ok(is_logged_in(&folded))
    }

    /// One keepalive iteration: heartbeat, then login if the heartbeat
    /// did not confirm the session.
    pub async fn keepalive_tick(&self) -> KeepaliveOutcome {
        match self.heartbeat().await {
            Ok(true) => {
                self.set_authenticated(true);
                return KeepaliveOutcome::Alive;
            }
            Ok(false) => {
                info!("Speedport session expired, logging in again");
            }
            Err(e) => {
                warn!("Heartbeat failed: {}", e);
            }
        }
        self.set_authenticated(false);

        match self.login().await {
            Ok(()) => KeepaliveOutcome::Relogged,
            Err(e) => {
                error!("Login failed: {}", e);
                KeepaliveOutcome::ReloginFailed
            }
        }
    }

    /// Keep the session alive for the lifetime of the process.
    pub async fn run_keepalive(self: Arc<Self>, interval: Duration) {
        loop {
            let outcome = self.keepalive_tick().await;
            debug!("Keepalive iteration: {:?}", outcome);
            tokio::time::sleep(interval).await;
        }
    }

    /// Establish the session before the keepalive loop starts.
    ///
    /// A persisted session is tried first and kept if a heartbeat confirms it.
    /// Otherwise login is attempted up to `attempts` times; the last error is
    /// returned when all of them fail.
    pub async fn start(&self, attempts: u32, retry_delay: Duration) -> Result<()> {
        if self.restore() {
            match self.heartbeat().await {
                Ok(true) => {
                    info!("Reusing persisted Speedport session");
                    self.set_authenticated(true);
                    return Ok(());
                }
                Ok(false) => debug!("Persisted session is no longer valid"),
                Err(e) => warn!("Heartbeat with persisted session failed: {}", e),
            }
            self.set_authenticated(false);
        }

        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.login().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    warn!("Login attempt {}/{} failed: {}", attempt, attempts, e);
                    attempt += 1;
                    tokio::time::sleep(retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn persist(&self) {
        let Some(path) = &self.session_path else {
            return;
        };
        if let Err(e) = write_session(path, &self.session()) {
            error!("Storing session to {} failed: {}", path.display(), e);
        }
    }

    /// Install persisted cookies and credentials; the session stays
    /// unauthenticated until a heartbeat confirms it.
    fn restore(&self) -> bool {
        let Some(path) = &self.session_path else {
            return false;
        };
        if !path.exists() {
            return false;
        }
        let stored = match read_session(path) {
            Ok(stored) => stored,
            Err(e) => {
                error!("Loading session from {} failed: {}", path.display(), e);
                return false;
            }
        };
        let installed = stored
            .cookies
            .iter()
            .filter(|(name, _)| !matches!(name.as_str(), CHALLENGE_COOKIE | DERIVED_KEY_COOKIE))
            .try_for_each(|(name, value)| self.transport.set_cookie(name, value))
            .and_then(|()| self.install(&stored.challenge, &stored.derived_key, false));
        if let Err(e) = installed {
            error!("Installing persisted session failed: {}", e);
            return false;
        }
        true
    }
}

fn ensure_success(resource: &str, response: &HttpResponse) -> Result<()> {
    if response.is_success() {
        Ok(())
    } else {
        Err(ExporterError::UnexpectedStatus {
            resource: resource.to_string(),
            status: response.status,
        })
    }
}

fn write_session(path: &Path, session: &Session) -> Result<()> {
    let json = serde_json::to_string(session)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn read_session(path: &Path) -> Result<Session> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}
