use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::collectors::SUBSYSTEMS;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub speedport: SpeedportConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub collectors: CollectorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpeedportConfig {
    /// Host (and optional port) of the router's web interface, e.g. `speedport.ip`
    pub host: String,
    pub password: SecretString,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_seconds: u64,
    #[serde(default = "default_startup_login_attempts")]
    pub startup_login_attempts: u32,
    #[serde(default = "default_startup_retry_delay")]
    pub startup_retry_delay_seconds: u64,
    /// File used to persist the session cookies across restarts
    #[serde(default)]
    pub session_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectorsConfig {
    /// Subsystems to collect; every known subsystem when unset
    #[serde(default = "default_enabled_collectors")]
    pub enabled: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            port: default_port(),
        }
    }
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_collectors(),
        }
    }
}

impl CollectorsConfig {
    pub fn is_enabled(&self, subsystem: &str) -> bool {
        self.enabled.iter().any(|name| name == subsystem)
    }
}

impl SpeedportConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_seconds)
    }

    pub fn startup_retry_delay(&self) -> Duration {
        Duration::from_secs(self.startup_retry_delay_seconds)
    }
}

fn default_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9611
}

fn default_request_timeout() -> u64 {
    10
}

fn default_keepalive_interval() -> u64 {
    5
}

fn default_startup_login_attempts() -> u32 {
    3
}

fn default_startup_retry_delay() -> u64 {
    5
}

fn default_enabled_collectors() -> Vec<String> {
    SUBSYSTEMS.iter().map(|s| s.to_string()).collect()
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        // Load environment variables from .env if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("SPEEDPORT_EXPORTER")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("collectors.enabled")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Rejects values the exporter cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.speedport.host.trim().is_empty() {
            bail!("speedport.host must not be empty");
        }
        if self.speedport.request_timeout_seconds == 0 {
            bail!("speedport.request_timeout_seconds must be greater than zero");
        }
        if self.speedport.keepalive_interval_seconds == 0 {
            bail!("speedport.keepalive_interval_seconds must be greater than zero");
        }
        if self.speedport.startup_login_attempts == 0 {
            bail!("speedport.startup_login_attempts must be at least 1");
        }
        for name in &self.collectors.enabled {
            if !SUBSYSTEMS.contains(&name.as_str()) {
                bail!(
                    "unknown collector '{}' (known: {})",
                    name,
                    SUBSYSTEMS.join(", ")
                );
            }
        }
        Ok(())
    }
}
