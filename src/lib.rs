//! Speedport Prometheus Exporter
//!
//! A Prometheus metrics exporter for Telekom Speedport routers (Hybrid and
//! Smart series).
//!
//! # Overview
//!
//! The router has no public API. Its web interface serves JSON resources under
//! `/data/*.json` behind a challenge-response login. This exporter keeps one
//! authenticated session alive and, on every scrape, polls the resources of all
//! enabled subsystems concurrently.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐   HTTP + cookies     ┌──────────────────┐
//! │  Speedport  │ ◄─────────────────►  │     Exporter     │
//! │   router    │   /data/*.json       │                  │
//! └─────────────┘                      │  ┌────────────┐  │      HTTP      ┌────────────┐
//!                                      │  │  Session   │  │ ◄────────────► │ Prometheus │
//!                                      │  │ keepalive  │  │   /metrics     └────────────┘
//!                                      │  └────────────┘  │
//!                                      │  ┌────────────┐  │
//!                                      │  │ Collectors │  │
//!                                      │  └────────────┘  │
//!                                      └──────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`speedport`] - Transport, session/login, and endpoint fetching
//! - [`collectors`] - Per-subsystem collectors and the concurrent collector registry
//! - [`metrics`] - Prometheus registry and shared instruments
//! - [`server`] - HTTP server and scrape handling
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//!
//! # Quick Start
//!
//! ```no_run
//! use speedport_exporter::{config::Config, server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/Default.toml")?;
//!     config.validate()?;
//!     server::start(config).await?;
//!     Ok(())
//! }
//! ```

pub mod collectors;
pub mod config;
pub mod error;
pub mod metrics;
pub mod server;
pub mod speedport;
