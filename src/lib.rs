//! Herakles CloudWatch Exporter Library
//!
//! A caching Prometheus exporter proxy for CloudWatch-style metrics. Every
//! scrape request names a task from the configuration; the exporter builds a
//! collector for that request, queries the metrics source and renders the
//! result in the Prometheus text format.
//!
//! # Components
//!
//! - [`config_store::ConfigStore`]: versioned configuration snapshots, lock-free reads
//! - [`collector::CollectorFactory`]: builds a single-use collector per request
//! - [`scrape::ScrapeHandler`]: runs one request with its own registry
//! - [`cache::ScrapeCache`]: TTL + LRU response cache with coalesced misses
//! - [`reload::ReloadController`]: validated configuration hot reload
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use herakles_cloudwatch_exporter::{
//!     AppState, Config, FileConfigLoader, TestDataSource,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::sample();
//! let source = TestDataSource::from_file("testdata.json".as_ref(), Duration::ZERO)?;
//! let state = AppState::build(
//!     config,
//!     Arc::new(source),
//!     Arc::new(FileConfigLoader::new("cloudwatch-exporter.yaml")),
//!     prometheus::Registry::new(),
//! )?;
//! let app = herakles_cloudwatch_exporter::handlers::router(state);
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cli;
pub mod collector;
pub mod commands;
pub mod config;
pub mod config_store;
pub mod handlers;
pub mod health_stats;
pub mod metrics;
pub mod reload;
pub mod scrape;
pub mod source;
pub mod state;

// Re-export main types for convenience
pub use cache::{CacheStatus, ScrapeCache, Served};
pub use config::{Config, ConfigError, MetricConfig, Statistic, TaskConfig};
pub use config_store::{ConfigSnapshot, ConfigStore};
pub use reload::{ConfigLoader, FileConfigLoader, ReloadController};
pub use scrape::{ScrapeError, ScrapeHandler, ScrapeRequest, ScrapeResponse};
pub use source::{MetricsSource, SourceError, TestDataSource};
pub use state::{AppState, SharedState};
