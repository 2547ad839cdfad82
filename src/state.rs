//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers and the reload signal task.

use prometheus::Registry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::cache::ScrapeCache;
use crate::collector::CollectorFactory;
use crate::config::{
    validate_effective_config, Config, ConfigError, DEFAULT_BIND_ADDR, DEFAULT_CACHE_CAPACITY,
    DEFAULT_CACHE_TTL, DEFAULT_METRICS_PATH, DEFAULT_PORT, DEFAULT_SCRAPE_PATH,
    DEFAULT_SCRAPE_TIMEOUT,
};
use crate::config_store::ConfigStore;
use crate::health_stats::HealthStats;
use crate::metrics::ExporterMetrics;
use crate::reload::{ConfigLoader, ReloadController};
use crate::scrape::ScrapeHandler;
use crate::source::MetricsSource;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Errors raised while assembling the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to register exporter metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Server settings fixed at startup. Reloads only replace the tasks.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub bind: String,
    pub port: u16,
    pub metrics_path: String,
    pub scrape_path: String,
    pub enable_health: bool,
    pub enable_cache: bool,
    pub cache_ttl: Duration,
    pub cache_capacity: u64,
    pub scrape_timeout: Duration,
}

impl ServerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            bind: cfg.bind.clone().unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            port: cfg.port.unwrap_or(DEFAULT_PORT),
            metrics_path: cfg
                .metrics_path
                .clone()
                .unwrap_or_else(|| DEFAULT_METRICS_PATH.into()),
            scrape_path: cfg
                .scrape_path
                .clone()
                .unwrap_or_else(|| DEFAULT_SCRAPE_PATH.into()),
            enable_health: cfg.enable_health.unwrap_or(true),
            enable_cache: cfg.enable_cache.unwrap_or(true),
            cache_ttl: Duration::from_secs(cfg.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL)),
            cache_capacity: cfg.cache_capacity.unwrap_or(DEFAULT_CACHE_CAPACITY),
            scrape_timeout: Duration::from_secs(
                cfg.scrape_timeout.unwrap_or(DEFAULT_SCRAPE_TIMEOUT),
            ),
        }
    }
}

/// Global application state shared across requests and background tasks.
pub struct AppState {
    /// Registry served at the telemetry path.
    pub registry: Registry,
    pub metrics: ExporterMetrics,
    pub settings: ServerSettings,
    pub config_store: Arc<ConfigStore>,
    pub reloader: Arc<ReloadController>,
    pub cache: Arc<ScrapeCache>,
    pub health_stats: Arc<HealthStats>,
    /// Name of the metrics source backing the collectors.
    pub source_name: String,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Wires the store, cache and reload controller around `source`.
    ///
    /// The exporter metrics are registered with `registry`, which becomes the
    /// registry served at the telemetry path.
    pub fn build(
        config: Config,
        source: Arc<dyn MetricsSource>,
        loader: Arc<dyn ConfigLoader>,
        registry: Registry,
    ) -> Result<SharedState, StateError> {
        validate_effective_config(&config)?;

        let settings = ServerSettings::from_config(&config);
        let metrics = ExporterMetrics::new(&registry)?;
        let source_name = source.name().to_string();

        let config_store = Arc::new(ConfigStore::new(config)?);
        metrics
            .config_version
            .set(config_store.get().version() as f64);

        let handler = Arc::new(ScrapeHandler::new(
            config_store.clone(),
            CollectorFactory::new(source, metrics.clone()),
            metrics.clone(),
            settings.scrape_timeout,
        ));
        let cache = if settings.enable_cache {
            ScrapeCache::new(handler, settings.cache_capacity, settings.cache_ttl)
        } else {
            ScrapeCache::disabled(handler)
        };
        let reloader = Arc::new(ReloadController::new(config_store.clone(), loader));

        debug!("Application state assembled: {:?}", settings);
        info!(
            "Serving {} tasks from source '{}'",
            config_store.get().tasks().len(),
            source_name
        );

        Ok(Arc::new(AppState {
            registry,
            metrics,
            settings,
            config_store,
            reloader,
            cache: Arc::new(cache),
            health_stats: Arc::new(HealthStats::new()),
            source_name,
            start_time: Instant::now(),
        }))
    }

    /// Reloads the task configuration and records the outcome.
    ///
    /// Cached responses are dropped after a successful reload.
    pub async fn reload(&self) -> Result<u64, ConfigError> {
        match self.reloader.reload().await {
            Ok(snapshot) => {
                self.cache.invalidate_all();
                self.metrics.record_reload(true, Some(snapshot.version()));
                self.health_stats.record_reload(true);
                Ok(snapshot.version())
            }
            Err(e) => {
                self.metrics.record_reload(false, None);
                self.health_stats.record_reload(false);
                Err(e)
            }
        }
    }
}
