//! HTTP endpoint handlers for the exporter.
//!
//! This module provides handlers for all HTTP endpoints:
//! - scrape path (default `/scrape`): per-task exposition, served through the cache
//! - metrics path (default `/metrics`): the exporter's own metrics
//! - `/reload`: re-read the configuration file
//! - `/health`: Health check endpoint
//! - `/config`: Configuration display endpoint
//! - `/`: landing page

pub mod config;
pub mod health;
pub mod metrics;
pub mod reload;
pub mod root;
pub mod scrape;

use axum::{routing::get, Router};
use tracing::debug;

use crate::state::SharedState;

// Re-export handlers
pub use config::config_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use reload::reload_handler;
pub use root::root_handler;
pub use scrape::{scrape_handler, CACHE_STATUS_HEADER};

/// Builds the HTTP router for the exporter.
pub fn router(state: SharedState) -> Router {
    let settings = &state.settings;

    let mut app = Router::new()
        .route("/", get(root_handler))
        .route(&settings.scrape_path, get(scrape_handler))
        .route(&settings.metrics_path, get(metrics_handler))
        .route("/reload", get(reload_handler))
        .route("/config", get(config_handler));

    if settings.enable_health {
        app = app.route("/health", get(health_handler));
    }

    debug!(
        "Routes: scrape={} metrics={} health={}",
        settings.scrape_path, settings.metrics_path, settings.enable_health
    );
    app.with_state(state)
}
