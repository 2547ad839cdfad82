//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! exporter health statistics as plain text.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str = "Project: https://github.com/cansp-dev/herakles-cloudwatch-exporter - More info: https://www.herakles.now - Support: exporter@herakles.now";

/// Formats an uptime in the largest fitting unit.
pub fn format_uptime(uptime_seconds: u64) -> String {
    let uptime_hours = uptime_seconds as f64 / SECONDS_PER_HOUR;
    if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    }
}

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");
    state.health_stats.record_http_request();

    let snapshot = state.config_store.get();
    state.health_stats.record_cache_entries(state.cache.entry_count());

    // An empty task list means there is nothing to scrape.
    let (status, message) = if snapshot.tasks().is_empty() {
        (StatusCode::SERVICE_UNAVAILABLE, "No scrape tasks configured")
    } else {
        (StatusCode::OK, "OK")
    };

    let uptime_str = format_uptime(state.health_stats.get_uptime_seconds());
    let table = state.health_stats.render_table();

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!(
            "{message}\n\nUptime: {uptime_str}\nConfiguration: v{} loaded at {} ({} tasks)\nSource: {}\n\n{table}\n{FOOTER_TEXT}",
            snapshot.version(),
            snapshot.loaded_at().format("%Y-%m-%d %H:%M:%S UTC"),
            snapshot.tasks().len(),
            state.source_name,
        ),
    )
}
