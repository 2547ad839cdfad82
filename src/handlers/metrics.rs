//! Telemetry endpoint handler.
//!
//! Serves the exporter's own counters and histograms from the process-wide
//! registry. Scrape series never show up here.

use axum::{extract::State, http::header, http::StatusCode, response::IntoResponse};
use prometheus::{Encoder, TextEncoder, TEXT_FORMAT};
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 16 * 1024;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response()
    }
}

/// Handler for the telemetry endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, MetricsError> {
    debug!("Processing telemetry request");
    state.health_stats.record_http_request();
    state.health_stats.record_telemetry_call();

    state.cache.run_pending_tasks().await;
    let entries = state.cache.entry_count();
    state.metrics.cache_entries.set(entries as f64);
    state.health_stats.record_cache_entries(entries);

    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    if let Err(e) = TextEncoder::new().encode(&state.registry.gather(), &mut buffer) {
        error!("Failed to encode exporter metrics: {}", e);
        return Err(MetricsError::EncodingFailed);
    }

    Ok(([(header::CONTENT_TYPE, TEXT_FORMAT)], buffer))
}
