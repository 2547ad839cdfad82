//! Reload endpoint handler.

use axum::{extract::State, response::IntoResponse};
use tracing::{info, instrument};

use crate::state::SharedState;

/// Handler for `GET /reload`.
#[instrument(skip(state))]
pub async fn reload_handler(State(state): State<SharedState>) -> impl IntoResponse {
    state.health_stats.record_http_request();

    match state.reload().await {
        Ok(version) => {
            info!("Reload via HTTP complete, configuration v{}", version);
            "Reload complete".to_string()
        }
        Err(e) => format!("Can't read configuration file: {e}"),
    }
}
