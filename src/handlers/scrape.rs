//! Scrape endpoint handler.
//!
//! `GET /scrape?task=&target=&region=` answers with the exposition of one
//! task. Request errors are reported as `200` with an `Error: ...` body.

use axum::{
    extract::{Query, State},
    http::{header, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::{debug, instrument, warn};

use crate::scrape::{ScrapeError, ScrapeRequest};
use crate::state::SharedState;

/// Header telling whether the response came from the cache.
pub const CACHE_STATUS_HEADER: &str = "x-cache-status";

/// Handler for the scrape endpoint.
///
/// The query is taken as raw pairs so repeated or unexpected parameters never
/// turn into an extractor rejection.
#[instrument(skip(state, params))]
pub async fn scrape_handler(
    State(state): State<SharedState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let start = Instant::now();
    let request = ScrapeRequest::from_pairs(params);
    state.health_stats.record_http_request();
    debug!(
        "Processing scrape request: task={:?} target={:?} region={:?}",
        request.task(),
        request.target(),
        request.region()
    );

    match state.cache.serve(&request).await {
        Ok(served) => {
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            state
                .health_stats
                .record_scrape(served.status, elapsed_ms, served.response.body.len());
            debug!(
                "Scrape served ({}) in {:.2}ms, {} bytes",
                served.status,
                elapsed_ms,
                served.response.body.len()
            );
            (
                [
                    (
                        header::CONTENT_TYPE,
                        HeaderValue::from_static(served.response.content_type),
                    ),
                    (
                        HeaderName::from_static(CACHE_STATUS_HEADER),
                        HeaderValue::from_static(served.status.as_str()),
                    ),
                ],
                served.response.body,
            )
                .into_response()
        }
        Err(e) => {
            warn!("Scrape failed: {}", e);
            state
                .health_stats
                .record_scrape_error(matches!(*e, ScrapeError::Timeout(_)));
            (
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                )],
                format!("Error: {e}"),
            )
                .into_response()
        }
    }
}
