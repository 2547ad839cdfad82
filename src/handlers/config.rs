//! Configuration display endpoint handler.
//!
//! Shows the server settings fixed at startup and the task definitions of the
//! active configuration snapshot.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::config::series_name;
use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the /config endpoint.
#[instrument(skip(state))]
pub async fn config_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /config request");
    state.health_stats.record_http_request();

    let settings = &state.settings;
    let snapshot = state.config_store.get();
    let cfg = snapshot.config();

    let mut out = String::new();

    writeln!(out, "HERAKLES CLOUDWATCH EXPORTER - CONFIGURATION").ok();
    writeln!(out, "============================================").ok();
    writeln!(out).ok();

    writeln!(out, "SERVER CONFIGURATION").ok();
    writeln!(out, "--------------------").ok();
    writeln!(out, "bind:                       {}", settings.bind).ok();
    writeln!(out, "port:                       {}", settings.port).ok();
    writeln!(out, "metrics_path:               {}", settings.metrics_path).ok();
    writeln!(out, "scrape_path:                {}", settings.scrape_path).ok();
    writeln!(out, "enable_health:              {}", settings.enable_health).ok();
    writeln!(
        out,
        "enable_tls:                 {}",
        cfg.enable_tls.unwrap_or(false)
    )
    .ok();
    writeln!(out).ok();

    writeln!(out, "RESPONSE CACHE").ok();
    writeln!(out, "--------------").ok();
    writeln!(out, "enable_cache:               {}", settings.enable_cache).ok();
    writeln!(
        out,
        "cache_ttl:                  {} seconds",
        settings.cache_ttl.as_secs()
    )
    .ok();
    writeln!(out, "cache_capacity:             {}", settings.cache_capacity).ok();
    writeln!(
        out,
        "scrape_timeout:             {} seconds",
        settings.scrape_timeout.as_secs()
    )
    .ok();
    writeln!(out, "source:                     {}", state.source_name).ok();
    writeln!(out).ok();

    writeln!(
        out,
        "TASKS (configuration v{}, loaded {})",
        snapshot.version(),
        snapshot.loaded_at().format("%Y-%m-%d %H:%M:%S UTC")
    )
    .ok();
    writeln!(out, "-----").ok();
    if snapshot.tasks().is_empty() {
        writeln!(out, "(none)").ok();
    }
    for task in snapshot.tasks() {
        writeln!(
            out,
            "{} (default_region: {})",
            task.name,
            task.default_region.as_deref().unwrap_or("none")
        )
        .ok();
        for metric in &task.metrics {
            let series: Vec<String> = metric
                .aws_statistics
                .iter()
                .map(|s| series_name(metric, *s))
                .collect();
            writeln!(
                out,
                "  {}/{} [{}] period={}s range={}s delay={}s{}",
                metric.aws_namespace,
                metric.aws_metric_name,
                metric.aws_dimensions.join(","),
                metric.period_seconds,
                metric.range_seconds,
                metric.delay_seconds,
                if metric.uses_target() { " (target)" } else { "" }
            )
            .ok();
            writeln!(out, "    -> {}", series.join(", ")).ok();
        }
    }

    writeln!(out).ok();
    writeln!(out, "{FOOTER_TEXT}").ok();

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        out,
    )
}
