//! Root endpoint handler for the landing page.
//!
//! Lists the endpoints of the exporter together with the configured tasks.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use tracing::{debug, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");
    state.health_stats.record_http_request();

    let version = env!("CARGO_PKG_VERSION");
    let settings = &state.settings;
    let snapshot = state.config_store.get();

    let tasks: String = snapshot
        .tasks()
        .iter()
        .map(|t| {
            format!(
                r#"        <li><a href="{path}?task={name}">{name}</a> <span class="endpoint-desc">{count} metrics</span></li>
"#,
                path = settings.scrape_path,
                name = html_escape(&t.name),
                count = t.metrics.len()
            )
        })
        .collect();

    // Calculate actual uptime from service start time
    let uptime_secs = state.start_time.elapsed().as_secs();
    let hours = uptime_secs / 3600;
    let minutes = (uptime_secs % 3600) / 60;
    let seconds = uptime_secs % 60;
    let uptime_str = format!("{}h {}m {}s", hours, minutes, seconds);

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Herakles CloudWatch Exporter</title>
    <style>
        body {{ 
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; 
            margin: 0; 
            padding: 20px; 
            background: #f5f5f5; 
            line-height: 1.6;
        }}
        .container {{ 
            max-width: 900px; 
            margin: 0 auto; 
            background: white; 
            padding: 40px; 
            border-radius: 8px; 
            box-shadow: 0 2px 8px rgba(0,0,0,0.1); 
        }}
        h1 {{ 
            color: #333; 
            border-bottom: 3px solid #007bff; 
            padding-bottom: 15px; 
            margin-bottom: 10px;
        }}
        .subtitle {{
            color: #666;
            font-size: 1.1em;
            margin-bottom: 30px;
        }}
        h2 {{ 
            color: #555; 
            margin-top: 35px; 
            margin-bottom: 15px;
        }}
        .info {{ 
            background: #e9ecef; 
            padding: 15px; 
            border-radius: 4px; 
            margin: 20px 0;
            display: flex;
            justify-content: space-around;
            flex-wrap: wrap;
        }}
        .info-item {{
            margin: 10px;
        }}
        .info-label {{ 
            font-weight: 600; 
            color: #555; 
            display: block;
            font-size: 0.9em;
        }}
        .info-value {{ 
            font-size: 1.2em; 
            color: #007bff; 
        }}
        .endpoint-list {{
            list-style: none;
            padding: 0;
        }}
        .endpoint-list li {{
            margin: 20px 0;
            padding: 15px;
            background: #f8f9fa;
            border-left: 4px solid #007bff;
            border-radius: 4px;
        }}
        .endpoint-list a {{
            color: #007bff;
            text-decoration: none;
            font-weight: 600;
            font-size: 1.1em;
        }}
        .endpoint-list a:hover {{
            text-decoration: underline;
        }}
        .endpoint-desc {{
            color: #666;
            margin-top: 5px;
        }}
        .footer {{ 
            margin-top: 40px; 
            padding-top: 20px; 
            border-top: 1px solid #ddd; 
            color: #666; 
            font-size: 0.9em; 
            text-align: center;
        }}
        code {{
            background: #e9ecef;
            padding: 2px 6px;
            border-radius: 3px;
            font-family: 'Courier New', monospace;
        }}
    </style>
</head>
<body>
<div class="container">
    <h1>Herakles CloudWatch Exporter</h1>
    <p class="subtitle">Caching Prometheus exporter for CloudWatch-style metrics</p>

    <div class="info">
        <div class="info-item">
            <span class="info-label">Version</span>
            <span class="info-value">{version}</span>
        </div>
        <div class="info-item">
            <span class="info-label">Uptime</span>
            <span class="info-value">{uptime}</span>
        </div>
        <div class="info-item">
            <span class="info-label">Configuration</span>
            <span class="info-value">v{config_version}</span>
        </div>
    </div>

    <h2>Available Endpoints</h2>
    <ul class="endpoint-list">
        <li>
            <a href="{scrape_path}">{scrape_path}</a>
            <div class="endpoint-desc">Scrape a task: <code>{scrape_path}?task=&lt;name&gt;&amp;target=&lt;id&gt;&amp;region=&lt;region&gt;</code></div>
        </li>
        <li>
            <a href="{metrics_path}">{metrics_path}</a>
            <div class="endpoint-desc">Exporter's own metrics (requests, errors, cache, reloads)</div>
        </li>
        <li>
            <a href="/health">/health</a>
            <div class="endpoint-desc">Exporter internal health &amp; performance statistics (text)</div>
        </li>
        <li>
            <a href="/config">/config</a>
            <div class="endpoint-desc">Active runtime configuration (read-only)</div>
        </li>
        <li>
            <a href="/reload">/reload</a>
            <div class="endpoint-desc">Re-read the configuration file</div>
        </li>
    </ul>

    <h2>Tasks</h2>
    <ul>
{tasks}    </ul>

    <div class="footer">
        <p>{footer}</p>
    </div>
</div>
</body>
</html>"#,
        version = version,
        uptime = uptime_str,
        config_version = snapshot.version(),
        scrape_path = settings.scrape_path,
        metrics_path = settings.metrics_path,
        tasks = tasks,
        footer = FOOTER_TEXT
    );

    Html(html)
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
