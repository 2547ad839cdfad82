//! Prometheus metrics describing the exporter itself.
//!
//! These live on the process-wide registry served at the telemetry path and are
//! never part of a scrape response. Per-scrape series go to the request-local
//! registry built in [`crate::scrape`].

use prometheus::{Counter, CounterVec, Gauge, GaugeVec, Histogram, HistogramOpts, Opts, Registry};

/// Buckets of the scrape duration histogram, in seconds.
pub const SCRAPE_DURATION_BUCKETS: [f64; 8] = [0.25, 0.5, 1.0, 2.0, 5.0, 8.0, 16.0, 30.0];

/// Operational metrics of the exporter.
#[derive(Clone)]
pub struct ExporterMetrics {
    pub source_requests_total: Counter,
    pub source_errors_total: Counter,
    pub scrape_duration: Histogram,
    pub cache_hits_total: Counter,
    pub cache_misses_total: Counter,
    pub cache_entries: Gauge,
    pub config_reloads_total: CounterVec, // labels: result
    pub config_version: Gauge,
    pub build_info: GaugeVec, // labels: version, git_sha
}

impl ExporterMetrics {
    /// Creates and registers all exporter metrics with the registry.
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let source_requests_total = Counter::new(
            "cloudwatch_requests_total",
            "API requests made to CloudWatch",
        )?;
        let source_errors_total = Counter::new(
            "cloudwatch_errors_total",
            "Failed API requests made to CloudWatch",
        )?;
        let scrape_duration = Histogram::with_opts(
            HistogramOpts::new(
                "cloudwatch_exporter_scrape_duration_seconds_buckets",
                "Time this CloudWatch scrape took, in seconds and shown in buckets",
            )
            .buckets(SCRAPE_DURATION_BUCKETS.to_vec()),
        )?;
        let cache_hits_total = Counter::new(
            "cloudwatch_exporter_cache_hits_total",
            "Scrape requests answered from the response cache",
        )?;
        let cache_misses_total = Counter::new(
            "cloudwatch_exporter_cache_misses_total",
            "Scrape requests that ran a collection pass",
        )?;
        let cache_entries = Gauge::new(
            "cloudwatch_exporter_cache_entries",
            "Number of scrape responses currently cached",
        )?;
        let config_reloads_total = CounterVec::new(
            Opts::new(
                "cloudwatch_exporter_config_reloads_total",
                "Configuration reload attempts by result",
            ),
            &["result"],
        )?;
        let config_version = Gauge::new(
            "cloudwatch_exporter_config_version",
            "Version of the active configuration snapshot",
        )?;
        let build_info = GaugeVec::new(
            Opts::new(
                "cloudwatch_exporter_build_info",
                "Build information of the running exporter",
            ),
            &["version", "git_sha"],
        )?;

        registry.register(Box::new(source_requests_total.clone()))?;
        registry.register(Box::new(source_errors_total.clone()))?;
        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(cache_hits_total.clone()))?;
        registry.register(Box::new(cache_misses_total.clone()))?;
        registry.register(Box::new(cache_entries.clone()))?;
        registry.register(Box::new(config_reloads_total.clone()))?;
        registry.register(Box::new(config_version.clone()))?;
        registry.register(Box::new(build_info.clone()))?;

        build_info
            .with_label_values(&[
                env!("CARGO_PKG_VERSION"),
                option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
            ])
            .set(1.0);

        Ok(Self {
            source_requests_total,
            source_errors_total,
            scrape_duration,
            cache_hits_total,
            cache_misses_total,
            cache_entries,
            config_reloads_total,
            config_version,
            build_info,
        })
    }

    /// Records the outcome of a configuration reload.
    pub fn record_reload(&self, success: bool, version: Option<u64>) {
        let result = if success { "success" } else { "failure" };
        self.config_reloads_total
            .with_label_values(&[result])
            .inc();
        if let Some(v) = version {
            self.config_version.set(v as f64);
        }
    }
}
