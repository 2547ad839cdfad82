//! Request-scoped collectors.
//!
//! [`CollectorFactory::build`] turns a scrape request plus a configuration
//! snapshot into a [`Collector`] that owns everything it needs for a single
//! collection pass. No I/O happens until [`Collector::collect`] is driven.

use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use prometheus::{Counter, Gauge, GaugeVec, Opts, Registry};
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::{
    is_valid_region, series_name, to_snake_case, MetricConfig, BUILTIN_LABELS,
    TARGET_PLACEHOLDER,
};
use crate::config_store::ConfigSnapshot;
use crate::metrics::ExporterMetrics;
use crate::scrape::ScrapeError;
use crate::source::{DimensionFilter, MetricQuery, MetricsSource, Observation, SourceError};

/// Maximum accepted length of the `target` parameter.
pub const MAX_TARGET_LEN: usize = 1024;

/// A task metric with every request parameter substituted.
#[derive(Debug)]
struct ResolvedMetric {
    config: MetricConfig,
    filters: Vec<DimensionFilter>,
    regex_filters: Vec<(String, Regex)>,
    label_names: Vec<String>,
}

impl ResolvedMetric {
    fn query(&self, region: &str, now: DateTime<Utc>) -> MetricQuery {
        let end = now - chrono::Duration::seconds(self.config.delay_seconds as i64);
        let start = end - chrono::Duration::seconds(self.config.range_seconds as i64);
        MetricQuery {
            namespace: self.config.aws_namespace.clone(),
            metric_name: self.config.aws_metric_name.clone(),
            region: region.to_string(),
            dimensions: self.config.aws_dimensions.clone(),
            filters: self.filters.clone(),
            statistics: self.config.aws_statistics.clone(),
            period_seconds: self.config.period_seconds,
            start,
            end,
        }
    }

    fn accepts(&self, observation: &Observation) -> bool {
        self.regex_filters.iter().all(|(dimension, re)| {
            observation
                .dimensions
                .get(dimension)
                .is_some_and(|v| re.is_match(v))
        })
    }
}

/// Result of one collection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionSummary {
    pub queries: usize,
    pub failed_queries: usize,
    pub series: usize,
}

/// Single-use collector bound to one request and one snapshot.
pub struct Collector {
    task: String,
    region: String,
    target: Option<String>,
    metrics: Vec<ResolvedMetric>,
    source: Arc<dyn MetricsSource>,
    exporter_metrics: ExporterMetrics,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("task", &self.task)
            .field("region", &self.region)
            .field("target", &self.target)
            .field("metrics", &self.metrics.len())
            .field("source", &self.source.name())
            .finish()
    }
}

impl Collector {
    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Runs the collection pass and registers the resulting series with `registry`.
    ///
    /// Consumes the collector. Fails only if every source query failed.
    pub async fn collect(self, registry: &Registry) -> Result<CollectionSummary, ScrapeError> {
        let start = Instant::now();
        let now = Utc::now();

        let mut gauges: HashMap<String, GaugeVec> = HashMap::new();
        let mut failures: Vec<SourceError> = Vec::new();
        let mut series = 0usize;

        for metric in &self.metrics {
            let query = metric.query(&self.region, now);
            self.exporter_metrics.source_requests_total.inc();

            let observations = match self.source.fetch(&query).await {
                Ok(obs) => obs,
                Err(e) => {
                    warn!(
                        "task {}: query {}/{} failed: {}",
                        self.task, query.namespace, query.metric_name, e
                    );
                    self.exporter_metrics.source_errors_total.inc();
                    failures.push(e);
                    continue;
                }
            };

            for observation in observations.iter().filter(|o| metric.accepts(o)) {
                let name = series_name(&metric.config, observation.statistic);
                let gauge = match gauges.get(&name) {
                    Some(g) => g.clone(),
                    None => {
                        let help = format!(
                            "CloudWatch metric {}/{} statistic {}",
                            metric.config.aws_namespace,
                            metric.config.aws_metric_name,
                            observation.statistic
                        );
                        let label_refs: Vec<&str> =
                            metric.label_names.iter().map(String::as_str).collect();
                        let g = GaugeVec::new(Opts::new(name.clone(), help), &label_refs)
                            .map_err(|e| ScrapeError::Registry(e.to_string()))?;
                        registry
                            .register(Box::new(g.clone()))
                            .map_err(|e| ScrapeError::Registry(e.to_string()))?;
                        gauges.insert(name, g.clone());
                        g
                    }
                };

                let mut values: Vec<&str> = metric
                    .config
                    .aws_dimensions
                    .iter()
                    .map(|d| {
                        observation
                            .dimensions
                            .get(d)
                            .map(String::as_str)
                            .unwrap_or("")
                    })
                    .collect();
                values.push(self.region.as_str());
                values.push(self.task.as_str());

                gauge.with_label_values(&values).set(observation.value);
                series += 1;
            }
        }

        let scrape_errors = Counter::new(
            "cloudwatch_exporter_scrape_errors",
            "CloudWatch queries that failed during this scrape",
        )
        .map_err(|e| ScrapeError::Registry(e.to_string()))?;
        scrape_errors.inc_by(failures.len() as f64);
        let scrape_duration = Gauge::new(
            "cloudwatch_exporter_scrape_duration_seconds",
            "Time this CloudWatch scrape took, in seconds",
        )
        .map_err(|e| ScrapeError::Registry(e.to_string()))?;
        scrape_duration.set(start.elapsed().as_secs_f64());

        let own: [Box<dyn prometheus::core::Collector>; 2] =
            [Box::new(scrape_errors), Box::new(scrape_duration)];
        for c in own {
            registry
                .register(c)
                .map_err(|e| ScrapeError::Registry(e.to_string()))?;
        }

        let summary = CollectionSummary {
            queries: self.metrics.len(),
            failed_queries: failures.len(),
            series,
        };
        debug!("task {} collected: {:?}", self.task, summary);

        if summary.queries > 0 && summary.failed_queries == summary.queries {
            // Nothing usable came back; surface the first failure.
            return Err(ScrapeError::Source(failures.swap_remove(0)));
        }

        Ok(summary)
    }
}

/// Builds collectors bound to the shared metrics source.
#[derive(Clone)]
pub struct CollectorFactory {
    source: Arc<dyn MetricsSource>,
    exporter_metrics: ExporterMetrics,
}

impl CollectorFactory {
    pub fn new(source: Arc<dyn MetricsSource>, exporter_metrics: ExporterMetrics) -> Self {
        Self {
            source,
            exporter_metrics,
        }
    }

    /// Builds a fresh collector for `task` from `snapshot`.
    ///
    /// Empty `target`/`region` fall back to task defaults.
    pub fn build(
        &self,
        target: Option<&str>,
        task: &str,
        region: Option<&str>,
        snapshot: &ConfigSnapshot,
    ) -> Result<Collector, ScrapeError> {
        let task_config = snapshot
            .task(task)
            .ok_or_else(|| ScrapeError::TaskNotFound(task.to_string()))?;

        let region = region
            .filter(|r| !r.is_empty())
            .or(task_config.default_region.as_deref())
            .ok_or_else(|| {
                ScrapeError::Build(format!(
                    "no region given and task '{task}' has no default_region"
                ))
            })?;
        if !is_valid_region(region) {
            return Err(ScrapeError::Build(format!("invalid region '{region}'")));
        }

        let target = target.filter(|t| !t.is_empty());
        if let Some(t) = target {
            if t.len() > MAX_TARGET_LEN {
                return Err(ScrapeError::Build(format!(
                    "target exceeds {MAX_TARGET_LEN} bytes"
                )));
            }
            if t.chars().any(|c| c.is_whitespace() || c.is_control()) {
                return Err(ScrapeError::Build(format!(
                    "target '{}' contains whitespace or control characters",
                    t.escape_debug()
                )));
            }
        }

        let metrics = task_config
            .metrics
            .iter()
            .map(|m| resolve_metric(m, task, target))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Collector {
            task: task.to_string(),
            region: region.to_string(),
            target: target.map(String::from),
            metrics,
            source: self.source.clone(),
            exporter_metrics: self.exporter_metrics.clone(),
        })
    }
}

fn resolve_metric(
    metric: &MetricConfig,
    task: &str,
    target: Option<&str>,
) -> Result<ResolvedMetric, ScrapeError> {
    let mut filters = Vec::with_capacity(metric.aws_dimensions.len());

    for dimension in &metric.aws_dimensions {
        let mut values: Vec<String> = metric
            .aws_dimensions_select
            .get(dimension)
            .cloned()
            .unwrap_or_default();

        if let Some(params) = metric.aws_dimensions_select_param.get(dimension) {
            for param in params {
                if param == TARGET_PLACEHOLDER {
                    let t = target.ok_or_else(|| {
                        ScrapeError::Build(format!("task '{task}' requires a target parameter"))
                    })?;
                    values.push(t.to_string());
                } else {
                    values.push(param.clone());
                }
            }
        }

        values.sort();
        values.dedup();
        filters.push(DimensionFilter {
            name: dimension.clone(),
            values,
        });
    }

    let regex_filters = metric
        .aws_dimensions_select_regex
        .iter()
        .map(|(dimension, pattern)| {
            Regex::new(pattern)
                .map(|re| (dimension.clone(), re))
                .map_err(|e| ScrapeError::Build(format!("invalid regex '{pattern}': {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut label_names: Vec<String> = metric
        .aws_dimensions
        .iter()
        .map(|d| to_snake_case(d))
        .collect();
    label_names.extend(BUILTIN_LABELS.iter().map(|l| l.to_string()));

    Ok(ResolvedMetric {
        config: metric.clone(),
        filters,
        regex_filters,
        label_names,
    })
}
