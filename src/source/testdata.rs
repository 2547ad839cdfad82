//! File-backed metrics source serving synthetic series.
//!
//! The JSON layout is produced by the `generate-testdata` subcommand and lets
//! the exporter run end-to-end without cloud credentials.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use super::{MetricQuery, MetricsSource, Observation, SourceError};
use crate::config::{Config, Statistic};

/// One synthetic series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSeries {
    pub namespace: String,
    pub metric_name: String,
    /// Region the series lives in; `None` matches every region.
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
    pub values: BTreeMap<Statistic, f64>,
}

/// Root structure for test data JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestData {
    pub version: String,
    pub generated_at: String,
    pub series: Vec<TestSeries>,
}

/// Load test data from JSON file.
pub fn load_test_data_from_file(path: &Path) -> anyhow::Result<TestData> {
    use anyhow::Context;

    debug!("Loading test data from: {}", path.display());

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read test data file {}", path.display()))?;
    let test_data: TestData =
        serde_json::from_str(&content).context("Failed to parse test data JSON")?;

    info!(
        "Loaded test data version {} from {} ({} series)",
        test_data.version,
        test_data.generated_at,
        test_data.series.len()
    );

    Ok(test_data)
}

/// Metrics source answering queries from [`TestData`].
pub struct TestDataSource {
    data: TestData,
    latency: Duration,
    queries: AtomicU64,
}

impl TestDataSource {
    pub fn new(data: TestData, latency: Duration) -> Self {
        Self {
            data,
            latency,
            queries: AtomicU64::new(0),
        }
    }

    pub fn from_file(path: &Path, latency: Duration) -> anyhow::Result<Self> {
        Ok(Self::new(load_test_data_from_file(path)?, latency))
    }

    /// Builds the source from `test_data_file` and `simulated_latency_ms`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let path = config
            .test_data_file
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no metrics source configured: set test_data_file"))?;
        let latency = Duration::from_millis(config.simulated_latency_ms.unwrap_or(0));
        Self::from_file(path, latency)
    }

    /// Number of queries answered so far.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    fn matches(series: &TestSeries, query: &MetricQuery) -> bool {
        if series.namespace != query.namespace || series.metric_name != query.metric_name {
            return false;
        }
        if series
            .region
            .as_deref()
            .is_some_and(|r| r != query.region)
        {
            return false;
        }
        query.filters.iter().all(|filter| {
            match series.dimensions.get(&filter.name) {
                Some(value) => filter.values.is_empty() || filter.values.contains(value),
                None => false,
            }
        })
    }
}

#[async_trait]
impl MetricsSource for TestDataSource {
    async fn fetch(&self, query: &MetricQuery) -> Result<Vec<Observation>, SourceError> {
        self.queries.fetch_add(1, Ordering::Relaxed);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let observations = self
            .data
            .series
            .iter()
            .filter(|s| Self::matches(s, query))
            .flat_map(|series| {
                query.statistics.iter().filter_map(move |stat| {
                    series.values.get(stat).map(|value| Observation {
                        dimensions: series.dimensions.clone(),
                        statistic: *stat,
                        value: *value,
                        timestamp: query.end,
                    })
                })
            })
            .collect::<Vec<_>>();

        debug!(
            "testdata: {}/{} in {} -> {} observations",
            query.namespace,
            query.metric_name,
            query.region,
            observations.len()
        );
        Ok(observations)
    }

    fn name(&self) -> &str {
        "testdata"
    }
}
