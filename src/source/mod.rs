//! Metrics source interface.
//!
//! A source answers fully resolved [`MetricQuery`] values with a set of
//! labelled observations. The exporter only depends on this trait; the bundled
//! [`TestDataSource`] serves synthetic series from a JSON file.

pub mod testdata;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::config::Statistic;

pub use testdata::{TestData, TestDataSource, TestSeries};

/// Failure reported by a metrics source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("authentication failure: {0}")]
    AuthFailure(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
}

/// Dimension selection sent to the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionFilter {
    pub name: String,
    /// Accepted values; empty means any value.
    pub values: Vec<String>,
}

/// A fully resolved query for one metric of a task.
#[derive(Debug, Clone)]
pub struct MetricQuery {
    pub namespace: String,
    pub metric_name: String,
    pub region: String,
    pub dimensions: Vec<String>,
    pub filters: Vec<DimensionFilter>,
    pub statistics: Vec<Statistic>,
    pub period_seconds: u64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// One value returned by the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub dimensions: BTreeMap<String, String>,
    pub statistic: Statistic,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Fetches the latest observations matching `query`.
    async fn fetch(&self, query: &MetricQuery) -> Result<Vec<Observation>, SourceError>;

    /// Short name for logs and the /config page.
    fn name(&self) -> &str;
}
