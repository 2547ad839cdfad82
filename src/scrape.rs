//! Scrape request handling.
//!
//! One [`ScrapeHandler::handle`] call walks a request through
//! `Validated -> ConfigSnapshotted -> CollectorBuilt -> Rendered`, using a
//! registry that exists only for that call.

use axum::body::Bytes;
use prometheus::{Encoder, Registry, TextEncoder, TEXT_FORMAT};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use crate::collector::CollectorFactory;
use crate::config_store::{ConfigSnapshot, ConfigStore};
use crate::metrics::ExporterMetrics;
use crate::source::SourceError;

/// Initial capacity of the encoding buffer.
const BUFFER_CAP: usize = 16 * 1024;

/// Query parameters of a scrape request.
///
/// Empty values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct ScrapeRequest {
    pub task: Option<String>,
    pub target: Option<String>,
    pub region: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl ScrapeRequest {
    pub fn new(task: &str) -> Self {
        Self {
            task: Some(task.to_string()),
            ..Self::default()
        }
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    pub fn with_region(mut self, region: &str) -> Self {
        self.region = Some(region.to_string());
        self
    }

    /// Builds a request from raw query pairs. The first occurrence of a
    /// parameter wins and unknown parameters are ignored.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut request = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "task" => &mut request.task,
                "target" => &mut request.target,
                "region" => &mut request.region,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        request
    }

    pub fn task(&self) -> Option<&str> {
        non_empty(&self.task)
    }

    pub fn target(&self) -> Option<&str> {
        non_empty(&self.target)
    }

    pub fn region(&self) -> Option<&str> {
        non_empty(&self.region)
    }
}

/// Request-level failures. All of them are rendered into the response body.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("Missing {0} parameter")]
    MissingParameter(&'static str),
    #[error("Task '{0}' not found in configuration")]
    TaskNotFound(String),
    #[error("Can't build collector: {0}")]
    Build(String),
    #[error("{0}")]
    Source(#[from] SourceError),
    #[error("Scrape timed out after {0:?}")]
    Timeout(Duration),
    #[error("Metrics registry error: {0}")]
    Registry(String),
    #[error("Failed to encode metrics: {0}")]
    Encoding(String),
}

/// Rendered exposition output.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeResponse {
    pub body: Bytes,
    pub content_type: &'static str,
}

/// Orchestrates one scrape request.
pub struct ScrapeHandler {
    store: Arc<ConfigStore>,
    factory: CollectorFactory,
    metrics: ExporterMetrics,
    timeout: Duration,
}

impl ScrapeHandler {
    pub fn new(
        store: Arc<ConfigStore>,
        factory: CollectorFactory,
        metrics: ExporterMetrics,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            factory,
            metrics,
            timeout,
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn metrics(&self) -> &ExporterMetrics {
        &self.metrics
    }

    /// Handles one request end to end against the active snapshot.
    pub async fn handle(&self, request: &ScrapeRequest) -> Result<ScrapeResponse, ScrapeError> {
        self.handle_at(request, self.store.get()).await
    }

    /// Handles one request against `snapshot`.
    ///
    /// The snapshot is held until the response is rendered, even if a reload
    /// swaps the store in the meantime.
    #[instrument(
        skip(self, snapshot),
        fields(task = ?request.task(), version = snapshot.version())
    )]
    pub async fn handle_at(
        &self,
        request: &ScrapeRequest,
        snapshot: Arc<ConfigSnapshot>,
    ) -> Result<ScrapeResponse, ScrapeError> {
        let task = request
            .task()
            .ok_or(ScrapeError::MissingParameter("task"))?;

        let collector = self
            .factory
            .build(request.target(), task, request.region(), &snapshot)?;
        debug!(
            "Collector built for task {} (config v{})",
            task,
            snapshot.version()
        );

        let start = Instant::now();
        let registry = Registry::new();
        let outcome = tokio::time::timeout(self.timeout, collector.collect(&registry)).await;
        self.metrics
            .scrape_duration
            .observe(start.elapsed().as_secs_f64());

        let summary = match outcome {
            Ok(result) => result?,
            Err(_) => {
                warn!("Scrape of task {} timed out after {:?}", task, self.timeout);
                return Err(ScrapeError::Timeout(self.timeout));
            }
        };

        let mut buffer = Vec::with_capacity(BUFFER_CAP);
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(|e| ScrapeError::Encoding(e.to_string()))?;

        debug!(
            "Scrape of task {} rendered {} series, {} bytes in {:.3}ms",
            task,
            summary.series,
            buffer.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(ScrapeResponse {
            body: Bytes::from(buffer),
            content_type: TEXT_FORMAT,
        })
    }
}
