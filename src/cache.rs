//! Response cache for scrape results.
//!
//! Responses are keyed by configuration version, task, target and region.
//! Entries expire after the configured TTL and the least recently used entry
//! is evicted once capacity is reached. Concurrent misses for the same key
//! share a single collection pass. Errors are never stored.

use moka::future::Cache;
use moka::policy::EvictionPolicy;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::scrape::{ScrapeError, ScrapeHandler, ScrapeRequest, ScrapeResponse};

/// Identity of a cacheable scrape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScrapeKey {
    pub config_version: u64,
    pub task: String,
    pub target: Option<String>,
    pub region: Option<String>,
}

impl ScrapeKey {
    /// Builds the key for a request. Returns `None` if the request has no task.
    pub fn from_request(config_version: u64, request: &ScrapeRequest) -> Option<Self> {
        Some(Self {
            config_version,
            task: request.task()?.to_string(),
            target: request.target().map(String::from),
            region: request.region().map(String::from),
        })
    }
}

/// How a response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Bypass,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Bypass => "BYPASS",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A response together with its cache status.
#[derive(Debug, Clone)]
pub struct Served {
    pub response: ScrapeResponse,
    pub status: CacheStatus,
}

/// Cache in front of a [`ScrapeHandler`].
pub struct ScrapeCache {
    handler: Arc<ScrapeHandler>,
    cache: Option<Cache<ScrapeKey, ScrapeResponse>>,
}

impl ScrapeCache {
    /// Creates a cache holding at most `capacity` responses for `ttl` each.
    pub fn new(handler: Arc<ScrapeHandler>, capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        info!(
            "Response cache enabled: capacity {}, ttl {}s",
            capacity,
            ttl.as_secs()
        );
        Self {
            handler,
            cache: Some(cache),
        }
    }

    /// Pass-through variant: every request runs a collection pass.
    pub fn disabled(handler: Arc<ScrapeHandler>) -> Self {
        info!("Response cache disabled");
        Self {
            handler,
            cache: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub fn handler(&self) -> &Arc<ScrapeHandler> {
        &self.handler
    }

    /// Serves a request from cache or runs the handler.
    pub async fn serve(&self, request: &ScrapeRequest) -> Result<Served, Arc<ScrapeError>> {
        // The key and the rendered body come from the same snapshot.
        let snapshot = self.handler.store().get();
        let key = ScrapeKey::from_request(snapshot.version(), request);
        let (cache, key) = match (&self.cache, key) {
            (Some(cache), Some(key)) => (cache, key),
            _ => {
                let response = self
                    .handler
                    .handle_at(request, snapshot)
                    .await
                    .map_err(Arc::new)?;
                return Ok(Served {
                    response,
                    status: CacheStatus::Bypass,
                });
            }
        };

        let handler = self.handler.clone();
        let owned = request.clone();
        let entry = cache
            .entry(key)
            .or_try_insert_with(async move { handler.handle_at(&owned, snapshot).await })
            .await?;

        let metrics = self.handler.metrics();
        let status = if entry.is_fresh() {
            // Enforce the capacity bound before answering, not on moka's schedule.
            cache.run_pending_tasks().await;
            metrics.cache_misses_total.inc();
            CacheStatus::Miss
        } else {
            metrics.cache_hits_total.inc();
            CacheStatus::Hit
        };
        debug!(
            "Scrape {:?}/{:?}: cache {}",
            request.task(),
            request.target(),
            status
        );

        Ok(Served {
            response: entry.into_value(),
            status,
        })
    }

    /// Drops every cached response.
    pub fn invalidate_all(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }

    /// Approximate number of cached responses.
    pub fn entry_count(&self) -> u64 {
        self.cache.as_ref().map_or(0, |c| c.entry_count())
    }

    /// Runs pending eviction and expiration work.
    pub async fn run_pending_tasks(&self) {
        if let Some(cache) = &self.cache {
            cache.run_pending_tasks().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectorFactory;
    use crate::config::{Config, MetricConfig, Statistic, TaskConfig};
    use crate::config_store::ConfigStore;
    use crate::metrics::ExporterMetrics;
    use crate::source::{MetricQuery, MetricsSource, Observation, SourceError};
    use async_trait::async_trait;
    use prometheus::Registry;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    /// Source returning a counter value that changes on every call.
    struct CountingSource {
        calls: AtomicU64,
        latency: Duration,
        fail: AtomicBool,
    }

    impl CountingSource {
        fn new(latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU64::new(0),
                latency,
                fail: AtomicBool::new(false),
            })
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MetricsSource for CountingSource {
        async fn fetch(&self, query: &MetricQuery) -> Result<Vec<Observation>, SourceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(SourceError::Unavailable("down".into()));
            }
            Ok(vec![Observation {
                dimensions: BTreeMap::from([("Currency".to_string(), "USD".to_string())]),
                statistic: Statistic::Maximum,
                value: n as f64,
                timestamp: query.end,
            }])
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn config(tasks: &[&str]) -> Config {
        Config {
            tasks: tasks
                .iter()
                .map(|name| TaskConfig {
                    name: name.to_string(),
                    default_region: Some("us-east-1".into()),
                    metrics: vec![MetricConfig {
                        aws_namespace: "AWS/Billing".into(),
                        aws_metric_name: "EstimatedCharges".into(),
                        aws_dimensions: vec!["Currency".into()],
                        aws_statistics: vec![Statistic::Maximum],
                        period_seconds: 60,
                        range_seconds: 600,
                        delay_seconds: 0,
                        aws_dimensions_select: BTreeMap::new(),
                        aws_dimensions_select_regex: BTreeMap::new(),
                        aws_dimensions_select_param: BTreeMap::new(),
                    }],
                })
                .collect(),
            ..Config::default()
        }
    }

    fn handler(source: Arc<CountingSource>, tasks: &[&str]) -> Arc<ScrapeHandler> {
        let metrics = ExporterMetrics::new(&Registry::new()).unwrap();
        let store = Arc::new(ConfigStore::new(config(tasks)).unwrap());
        Arc::new(ScrapeHandler::new(
            store,
            CollectorFactory::new(source, metrics.clone()),
            metrics,
            Duration::from_secs(5),
        ))
    }

    fn cache(source: Arc<CountingSource>, capacity: u64, ttl: Duration) -> ScrapeCache {
        ScrapeCache::new(handler(source, &["a", "b", "c"]), capacity, ttl)
    }

    #[tokio::test]
    async fn test_hit_is_byte_identical() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = cache(source.clone(), 10, Duration::from_secs(60));
        let req = ScrapeRequest::new("a");

        let first = cache.serve(&req).await.unwrap();
        let second = cache.serve(&req).await.unwrap();

        assert_eq!(first.status, CacheStatus::Miss);
        assert_eq!(second.status, CacheStatus::Hit);
        assert_eq!(first.response.body, second.response.body);
        assert_eq!(source.calls(), 1);

        let metrics = cache.handler().metrics();
        assert_eq!(metrics.cache_hits_total.get(), 1.0);
        assert_eq!(metrics.cache_misses_total.get(), 1.0);
    }

    #[tokio::test]
    async fn test_distinct_keys() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = cache(source.clone(), 10, Duration::from_secs(60));

        cache.serve(&ScrapeRequest::new("a")).await.unwrap();
        cache
            .serve(&ScrapeRequest::new("a").with_target("x"))
            .await
            .unwrap();
        cache
            .serve(&ScrapeRequest::new("a").with_region("eu-west-1"))
            .await
            .unwrap();
        // Empty target normalizes to the first key
        let served = cache
            .serve(&ScrapeRequest::new("a").with_target(""))
            .await
            .unwrap();

        assert_eq!(served.status, CacheStatus::Hit);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = cache(source.clone(), 10, Duration::from_millis(200));
        let req = ScrapeRequest::new("a");

        let first = cache.serve(&req).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        let second = cache.serve(&req).await.unwrap();

        assert_eq!(second.status, CacheStatus::Miss);
        assert_ne!(first.response.body, second.response.body);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = cache(source.clone(), 2, Duration::from_secs(60));

        cache.serve(&ScrapeRequest::new("a")).await.unwrap();
        cache.serve(&ScrapeRequest::new("b")).await.unwrap();
        // Touch "a" so "b" becomes least recently used
        let a = cache.serve(&ScrapeRequest::new("a")).await.unwrap();
        assert_eq!(a.status, CacheStatus::Hit);
        cache.serve(&ScrapeRequest::new("c")).await.unwrap();

        assert!(cache.entry_count() <= 2);
        let a = cache.serve(&ScrapeRequest::new("a")).await.unwrap();
        assert_eq!(a.status, CacheStatus::Hit);
        let b = cache.serve(&ScrapeRequest::new("b")).await.unwrap();
        assert_eq!(b.status, CacheStatus::Miss);
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test]
    async fn test_capacity_bound_holds_without_housekeeping() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = cache(source.clone(), 2, Duration::from_secs(60));

        for key in ["a", "b", "c"] {
            let served = cache.serve(&ScrapeRequest::new(key)).await.unwrap();
            assert_eq!(served.status, CacheStatus::Miss);
        }
        assert_eq!(cache.entry_count(), 2);

        // "a" was the least recently used entry when "c" came in
        let a = cache.serve(&ScrapeRequest::new("a")).await.unwrap();
        assert_eq!(a.status, CacheStatus::Miss);
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = cache(source.clone(), 10, Duration::from_secs(60));
        let req = ScrapeRequest::new("a");

        source.fail.store(true, Ordering::SeqCst);
        assert!(cache.serve(&req).await.is_err());
        cache.run_pending_tasks().await;
        assert_eq!(cache.entry_count(), 0);

        source.fail.store(false, Ordering::SeqCst);
        let served = cache.serve(&req).await.unwrap();
        assert_eq!(served.status, CacheStatus::Miss);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_task_bypasses() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = cache(source.clone(), 10, Duration::from_secs(60));

        let err = cache.serve(&ScrapeRequest::default()).await.unwrap_err();
        assert!(matches!(*err, ScrapeError::MissingParameter("task")));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_collects() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = ScrapeCache::disabled(handler(source.clone(), &["a"]));
        let req = ScrapeRequest::new("a");

        let first = cache.serve(&req).await.unwrap();
        let second = cache.serve(&req).await.unwrap();
        assert_eq!(first.status, CacheStatus::Bypass);
        assert_eq!(second.status, CacheStatus::Bypass);
        assert_eq!(source.calls(), 2);
        assert!(!cache.is_enabled());
    }

    #[tokio::test]
    async fn test_concurrent_misses_are_coalesced() {
        let source = CountingSource::new(Duration::from_millis(100));
        let cache = Arc::new(cache(source.clone(), 10, Duration::from_secs(60)));

        let mut joins = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            joins.push(tokio::spawn(async move {
                cache.serve(&ScrapeRequest::new("a")).await.unwrap()
            }));
        }

        let mut misses = 0;
        let mut bodies = Vec::new();
        for join in joins {
            let served = join.await.unwrap();
            if served.status == CacheStatus::Miss {
                misses += 1;
            }
            bodies.push(served.response.body);
        }

        assert_eq!(misses, 1);
        assert_eq!(source.calls(), 1);
        assert!(bodies.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_cancelled_request_caches_nothing() {
        let source = CountingSource::new(Duration::from_millis(300));
        let cache = Arc::new(cache(source.clone(), 10, Duration::from_secs(60)));

        let c = cache.clone();
        let join = tokio::spawn(async move { c.serve(&ScrapeRequest::new("a")).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        join.abort();
        assert!(join.await.unwrap_err().is_cancelled());

        cache.run_pending_tasks().await;
        assert_eq!(cache.entry_count(), 0);

        let served = cache.serve(&ScrapeRequest::new("a")).await.unwrap();
        assert_eq!(served.status, CacheStatus::Miss);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_reload_changes_key() {
        let source = CountingSource::new(Duration::ZERO);
        let handler = handler(source.clone(), &["a"]);
        let cache = ScrapeCache::new(handler.clone(), 10, Duration::from_secs(60));
        let req = ScrapeRequest::new("a");

        cache.serve(&req).await.unwrap();
        handler.store().set(config(&["a"])).unwrap();
        let served = cache.serve(&req).await.unwrap();

        assert_eq!(served.status, CacheStatus::Miss);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = cache(source.clone(), 10, Duration::from_secs(60));

        cache.serve(&ScrapeRequest::new("a")).await.unwrap();
        cache.invalidate_all();
        let served = cache.serve(&ScrapeRequest::new("a")).await.unwrap();
        assert_eq!(served.status, CacheStatus::Miss);
    }
}
