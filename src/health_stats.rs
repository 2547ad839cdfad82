//! Health statistics for the exporter.
//!
//! Tracks scrape performance, cache effectiveness, reloads and HTTP traffic
//! and renders them as the plain-text table served at `/health`.

use std::collections::VecDeque;
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock as StdRwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::cache::CacheStatus;

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// Returns `(last, avg, max, min, count)`.
    pub fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

/// Sliding window of HTTP request timestamps.
pub struct RequestTimestamps {
    inner: Mutex<VecDeque<Instant>>,
}

impl Default for RequestTimestamps {
    fn default() -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(1024)),
        }
    }
}

impl RequestTimestamps {
    const WINDOW: Duration = Duration::from_secs(60);

    pub fn record(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            let now = Instant::now();
            guard.push_back(now);
            while guard
                .front()
                .is_some_and(|&t| now.duration_since(t) > Self::WINDOW)
            {
                guard.pop_front();
            }
        }
    }

    pub fn count_last_minute(&self) -> u64 {
        if let Ok(guard) = self.inner.lock() {
            guard
                .iter()
                .filter(|t| t.elapsed() <= Self::WINDOW)
                .count() as u64
        } else {
            0
        }
    }
}

/// Exporter internal statistics.
pub struct HealthStats {
    // Scrapes
    pub scrape_duration_ms: Stat,
    pub response_size_kb: Stat,
    pub scrapes_total: AtomicU64,
    pub scrape_errors: AtomicU64,
    pub scrape_timeouts: AtomicU64,

    // Response cache
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub cache_bypass: AtomicU64,
    pub cache_entries: AtomicU64,

    // Configuration
    pub reload_success: AtomicU64,
    pub reload_failure: AtomicU64,

    // HTTP server
    pub http_request_timestamps: RequestTimestamps,
    pub telemetry_calls: AtomicU64,

    pub start_time: Instant,
    pub last_scrape_time: StdRwLock<Option<DateTime<Utc>>>,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            scrape_duration_ms: Stat::default(),
            response_size_kb: Stat::default(),
            scrapes_total: AtomicU64::new(0),
            scrape_errors: AtomicU64::new(0),
            scrape_timeouts: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            cache_bypass: AtomicU64::new(0),
            cache_entries: AtomicU64::new(0),
            reload_success: AtomicU64::new(0),
            reload_failure: AtomicU64::new(0),
            http_request_timestamps: RequestTimestamps::default(),
            telemetry_calls: AtomicU64::new(0),
            start_time: Instant::now(),
            last_scrape_time: StdRwLock::new(None),
        }
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Default::default()
    }

    /// Records a served scrape response.
    pub fn record_scrape(&self, status: CacheStatus, duration_ms: f64, size_bytes: usize) {
        self.scrapes_total.fetch_add(1, Ordering::Relaxed);
        self.scrape_duration_ms.add_sample(duration_ms);
        self.response_size_kb.add_sample(size_bytes as f64 / 1024.0);
        let counter = match status {
            CacheStatus::Hit => &self.cache_hits,
            CacheStatus::Miss => &self.cache_misses,
            CacheStatus::Bypass => &self.cache_bypass,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.last_scrape_time.write() {
            *guard = Some(Utc::now());
        }
    }

    pub fn record_scrape_error(&self, timed_out: bool) {
        self.scrapes_total.fetch_add(1, Ordering::Relaxed);
        self.scrape_errors.fetch_add(1, Ordering::Relaxed);
        if timed_out {
            self.scrape_timeouts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_reload(&self, success: bool) {
        if success {
            self.reload_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.reload_failure.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cache_entries(&self, entries: u64) {
        self.cache_entries.store(entries, Ordering::Relaxed);
    }

    pub fn record_http_request(&self) {
        self.http_request_timestamps.record();
    }

    pub fn record_telemetry_call(&self) {
        self.telemetry_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_cache_hit_ratio(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn get_last_scrape_time_str(&self) -> String {
        match self.last_scrape_time.read() {
            Ok(guard) => (*guard)
                .map(|t| t.format("%H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            Err(_) => "N/A".to_string(),
        }
    }

    pub fn render_table(&self) -> String {
        let left_col = 26usize;
        let col_w = 12usize;
        let mut out = String::new();

        let row = |out: &mut String, name: &str, cols: [String; 4]| {
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                name,
                cols[0],
                cols[1],
                cols[2],
                cols[3],
                left = left_col,
                col = col_w
            )
            .ok();
        };
        let stat_cols = |stat: &Stat, precision: usize| -> [String; 4] {
            let (cur, avg, max, min, _) = stat.snapshot();
            [
                format!("{:.*}", precision, cur),
                format!("{:.*}", precision, avg),
                format!("{:.*}", precision, max),
                format!("{:.*}", precision, min),
            ]
        };
        let single = |value: String| -> [String; 4] {
            [value, "N/A".into(), "N/A".into(), "N/A".into()]
        };
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed).to_string();

        writeln!(out, "HEALTH ENDPOINT - EXPORTER INTERNAL STATS").ok();
        writeln!(out, "==========================================").ok();
        writeln!(out).ok();
        row(
            &mut out,
            "",
            [
                "current".into(),
                "average".into(),
                "max".into(),
                "min".into(),
            ],
        );

        writeln!(out).ok();
        writeln!(out, "SCRAPES").ok();
        writeln!(out, "-------").ok();
        row(&mut out, "scrape_duration (ms)", stat_cols(&self.scrape_duration_ms, 1));
        row(&mut out, "response_size (KB)", stat_cols(&self.response_size_kb, 1));
        row(&mut out, "scrapes_total", single(load(&self.scrapes_total)));
        row(&mut out, "scrape_errors", single(load(&self.scrape_errors)));
        row(&mut out, "scrape_timeouts", single(load(&self.scrape_timeouts)));

        writeln!(out).ok();
        writeln!(out, "RESPONSE CACHE").ok();
        writeln!(out, "--------------").ok();
        row(&mut out, "cache_hits", single(load(&self.cache_hits)));
        row(&mut out, "cache_misses", single(load(&self.cache_misses)));
        row(&mut out, "cache_bypass", single(load(&self.cache_bypass)));
        row(
            &mut out,
            "cache_hit_ratio (%)",
            single(format!("{:.1}", self.get_cache_hit_ratio())),
        );
        row(&mut out, "cache_entries", single(load(&self.cache_entries)));

        writeln!(out).ok();
        writeln!(out, "CONFIGURATION").ok();
        writeln!(out, "-------------").ok();
        row(&mut out, "reloads_ok", single(load(&self.reload_success)));
        row(&mut out, "reloads_failed", single(load(&self.reload_failure)));

        writeln!(out).ok();
        writeln!(out, "HTTP SERVER").ok();
        writeln!(out, "-----------").ok();
        row(
            &mut out,
            "http_requests_last_minute",
            single(self.http_request_timestamps.count_last_minute().to_string()),
        );
        row(&mut out, "telemetry_calls", single(load(&self.telemetry_calls)));

        writeln!(out).ok();
        writeln!(out, "Last scrape: {}", self.get_last_scrape_time_str()).ok();
        out
    }
}
