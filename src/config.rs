//! Configuration management for herakles-cloudwatch-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.
//!
//! The file carries both the server settings (read once at startup) and the
//! scrape task definitions (hot-reloadable through [`crate::reload`]).

use ahash::AHashSet as HashSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cli::{Args, ConfigFormat};

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9042;
pub const DEFAULT_METRICS_PATH: &str = "/metrics";
pub const DEFAULT_SCRAPE_PATH: &str = "/scrape";
pub const DEFAULT_CACHE_TTL: u64 = 60;
pub const DEFAULT_CACHE_CAPACITY: u64 = 100;
pub const DEFAULT_SCRAPE_TIMEOUT: u64 = 30;

/// Paths served by built-in endpoints.
pub const RESERVED_PATHS: [&str; 4] = ["/", "/health", "/config", "/reload"];

/// Placeholder in `aws_dimensions_select_param` replaced by the `target` query parameter.
pub const TARGET_PLACEHOLDER: &str = "$_target";

/// Config file locations probed when `--config` is not given.
pub const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "/etc/herakles/cloudwatch-exporter.yaml",
    "./cloudwatch-exporter.yaml",
    "./config.yml",
];

static REGION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]{2}(-gov|-iso[a-z]?)?-[a-z]+-\d{1,2}$").expect("valid regex"));

static LABEL_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid regex"));

/// Labels every task series carries besides its dimensions.
pub const BUILTIN_LABELS: [&str; 2] = ["region", "task"];

/// Returns true if `region` looks like a cloud region identifier (e.g. `eu-west-1`).
pub fn is_valid_region(region: &str) -> bool {
    REGION_RE.is_match(region)
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("invalid configuration: {0}")]
    Validation(String),
    #[error("configuration loader failed: {0}")]
    Loader(String),
}

/// Statistic requested from the metrics source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Statistic {
    Sum,
    Average,
    Maximum,
    Minimum,
    SampleCount,
}

impl Statistic {
    /// Name as used by the source API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Sum => "Sum",
            Statistic::Average => "Average",
            Statistic::Maximum => "Maximum",
            Statistic::Minimum => "Minimum",
            Statistic::SampleCount => "SampleCount",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_period_seconds() -> u64 {
    60
}
fn default_range_seconds() -> u64 {
    600
}

/// One metric definition of a task.
///
/// Scalar fields come before the map fields so the struct serializes to TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricConfig {
    pub aws_namespace: String,
    pub aws_metric_name: String,

    /// Dimensions exported as labels
    #[serde(default)]
    pub aws_dimensions: Vec<String>,

    pub aws_statistics: Vec<Statistic>,

    /// Granularity of the returned datapoints (default: 60)
    #[serde(default = "default_period_seconds")]
    pub period_seconds: u64,

    /// Width of the query window (default: 600)
    #[serde(default = "default_range_seconds")]
    pub range_seconds: u64,

    /// Shift of the query window into the past (default: 0)
    #[serde(default)]
    pub delay_seconds: u64,

    /// Static dimension value selection
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aws_dimensions_select: BTreeMap<String, Vec<String>>,

    /// Dimension value selection by regular expression
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aws_dimensions_select_regex: BTreeMap<String, String>,

    /// Dimension value selection from request parameters (`$_target`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aws_dimensions_select_param: BTreeMap<String, Vec<String>>,
}

impl MetricConfig {
    /// Returns true if any selection refers to the `target` request parameter.
    pub fn uses_target(&self) -> bool {
        self.aws_dimensions_select_param
            .values()
            .flatten()
            .any(|v| v == TARGET_PLACEHOLDER)
    }
}

/// A named scrape task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    #[serde(default, alias = "default-region")]
    pub default_region: Option<String>,
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
}

/// Enhanced configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,
    #[serde(alias = "metrics-path")]
    pub metrics_path: Option<String>,
    #[serde(alias = "scrape-path")]
    pub scrape_path: Option<String>,

    // Response cache
    #[serde(alias = "enable-cache")]
    pub enable_cache: Option<bool>,
    /// Seconds a scrape response may be served from cache
    #[serde(alias = "cache-ttl")]
    pub cache_ttl: Option<u64>,
    /// Maximum number of cached scrape responses
    #[serde(alias = "cache-capacity")]
    pub cache_capacity: Option<u64>,

    // Collection
    /// Upper bound in seconds for one collection pass against the source
    #[serde(alias = "scrape-timeout")]
    pub scrape_timeout: Option<u64>,
    /// Path to JSON test data file served by the bundled metrics source
    #[serde(alias = "test-data-file")]
    pub test_data_file: Option<PathBuf>,
    /// Artificial latency added to every source query
    #[serde(alias = "simulated-latency-ms")]
    pub simulated_latency_ms: Option<u64>,

    // Feature flags
    pub enable_health: Option<bool>,

    // Logging
    pub log_level: Option<String>,

    // TLS/SSL Configuration
    #[serde(alias = "enable-tls")]
    pub enable_tls: Option<bool>,
    #[serde(alias = "tls-cert-path")]
    pub tls_cert_path: Option<String>,
    #[serde(alias = "tls-key-path")]
    pub tls_key_path: Option<String>,

    // Scrape tasks
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            metrics_path: Some(DEFAULT_METRICS_PATH.to_string()),
            scrape_path: Some(DEFAULT_SCRAPE_PATH.to_string()),
            enable_cache: Some(true),
            cache_ttl: Some(DEFAULT_CACHE_TTL),
            cache_capacity: Some(DEFAULT_CACHE_CAPACITY),
            scrape_timeout: Some(DEFAULT_SCRAPE_TIMEOUT),
            test_data_file: None,
            simulated_latency_ms: None,
            enable_health: Some(true),
            log_level: Some("info".into()),
            enable_tls: Some(false),
            tls_cert_path: None,
            tls_key_path: None,
            tasks: Vec::new(),
        }
    }
}

impl Config {
    /// Sample configuration used by `config` subcommand and tests.
    pub fn sample() -> Self {
        Self {
            test_data_file: Some(PathBuf::from("testdata.json")),
            tasks: vec![
                TaskConfig {
                    name: "billing".into(),
                    default_region: Some("us-east-1".into()),
                    metrics: vec![MetricConfig {
                        aws_namespace: "AWS/Billing".into(),
                        aws_metric_name: "EstimatedCharges".into(),
                        aws_dimensions: vec!["Currency".into()],
                        aws_statistics: vec![Statistic::Maximum],
                        period_seconds: 21600,
                        range_seconds: 86400,
                        delay_seconds: 0,
                        aws_dimensions_select: BTreeMap::from([(
                            "Currency".to_string(),
                            vec!["USD".to_string()],
                        )]),
                        aws_dimensions_select_regex: BTreeMap::new(),
                        aws_dimensions_select_param: BTreeMap::new(),
                    }],
                },
                TaskConfig {
                    name: "ec2_cpu".into(),
                    default_region: Some("eu-west-1".into()),
                    metrics: vec![MetricConfig {
                        aws_namespace: "AWS/EC2".into(),
                        aws_metric_name: "CPUUtilization".into(),
                        aws_dimensions: vec!["InstanceId".into()],
                        aws_statistics: vec![Statistic::Average, Statistic::Maximum],
                        period_seconds: 60,
                        range_seconds: 600,
                        delay_seconds: 60,
                        aws_dimensions_select: BTreeMap::new(),
                        aws_dimensions_select_regex: BTreeMap::new(),
                        aws_dimensions_select_param: BTreeMap::from([(
                            "InstanceId".to_string(),
                            vec![TARGET_PLACEHOLDER.to_string()],
                        )]),
                    }],
                },
            ],
            ..Self::default()
        }
    }

    /// Looks up a task by name.
    pub fn task(&self, name: &str) -> Option<&TaskConfig> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

/// Converts a source identifier like `AWS/EC2` or `CPUUtilization` to snake case.
pub fn to_snake_case(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 8);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() {
                let prev = if i > 0 { Some(chars[i - 1]) } else { None };
                let next = chars.get(i + 1).copied();
                let boundary = match prev {
                    Some(p) if p.is_ascii_lowercase() => true,
                    // End of an acronym: "CPUUtilization" -> "cpu_utilization"
                    Some(p) if p.is_ascii_uppercase() || p.is_ascii_digit() => {
                        next.is_some_and(|n| n.is_ascii_lowercase())
                    }
                    _ => false,
                };
                if boundary && !out.is_empty() && !out.ends_with('_') {
                    out.push('_');
                }
                out.push(c.to_ascii_lowercase());
            } else {
                out.push(c);
            }
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }

    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Prometheus series name for a metric/statistic pair.
pub fn series_name(metric: &MetricConfig, statistic: Statistic) -> String {
    let namespace = metric
        .aws_namespace
        .strip_prefix("AWS/")
        .unwrap_or(&metric.aws_namespace);
    format!(
        "aws_{}_{}_{}",
        to_snake_case(namespace),
        to_snake_case(&metric.aws_metric_name),
        to_snake_case(statistic.as_str())
    )
}

fn validate_task(task: &TaskConfig) -> Result<(), String> {
    if task.name.trim().is_empty() {
        return Err("task name must not be empty".into());
    }

    if let Some(region) = task.default_region.as_deref() {
        if !is_valid_region(region) {
            return Err(format!(
                "task '{}': invalid default_region '{}'",
                task.name, region
            ));
        }
    }

    let mut series_dimensions: BTreeMap<String, &Vec<String>> = BTreeMap::new();

    for metric in &task.metrics {
        let label = format!("task '{}' metric '{}'", task.name, metric.aws_metric_name);

        if metric.aws_namespace.trim().is_empty() {
            return Err(format!("{label}: aws_namespace must not be empty"));
        }
        if metric.aws_metric_name.trim().is_empty() {
            return Err(format!("task '{}': aws_metric_name must not be empty", task.name));
        }
        if metric.aws_statistics.is_empty() {
            return Err(format!("{label}: at least one aws_statistics entry is required"));
        }
        if metric.period_seconds == 0 {
            return Err(format!("{label}: period_seconds must be greater than 0"));
        }
        if metric.range_seconds < metric.period_seconds {
            return Err(format!(
                "{label}: range_seconds ({}) must be >= period_seconds ({})",
                metric.range_seconds, metric.period_seconds
            ));
        }

        let mut labels: Vec<String> = BUILTIN_LABELS.iter().map(|l| l.to_string()).collect();
        for dimension in &metric.aws_dimensions {
            let name = to_snake_case(dimension);
            if !LABEL_NAME_RE.is_match(&name) {
                return Err(format!(
                    "{label}: dimension '{dimension}' does not map to a valid label name"
                ));
            }
            if labels.contains(&name) {
                return Err(format!(
                    "{label}: dimension '{dimension}' collides with label '{name}'"
                ));
            }
            labels.push(name);
        }

        let selection_keys = metric
            .aws_dimensions_select
            .keys()
            .chain(metric.aws_dimensions_select_regex.keys())
            .chain(metric.aws_dimensions_select_param.keys());
        for key in selection_keys {
            if !metric.aws_dimensions.contains(key) {
                return Err(format!(
                    "{label}: selection on '{key}' which is not listed in aws_dimensions"
                ));
            }
        }

        for (dimension, pattern) in &metric.aws_dimensions_select_regex {
            Regex::new(pattern).map_err(|e| {
                format!("{label}: invalid regex for dimension '{dimension}': {e}")
            })?;
        }

        for statistic in &metric.aws_statistics {
            let name = series_name(metric, *statistic);
            match series_dimensions.get(&name) {
                Some(dims) if *dims != &metric.aws_dimensions => {
                    return Err(format!(
                        "task '{}': series '{}' is declared with different dimensions",
                        task.name, name
                    ));
                }
                _ => {
                    series_dimensions.insert(name, &metric.aws_dimensions);
                }
            }
        }
    }

    Ok(())
}

/// Validates the task definitions only (used on reload).
pub fn validate_tasks(tasks: &[TaskConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for task in tasks {
        validate_task(task).map_err(ConfigError::Validation)?;
        if !seen.insert(task.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate task name '{}'",
                task.name
            )));
        }
    }
    Ok(())
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), ConfigError> {
    validate_tasks(&cfg.tasks)?;

    for (name, path) in [
        ("metrics_path", cfg.metrics_path.as_deref()),
        ("scrape_path", cfg.scrape_path.as_deref()),
    ] {
        if let Some(p) = path {
            if !p.starts_with('/') {
                return Err(ConfigError::Validation(format!(
                    "{name} must start with '/', got '{p}'"
                )));
            }
        }
    }
    for path in [&cfg.metrics_path, &cfg.scrape_path].into_iter().flatten() {
        if RESERVED_PATHS.contains(&path.as_str()) {
            return Err(ConfigError::Validation(format!(
                "path '{path}' is reserved for a built-in endpoint"
            )));
        }
    }
    if cfg.metrics_path.as_deref().unwrap_or(DEFAULT_METRICS_PATH)
        == cfg.scrape_path.as_deref().unwrap_or(DEFAULT_SCRAPE_PATH)
    {
        return Err(ConfigError::Validation(
            "metrics_path and scrape_path must differ".into(),
        ));
    }

    if cfg.enable_cache.unwrap_or(true) && cfg.cache_capacity == Some(0) {
        return Err(ConfigError::Validation(
            "cache_capacity must be greater than 0 when the cache is enabled".into(),
        ));
    }

    if cfg.scrape_timeout == Some(0) {
        return Err(ConfigError::Validation(
            "scrape_timeout must be greater than 0".into(),
        ));
    }

    // TLS validation
    if cfg.enable_tls.unwrap_or(false) {
        let cert_path = cfg.tls_cert_path.as_deref();
        let key_path = cfg.tls_key_path.as_deref();

        match (cert_path, key_path) {
            (None, None) => {
                return Err(ConfigError::Validation(
                    "TLS is enabled but neither tls_cert_path nor tls_key_path are set".into(),
                ));
            }
            (Some(_), None) => {
                return Err(ConfigError::Validation(
                    "TLS is enabled but tls_key_path is not set".into(),
                ));
            }
            (None, Some(_)) => {
                return Err(ConfigError::Validation(
                    "TLS is enabled but tls_cert_path is not set".into(),
                ));
            }
            (Some(cert), Some(key)) => {
                for (what, file) in [("certificate", cert), ("private key", key)] {
                    match fs::metadata(file) {
                        Ok(meta) if meta.len() == 0 => {
                            return Err(ConfigError::Validation(format!(
                                "TLS {what} file is empty: {file}"
                            )));
                        }
                        Err(_) => {
                            return Err(ConfigError::Validation(format!(
                                "TLS {what} file not found: {file}"
                            )));
                        }
                        Ok(_) => {}
                    }
                }
            }
        }
    }

    Ok(())
}

/// Finds the configuration file: explicit path or the first existing default location.
pub fn find_config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }

    DEFAULT_CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| ConfigError::NotFound(DEFAULT_CONFIG_PATHS.join(", ")))
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let path_str = path.display().to_string();

    if !path.exists() {
        return Err(ConfigError::NotFound(path_str));
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path_str.clone(),
        source,
    })?;

    let parse_err = |message: String| ConfigError::Parse {
        path: path_str.clone(),
        message,
    };

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config =
                serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))?;
            info!("Loaded JSON configuration from: {}", path_str);
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content).map_err(|e| parse_err(e.to_string()))?;
            info!("Loaded TOML configuration from: {}", path_str);
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config =
                serde_yaml::from_str(&content).map_err(|e| parse_err(e.to_string()))?;
            info!("Loaded YAML configuration from: {}", path_str);
            Ok(config)
        }
    }
}

/// Loads the configuration file and applies CLI overrides (CLI > file > defaults).
///
/// Returns the effective configuration and the file it was read from.
pub fn resolve_config(args: &Args) -> Result<(Config, PathBuf), ConfigError> {
    let path = find_config_path(args.config.as_deref())?;
    let mut config = load_config(&path)?;
    apply_overrides(&mut config, args);
    Ok((config, path))
}

/// Applies CLI flags on top of a loaded configuration.
pub fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }
    if let Some(path) = &args.metrics_path {
        config.metrics_path = Some(path.clone());
    }
    if let Some(path) = &args.scrape_path {
        config.scrape_path = Some(path.clone());
    }

    // Cache and collection
    if let Some(cache_ttl) = args.cache_ttl {
        config.cache_ttl = Some(cache_ttl);
    }
    if let Some(capacity) = args.cache_capacity {
        config.cache_capacity = Some(capacity);
    }
    if args.disable_cache {
        config.enable_cache = Some(false);
    }
    if let Some(timeout) = args.scrape_timeout {
        config.scrape_timeout = Some(timeout);
    }
    if let Some(path) = &args.test_data_file {
        config.test_data_file = Some(path.clone());
    }

    if args.disable_health {
        config.enable_health = Some(false);
    }

    // TLS
    if args.enable_tls {
        config.enable_tls = Some(true);
    }
    if let Some(cert) = &args.tls_cert {
        config.tls_cert_path = Some(cert.display().to_string());
    }
    if let Some(key) = &args.tls_key {
        config.tls_key_path = Some(key.display().to_string());
    }
}

/// Prints a configuration in the requested format.
pub fn show_config(
    config: &Config,
    format: ConfigFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, format)?);
    Ok(())
}

/// Serializes a configuration in the requested format.
pub fn render_config(
    config: &Config,
    format: ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}
