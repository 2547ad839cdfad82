//! Config command implementation.
//!
//! Generates a sample configuration file in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Writes the sample configuration to `output` (or stdout for `-`).
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::sample();
    let output = output.unwrap_or_else(|| PathBuf::from("cloudwatch-exporter.yaml"));

    let mut content = render_config(&config, format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Herakles CloudWatch Exporter Configuration
# ==========================================
#
# Server Configuration (read at startup)
# --------------------
# bind: "0.0.0.0"              # Bind IP (0.0.0.0 = all interfaces)
# port: 9042                   # HTTP port
# metrics_path: /metrics       # Exporter's own metrics
# scrape_path: /scrape         # Task scrapes: /scrape?task=<name>&target=<id>&region=<region>
# enable_health: true          # Enable /health endpoint
#
# Response Cache
# --------------
# enable_cache: true           # Serve repeated scrapes from cache
# cache_ttl: 60                # Seconds a response stays valid
# cache_capacity: 100          # Maximum cached responses (LRU eviction)
#
# Collection
# ----------
# scrape_timeout: 30           # Upper bound for one collection pass (seconds)
# test_data_file: null         # JSON file served by the bundled source
# simulated_latency_ms: null   # Artificial latency per source query
#
# TLS/SSL Configuration
# ---------------------
# enable_tls: false            # Enable HTTPS (default: false)
# tls_cert_path: null          # Path to TLS certificate (PEM format)
# tls_key_path: null           # Path to TLS private key (PEM format)
#
# Tasks (hot-reloaded via GET /reload or SIGHUP)
# -----
# - name: ec2_cpu
#   default_region: eu-west-1
#   metrics:
#     - aws_namespace: AWS/EC2
#       aws_metric_name: CPUUtilization
#       aws_dimensions: [InstanceId]
#       aws_statistics: [Average, Maximum]   # Sum, Average, Maximum, Minimum, SampleCount
#       period_seconds: 60
#       range_seconds: 600
#       delay_seconds: 60
#       aws_dimensions_select: {}          # static values per dimension
#       aws_dimensions_select_regex: {}    # regex per dimension
#       aws_dimensions_select_param:       # values from request parameters
#         InstanceId: [$_target]
"#;

    format!("{comments}\n{yaml}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config, validate_effective_config};

    #[test]
    fn test_written_sample_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exporter.yaml");
        command_config(Some(path.clone()), ConfigFormat::Yaml, true).unwrap();

        let cfg = load_config(&path).unwrap();
        assert!(validate_effective_config(&cfg).is_ok());
        assert!(cfg.task("billing").is_some());
        assert!(fs::read_to_string(&path)
            .unwrap()
            .starts_with("# Herakles CloudWatch Exporter"));
    }
}
