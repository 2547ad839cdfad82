//! CLI arguments and subcommands for herakles-cloudwatch-exporter.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Default, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum ConfigFormat {
    #[default]
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug, Default)]
#[command(
    name = "herakles-cloudwatch-exporter",
    about = "Caching Prometheus exporter proxy for CloudWatch-style metrics",
    long_about = "Caching Prometheus exporter proxy for CloudWatch-style metrics.\n\n\
                  Builds a collector per scrape request from named tasks, serves repeated \
                  scrapes from a bounded TTL cache and reloads its task definitions \
                  without a restart.",
    author = "Michael Moll <exporter@herakles.now> - Herakles",
    version,
    propagate_version = true,
    after_help = "Project: https://github.com/cansp-dev/herakles-cloudwatch-exporter - More info: https://www.herakles.now - Support: exporter@herakles.now"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Cache scrape responses for N seconds
    #[arg(long)]
    pub cache_ttl: Option<u64>,

    /// Maximum number of cached scrape responses
    #[arg(long)]
    pub cache_capacity: Option<u64>,

    /// Serve every scrape from a fresh collection pass
    #[arg(long)]
    pub disable_cache: bool,

    /// Upper bound in seconds for one collection pass
    #[arg(long)]
    pub scrape_timeout: Option<u64>,

    /// Path to JSON test data file served as metrics source
    #[arg(short = 't', long)]
    pub test_data_file: Option<PathBuf>,

    /// Path of the telemetry endpoint
    #[arg(long)]
    pub metrics_path: Option<String>,

    /// Path of the scrape endpoint
    #[arg(long)]
    pub scrape_path: Option<String>,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Enable TLS/SSL for HTTPS
    #[arg(long)]
    pub enable_tls: bool,

    /// Path to TLS certificate file (PEM format)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration and summarize the scrape tasks
    Check {
        /// Also verify that the test data file can be loaded
        #[arg(long)]
        source: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Run scrapes of a task offline and print output and timings
    Test {
        /// Task to scrape
        #[arg(long)]
        task: String,

        /// Value substituted for $_target
        #[arg(long)]
        target: Option<String>,

        /// Region override
        #[arg(long)]
        region: Option<String>,

        /// Number of test iterations
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: usize,

        /// Print the exposition body
        #[arg(long)]
        verbose: bool,
    },

    /// Generate synthetic test data JSON file
    GenerateTestdata {
        /// Output file path
        #[arg(short = 'o', long, default_value = "testdata.json")]
        output: PathBuf,

        /// Number of dimension value combinations per metric
        #[arg(long, default_value_t = 3)]
        series_per_metric: usize,

        /// Regions to generate series for (comma-separated, default: task regions)
        #[arg(long)]
        regions: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_overrides() {
        let args = Args::try_parse_from([
            "herakles-cloudwatch-exporter",
            "--port",
            "9100",
            "--disable-cache",
            "--scrape-timeout",
            "5",
            "--scrape-path",
            "/cw",
        ])
        .unwrap();
        assert_eq!(args.port, Some(9100));
        assert!(args.disable_cache);
        assert_eq!(args.scrape_timeout, Some(5));
        assert_eq!(args.scrape_path.as_deref(), Some("/cw"));
        assert!(args.command.is_none());
    }

    #[test]
    fn test_parse_test_subcommand() {
        let args = Args::try_parse_from([
            "herakles-cloudwatch-exporter",
            "test",
            "--task",
            "ec2_cpu",
            "--target",
            "i-1",
            "-n",
            "3",
        ])
        .unwrap();
        match args.command {
            Some(Commands::Test {
                task,
                target,
                iterations,
                ..
            }) => {
                assert_eq!(task, "ec2_cpu");
                assert_eq!(target.as_deref(), Some("i-1"));
                assert_eq!(iterations, 3);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
