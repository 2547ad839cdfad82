//! Integration tests for `--check-config` and the TLS settings validation.

use std::io::Write;
use std::process::Output;
use tempfile::NamedTempFile;

const CONFIG: &str = r#"
tasks:
  - name: billing
    default_region: us-east-1
    metrics:
      - aws_namespace: AWS/Billing
        aws_metric_name: EstimatedCharges
        aws_dimensions: [Currency]
        aws_statistics: [Maximum]
"#;

/// Helper to get the binary path
fn binary_path() -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_BIN_EXE_herakles-cloudwatch-exporter"))
}

fn config_file(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

fn run(args: &[&str]) -> Output {
    std::process::Command::new(binary_path())
        .args(args)
        .output()
        .expect("Failed to execute command")
}

fn assert_fails_with(output: &Output, message: &str) {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(!output.status.success());
    assert!(
        stdout.contains(message) || stderr.contains(message),
        "Expected '{}', got stdout: '{}', stderr: '{}'",
        message,
        stdout,
        stderr
    );
}

#[test]
fn test_valid_config() {
    let file = config_file(CONFIG);
    let output = run(&["--config", file.path().to_str().unwrap(), "--check-config"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout: {stdout}");
    assert!(stdout.contains("Configuration is valid"));
    assert!(stdout.contains("1 tasks"));
}

#[test]
fn test_invalid_task_rejected() {
    let file = config_file(&CONFIG.replace("[Maximum]", "[]"));
    let output = run(&["--config", file.path().to_str().unwrap(), "--check-config"]);
    assert_fails_with(&output, "Configuration invalid");
}

#[test]
fn test_missing_config_file() {
    let output = run(&["--config", "/nonexistent/exporter.yaml", "--check-config"]);
    assert!(!output.status.success());
}

#[test]
fn test_reserved_scrape_path_rejected() {
    let file = config_file(CONFIG);
    let output = run(&[
        "--config",
        file.path().to_str().unwrap(),
        "--scrape-path",
        "/health",
        "--check-config",
    ]);
    assert_fails_with(&output, "reserved");
}

#[test]
fn test_tls_enabled_without_paths() {
    let file = config_file(CONFIG);
    let output = run(&[
        "--config",
        file.path().to_str().unwrap(),
        "--enable-tls",
        "--check-config",
    ]);
    assert_fails_with(
        &output,
        "TLS is enabled but neither tls_cert_path nor tls_key_path are set",
    );
}

#[test]
fn test_tls_enabled_with_cert_only() {
    let file = config_file(CONFIG);
    let output = run(&[
        "--config",
        file.path().to_str().unwrap(),
        "--enable-tls",
        "--tls-cert",
        "/some/path.pem",
        "--check-config",
    ]);
    assert_fails_with(&output, "TLS is enabled but tls_key_path is not set");
}

#[test]
fn test_tls_cert_file_not_found() {
    let file = config_file(CONFIG);
    let output = run(&[
        "--config",
        file.path().to_str().unwrap(),
        "--enable-tls",
        "--tls-cert",
        "/nonexistent/cert.pem",
        "--tls-key",
        "/nonexistent/key.pem",
        "--check-config",
    ]);
    assert_fails_with(&output, "TLS certificate file not found");
}

#[test]
fn test_show_config_includes_overrides() {
    let file = config_file(CONFIG);
    let output = run(&[
        "--config",
        file.path().to_str().unwrap(),
        "--port",
        "9200",
        "--show-config",
        "--config-format",
        "json",
    ]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("\"port\": 9200"));
    assert!(stdout.contains("\"billing\""));
}
