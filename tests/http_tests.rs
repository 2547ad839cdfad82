//! HTTP level tests for the exporter router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use prometheus::Registry;
use std::collections::BTreeMap;
use std::io::{Seek, Write};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tower::ServiceExt;

use herakles_cloudwatch_exporter::config::load_config;
use herakles_cloudwatch_exporter::handlers::{router, CACHE_STATUS_HEADER};
use herakles_cloudwatch_exporter::source::{TestData, TestSeries};
use herakles_cloudwatch_exporter::{
    AppState, FileConfigLoader, SharedState, Statistic, TestDataSource,
};

const CONFIG: &str = r#"
tasks:
  - name: billing
    default_region: us-east-1
    metrics:
      - aws_namespace: AWS/Billing
        aws_metric_name: EstimatedCharges
        aws_dimensions: [Currency]
        aws_statistics: [Maximum]
  - name: ec2_cpu
    default_region: us-east-1
    metrics:
      - aws_namespace: AWS/EC2
        aws_metric_name: CPUUtilization
        aws_dimensions: [InstanceId]
        aws_dimensions_select_param:
          InstanceId: [$_target]
        aws_statistics: [Average]
"#;

const RELOADED: &str = r#"
tasks:
  - name: spend
    default_region: us-east-1
    metrics:
      - aws_namespace: Custom/Spend
        aws_metric_name: Total
        aws_dimensions: [Currency]
        aws_statistics: [Maximum]
"#;

fn write_config(file: &mut NamedTempFile, content: &str) {
    let f = file.as_file_mut();
    f.set_len(0).unwrap();
    f.rewind().unwrap();
    f.write_all(content.as_bytes()).unwrap();
    f.flush().unwrap();
}

fn series(ns: &str, name: &str, dims: &[(&str, &str)], stat: Statistic, value: f64) -> TestSeries {
    TestSeries {
        namespace: ns.into(),
        metric_name: name.into(),
        region: None,
        dimensions: dims
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        values: BTreeMap::from([(stat, value)]),
    }
}

fn source(latency: Duration) -> Arc<TestDataSource> {
    Arc::new(TestDataSource::new(
        TestData {
            version: "1".into(),
            generated_at: "test".into(),
            series: vec![
                series(
                    "AWS/Billing",
                    "EstimatedCharges",
                    &[("Currency", "USD")],
                    Statistic::Maximum,
                    12.5,
                ),
                series(
                    "AWS/EC2",
                    "CPUUtilization",
                    &[("InstanceId", "i-1")],
                    Statistic::Average,
                    41.0,
                ),
                series(
                    "AWS/EC2",
                    "CPUUtilization",
                    &[("InstanceId", "i-2")],
                    Statistic::Average,
                    7.0,
                ),
                series(
                    "Custom/Spend",
                    "Total",
                    &[("Currency", "EUR")],
                    Statistic::Maximum,
                    3.0,
                ),
            ],
        },
        latency,
    ))
}

fn setup(latency: Duration) -> (NamedTempFile, SharedState, Arc<TestDataSource>) {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    write_config(&mut file, CONFIG);
    let config = load_config(file.path()).unwrap();
    let source = source(latency);
    let state = AppState::build(
        config,
        source.clone(),
        Arc::new(FileConfigLoader::new(file.path())),
        Registry::new(),
    )
    .unwrap();
    (file, state, source)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Option<String>, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let cache_status = response
        .headers()
        .get(CACHE_STATUS_HEADER)
        .map(|v| v.to_str().unwrap().to_string());
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, cache_status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_missing_task_parameter() {
    let (_file, state, source) = setup(Duration::ZERO);
    let app = router(state);

    let (status, _, body) = get(&app, "/scrape").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Error: Missing task parameter");

    let (_, _, body) = get(&app, "/scrape?task=").await;
    assert_eq!(body, "Error: Missing task parameter");
    assert_eq!(source.query_count(), 0);
}

#[tokio::test]
async fn test_repeated_parameters_use_first_value() {
    let (_file, state, source) = setup(Duration::ZERO);
    let app = router(state);

    let (status, cache, body) = get(&app, "/scrape?task=billing&task=billing").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache.as_deref(), Some("MISS"));
    assert!(body.contains("aws_billing_estimated_charges_maximum"), "body: {body}");

    let (status, cache, body) = get(&app, "/scrape?task=billing&task=nope&debug=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache.as_deref(), Some("HIT"));
    assert!(body.contains("aws_billing_estimated_charges_maximum"));

    let (status, _, body) = get(&app, "/scrape?target=i-1&target=i-2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Error: Missing task parameter");
    assert_eq!(source.query_count(), 1);
}

#[tokio::test]
async fn test_unknown_task() {
    let (_file, state, source) = setup(Duration::ZERO);
    let app = router(state);

    let (status, _, body) = get(&app, "/scrape?task=nope").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("Error: "), "body: {body}");
    assert!(body.contains("nope"));
    assert_eq!(source.query_count(), 0);
}

#[tokio::test]
async fn test_scrape_miss_then_hit() {
    let (_file, state, source) = setup(Duration::ZERO);
    let app = router(state);

    let (status, cache, first) = get(&app, "/scrape?task=billing").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache.as_deref(), Some("MISS"));
    assert!(first.contains(
        concat!(
            r#"aws_billing_estimated_charges_maximum"#,
            r#"{currency="USD",region="us-east-1",task="billing"} 12.5"#
        )
    ));

    let (_, cache, second) = get(&app, "/scrape?task=billing").await;
    assert_eq!(cache.as_deref(), Some("HIT"));
    assert_eq!(first, second);
    assert_eq!(source.query_count(), 1);
}

#[tokio::test]
async fn test_target_parameter_selects_series() {
    let (_file, state, _) = setup(Duration::ZERO);
    let app = router(state);

    let (_, _, body) = get(&app, "/scrape?task=ec2_cpu&target=i-2").await;
    assert!(body.contains(r#"instance_id="i-2""#), "body: {body}");
    assert!(!body.contains(r#"instance_id="i-1""#));

    // A different target is a different cache entry
    let (_, cache, body) = get(&app, "/scrape?task=ec2_cpu&target=i-1").await;
    assert_eq!(cache.as_deref(), Some("MISS"));
    assert!(body.contains(r#"instance_id="i-1""#));
}

#[tokio::test]
async fn test_responses_are_isolated_per_task() {
    let (_file, state, _) = setup(Duration::ZERO);
    let app = router(state);

    let (a, b) = tokio::join!(
        get(&app, "/scrape?task=billing"),
        get(&app, "/scrape?task=ec2_cpu&target=i-1")
    );
    assert!(a.2.contains("aws_billing_estimated_charges_maximum"));
    assert!(!a.2.contains("cpu_utilization"));
    assert!(b.2.contains("aws_ec2_cpu_utilization_average"));
    assert!(!b.2.contains("estimated_charges"));
}

#[tokio::test]
async fn test_reload_success_and_failure() {
    let (mut file, state, _) = setup(Duration::ZERO);
    let app = router(state.clone());
    assert_eq!(state.config_store.get().version(), 1);

    write_config(&mut file, RELOADED);
    let (status, _, body) = get(&app, "/reload").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Reload complete");
    assert_eq!(state.config_store.get().version(), 2);

    let (_, _, body) = get(&app, "/scrape?task=spend").await;
    assert!(body.contains("aws_custom_spend_total_maximum"));
    let (_, _, body) = get(&app, "/scrape?task=billing").await;
    assert!(body.starts_with("Error: "));

    write_config(&mut file, "tasks: [");
    let (status, _, body) = get(&app, "/reload").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("Can't read configuration file: "), "body: {body}");
    assert_eq!(state.config_store.get().version(), 2);

    let (_, _, body) = get(&app, "/scrape?task=spend").await;
    assert!(body.contains("aws_custom_spend_total_maximum"));
}

#[tokio::test]
async fn test_reload_drops_cached_responses() {
    let (mut file, state, source) = setup(Duration::ZERO);
    let app = router(state);

    get(&app, "/scrape?task=billing").await;
    write_config(&mut file, CONFIG);
    let (_, _, body) = get(&app, "/reload").await;
    assert_eq!(body, "Reload complete");

    let (_, cache, _) = get(&app, "/scrape?task=billing").await;
    assert_eq!(cache.as_deref(), Some("MISS"));
    assert_eq!(source.query_count(), 2);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (_file, state, _) = setup(Duration::ZERO);
    let app = router(state);

    get(&app, "/scrape?task=billing").await;
    get(&app, "/scrape?task=billing").await;

    let (status, _, body) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("cloudwatch_exporter_cache_hits_total 1"));
    assert!(body.contains("cloudwatch_exporter_cache_misses_total 1"));
    assert!(body.contains("cloudwatch_requests_total 1"));
    assert!(body.contains("cloudwatch_exporter_config_version 1"));
    assert!(body.contains("cloudwatch_exporter_build_info"));
    // Task series only appear on the scrape path
    assert!(!body.contains("aws_billing_estimated_charges_maximum"));
}

#[tokio::test]
async fn test_health_and_config_pages() {
    let (_file, state, _) = setup(Duration::ZERO);
    let app = router(state);

    let (status, _, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("OK"));
    assert!(body.contains("RESPONSE CACHE"));

    let (status, _, body) = get(&app, "/config").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("billing"));
    assert!(body.contains("aws_ec2_cpu_utilization_average"));

    let (status, _, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("/scrape"));
}
