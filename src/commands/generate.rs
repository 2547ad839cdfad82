//! Generate testdata command implementation.
//!
//! Generates synthetic series for every metric of every configured task, in
//! the JSON layout read by the bundled test data source.

use ahash::AHashSet as HashSet;
use chrono::Utc;
use rand::Rng;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::config::{Config, MetricConfig, Statistic};
use crate::source::{TestData, TestSeries};

/// Region used for tasks without a default region.
const FALLBACK_REGION: &str = "us-east-1";

/// Writes synthetic test data for `config` to `output`.
pub fn command_generate_testdata(
    output: PathBuf,
    series_per_metric: usize,
    regions: Option<String>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let regions: Option<Vec<String>> = regions.map(|r| {
        r.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    });

    let mut rng = rand::thread_rng();
    let test_data = build_test_data(config, series_per_metric, regions.as_deref(), &mut rng);

    let json_content = serde_json::to_string_pretty(&test_data)?;
    fs::write(&output, &json_content)?;

    println!(
        "✅ Generated test data: {} series in {}",
        test_data.series.len(),
        output.display()
    );

    Ok(())
}

/// Builds synthetic series for every task metric.
pub fn build_test_data(
    config: &Config,
    series_per_metric: usize,
    regions: Option<&[String]>,
    rng: &mut impl Rng,
) -> TestData {
    let mut seen = HashSet::new();
    let mut series = Vec::new();

    for task in &config.tasks {
        let task_regions: Vec<String> = match regions {
            Some(r) if !r.is_empty() => r.to_vec(),
            _ => vec![task
                .default_region
                .clone()
                .unwrap_or_else(|| FALLBACK_REGION.to_string())],
        };

        for metric in &task.metrics {
            for region in &task_regions {
                for i in 0..series_per_metric.max(1) {
                    let dimensions = dimension_values(metric, i, rng);
                    let key = format!(
                        "{}|{}|{}|{:?}",
                        metric.aws_namespace, metric.aws_metric_name, region, dimensions
                    );
                    if !seen.insert(key) {
                        continue;
                    }
                    series.push(TestSeries {
                        namespace: metric.aws_namespace.clone(),
                        metric_name: metric.aws_metric_name.clone(),
                        region: Some(region.clone()),
                        dimensions,
                        values: statistic_values(metric, rng),
                    });
                }
            }
            debug!(
                "Generated series for {}/{} in task {}",
                metric.aws_namespace, metric.aws_metric_name, task.name
            );
        }
    }

    TestData {
        version: "1.0".to_string(),
        generated_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        series,
    }
}

/// Picks the value of each dimension for the `index`-th series.
///
/// Statically selected values are cycled through; other dimensions get
/// generated identifiers.
fn dimension_values(
    metric: &MetricConfig,
    index: usize,
    rng: &mut impl Rng,
) -> BTreeMap<String, String> {
    metric
        .aws_dimensions
        .iter()
        .map(|dimension| {
            let value = match metric.aws_dimensions_select.get(dimension) {
                Some(values) if !values.is_empty() => values[index % values.len()].clone(),
                _ => generated_value(dimension, index, rng),
            };
            (dimension.clone(), value)
        })
        .collect()
}

fn generated_value(dimension: &str, index: usize, rng: &mut impl Rng) -> String {
    match dimension {
        "InstanceId" => format!("i-0{:016x}", rng.gen::<u64>()),
        "Currency" => "USD".to_string(),
        "AvailabilityZone" => format!("zone-{}", (b'a' + (index % 3) as u8) as char),
        _ => format!("{}-{}", dimension.to_lowercase(), index + 1),
    }
}

/// Generates consistent values for every requested statistic.
fn statistic_values(metric: &MetricConfig, rng: &mut impl Rng) -> BTreeMap<Statistic, f64> {
    let samples = (metric.period_seconds / 60).max(1) as f64;
    let average: f64 = rng.gen_range(1.0..100.0);
    let minimum = average * rng.gen_range(0.2..1.0);
    let maximum = average * rng.gen_range(1.0..1.8);

    metric
        .aws_statistics
        .iter()
        .map(|stat| {
            let value = match stat {
                Statistic::Average => average,
                Statistic::Minimum => minimum,
                Statistic::Maximum => maximum,
                Statistic::Sum => average * samples,
                Statistic::SampleCount => samples,
            };
            (*stat, (value * 100.0).round() / 100.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generates_every_metric() {
        let config = Config::sample();
        let mut rng = StdRng::seed_from_u64(7);
        let data = build_test_data(&config, 3, None, &mut rng);

        // billing selects a single currency, so its combinations collapse to one
        let billing: Vec<_> = data
            .series
            .iter()
            .filter(|s| s.namespace == "AWS/Billing")
            .collect();
        assert_eq!(billing.len(), 1);
        assert_eq!(billing[0].dimensions["Currency"], "USD");
        assert_eq!(billing[0].region.as_deref(), Some("us-east-1"));

        let ec2: Vec<_> = data
            .series
            .iter()
            .filter(|s| s.namespace == "AWS/EC2")
            .collect();
        assert_eq!(ec2.len(), 3);
        for s in ec2 {
            assert!(s.dimensions["InstanceId"].starts_with("i-"));
            assert!(s.values[&Statistic::Average] > 0.0);
            assert!(s.values[&Statistic::Maximum] >= s.values[&Statistic::Average]);
        }
    }

    #[test]
    fn test_region_override() {
        let config = Config::sample();
        let mut rng = StdRng::seed_from_u64(1);
        let regions = vec!["eu-central-1".to_string(), "ap-south-1".to_string()];
        let data = build_test_data(&config, 1, Some(&regions), &mut rng);

        assert!(data
            .series
            .iter()
            .all(|s| regions.contains(s.region.as_ref().unwrap())));
        assert_eq!(data.series.len(), 4);
    }
}
