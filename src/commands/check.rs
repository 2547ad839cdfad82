//! Check command implementation.
//!
//! Validates the configuration and summarizes the scrape tasks.

use crate::config::{series_name, validate_effective_config, Config};
use crate::source::testdata::load_test_data_from_file;

/// Validates the configuration and prints a task summary.
///
/// Returns `Ok(false)` if any check failed.
pub fn command_check(source: bool, config: &Config) -> Result<bool, Box<dyn std::error::Error>> {
    println!("🔍 Herakles CloudWatch Exporter - Configuration Check");
    println!("=====================================================");

    let mut all_ok = true;

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n📊 Scrape tasks...");
    if config.tasks.is_empty() {
        println!("   ⚠️  No tasks configured");
    }
    for task in &config.tasks {
        println!(
            "   • {} (region: {}, {} metrics)",
            task.name,
            task.default_region.as_deref().unwrap_or("per request"),
            task.metrics.len()
        );
        for metric in &task.metrics {
            for stat in &metric.aws_statistics {
                println!(
                    "       {}{}",
                    series_name(metric, *stat),
                    if metric.uses_target() {
                        "  (needs target)"
                    } else {
                        ""
                    }
                );
            }
        }
    }

    if source {
        println!("\n📁 Checking test data source...");
        match &config.test_data_file {
            Some(path) => match load_test_data_from_file(path) {
                Ok(data) => println!(
                    "   ✅ {} series loaded from {}",
                    data.series.len(),
                    path.display()
                ),
                Err(e) => {
                    println!("   ❌ {:#}", e);
                    all_ok = false;
                }
            },
            None => {
                println!("   ❌ test_data_file is not set");
                all_ok = false;
            }
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed");
    } else {
        println!("   ❌ Some checks failed - please review the output above");
    }
    Ok(all_ok)
}
