//! CLI command implementations for herakles-cloudwatch-exporter.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: Configuration validation and task summary
//! - `config`: Sample configuration file generation
//! - `test`: Offline scrapes of a task
//! - `generate`: Test data generation

pub mod check;
pub mod config;
pub mod generate;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use generate::command_generate_testdata;
pub use test::command_test;
