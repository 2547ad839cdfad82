//! herakles-cloudwatch-exporter
//!
//! Caching Prometheus exporter proxy for CloudWatch-style metrics with tracing logging.
//! This is the main entry point that initializes the server and handles subcommands.

use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use prometheus::Registry;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::{debug, error, info, warn, Level};

use herakles_cloudwatch_exporter::cli::{Args, Commands, LogLevel};
use herakles_cloudwatch_exporter::commands::{
    command_check, command_config, command_generate_testdata, command_test,
};
use herakles_cloudwatch_exporter::config::{
    resolve_config, show_config, validate_effective_config, Config,
};
use herakles_cloudwatch_exporter::handlers::router;
use herakles_cloudwatch_exporter::reload::FileConfigLoader;
use herakles_cloudwatch_exporter::source::TestDataSource;
use herakles_cloudwatch_exporter::state::{AppState, SharedState};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => Level::ERROR,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
    }

    info!("Logging initialized with level: {:?}", args.log_level);
}

/// Loads the configuration and exits with code 1 if it is invalid.
fn load_validated_config(
    args: &Args,
) -> Result<(Config, std::path::PathBuf), Box<dyn std::error::Error>> {
    let (config, path) = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok((config, path))
}

/// Reloads the configuration on every SIGHUP.
#[cfg(unix)]
fn spawn_sighup_reload(state: SharedState) -> Result<(), std::io::Error> {
    let mut hangup = signal::unix::signal(signal::unix::SignalKind::hangup())?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("Received SIGHUP, reloading configuration");
            if let Err(e) = state.reload().await {
                warn!("SIGHUP reload failed: {}", e);
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_sighup_reload(_state: SharedState) -> Result<(), std::io::Error> {
    Ok(())
}

/// Resolves when SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let (config, path) = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!(
                "✅ Configuration is valid ({}, {} tasks)",
                path.display(),
                config.tasks.len()
            );
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        // Writing a sample config doesn't need an existing one
        if let Commands::Config {
            output,
            format,
            commented,
        } = command
        {
            return command_config(output.clone(), *format, *commented);
        }

        let (config, _) = load_validated_config(&args)?;

        return match command {
            Commands::Check { source } => {
                if !command_check(*source, &config)? {
                    std::process::exit(1);
                }
                Ok(())
            }

            Commands::Test {
                task,
                target,
                region,
                iterations,
                verbose,
            } => {
                command_test(
                    task.clone(),
                    target.clone(),
                    region.clone(),
                    *iterations,
                    *verbose,
                    &config,
                )
                .await
            }

            Commands::GenerateTestdata {
                output,
                series_per_metric,
                regions,
            } => command_generate_testdata(
                output.clone(),
                *series_per_metric,
                regions.clone(),
                &config,
            ),

            Commands::Config { .. } => unreachable!("Config handled above"),
        };
    }

    // Load configuration for main server mode
    let (config, config_path) = load_validated_config(&args)?;

    setup_logging(&args);

    info!("Starting herakles-cloudwatch-exporter");
    debug!("Configuration file: {}", config_path.display());

    let source = TestDataSource::from_config(&config).map_err(|e| {
        error!("Failed to initialize metrics source: {:#}", e);
        e
    })?;

    let enable_tls = config.enable_tls.unwrap_or(false);
    let tls_paths = config.tls_cert_path.clone().zip(config.tls_key_path.clone());

    // Initialize Prometheus metrics registry
    let registry = Registry::new();
    debug!("Prometheus registry initialized");

    let state = AppState::build(
        config,
        Arc::new(source),
        Arc::new(FileConfigLoader::new(&config_path)),
        registry,
    )?;

    spawn_sighup_reload(state.clone())?;

    let bind_ip_str = state.settings.bind.clone();
    let port = state.settings.port;
    let addr = SocketAddr::new(bind_ip_str.parse::<IpAddr>()?, port);

    let app = router(state.clone());

    match (enable_tls, tls_paths) {
        (true, Some((cert_path, key_path))) => {
            info!("Loading TLS certificate from: {}", cert_path);
            info!("Loading TLS private key from: {}", key_path);

            let tls_config = RustlsConfig::from_pem_file(&cert_path, &key_path)
                .await
                .map_err(|e| {
                    error!("Failed to load TLS configuration: {}", e);
                    e
                })?;

            info!(
                "herakles-cloudwatch-exporter listening on https://{}:{}",
                bind_ip_str, port
            );

            let server = axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service());

            tokio::select! {
                result = server => {
                    if let Err(e) = result {
                        error!("Server error: {}", e);
                        return Err(e.into());
                    }
                }
                _ = shutdown_signal() => {
                    info!("Shutdown signal received, exiting...");
                }
            }
        }
        (true, None) => {
            // validate_effective_config rejects this combination
            return Err("TLS is enabled but certificate paths are missing".into());
        }
        (false, _) => {
            let listener = TcpListener::bind(addr).await?;
            info!(
                "herakles-cloudwatch-exporter listening on http://{}:{}",
                bind_ip_str, port
            );

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .map_err(|e| {
                    error!("Server error: {}", e);
                    e
                })?;
        }
    }

    info!("herakles-cloudwatch-exporter stopped gracefully");
    Ok(())
}
