//! DevSim monitor main entry point
//!
//! Samples host metrics on a fixed schedule, raises and clears alerts, and
//! optionally forecasts resource usage from a retrained trend model.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use devsim_monitor::{
    HealthStatus, LogNotifier, MonitorConfig, MonitorService, Predictor, SysinfoSource, TickReport,
    TrendPredictor,
};

/// DevSim monitor command line interface
#[derive(Parser)]
#[command(name = "devsim-monitor")]
#[command(about = "Environment-aware health monitor with predictive alerting")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level, overrides the configured one
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Run the monitor until SIGINT or SIGTERM
    Run,

    /// Take one sample, analyze it and print the report
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logging settings may come from the file, so load it first
    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            process::exit(1);
        }
    };

    let guard = match initialize_logging(&cli, &config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            process::exit(1);
        }
    };

    let result = match &cli.command {
        Some(Commands::Run) | None => run_service(config).await,
        Some(Commands::Check { json }) => check(config, *json).await,
        Some(Commands::Config { show }) => handle_config(&config, *show),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        drop(guard);
        process::exit(1);
    }
}

/// Initialize logging from the CLI flags and the logging section
fn initialize_logging(cli: &Cli, config: &MonitorConfig) -> Result<Option<WorkerGuard>> {
    let requested = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let log_level = match requested.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("devsim_monitor={}", log_level).parse()?)
        .add_directive("tokio=warn".parse()?);

    let (file_writer, guard) = match &config.logging.file_path {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("log file path has no file name: {}", path.display()))?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    if cli.json_logs || config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .with(file_writer.map(|w| fmt::layer().json().with_writer(w).with_ansi(false)))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .with(file_writer.map(|w| fmt::layer().with_writer(w).with_ansi(false)))
            .init();
    }

    Ok(guard)
}

/// Load configuration: environment preset, then file, then `DEVSIM_*` overrides
fn load_configuration(cli: &Cli) -> Result<MonitorConfig> {
    let config = MonitorConfig::load_with_fallback(cli.config.as_ref())
        .context("configuration rejected")?;
    Ok(config)
}

fn build_service(config: MonitorConfig) -> Result<MonitorService> {
    let predictor = if config.prediction.enabled {
        Some(Arc::new(TrendPredictor::new(config.prediction.window_secs)) as Arc<dyn Predictor>)
    } else {
        None
    };

    let service = MonitorService::new(config, Arc::new(SysinfoSource::new()), Arc::new(LogNotifier), predictor)?;
    Ok(service)
}

/// Run until a shutdown signal, then stop gracefully
async fn run_service(config: MonitorConfig) -> Result<()> {
    info!(
        environment = %config.environment,
        interval_ms = config.sampling.interval_ms,
        prediction = config.prediction.enabled,
        "Starting DevSim monitor"
    );

    let service = build_service(config)?;
    service.start().await?;

    service.wait_for_shutdown().await?;

    info!("Initiating graceful shutdown");
    service.stop().await?;

    let state = service.status().await;
    let health = service.health().await;
    info!(
        ticks = state.stats.total_ticks,
        degraded = state.stats.degraded_ticks,
        raised = state.stats.alerts_raised,
        cleared = state.stats.alerts_cleared,
        health = ?health,
        "DevSim monitor stopped"
    );
    Ok(())
}

/// One-shot check of the host
async fn check(config: MonitorConfig, json: bool) -> Result<()> {
    let service = build_service(config)?;

    // CPU usage needs two refreshes some time apart
    tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;

    let report = service.check_once().await?;
    let health = service.health().await;

    if json {
        let output = serde_json::json!({ "report": report, "health": health });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_report(&report, health);
    }

    Ok(())
}

fn print_report(report: &TickReport, health: HealthStatus) {
    let snapshot = &report.snapshot;
    println!("DevSim Monitor Check");
    println!("====================");
    println!("CPU usage:    {:>6.2}%", snapshot.cpu_percent);
    println!("Memory usage: {:>6.2}%", snapshot.memory_percent);
    println!("Disk usage:   {:>6.2}%", snapshot.disk_percent);

    if let Some(forecast) = &report.forecast {
        println!(
            "Forecast (+{}s): cpu {:.2}%, memory {:.2}% ({:.0}% confidence)",
            forecast.horizon_seconds,
            forecast.predicted_cpu_percent,
            forecast.predicted_memory_percent,
            forecast.confidence_percent
        );
    }

    for finding in &report.findings {
        println!(
            "  {:?} {} {}: {:.2}% > {:.2}%",
            finding.source, finding.severity, finding.metric, finding.observed_value, finding.threshold
        );
    }

    let status = match health {
        HealthStatus::Healthy => "HEALTHY",
        HealthStatus::Degraded => "DEGRADED",
        HealthStatus::Critical => "CRITICAL",
    };
    println!("\nSystem status: {}", status);
}

/// Handle configuration commands
fn handle_config(config: &MonitorConfig, show: bool) -> Result<()> {
    if show {
        println!("Effective configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    } else {
        config.validate()?;
        println!("Configuration is valid ({} environment)", config.environment);
    }

    Ok(())
}
