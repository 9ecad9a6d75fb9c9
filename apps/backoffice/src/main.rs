//! # Till Back-Office Daemon
//!
//! Runs the low-stock sweep and the daily closing report against the shop
//! database until stopped.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Back-Office Daemon                               │
//! │                                                                         │
//! │  till.toml + TILL_* ──► EngineConfig                                    │
//! │                             │                                           │
//! │  SQLite (WAL) ◄── Stores ◄──┤                                           │
//! │                             ▼                                           │
//! │                      SchedulerRunner ──► AlertJobs ──► TracingNotifier  │
//! │                             ▲                                           │
//! │  Ctrl+C / SIGTERM ──────────┘ shutdown                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```bash
//! backoffice                        # run until Ctrl+C
//! backoffice --config ./till.toml   # explicit config file
//! backoffice --sweep-once           # one sweep, print the outcome, exit
//! ```

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use till_db::{Database, DbConfig};
use till_engine::{
    AlertJobs, EngineConfig, ForecastService, InsightsService, SchedulerRunner, SchedulerSettings, Stores,
    TracingNotifier,
};

const DEFAULT_LOG_FILTER: &str = "info,till=debug,sqlx=warn";

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    sweep_once: bool,
}

fn parse_args() -> Result<Option<Args>, String> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter.next().ok_or("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            }
            "--sweep-once" => args.sweep_once = true,
            "--help" | "-h" => {
                println!("Usage: backoffice [--config <path>] [--sweep-once]");
                return Ok(None);
            }
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }

    Ok(Some(args))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_target(true)
        .init();

    let Some(args) = parse_args()? else {
        return Ok(());
    };

    let config = EngineConfig::load(args.config).map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;
    info!(
        database = %config.database.path.display(),
        sweep_interval_secs = config.alerts.sweep_interval_secs,
        report_enabled = config.report.enabled,
        "Configuration loaded"
    );

    let db = Database::new(
        DbConfig::new(config.database.path.clone()).max_connections(config.database.max_connections),
    )
    .await?;
    info!("Database ready");
    let stores = Stores::sqlite(&db);

    log_startup_figures(&stores, &config).await;

    let jobs = Arc::new(AlertJobs::new(&stores, Arc::new(TracingNotifier)));
    let (runner, handle) = SchedulerRunner::new(jobs, SchedulerSettings::from_config(&config));
    let scheduler = tokio::spawn(runner.run());

    let startup = handle.trigger_sweep().await;
    if args.sweep_once {
        let outcome = startup?;
        println!(
            "newly low: {}, recovered: {}, notified: {}",
            outcome.newly_low.len(),
            outcome.recovered.len(),
            outcome.notified
        );
    } else {
        if let Err(e) = startup {
            warn!(error = %e, "Startup sweep failed, waiting for the next interval");
        }
        shutdown_signal().await;
    }

    handle.shutdown().await?;
    if let Err(e) = scheduler.await {
        error!(?e, "Scheduler task ended abnormally");
    }
    db.close().await;

    info!("Back-office daemon stopped");
    Ok(())
}

/// Logs a few dashboard numbers so a restart shows the shop's state.
async fn log_startup_figures(stores: &Stores, config: &EngineConfig) {
    let insights = InsightsService::new(stores);
    match insights.low_stock_count().await {
        Ok(count) => info!(low_stock = count, "Inventory status"),
        Err(e) => warn!(error = %e, "Could not count low-stock products"),
    }

    let forecast = ForecastService::from_config(stores, config);
    match forecast.forecast(None, Utc::now()).await {
        Ok(f) => info!(
            history_days = f.history_days,
            predicted_units = f.predicted_units,
            "Store-wide demand forecast for tomorrow"
        ),
        Err(e) => warn!(error = %e, "Could not compute forecast"),
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(?e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping scheduler");
}
