// =============================================================================
// Multi-Platform Social-Trend Harvester — Main Entry Point
// =============================================================================
//
// Three subcommands share one bootstrap: resolve config, init logging and
// metrics, open the store, build the proxy pool and browser factory, then
// dispatch. Exit codes follow §6 exactly — 0 success, 1 runtime error, 2
// config error, 3 proxy-required-but-unavailable.
// =============================================================================

use std::process::ExitCode as ProcessExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use trend_harvester::app_state::AppState;
use trend_harvester::cli::{Cli, Commands, ExitCode};
use trend_harvester::config::ResolvedConfig;
use trend_harvester::errors::ErrorKind;
use trend_harvester::proxy::ProxyPool;
use trend_harvester::store::{SqliteStore, Store};
use trend_harvester::types::RunStatus;
use trend_harvester::{api, browser, cli, queue, scheduler, telemetry};

#[tokio::main]
async fn main() -> ProcessExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match ResolvedConfig::resolve(None) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("config error: {err}");
            let code = if err.kind == ErrorKind::Config && err.subcode == "missing" {
                ExitCode::ProxyRequiredUnavailable
            } else {
                ExitCode::ConfigError
            };
            return to_process_code(code);
        }
    };

    // `run --once` is a scriptable one-shot invocation — plain text is
    // friendlier on a terminal than JSON lines. Every long-running mode logs
    // structured JSON per §5.
    let json_logging = !matches!(cli.command, Commands::Run { once: true, .. }) && config.json_logging;
    let _logging_guard = telemetry::init_logging(json_logging, &config.log_level, None);
    let metrics_handle = telemetry::init_metrics();

    info!(frequency_hours = config.frequency_hours, "configuration resolved");

    let store: Arc<dyn Store> = match SqliteStore::connect(&config.db_dsn).await {
        Ok(s) => Arc::new(s),
        Err(err) => {
            error!(error = %err, "failed to connect to store");
            return to_process_code(ExitCode::RuntimeError);
        }
    };
    if let Err(err) = store.init_schema().await {
        error!(error = %err, "failed to initialize schema");
        return to_process_code(ExitCode::RuntimeError);
    }

    let proxy_pool = match ProxyPool::from_config(&config) {
        Ok(p) => Arc::new(p),
        Err(err) => {
            error!(error = %err, "failed to build proxy pool");
            let code = if err.kind == ErrorKind::Config && err.subcode == "missing" {
                ExitCode::ProxyRequiredUnavailable
            } else {
                ExitCode::ConfigError
            };
            return to_process_code(code);
        }
    };

    let browser_factory: Arc<dyn browser::BrowserContextFactory> =
        Arc::new(browser::UnconfiguredBrowserFactory);

    let scheduler = scheduler::Scheduler::new(
        store.clone(),
        proxy_pool.clone(),
        browser_factory.clone(),
        config.clone(),
    );

    let code = match cli.command {
        Commands::Run { ref source, once, limit, headless: _, interval } => {
            run_command(&scheduler, source, once, limit, interval).await
        }
        Commands::Scheduler => {
            scheduler_command(scheduler, store, proxy_pool, browser_factory, config, metrics_handle).await
        }
        Commands::Worker { worker_type: _ } => worker_command(store).await,
    };

    to_process_code(code)
}

fn to_process_code(code: ExitCode) -> ProcessExitCode {
    ProcessExitCode::from(code as u8)
}

/// `harvester run --source=<platform> [--once] [--limit=N] [--interval=H]`
async fn run_command(
    scheduler: &scheduler::Scheduler,
    source: &str,
    once: bool,
    limit: usize,
    interval: Option<f64>,
) -> ExitCode {
    let platform = match cli::parse_platform_arg(source) {
        Ok(p) => p,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::ConfigError;
        }
    };

    if once {
        return match scheduler.run_once(platform, limit).await {
            Ok(outcome) => {
                info!(
                    platform = platform.as_str(),
                    status = ?outcome.status,
                    scraped = outcome.records_scraped,
                    uploaded = outcome.records_uploaded,
                    invalid = outcome.records_invalid,
                    "run complete"
                );
                if outcome.status == RunStatus::Failed {
                    ExitCode::RuntimeError
                } else {
                    ExitCode::Success
                }
            }
            Err(err) => {
                error!(platform = platform.as_str(), error = %err, "run failed");
                ExitCode::RuntimeError
            }
        };
    }

    let hours = interval.unwrap_or(1.0).max(0.01);
    let mut ticker = tokio::time::interval(tokio::time::Duration::from_secs_f64(hours * 3600.0));
    info!(platform = platform.as_str(), interval_hours = hours, "looping run until Ctrl+C");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match scheduler.run_once(platform, limit).await {
                    Ok(outcome) => info!(platform = platform.as_str(), status = ?outcome.status, "run complete"),
                    Err(err) => error!(platform = platform.as_str(), error = %err, "run failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("shutdown signal received");
                return ExitCode::Success;
            }
        }
    }
}

/// `harvester scheduler` — the persistent process: scheduler loop, offline
/// queue drain loop, and the admin HTTP server, all sharing one cooperative
/// shutdown signal.
async fn scheduler_command(
    scheduler: scheduler::Scheduler,
    store: Arc<dyn Store>,
    proxy_pool: Arc<ProxyPool>,
    browser_factory: Arc<dyn browser::BrowserContextFactory>,
    config: ResolvedConfig,
    metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
) -> ExitCode {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let queue_worker = queue::OfflineQueueWorker::new(store.clone());
    let queue_cancel = shutdown_rx.clone();
    let queue_task = tokio::spawn(async move {
        queue_worker.run_forever(queue_cancel).await;
    });

    let state = Arc::new(AppState::new(
        store,
        proxy_pool,
        browser_factory,
        config,
        metrics_handle,
    ));
    let bind_addr = std::env::var("HARVESTER_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8090".into());
    let app = api::rest::router(state);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(err) => {
            error!(addr = %bind_addr, error = %err, "failed to bind admin HTTP server");
            let _ = shutdown_tx.send(true);
            return ExitCode::RuntimeError;
        }
    };
    info!(addr = %bind_addr, "admin HTTP server listening");

    let server_cancel = shutdown_rx.clone();
    let server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut cancel = server_cancel;
                let _ = cancel.changed().await;
            })
            .await
    });

    let scheduler_cancel = shutdown_rx.clone();
    tokio::select! {
        _ = scheduler.run_forever(scheduler_cancel) => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("shutdown signal received — stopping scheduler, queue worker, and admin server");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = queue_task.await;
    let _ = server_task.await;

    info!("harvester shut down complete");
    ExitCode::Success
}

/// `harvester worker --type=<cron|rq|celery|apscheduler>` — the worker types
/// are an external scheduling convention (§1 "interchangeable worker
/// wrapper"); this process only ever speaks "drain one batch of due retry
/// jobs and exit", which is all any of those schedulers actually invoke.
async fn worker_command(store: Arc<dyn Store>) -> ExitCode {
    let worker = queue::OfflineQueueWorker::new(store);
    match worker.drain_once().await {
        Ok(n) => {
            info!(jobs_processed = n, "offline queue drain complete");
            ExitCode::Success
        }
        Err(err) => {
            error!(error = %err, "offline queue drain failed");
            ExitCode::RuntimeError
        }
    }
}
