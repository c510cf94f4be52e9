use anyhow::Result;
use apm_collector::{backfill, config, rollup_worker, routes};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

use apm_collector::alerting::{AlertEngine, LogNotifier};
use apm_collector::clock::{Clock, SystemClock};
use apm_collector::collector::Collector;
use apm_collector::rollup::RollupEngine;
use apm_collector::rollup_worker::{RollupWorker, RollupWorkerConfig};
use apm_collector::store::{CollectorStore, SqliteStore};

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    let levels = app_config.rollup.rollup_levels()?;

    let sqlite = SqliteStore::connect(
        &app_config.database.path,
        app_config.database.max_pool_size,
        Duration::from_secs(app_config.database.busy_timeout_secs),
    )
    .await?;
    sqlite.init().await?;
    let store: Arc<dyn CollectorStore> = Arc::new(sqlite);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let alerts = Arc::new(AlertEngine::new(
        store.clone(),
        levels.clone(),
        app_config.alerts.clone(),
        Arc::new(LogNotifier),
        clock.clone(),
    ));
    let engine = Arc::new(RollupEngine::new(store.clone(), levels));
    let worker = Arc::new(RollupWorker::new(
        store.clone(),
        engine,
        alerts.clone(),
        clock.clone(),
        RollupWorkerConfig::from_app_config(&app_config),
    ));

    if let Err(e) = backfill::run_backfill(&worker).await {
        tracing::warn!(error = %e, "backfill failed; periodic rollup will catch up");
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker_handles = rollup_worker::spawn(worker, shutdown_rx);

    let collector = Arc::new(Collector::new(store, alerts, clock));
    let app = routes::app(collector);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);
    for handle in worker_handles {
        let _ = handle.await;
    }
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
