use std::sync::Arc;
use tokio::sync::{watch, Mutex};
pub mod api;
pub mod config;
pub mod orchestrator;
pub mod storage;
pub mod views;

use orchestrator::{Orchestrator, PollStatus};
use storage::Buffer;

/// What the dashboard HTTP surface reads from.
pub struct AppState {
    pub buffer: watch::Receiver<Buffer>,
    pub status: watch::Receiver<PollStatus>,
    pub views: Mutex<views::DashboardViews>,
}

pub async fn run_dashboard(cfg: config::Config) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&cfg.data_dir).await?;
    let store = storage::FileSnapshot::new(&cfg.data_dir, config::SNAPSHOT_SLOT);
    tracing::info!(path = %store.path().display(), "using snapshot slot");

    // hydrate before the first fetch so charts have something to show immediately
    let orchestrator =
        Orchestrator::hydrate(store, config::RETENTION_WINDOW_SECS, orchestrator::unix_now()).await;
    let buffer = orchestrator.subscribe();

    let source = api::client::HttpMetricsSource::new(cfg.api_url.clone(), cfg.request_timeout())?;
    tracing::info!(url = source.url(), interval_ms = cfg.poll_interval_ms, "polling metrics");

    // broadcast channel for shutdown signaling
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let poller = orchestrator::spawn_poller(orchestrator, source, cfg.poll_interval(), shutdown_tx.clone());

    let mut dashboard = views::DashboardViews::new();
    dashboard.begin_loading();
    let state = Arc::new(AppState {
        buffer,
        status: poller.status(),
        views: Mutex::new(dashboard),
    });

    // run HTTP server in background; it will be shut down via broadcast signal
    let http_shutdown = shutdown_tx.clone();
    let listen = cfg.listen;
    let server = tokio::spawn(async move {
        if let Err(e) = api::http::run(state, listen, http_shutdown).await {
            tracing::error!(error = %e, "dashboard server failed");
        }
    });

    // wait for CTRL-C then signal shutdown
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    let _ = shutdown_tx.send(());
    if let Some(orchestrator) = poller.stop().await {
        tracing::info!(samples = orchestrator.buffer().len(), "final buffer");
    }
    let _ = server.await;
    Ok(())
}
