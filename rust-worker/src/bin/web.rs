//! Campaign web server.
//!
//! Exposes:
//! - `POST /campaigns/:campaign_id/send` to dispatch a campaign
//! - `POST /campaigns/scan` to run one bounce reconciliation pass
//! - `GET /health`
//!
//! The same process runs the timed bounce scan against the shared store.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal, sync::watch};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use campaign::bounce::ImapScanner;
use campaign::credentials::CredentialResolver;
use campaign::provider::LiveProviders;
use campaign::scheduler;
use campaign::store::{CampaignStore, MemoryStore};
use campaign::web::{router, AppState};
use campaign::{Config, Dispatcher, Reconciler};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    let config = Config::from_env();
    info!(
        port = config.port,
        api_base = %config.api_base,
        smtp_host = %config.smtp_host,
        imap_host = %config.imap_host,
        scan_interval_secs = config.scan_interval.as_secs(),
        delivery_promotion_secs = config.delivery_promotion.as_secs(),
        snapshot = ?config.store_snapshot_path,
        credentials = ?config.credentials,
        "config_loaded"
    );

    let store: Arc<dyn CampaignStore> = match &config.store_snapshot_path {
        Some(path) => Arc::new(
            MemoryStore::load(path)
                .with_context(|| format!("Failed to load store snapshot {}", path.display()))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.request_timeout_ms))
        .build()
        .context("Failed to build HTTP client")?;

    let resolver = CredentialResolver::new(store.clone(), config.credentials.clone());
    let providers = Arc::new(LiveProviders::new(client, &config));
    let dispatcher = Dispatcher::new(store.clone(), resolver, providers);

    let (user, password) = config.mailbox_login();
    let mailbox_configured = !user.is_empty() && !password.is_empty();
    let scanner = Arc::new(ImapScanner::new(
        config.imap_host.clone(),
        config.imap_port,
        user,
        password,
        config.scan_limit,
    ));
    let promotion = chrono::Duration::from_std(config.delivery_promotion)
        .context("Delivery promotion window out of range")?;
    let reconciler = Arc::new(Reconciler::new(store, scanner, promotion));

    let (stop_tx, stop_rx) = watch::channel(false);
    let scheduled = if mailbox_configured {
        Some(tokio::spawn(scheduler::run(
            reconciler.clone(),
            config.scan_interval,
            stop_rx,
        )))
    } else {
        warn!("scheduled_scan_disabled_no_mailbox");
        None
    };

    let port = config.port;
    let state = AppState::new(dispatcher, reconciler);
    let app = router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let _ = stop_tx.send(true);
    if let Some(task) = scheduled {
        task.await.context("Scheduler task failed")?;
    }

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
