mod business_logic;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::business_logic::config::AppConfig;
use crate::services::dedup_store::open_store;
use crate::services::hyperliquid::HyperliquidClient;
use crate::services::monitor::InstrumentMonitor;
use crate::services::notifier::AlertDispatcher;
use crate::services::pattern_state::PatternStateInner;
use crate::services::provider::CandleProvider;
use crate::state::AppState;

const CONFIG_ENV: &str = "ZONESCREENER_CONFIG";
const NOTIFICATION_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = load_config()?;
    let _log_guard = init_tracing(config.log_dir.as_deref())?;

    tracing::info!(
        "Loaded {} instrument(s), polling every {}s",
        config.instruments.len(),
        config.poll_interval_secs
    );

    let pattern_state = PatternStateInner::new(16);

    // Single consumer for every instrument's alerts
    let (alert_tx, alert_rx) = mpsc::channel(NOTIFICATION_BUFFER);
    let dispatcher = AlertDispatcher::new(alert_rx, config.webhook_url.clone())
        .context("failed to build webhook client")?;
    tokio::spawn(dispatcher.run());

    let provider: Arc<dyn CandleProvider> = Arc::new(HyperliquidClient::new());
    let fetch_gate = Arc::new(Mutex::new(()));
    let poll_interval = Duration::from_secs(config.poll_interval_secs);

    let dedup_dir = config.dedup_dir.as_deref().map(Path::new);
    if dedup_dir.is_none() {
        tracing::warn!("No dedup_dir configured, alert history will not survive a restart");
    }

    for instrument in &config.instruments {
        let monitor = InstrumentMonitor::new(
            instrument.clone(),
            provider.clone(),
            fetch_gate.clone(),
            pattern_state.clone(),
            alert_tx.clone(),
            config.alert_ttl_secs,
            |id, kind| open_store(dedup_dir, id, kind),
        );
        tokio::spawn(monitor.run(poll_interval));
    }
    drop(alert_tx);

    let app = routes::router(AppState { pattern_state });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("Server running on http://{}", config.bind_addr);
    tracing::info!("Swagger UI: http://{}/swagger-ui", config.bind_addr);
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn load_config() -> anyhow::Result<AppConfig> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => AppConfig::from_file(Path::new(&path))
            .with_context(|| format!("failed to load config from {path}")),
        Err(_) => Ok(AppConfig::default()),
    }
}

fn init_tracing(log_dir: Option<&str>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "zonescreener=info,tower_http=debug".into());
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log dir {dir}"))?;
            let appender = tracing_appender::rolling::daily(dir, "zonescreener");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .init();
            Ok(Some(guard))
        }
        None => {
            registry.init();
            Ok(None)
        }
    }
}
