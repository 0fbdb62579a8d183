//! Amber Price Stream Binary
//!
//! Subscribes to the live-prices feed for one site and logs every update.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin amber-price-stream
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `AMBER_AUTH_TOKEN`: Bearer token for the feed
//! - `AMBER_SITE_ID`: Site to subscribe to
//!
//! ## Optional
//! - `AMBER_WS_URL`: Feed endpoint (default: `wss://api-ws.amber.com.au`)
//! - `AMBER_CHANNEL_GENERAL` / `AMBER_CHANNEL_FEED_IN` / `AMBER_CHANNEL_CONTROLLED_LOAD`:
//!   Channels to report (default: true / true / false)
//! - `AMBER_DEBUG_LOGGING`: Debug-level logs for this crate (default: false)
//! - `AMBER_METRICS_PORT`: Prometheus metrics port (default: 0, disabled)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Additional log directives

use std::sync::{Arc, Weak};
use std::time::Duration;

use amber_price_stream::infrastructure::telemetry;
use amber_price_stream::{
    ChannelEntry, FeedClientConfig, StateCoordinator, StreamConfig, SubscriptionClient,
    TungsteniteConnector, init_metrics,
};
use anyhow::Context;
use tokio::signal;

/// Upper bound on waiting for the client to stop.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("failed to install rustls crypto provider");
    }

    load_dotenv();

    let config = StreamConfig::from_env();
    let debug = config.as_ref().is_ok_and(|c| c.debug_logging);
    let _telemetry_guard = telemetry::init(debug).context("failed to initialise telemetry")?;
    let config = config.context("invalid configuration")?;

    tracing::info!("Starting Amber price stream");
    log_config(&config);

    if let Some(addr) = init_metrics(config.metrics_port)? {
        tracing::info!(addr = %addr, "Prometheus metrics listening");
    }

    let client = SubscriptionClient::new(
        FeedClientConfig::from_stream_config(&config),
        Arc::new(TungsteniteConnector::new()),
    );
    let coordinator = StateCoordinator::new(&client, config.credentials.site_id());

    let channels = config.channels.enabled();
    let weak: Weak<StateCoordinator> = Arc::downgrade(&coordinator);
    let _summary = coordinator.add_listener(move || {
        if let Some(coordinator) = weak.upgrade() {
            log_summary(&coordinator, &channels);
        }
    });

    client.start();
    tracing::info!("Price stream ready");

    await_shutdown().await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, client.stop())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Client did not stop in time"
        );
    }

    tracing::info!("Price stream stopped");
    Ok(())
}

/// Log the current price of every enabled channel.
fn log_summary(coordinator: &StateCoordinator, channels: &[&'static str]) {
    for &channel in channels {
        match coordinator.channel(channel) {
            Some(entry) => log_channel(channel, &entry),
            None => tracing::debug!(channel, "No price for channel"),
        }
    }
}

fn log_channel(channel: &str, entry: &ChannelEntry) {
    tracing::info!(
        channel,
        per_kwh = ?entry.per_kwh(),
        spot_per_kwh = ?entry.spot_per_kwh(),
        renewables = ?entry.renewables(),
        descriptor = entry.descriptor().unwrap_or("-"),
        spike_status = entry.spike_status().unwrap_or("-"),
        start = ?entry.start_time(),
        end = ?entry.end_time(),
        "Price update"
    );
}

/// Log the parsed configuration.
fn log_config(config: &StreamConfig) {
    tracing::info!(
        site_id = config.credentials.site_id(),
        url = %config.websocket.url,
        channels = ?config.channels.enabled(),
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        heartbeat_secs = config.websocket.heartbeat_interval.as_secs(),
        reconnect_min_secs = config.websocket.reconnect_delay_initial.as_secs(),
        reconnect_max_secs = config.websocket.reconnect_delay_max.as_secs(),
        "Connection timings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
