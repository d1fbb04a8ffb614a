//! Alice Feed Binary
//!
//! Connects to the Alice Blue market data feed and logs what arrives.
//!
//! # Usage
//!
//! ```bash
//! ALICE_USER_ID=AB123 ALICE_SESSION_ID=... \
//! ALICE_CONTRACT_FILES=NSE.json ALICE_SUBSCRIBE='NSE|1594' \
//! cargo run --bin alice-feed
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `ALICE_USER_ID`: Account user id
//! - `ALICE_SESSION_ID`: Authenticated session id
//!
//! ## Optional
//! - `ALICE_FEED_PROTOCOL`: "json" | "binary" (default: json)
//! - `ALICE_CONTRACT_FILES`: Comma-separated master contract JSON files
//! - `ALICE_SUBSCRIBE`: Comma-separated `EXCHANGE|TOKEN` keys to subscribe at startup
//! - `ALICE_SUBSCRIBE_MODE`: Feed mode for startup subscriptions (default: tick)
//! - `ALICE_METRICS_ADDR`: Address for the Prometheus listener
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `RUST_LOG`: Log filter (default: `alice_feed=info`)
//!
//! See [`alice_feed::infrastructure::config`] for the full list.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use alice_feed::domain::instrument::InstrumentDirectory;
use alice_feed::infrastructure::telemetry;
use alice_feed::{
    FeedCallbacks, FeedClient, FeedConfig, FeedProtocol, Instrument, StaticSession, init_metrics,
};
use anyhow::{Context, anyhow};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Time allowed for the connection loop to stop after a signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install rustls crypto provider"))?;

    let dotenv_path = dotenvy::dotenv().ok();

    let _telemetry_guard = telemetry::init().context("failed to initialise telemetry")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Alice feed");
    if let Some(path) = dotenv_path {
        tracing::debug!(path = %path.display(), "Loaded .env");
    }

    let config = FeedConfig::from_env().context("invalid configuration")?;
    init_metrics(config.metrics_addr).context("failed to install metrics recorder")?;
    log_config(&config);

    let directory = Arc::new(load_directory(&config.contract_files)?);
    let instruments = startup_instruments(&directory, &config);

    let shutdown_token = CancellationToken::new();
    let client = Arc::new(FeedClient::new(
        config.client_config(),
        FeedProtocol::new(config.protocol, directory),
        Arc::new(StaticSession::new(config.credentials.clone())),
        logging_callbacks(),
        shutdown_token.clone(),
    ));
    let handle = client.start();

    if !instruments.is_empty() {
        let client = Arc::clone(&client);
        let mode = config.subscribe_mode;
        tokio::spawn(async move {
            match client.subscribe(&instruments, mode).await {
                Ok(changes) => tracing::info!(
                    %mode,
                    added = changes.added.len(),
                    "Startup subscriptions sent"
                ),
                Err(e) => tracing::error!(error = %e, "Startup subscription failed"),
            }
        });
    }

    match wait_for_signal().await {
        Ok(name) => tracing::info!(signal = name, "Received signal, initiating shutdown"),
        Err(e) => tracing::error!(error = %e, "Signal handler failed, shutting down"),
    }

    client.shutdown();
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
        Ok(Ok(Ok(()))) => tracing::info!("Alice feed stopped"),
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "Feed client stopped with error"),
        Ok(Err(e)) => tracing::error!(error = %e, "Feed client task panicked"),
        Err(_) => tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Feed client did not stop in time"
        ),
    }

    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &FeedConfig) {
    tracing::info!(
        protocol = %config.protocol,
        heartbeat_secs = config.connection.heartbeat_interval.as_secs(),
        reconnect_delay_ms = config.connection.reconnect_delay.as_millis(),
        contract_files = config.contract_files.len(),
        subscriptions = config.subscribe.len(),
        "Configuration loaded"
    );
}

/// Load every configured master contract file.
fn load_directory(files: &[impl AsRef<Path>]) -> anyhow::Result<InstrumentDirectory> {
    let mut directory = InstrumentDirectory::new();
    for file in files {
        let path = file.as_ref();
        let loaded = directory
            .load_contract_file(path)
            .with_context(|| format!("failed to load contracts from {}", path.display()))?;
        tracing::info!(path = %path.display(), instruments = loaded, "Loaded contracts");
    }
    Ok(directory)
}

/// Resolve startup subscription keys, skipping unknown ones.
fn startup_instruments(
    directory: &InstrumentDirectory,
    config: &FeedConfig,
) -> Vec<Arc<Instrument>> {
    config
        .subscribe
        .iter()
        .filter_map(|key| {
            let instrument = directory.by_token(key.exchange, key.token);
            if instrument.is_none() {
                tracing::warn!(%key, "Startup instrument not found in directory");
            }
            instrument
        })
        .collect()
}

/// Callbacks that log each event.
fn logging_callbacks() -> FeedCallbacks {
    FeedCallbacks::new()
        .on_tick(|tick| {
            tracing::debug!(
                instrument = %tick.instrument,
                ltp = %tick.ltp,
                volume = tick.volume,
                "Tick"
            );
        })
        .on_depth(|depth| {
            let best_bid = depth.depth.bids[0];
            let best_ask = depth.depth.asks[0];
            tracing::debug!(
                instrument = %depth.tick.instrument,
                bid = ?best_bid.price,
                ask = ?best_ask.price,
                "Depth"
            );
        })
        .on_open_interest(|oi| {
            tracing::debug!(
                instrument = %oi.instrument,
                open_interest = oi.open_interest,
                "Open interest"
            );
        })
        .on_price_band(|band| {
            tracing::debug!(
                instrument = %band.instrument,
                upper = %band.upper_circuit,
                lower = %band.lower_circuit,
                "Price band"
            );
        })
        .on_market_status(|status| {
            tracing::info!(
                exchange = %status.exchange,
                market_type = %status.market_type,
                status = %status.status,
                "Market status"
            );
        })
        .on_exchange_message(|notice| {
            tracing::info!(
                exchange = %notice.exchange,
                message = %notice.message,
                "Exchange message"
            );
        })
        .on_connect(|| tracing::info!("Feed connected"))
        .on_disconnect(|| tracing::warn!("Feed disconnected"))
}

/// Wait for SIGINT or SIGTERM.
async fn wait_for_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result.map(|()| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map(|()| "SIGINT")
    }
}
