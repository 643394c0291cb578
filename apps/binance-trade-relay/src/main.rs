//! Binance Trade Relay Binary
//!
//! Streams live trades for every listed symbol into the sheet until
//! interrupted, then saves the sheet.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin binance-trade-relay
//! ```
//!
//! # Environment Variables
//!
//! All optional.
//! - `BINANCE_STREAM_URL`: Combined-stream endpoint (default: wss://stream.binance.com:9443/stream)
//! - `TRADE_RELAY_SYMBOLS_FILE`: Symbol list (default: symbols.txt)
//! - `TRADE_RELAY_OUTPUT_FILE`: CSV written on exit (default: trades.csv)
//! - `TRADE_RELAY_MAX_SYMBOLS_PER_CONNECTION`: Chunk size (default: 100)
//! - `TRADE_RELAY_MAX_RETRIES`: Abnormal closures tolerated per connection (default: 5)
//! - `TRADE_RELAY_RECONNECT_DELAY_MS`: Wait before reconnecting (default: 5000)
//! - `TRADE_RELAY_RECONNECT_JITTER`: Jitter fraction for the wait (default: 0.0)
//! - `TRADE_RELAY_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: binance-trade-relay)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use binance_trade_relay::infrastructure::health::{HealthServer, HealthServerState};
use binance_trade_relay::infrastructure::telemetry;
use binance_trade_relay::{
    ConnectionStatusBoard, ConnectionSupervisor, ReconnectConfig, RelayConfig, SheetSink,
    StreamConnectionConfig, SupervisorReport, TradeSink, chunk_symbols, init_metrics,
    load_symbols,
};
use chrono::Local;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Wall-clock format for session start and finish.
const SESSION_TIME_FORMAT: &str = "%I:%M:%S %p";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let tls_provider_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    load_dotenv();

    // Keep alive until exit so spans are flushed
    let _telemetry_guard = telemetry::init()?;

    if !tls_provider_installed {
        tracing::debug!("rustls crypto provider was already installed");
    }

    let started_at = Local::now();
    tracing::info!(
        started_at = %started_at.format(SESSION_TIME_FORMAT),
        "Starting Binance trade relay"
    );

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed, metrics disabled");
    }

    let config = RelayConfig::from_env()?;
    log_config(&config);

    let symbols = load_symbols(&config.files.symbols_file).await?;

    let sink = Arc::new(SheetSink::new(config.files.output_file.clone()));
    let registry = Arc::new(
        sink.initialize(&symbols)
            .await
            .context("failed to lay out the sheet")?,
    );
    let chunks = chunk_symbols(
        registry.symbols(),
        config.stream.max_symbols_per_connection,
    );

    let shutdown_token = CancellationToken::new();
    let status = Arc::new(ConnectionStatusBoard::new());

    if config.server.health_port == 0 {
        tracing::info!("Health server disabled");
    } else {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&status),
        ));
        let health_server = HealthServer::new(
            config.server.health_port,
            health_state,
            shutdown_token.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    tokio::spawn(await_shutdown(shutdown_token.clone()));

    let supervisor = ConnectionSupervisor::new(
        StreamConnectionConfig {
            url: config.feed.url.clone(),
            reconnect: ReconnectConfig::from_stream_settings(&config.stream),
        },
        registry,
        Arc::clone(&sink) as Arc<dyn TradeSink>,
        status,
        shutdown_token.clone(),
    );

    let report = supervisor.run(chunks).await;

    // Stops the health server and the signal listener
    shutdown_token.cancel();

    sink.close().await.context("failed to save the sheet")?;

    log_report(&report);
    tracing::info!(
        started_at = %started_at.format(SESSION_TIME_FORMAT),
        finished_at = %Local::now().format(SESSION_TIME_FORMAT),
        "Binance trade relay stopped"
    );
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        url = %config.feed.url,
        symbols_file = %config.files.symbols_file.display(),
        output_file = %config.files.output_file.display(),
        max_symbols_per_connection = config.stream.max_symbols_per_connection,
        max_retries = config.stream.max_retries,
        reconnect_delay_ms = config.stream.reconnect_delay.as_millis(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
}

/// Log the per-connection outcomes.
fn log_report(report: &SupervisorReport) {
    for outcome in report.outcomes() {
        tracing::debug!(
            chunk = outcome.chunk,
            state = outcome.state.as_str(),
            reason = %outcome.reason,
            "Connection outcome"
        );
    }

    tracing::info!(
        connections = report.len(),
        closed = report.closed(),
        failed = report.failed(),
        "Session summary"
    );
}

/// Wait for a shutdown signal (SIGTERM or SIGINT), or for the relay to stop
/// on its own.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
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
                tracing::error!(error = %e, "SIGTERM handler unavailable");
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
        () = shutdown_token.cancelled() => return,
    }

    shutdown_token.cancel();
}
