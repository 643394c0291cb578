//! Prometheus Metrics Module
//!
//! Exposes relay metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: Frames received, skipped, and rejected
//! - **Trades**: Trades routed to the sink and dropped for unknown symbols
//! - **Connections**: Active connections, reconnects, and terminations
//! - **Latency**: Sink write latency
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::infrastructure::binance::{SkipReason, TerminationReason};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Later calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Frame counters
    describe_counter!(
        "trade_relay_frames_received_total",
        "Total data frames received from the trade stream"
    );
    describe_counter!(
        "trade_relay_frames_skipped_total",
        "Total frames that carried no trade"
    );
    describe_counter!(
        "trade_relay_decode_errors_total",
        "Total trade payloads rejected as malformed"
    );

    // Trade counters
    describe_counter!(
        "trade_relay_trades_routed_total",
        "Total trades written to the sink"
    );
    describe_counter!(
        "trade_relay_unknown_symbols_total",
        "Total trades dropped for unregistered symbols"
    );

    // Connection metrics
    describe_gauge!(
        "trade_relay_active_connections",
        "Number of stream connections currently running"
    );
    describe_counter!(
        "trade_relay_reconnects_total",
        "Total reconnect attempts after abnormal closures"
    );
    describe_counter!(
        "trade_relay_connections_terminated_total",
        "Total stream connections stopped, by reason"
    );

    // Latency histograms
    describe_histogram!(
        "trade_relay_sink_write_seconds",
        "Time to write one trade to the sink"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

const fn skip_label(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::NotJson => "not_json",
        SkipReason::NoData => "no_data",
        SkipReason::NotTrade => "not_trade",
    }
}

/// Record a data frame received on any connection.
pub fn record_frame_received() {
    counter!("trade_relay_frames_received_total").increment(1);
}

/// Record a frame that carried no trade.
pub fn record_frame_skipped(reason: SkipReason) {
    counter!(
        "trade_relay_frames_skipped_total",
        "reason" => skip_label(reason)
    )
    .increment(1);
}

/// Record a malformed trade payload.
pub fn record_decode_error() {
    counter!("trade_relay_decode_errors_total").increment(1);
}

/// Record a trade dropped for an unregistered symbol.
pub fn record_unknown_symbol() {
    counter!("trade_relay_unknown_symbols_total").increment(1);
}

/// Record a trade written to the sink.
pub fn record_trade_routed(latency: Duration) {
    counter!("trade_relay_trades_routed_total").increment(1);
    histogram!("trade_relay_sink_write_seconds").record(latency.as_secs_f64());
}

/// Record a reconnect attempt.
pub fn record_reconnect() {
    counter!("trade_relay_reconnects_total").increment(1);
}

/// Record a connection task starting.
pub fn record_connection_started() {
    gauge!("trade_relay_active_connections").increment(1.0);
}

/// Record a connection task stopping.
pub fn record_connection_finished(reason: &TerminationReason) {
    gauge!("trade_relay_active_connections").decrement(1.0);
    counter!(
        "trade_relay_connections_terminated_total",
        "reason" => reason.label()
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_labels() {
        assert_eq!(skip_label(SkipReason::NotJson), "not_json");
        assert_eq!(skip_label(SkipReason::NoData), "no_data");
        assert_eq!(skip_label(SkipReason::NotTrade), "not_trade");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_frame_received();
        record_frame_skipped(SkipReason::NoData);
        record_trade_routed(Duration::from_micros(5));
        record_connection_finished(&TerminationReason::Shutdown);
    }
}
