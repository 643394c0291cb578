#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Binance Trade Relay - Live Trade Streamer
//!
//! Subscribes to the Binance trade stream for a list of symbols and writes
//! the latest price and trade time of every symbol into a sheet.
//!
//! Symbols are split into chunks of at most 100; each chunk is served by
//! its own WebSocket connection. A connection that drops abnormally is
//! reconnected a bounded number of times, then abandoned without affecting
//! the others.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core relay types
//!   - `symbols`: Symbols, sink keys, registry, and chunking
//!   - `trade`: Trade events and display time formatting
//!   - `connection`: Connection state machine and retry budget
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: The `TradeSink` interface
//!   - `services`: Trade routing and connection status tracking
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `binance`: WebSocket connections and supervisor
//!   - `sheet`: Sheet-backed sink persisted as CSV
//!   - `symbols`: Symbol file loading
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//!                 ┌──────────────┐
//! chunk 0 WS ────►│              │
//! chunk 1 WS ────►│ TradeRouter  │────► TradeSink (sheet row per symbol)
//! chunk N WS ────►│              │
//!                 └──────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core relay types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{ConnectionLifecycle, ConnectionState, RetryBudget};
pub use domain::symbols::{Chunk, SinkKey, Symbol, SymbolRegistry, chunk_symbols};
pub use domain::trade::TradeEvent;

// Ports and services
pub use application::ports::{SinkError, TradeSink};
pub use application::services::{ConnectionStatusBoard, RouteOutcome, TradeRouter};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, FeedSettings, FileSettings, RelayConfig, ServerSettings, StreamSettings,
};

// Stream connections
pub use infrastructure::binance::{
    ConnectionOutcome, ConnectionSupervisor, ReconnectConfig, StreamConnection,
    StreamConnectionConfig, SupervisorReport, TerminationReason,
};

// Sink and symbol source
pub use infrastructure::sheet::SheetSink;
pub use infrastructure::symbols::{SymbolSourceError, load_symbols};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
