//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Binance combined-stream WebSocket client.
pub mod binance;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Sheet-backed trade sink.
pub mod sheet;

/// Symbol list loading.
pub mod symbols;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
