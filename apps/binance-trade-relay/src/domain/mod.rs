//! Domain Layer - Core relay types and business rules.
//!
//! This layer holds the symbol registry, the chunk partition, trade events
//! and the per-connection lifecycle state machine. Nothing here performs I/O.

/// Symbols, sink keys, the registry and chunking.
pub mod symbols;

/// Trade events and display-time formatting.
pub mod trade;

/// Connection states and the bounded retry state machine.
pub mod connection;
