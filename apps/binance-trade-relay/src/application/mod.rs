//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the sink port the relay writes through and the
//! services that sit between decoded trades and that port.

/// Port interfaces for external systems (the trade sink).
pub mod ports;

/// Application services for routing and connection status.
pub mod services;
