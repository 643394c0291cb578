//! Binance Trade Stream Adapter
//!
//! WebSocket client for the Binance combined-stream endpoint.
//!
//! # Components
//!
//! - `messages`: Wire format types
//! - `codec`: Subscribe encoding and frame decoding
//! - `reconnect`: Backoff between reconnect attempts
//! - `connection`: One connection per chunk with bounded retries
//! - `supervisor`: Fan-out over chunks and join
//!
//! # Endpoint
//!
//! - Production: `wss://stream.binance.com:9443/stream`

pub mod codec;
pub mod connection;
pub mod messages;
pub mod reconnect;
pub mod supervisor;

pub use codec::{DecodeError, Decoded, SkipReason, TradeCodec};
pub use connection::{
    ConnectionOutcome, StreamConnection, StreamConnectionConfig, StreamError, TerminationReason,
};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use supervisor::{ConnectionSupervisor, SupervisorReport};

/// Default combined-stream endpoint.
pub const DEFAULT_STREAM_URL: &str = "wss://stream.binance.com:9443/stream";
