//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `TradeSink`: Display or storage target for the latest trade per symbol

use async_trait::async_trait;

use crate::domain::symbols::{RegistryError, SinkKey, Symbol, SymbolRegistry};

/// Sink errors.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The sink has been closed and accepts no more writes.
    #[error("sink is closed")]
    Closed,

    /// The key does not address any location in the sink.
    #[error("unknown sink key {0}")]
    UnknownKey(SinkKey),

    /// The sink cannot hold that many symbols.
    #[error("sink capacity exceeded at {0} symbols")]
    CapacityExceeded(usize),

    /// Registry construction failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Backing storage failed.
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The sink refused the write.
    #[error("sink rejected update: {0}")]
    Rejected(String),
}

/// Destination for relayed trades.
///
/// Implementations must tolerate concurrent `update` calls for distinct
/// keys; connections never share a key.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeSink: Send + Sync {
    /// Lay out the sink for `symbols` and hand back their keys.
    ///
    /// Called once, before any connection starts.
    async fn initialize(&self, symbols: &[Symbol]) -> Result<SymbolRegistry, SinkError>;

    /// Record the latest trade for the symbol at `key`.
    async fn update(&self, key: SinkKey, price: &str, display_time: &str)
    -> Result<(), SinkError>;

    /// Persist and release the sink. Called once after streaming ends.
    async fn close(&self) -> Result<(), SinkError>;
}
