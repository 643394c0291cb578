//! Trade Router
//!
//! Maps a decoded trade's symbol to its sink key and performs the single
//! sink write for it.

use std::sync::Arc;

use crate::application::ports::{SinkError, TradeSink};
use crate::domain::symbols::{SinkKey, SymbolRegistry};
use crate::domain::trade::TradeEvent;

/// Result of routing one trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Written to the sink at this key.
    Delivered(SinkKey),
    /// The symbol is not in the registry; nothing was written.
    UnknownSymbol,
}

/// Forwards trades to the sink using the shared registry.
#[derive(Clone)]
pub struct TradeRouter {
    registry: Arc<SymbolRegistry>,
    sink: Arc<dyn TradeSink>,
}

impl TradeRouter {
    /// Create a router over a built registry.
    #[must_use]
    pub fn new(registry: Arc<SymbolRegistry>, sink: Arc<dyn TradeSink>) -> Self {
        Self { registry, sink }
    }

    /// Registry used for lookups.
    #[must_use]
    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    /// Route one trade.
    ///
    /// # Errors
    ///
    /// Returns the sink's error if the write fails.
    pub async fn route(&self, event: &TradeEvent) -> Result<RouteOutcome, SinkError> {
        let Some(key) = self.registry.get(event.symbol().as_str()) else {
            tracing::trace!(symbol = %event.symbol(), "Dropping trade for unregistered symbol");
            return Ok(RouteOutcome::UnknownSymbol);
        };

        self.sink
            .update(key, event.price(), &event.display_time())
            .await?;

        Ok(RouteOutcome::Delivered(key))
    }
}

impl std::fmt::Debug for TradeRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeRouter")
            .field("symbols", &self.registry.len())
            .finish_non_exhaustive()
    }
}
