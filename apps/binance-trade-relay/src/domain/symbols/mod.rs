//! Symbol Registry and Chunking
//!
//! Domain types for the set of symbols being relayed.
//!
//! # Design
//!
//! - `SymbolRegistry` maps every relayed symbol to the `SinkKey` the sink
//!   handed out for it. It is built once, before any connection starts, and
//!   is shared read-only afterwards.
//! - `chunk_symbols` partitions the registry's symbols into groups no larger
//!   than the per-connection subscription cap. Each group is served by its
//!   own WebSocket connection.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

/// Binance caps combined-stream subscriptions per connection; 100 keeps a
/// wide margin under that limit.
pub const DEFAULT_MAX_SYMBOLS_PER_CONNECTION: usize = 100;

// =============================================================================
// Symbol
// =============================================================================

/// An uppercase trading symbol such as `BTCUSDT`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol, trimming whitespace and normalizing to uppercase.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_uppercase())
    }

    /// Get the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of this symbol's trade stream, e.g. `btcusdt@trade`.
    #[must_use]
    pub fn trade_stream(&self) -> String {
        format!("{}@trade", self.0.to_ascii_lowercase())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Sink Key
// =============================================================================

/// Opaque location the sink assigned to one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SinkKey(u32);

impl SinkKey {
    /// Wrap a raw sink location.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw sink location.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// Symbol Registry
// =============================================================================

/// Error building a registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The same symbol was registered twice.
    #[error("symbol {0} registered more than once")]
    DuplicateSymbol(Symbol),
}

/// Read-only mapping from symbol to sink key.
///
/// Keeps the insertion order so chunking is deterministic.
#[derive(Debug, Clone, Default)]
pub struct SymbolRegistry {
    keys: HashMap<Symbol, SinkKey>,
    order: Vec<Symbol>,
}

impl SymbolRegistry {
    /// Build a registry from `(symbol, key)` pairs in display order.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateSymbol` if a symbol appears twice.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (Symbol, SinkKey)>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::default();

        for (symbol, key) in entries {
            if registry.keys.contains_key(&symbol) {
                return Err(RegistryError::DuplicateSymbol(symbol));
            }
            registry.keys.insert(symbol.clone(), key);
            registry.order.push(symbol);
        }

        Ok(registry)
    }

    /// Look up the sink key for a symbol.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<SinkKey> {
        self.keys.get(symbol).copied()
    }

    /// Check whether a symbol is registered.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.keys.contains_key(symbol)
    }

    /// All registered symbols in registration order.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.order
    }

    /// Number of registered symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// =============================================================================
// Chunking
// =============================================================================

/// A group of symbols served by one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    index: usize,
    symbols: Vec<Symbol>,
}

impl Chunk {
    /// Create a chunk.
    #[must_use]
    pub const fn new(index: usize, symbols: Vec<Symbol>) -> Self {
        Self { index, symbols }
    }

    /// Position of this chunk in the partition.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Symbols in this chunk, in input order.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Number of symbols in this chunk.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Check if the chunk is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Trade stream names for every symbol in the chunk.
    #[must_use]
    pub fn trade_streams(&self) -> Vec<String> {
        self.symbols.iter().map(Symbol::trade_stream).collect()
    }
}

/// Partition `symbols` into consecutive chunks of at most `max_size`.
///
/// A `max_size` of zero is treated as one.
#[must_use]
pub fn chunk_symbols(symbols: &[Symbol], max_size: usize) -> Vec<Chunk> {
    symbols
        .chunks(max_size.max(1))
        .enumerate()
        .map(|(index, group)| Chunk::new(index, group.to_vec()))
        .collect()
}
