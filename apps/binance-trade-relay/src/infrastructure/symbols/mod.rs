//! Symbol File Source
//!
//! Loads the relayed symbol list from a newline-separated text file.
//!
//! ```text
//! # majors
//! BTCUSDT
//! ethusdt
//!
//! BNBUSDT
//! ```
//!
//! Lines are trimmed and uppercased. Blank lines and `#` comments are
//! skipped. Duplicates keep their first position.

use std::collections::HashSet;
use std::path::Path;

use crate::domain::symbols::Symbol;

/// Symbol source errors.
#[derive(Debug, thiserror::Error)]
pub enum SymbolSourceError {
    /// The file could not be read.
    #[error("failed to read symbols from {path}: {source}")]
    Io {
        /// File that was read.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file lists no symbols.
    #[error("no symbols found in {0}")]
    Empty(String),
}

/// Parse symbol lines in file order.
#[must_use]
pub fn parse_symbols(contents: &str) -> Vec<Symbol> {
    let mut seen = HashSet::new();
    let mut symbols = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let symbol = Symbol::new(line);
        if seen.insert(symbol.clone()) {
            symbols.push(symbol);
        } else {
            tracing::warn!(%symbol, "Ignoring duplicate symbol");
        }
    }

    symbols
}

/// Load symbols from `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or lists no symbols.
pub async fn load_symbols(path: &Path) -> Result<Vec<Symbol>, SymbolSourceError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SymbolSourceError::Io {
            path: path.display().to_string(),
            source,
        })?;

    let symbols = parse_symbols(&contents);
    if symbols.is_empty() {
        return Err(SymbolSourceError::Empty(path.display().to_string()));
    }

    tracing::info!(path = %path.display(), count = symbols.len(), "Loaded symbols");
    Ok(symbols)
}
