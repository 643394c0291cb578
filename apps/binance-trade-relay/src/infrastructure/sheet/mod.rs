//! Sheet Sink
//!
//! In-memory sheet with one row per symbol, persisted as CSV on close.
//!
//! # Layout
//!
//! | Row | A      | B     | C    |
//! |-----|--------|-------|------|
//! | 1   | Symbol | Price | Time |
//! | 2.. | symbol | last  | time |
//!
//! The `SinkKey` handed out for a symbol is its row number, starting at 2 in
//! input order. Each connection writes a disjoint set of rows.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use crate::application::ports::{SinkError, TradeSink};
use crate::domain::symbols::{SinkKey, Symbol, SymbolRegistry};

/// Column headers.
pub const HEADER: [&str; 3] = ["Symbol", "Price", "Time"];

/// Row number of the first symbol.
pub const FIRST_DATA_ROW: u32 = 2;

/// One symbol's row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetRow {
    /// Symbol in column A.
    pub symbol: Symbol,
    /// Latest price in column B.
    pub price: Option<String>,
    /// Latest trade time in column C.
    pub time: Option<String>,
}

#[derive(Debug, Default)]
struct SheetState {
    rows: Vec<SheetRow>,
    initialized: bool,
    closed: bool,
}

/// Sheet-backed `TradeSink`.
#[derive(Debug)]
pub struct SheetSink {
    output: Option<PathBuf>,
    state: Mutex<SheetState>,
}

impl SheetSink {
    /// Create a sheet persisted to `path` on close.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            output: Some(path.into()),
            state: Mutex::new(SheetState::default()),
        }
    }

    /// Create a sheet that is never persisted.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            output: None,
            state: Mutex::new(SheetState::default()),
        }
    }

    /// Output path, if persisted.
    #[must_use]
    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    /// Copy of every data row in sheet order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SheetRow> {
        self.state.lock().rows.clone()
    }

    /// Copy of the row at `key`.
    #[must_use]
    pub fn row(&self, key: SinkKey) -> Option<SheetRow> {
        let index = row_index(key)?;
        self.state.lock().rows.get(index).cloned()
    }

    /// Check whether the sheet has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

fn row_index(key: SinkKey) -> Option<usize> {
    key.get()
        .checked_sub(FIRST_DATA_ROW)
        .and_then(|i| usize::try_from(i).ok())
}

fn render_csv(rows: &[SheetRow]) -> Result<Vec<u8>, std::io::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER).map_err(std::io::Error::from)?;

    for row in rows {
        writer
            .write_record([
                row.symbol.as_str(),
                row.price.as_deref().unwrap_or_default(),
                row.time.as_deref().unwrap_or_default(),
            ])
            .map_err(std::io::Error::from)?;
    }

    writer.into_inner().map_err(|e| e.into_error())
}

#[async_trait]
impl TradeSink for SheetSink {
    async fn initialize(&self, symbols: &[Symbol]) -> Result<SymbolRegistry, SinkError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SinkError::Closed);
        }
        if state.initialized {
            return Err(SinkError::Rejected("sheet already initialized".to_string()));
        }

        let mut entries = Vec::with_capacity(symbols.len());
        for (offset, symbol) in symbols.iter().enumerate() {
            let row = u32::try_from(offset)
                .ok()
                .and_then(|o| o.checked_add(FIRST_DATA_ROW))
                .ok_or(SinkError::CapacityExceeded(symbols.len()))?;
            entries.push((symbol.clone(), SinkKey::new(row)));
        }

        let registry = SymbolRegistry::from_entries(entries)?;

        state.rows = registry
            .symbols()
            .iter()
            .map(|symbol| SheetRow {
                symbol: symbol.clone(),
                price: None,
                time: None,
            })
            .collect();
        state.initialized = true;

        tracing::debug!(rows = state.rows.len(), "Sheet laid out");
        Ok(registry)
    }

    async fn update(&self, key: SinkKey, price: &str, display_time: &str) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SinkError::Closed);
        }

        let row = row_index(key)
            .and_then(|index| state.rows.get_mut(index))
            .ok_or(SinkError::UnknownKey(key))?;
        row.price = Some(price.to_string());
        row.time = Some(display_time.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        let rows = {
            let mut state = self.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state.rows.clone()
        };

        let Some(path) = &self.output else {
            return Ok(());
        };

        tokio::fs::write(path, render_csv(&rows)?).await?;

        tracing::info!(path = %path.display(), "Sheet saved");
        Ok(())
    }
}
