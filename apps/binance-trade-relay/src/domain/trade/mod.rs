//! Trade Events
//!
//! Codec-agnostic representation of one executed trade, plus the
//! display-time format used by the sink.

use chrono::{DateTime, Utc};

use crate::domain::symbols::Symbol;

/// `DD-MM-YYYY HH:MM:SS.mmm` in UTC.
pub const DISPLAY_TIME_FORMAT: &str = "%d-%m-%Y %H:%M:%S%.3f";

/// One executed trade from the feed.
///
/// The price is kept as the exact decimal string the exchange sent so the
/// sink shows it without re-rounding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeEvent {
    symbol: Symbol,
    price: String,
    trade_time: DateTime<Utc>,
}

impl TradeEvent {
    /// Create a trade event.
    ///
    /// Returns `None` if `trade_time_millis` is outside chrono's calendar range.
    #[must_use]
    pub fn new(symbol: Symbol, price: String, trade_time_millis: i64) -> Option<Self> {
        let trade_time = DateTime::from_timestamp_millis(trade_time_millis)?;
        Some(Self {
            symbol,
            price,
            trade_time,
        })
    }

    /// Traded symbol.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Trade price as sent by the exchange.
    #[must_use]
    pub fn price(&self) -> &str {
        &self.price
    }

    /// Trade time.
    #[must_use]
    pub const fn trade_time(&self) -> DateTime<Utc> {
        self.trade_time
    }

    /// Trade time in epoch milliseconds.
    #[must_use]
    pub fn trade_time_millis(&self) -> i64 {
        self.trade_time.timestamp_millis()
    }

    /// Trade time rendered for display.
    #[must_use]
    pub fn display_time(&self) -> String {
        format_display_time(self.trade_time)
    }
}

/// Render a UTC instant as `DD-MM-YYYY HH:MM:SS.mmm`.
#[must_use]
pub fn format_display_time(time: DateTime<Utc>) -> String {
    time.format(DISPLAY_TIME_FORMAT).to_string()
}

/// Render epoch milliseconds for display, if representable.
#[must_use]
pub fn display_time_from_millis(millis: i64) -> Option<String> {
    DateTime::from_timestamp_millis(millis).map(format_display_time)
}
