//! Stream Codec Module
//!
//! Encodes subscribe requests and decodes inbound text frames.
//!
//! Decoding is three-way:
//!
//! - `Decoded::Trade` for a well-formed trade payload
//! - `Decoded::Skip` for anything that is not shaped like a trade
//!   (acknowledgements, other envelopes, non-JSON text)
//! - `DecodeError` for a trade-shaped payload with bad field values

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::messages::{SubscribeRequest, TRADE_FIELDS, TradePayload};
use crate::domain::symbols::{Chunk, Symbol};
use crate::domain::trade::TradeEvent;

/// Codec errors for trade-shaped payloads.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// A trade field has the wrong JSON type.
    #[error("malformed trade payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The price is not a decimal number.
    #[error("price {0:?} is not a decimal number")]
    InvalidPrice(String),

    /// The trade time cannot be represented as a calendar instant.
    #[error("trade time {0} is out of range")]
    TimestampOutOfRange(i64),
}

/// Why a frame was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Not valid JSON.
    NotJson,
    /// No `data` field (e.g. a subscribe acknowledgement).
    NoData,
    /// `data` is present but is not a trade payload.
    NotTrade,
}

/// Result of decoding one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A trade to route.
    Trade(TradeEvent),
    /// Nothing to do for this frame.
    Skip(SkipReason),
}

/// JSON codec for the combined trade stream.
#[derive(Debug, Default, Clone)]
pub struct TradeCodec;

impl TradeCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode the subscribe request for a chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_subscribe(&self, chunk: &Chunk) -> Result<String, serde_json::Error> {
        serde_json::to_string(&SubscribeRequest::trades(chunk))
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error only when `data` carries all trade fields but one of
    /// them is invalid.
    pub fn decode(&self, text: &str) -> Result<Decoded, DecodeError> {
        let Ok(envelope) = serde_json::from_str::<Value>(text) else {
            return Ok(Decoded::Skip(SkipReason::NotJson));
        };

        let Some(data) = envelope.get("data") else {
            return Ok(Decoded::Skip(SkipReason::NoData));
        };

        if !is_trade_shaped(data) {
            return Ok(Decoded::Skip(SkipReason::NotTrade));
        }

        let payload = TradePayload::deserialize(data)?;

        if Decimal::from_str(&payload.price).is_err() {
            return Err(DecodeError::InvalidPrice(payload.price));
        }

        let trade_time = payload.trade_time;
        TradeEvent::new(Symbol::new(&payload.symbol), payload.price, trade_time)
            .map(Decoded::Trade)
            .ok_or(DecodeError::TimestampOutOfRange(trade_time))
    }
}

fn is_trade_shaped(data: &Value) -> bool {
    data.as_object()
        .is_some_and(|fields| TRADE_FIELDS.iter().all(|key| fields.contains_key(*key)))
}
