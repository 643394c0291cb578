//! Binance WebSocket Message Types
//!
//! Wire format types for the combined-stream endpoint.
//!
//! # Message Types
//!
//! ## Outbound
//! - `SubscribeRequest`: `SUBSCRIBE` call listing `<symbol>@trade` streams
//!
//! ## Inbound
//! - Acknowledgement: `{"result": null, "id": 1}`
//! - Stream envelope: `{"stream": "btcusdt@trade", "data": {...}}`
//!
//! # References
//!
//! - [WebSocket Streams](https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams)

use serde::{Deserialize, Serialize};

use crate::domain::symbols::Chunk;

/// Method name for subscribing to streams.
pub const SUBSCRIBE_METHOD: &str = "SUBSCRIBE";

/// Request id sent with every subscribe call; only correlates locally.
pub const SUBSCRIBE_REQUEST_ID: u64 = 1;

/// Keys that mark a `data` object as a trade payload.
pub const TRADE_FIELDS: [&str; 3] = ["s", "p", "T"];

/// Subscribe request for a set of streams.
///
/// # Wire Format (JSON)
/// ```json
/// {"method": "SUBSCRIBE", "params": ["btcusdt@trade", "ethusdt@trade"], "id": 1}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Always `SUBSCRIBE`.
    pub method: String,
    /// Stream names.
    pub params: Vec<String>,
    /// Local correlation id.
    pub id: u64,
}

impl SubscribeRequest {
    /// Subscribe to the trade stream of every symbol in `chunk`.
    #[must_use]
    pub fn trades(chunk: &Chunk) -> Self {
        Self {
            method: SUBSCRIBE_METHOD.to_string(),
            params: chunk.trade_streams(),
            id: SUBSCRIBE_REQUEST_ID,
        }
    }
}

/// Trade payload carried in the `data` field of a `<symbol>@trade` frame.
///
/// # Wire Format (JSON)
/// ```json
/// {"e":"trade","E":1700000000005,"s":"BTCUSDT","t":12345,"p":"50000.10",
///  "q":"0.010","T":1700000000000,"m":true,"M":true}
/// ```
///
/// Only the fields the relay forwards are decoded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TradePayload {
    /// Symbol
    #[serde(rename = "s")]
    pub symbol: String,

    /// Price as a decimal string
    #[serde(rename = "p")]
    pub price: String,

    /// Trade time in epoch milliseconds
    #[serde(rename = "T")]
    pub trade_time: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::symbols::Symbol;

    #[test]
    fn subscribe_request_serialization() {
        let chunk = Chunk::new(0, vec![Symbol::new("BTCUSDT"), Symbol::new("ETHUSDT")]);
        let json = serde_json::to_string(&SubscribeRequest::trades(&chunk)).unwrap();

        assert_eq!(
            json,
            r#"{"method":"SUBSCRIBE","params":["btcusdt@trade","ethusdt@trade"],"id":1}"#
        );
    }

    #[test]
    fn trade_payload_ignores_extra_fields() {
        let json = r#"{"e":"trade","E":1700000000005,"s":"BTCUSDT","t":12345,"p":"50000.10","q":"0.010","T":1700000000000,"m":true,"M":true}"#;
        let payload: TradePayload = serde_json::from_str(json).unwrap();

        assert_eq!(payload.symbol, "BTCUSDT");
        assert_eq!(payload.price, "50000.10");
        assert_eq!(payload.trade_time, 1_700_000_000_000);
    }
}
