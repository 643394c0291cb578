//! Connection Status Board
//!
//! Shared, read-mostly record of every connection's current state. Stream
//! connections write to it on each transition; the health endpoint reads it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::connection::ConnectionState;

/// Point-in-time view of one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    /// Chunk index served by the connection.
    pub chunk: usize,
    /// Number of symbols in the chunk.
    pub symbols: usize,
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Consecutive abnormal closures since the last successful subscription.
    pub retries: u32,
    /// Trades written to the sink so far.
    pub trades_routed: u64,
    /// Most recent error, if any.
    pub last_error: Option<String>,
    /// When this entry last changed.
    pub updated_at: DateTime<Utc>,
}

/// Number of connections in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    /// All registered connections.
    pub total: usize,
    /// Connecting or reconnecting.
    pub pending: usize,
    /// Subscribed or streaming.
    pub live: usize,
    /// Closed cleanly.
    pub closed: usize,
    /// Failed permanently.
    pub failed: usize,
}

/// Status of every connection, keyed by chunk index.
#[derive(Debug, Default)]
pub struct ConnectionStatusBoard {
    entries: RwLock<BTreeMap<usize, ConnectionSnapshot>>,
}

impl ConnectionStatusBoard {
    /// Create an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection in `Connecting`.
    pub fn register(&self, chunk: usize, symbols: usize) {
        self.entries.write().insert(
            chunk,
            ConnectionSnapshot {
                chunk,
                symbols,
                state: ConnectionState::Connecting,
                retries: 0,
                trades_routed: 0,
                last_error: None,
                updated_at: Utc::now(),
            },
        );
    }

    /// Record a state transition.
    pub fn set_state(&self, chunk: usize, state: ConnectionState, retries: u32) {
        if let Some(entry) = self.entries.write().get_mut(&chunk) {
            entry.state = state;
            entry.retries = retries;
            entry.updated_at = Utc::now();
        }
    }

    /// Count one trade written to the sink.
    pub fn record_trade(&self, chunk: usize) {
        if let Some(entry) = self.entries.write().get_mut(&chunk) {
            entry.trades_routed += 1;
            entry.updated_at = Utc::now();
        }
    }

    /// Remember the latest error for a connection.
    pub fn record_error(&self, chunk: usize, error: &str) {
        if let Some(entry) = self.entries.write().get_mut(&chunk) {
            entry.last_error = Some(error.to_string());
            entry.updated_at = Utc::now();
        }
    }

    /// Snapshot of one connection.
    #[must_use]
    pub fn get(&self, chunk: usize) -> Option<ConnectionSnapshot> {
        self.entries.read().get(&chunk).cloned()
    }

    /// Snapshot of every connection ordered by chunk.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ConnectionSnapshot> {
        self.entries.read().values().cloned().collect()
    }

    /// Tally connections by state.
    #[must_use]
    pub fn counts(&self) -> StatusCounts {
        let entries = self.entries.read();
        let mut counts = StatusCounts {
            total: entries.len(),
            ..StatusCounts::default()
        };

        for entry in entries.values() {
            match entry.state {
                ConnectionState::Connecting | ConnectionState::Reconnecting => counts.pending += 1,
                ConnectionState::Subscribed | ConnectionState::Streaming => counts.live += 1,
                ConnectionState::Closed => counts.closed += 1,
                ConnectionState::Failed => counts.failed += 1,
            }
        }

        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_transition() {
        let board = ConnectionStatusBoard::new();
        board.register(0, 100);
        board.register(1, 20);

        board.set_state(0, ConnectionState::Streaming, 0);
        board.set_state(1, ConnectionState::Reconnecting, 2);
        board.record_trade(0);
        board.record_trade(0);
        board.record_error(1, "connection reset");

        let first = board.get(0).unwrap();
        assert_eq!(first.state, ConnectionState::Streaming);
        assert_eq!(first.trades_routed, 2);

        let second = board.get(1).unwrap();
        assert_eq!(second.retries, 2);
        assert_eq!(second.last_error.as_deref(), Some("connection reset"));
    }

    #[test]
    fn unknown_chunk_is_ignored() {
        let board = ConnectionStatusBoard::new();
        board.set_state(7, ConnectionState::Failed, 5);
        board.record_trade(7);
        assert!(board.get(7).is_none());
        assert!(board.snapshot().is_empty());
    }

    #[test]
    fn counts_by_state() {
        let board = ConnectionStatusBoard::new();
        for chunk in 0..5 {
            board.register(chunk, 10);
        }
        board.set_state(1, ConnectionState::Subscribed, 0);
        board.set_state(2, ConnectionState::Streaming, 0);
        board.set_state(3, ConnectionState::Failed, 5);
        board.set_state(4, ConnectionState::Closed, 0);

        assert_eq!(
            board.counts(),
            StatusCounts {
                total: 5,
                pending: 1,
                live: 2,
                closed: 1,
                failed: 1,
            }
        );
    }

    #[test]
    fn snapshot_is_ordered_by_chunk() {
        let board = ConnectionStatusBoard::new();
        board.register(2, 1);
        board.register(0, 1);
        board.register(1, 1);

        let chunks: Vec<usize> = board.snapshot().iter().map(|s| s.chunk).collect();
        assert_eq!(chunks, vec![0, 1, 2]);
    }
}
