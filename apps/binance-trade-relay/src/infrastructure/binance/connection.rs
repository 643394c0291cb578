//! Stream Connection
//!
//! Owns one WebSocket connection serving one chunk of symbols: connect,
//! subscribe, receive loop, and reconnect within the retry budget.
//!
//! # Failure Handling
//!
//! - Abnormal transport closure: wait the reconnect delay, reconnect and
//!   resend the identical subscribe text, until the budget is spent
//! - Sink write failure: close this connection, no retry
//! - Anything else (including a failed connect): fail this connection,
//!   no retry
//!
//! Other connections are never affected.

use std::sync::Arc;
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use super::codec::{DecodeError, Decoded, SkipReason, TradeCodec};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::SinkError;
use crate::application::services::{ConnectionStatusBoard, RouteOutcome, TradeRouter};
use crate::domain::connection::{ClosureVerdict, ConnectionLifecycle, ConnectionState};
use crate::domain::symbols::Chunk;
use crate::infrastructure::metrics;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that end one session of a stream connection.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The transport closed without a clean shutdown; retryable.
    #[error("connection closed abnormally: {0}")]
    AbnormalClosure(String),

    /// Opening the transport failed.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        /// Endpoint that was dialled.
        url: String,
        /// Underlying transport error.
        #[source]
        source: tungstenite::Error,
    },

    /// Any other transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[source] tungstenite::Error),

    /// The subscribe request could not be encoded.
    #[error("failed to encode subscribe request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StreamError {
    /// Classify a transport error raised on an open connection.
    #[must_use]
    pub fn from_transport(error: tungstenite::Error) -> Self {
        if is_abnormal_closure(&error) {
            Self::AbnormalClosure(error.to_string())
        } else {
            Self::WebSocket(error)
        }
    }

    /// Check whether reconnecting may help.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::AbnormalClosure(_))
    }
}

/// Check whether a transport error means the peer went away.
#[must_use]
pub fn is_abnormal_closure(error: &tungstenite::Error) -> bool {
    matches!(
        error,
        tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Io(_)
            | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake)
    )
}

// =============================================================================
// Outcome
// =============================================================================

/// Why a connection stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Process shutdown was requested.
    Shutdown,
    /// The sink rejected a write.
    SinkWriteFailed(String),
    /// Too many consecutive abnormal closures.
    RetryBudgetExhausted {
        /// Closures counted.
        attempts: u32,
    },
    /// Non-retryable error.
    Fatal(String),
}

impl TerminationReason {
    /// Metric label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Shutdown => "shutdown",
            Self::SinkWriteFailed(_) => "sink_write_failed",
            Self::RetryBudgetExhausted { .. } => "retry_budget_exhausted",
            Self::Fatal(_) => "fatal",
        }
    }

    /// State the connection ends in.
    #[must_use]
    pub const fn terminal_state(&self) -> ConnectionState {
        match self {
            Self::Shutdown | Self::SinkWriteFailed(_) => ConnectionState::Closed,
            Self::RetryBudgetExhausted { .. } | Self::Fatal(_) => ConnectionState::Failed,
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shutdown => f.write_str("shutdown requested"),
            Self::SinkWriteFailed(e) => write!(f, "sink write failed: {e}"),
            Self::RetryBudgetExhausted { attempts } => {
                write!(f, "gave up after {attempts} abnormal closures")
            }
            Self::Fatal(e) => write!(f, "fatal error: {e}"),
        }
    }
}

/// Final result of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOutcome {
    /// Chunk index served.
    pub chunk: usize,
    /// Terminal state.
    pub state: ConnectionState,
    /// Why it stopped.
    pub reason: TerminationReason,
}

// =============================================================================
// Stream Connection
// =============================================================================

/// Settings shared by every stream connection.
#[derive(Debug, Clone)]
pub struct StreamConnectionConfig {
    /// Combined-stream endpoint.
    pub url: String,
    /// Reconnect behavior.
    pub reconnect: ReconnectConfig,
}

/// How a session ended without a transport error.
enum SessionEnd {
    Cancelled,
    SinkFailed(SinkError),
}

/// One connection serving one chunk.
#[derive(Debug)]
pub struct StreamConnection {
    chunk: Chunk,
    url: String,
    policy: ReconnectPolicy,
    codec: TradeCodec,
    router: TradeRouter,
    status: Arc<ConnectionStatusBoard>,
    cancel: CancellationToken,
}

impl StreamConnection {
    /// Create a connection and register it on the status board.
    #[must_use]
    pub fn new(
        chunk: Chunk,
        config: StreamConnectionConfig,
        router: TradeRouter,
        status: Arc<ConnectionStatusBoard>,
        cancel: CancellationToken,
    ) -> Self {
        status.register(chunk.index(), chunk.len());
        Self {
            chunk,
            url: config.url,
            policy: ReconnectPolicy::new(config.reconnect),
            codec: TradeCodec::new(),
            router,
            status,
            cancel,
        }
    }

    /// Chunk index served.
    #[must_use]
    pub const fn chunk_index(&self) -> usize {
        self.chunk.index()
    }

    /// Run until shutdown, sink failure, fatal error, or budget exhaustion.
    pub async fn run(self) -> ConnectionOutcome {
        let mut lifecycle = ConnectionLifecycle::new(self.policy.max_retries());
        metrics::record_connection_started();

        let subscribe = match self.codec.encode_subscribe(&self.chunk) {
            Ok(text) => text,
            Err(e) => {
                let error = StreamError::from(e);
                return self.finish(&mut lifecycle, TerminationReason::Fatal(error.to_string()));
            }
        };

        loop {
            if self.cancel.is_cancelled() {
                return self.finish(&mut lifecycle, TerminationReason::Shutdown);
            }

            self.publish(&lifecycle);

            match self.connect_and_stream(&subscribe, &mut lifecycle).await {
                Ok(SessionEnd::Cancelled) => {
                    return self.finish(&mut lifecycle, TerminationReason::Shutdown);
                }
                Ok(SessionEnd::SinkFailed(e)) => {
                    tracing::error!(chunk = self.chunk.index(), error = %e, "Sink write failed");
                    self.status.record_error(self.chunk.index(), &e.to_string());
                    return self.finish(
                        &mut lifecycle,
                        TerminationReason::SinkWriteFailed(e.to_string()),
                    );
                }
                Err(e) if e.is_retryable() => {
                    self.status.record_error(self.chunk.index(), &e.to_string());

                    match lifecycle.on_abnormal_closure() {
                        ClosureVerdict::Reconnect { attempt } => {
                            self.publish(&lifecycle);
                            metrics::record_reconnect();

                            let delay = self.policy.delay();
                            tracing::warn!(
                                chunk = self.chunk.index(),
                                attempt,
                                max_retries = self.policy.max_retries(),
                                delay_ms = delay.as_millis(),
                                error = %e,
                                "Connection closed abnormally, reconnecting"
                            );

                            tokio::select! {
                                () = self.cancel.cancelled() => {
                                    tracing::info!(
                                        chunk = self.chunk.index(),
                                        "Cancelled during reconnect delay"
                                    );
                                    return self.finish(&mut lifecycle, TerminationReason::Shutdown);
                                }
                                () = tokio::time::sleep(delay) => {}
                            }

                            lifecycle.on_reconnect();
                        }
                        ClosureVerdict::Exhausted { attempts } => {
                            tracing::error!(
                                chunk = self.chunk.index(),
                                attempts,
                                error = %e,
                                "Retry budget exhausted"
                            );
                            return self.finish(
                                &mut lifecycle,
                                TerminationReason::RetryBudgetExhausted { attempts },
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(chunk = self.chunk.index(), error = %e, "Connection failed");
                    self.status.record_error(self.chunk.index(), &e.to_string());
                    return self.finish(&mut lifecycle, TerminationReason::Fatal(e.to_string()));
                }
            }
        }
    }

    /// Connect, subscribe, and process frames until the session ends.
    async fn connect_and_stream(
        &self,
        subscribe: &str,
        lifecycle: &mut ConnectionLifecycle,
    ) -> Result<SessionEnd, StreamError> {
        tracing::debug!(chunk = self.chunk.index(), url = %self.url, "Connecting to trade stream");

        let connected = tokio::select! {
            () = self.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            result = tokio_tungstenite::connect_async(self.url.as_str()) => result,
        };
        let (ws_stream, _response) = connected.map_err(|source| StreamError::Connect {
            url: self.url.clone(),
            source,
        })?;

        let (mut write, mut read) = ws_stream.split();

        write
            .send(Message::Text(subscribe.to_owned().into()))
            .await
            .map_err(StreamError::from_transport)?;

        lifecycle.on_subscribed();
        self.publish(lifecycle);
        tracing::info!(
            chunk = self.chunk.index(),
            symbols = self.chunk.len(),
            "Subscribed to trade streams"
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        tracing::debug!(chunk = self.chunk.index(), error = %e, "Close frame not sent");
                    }
                    return Ok(SessionEnd::Cancelled);
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.mark_streaming(lifecycle);
                            metrics::record_frame_received();

                            if let Some(end) = self.handle_text(&text).await {
                                return Ok(end);
                            }
                        }
                        Some(Ok(Message::Binary(_))) => {
                            self.mark_streaming(lifecycle);
                            metrics::record_frame_received();
                            metrics::record_frame_skipped(SkipReason::NotJson);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write
                                .send(Message::Pong(data))
                                .await
                                .map_err(StreamError::from_transport)?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame.map_or_else(
                                || "server sent close frame".to_string(),
                                |f| format!("server sent close frame ({}): {}", f.code, f.reason.as_str()),
                            );
                            return Err(StreamError::AbnormalClosure(reason));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(StreamError::from_transport(e)),
                        None => {
                            return Err(StreamError::AbnormalClosure("stream ended".to_string()));
                        }
                    }
                }
            }
        }
    }

    /// Decode and route one text frame. Returns `Some` when the session must end.
    async fn handle_text(&self, text: &str) -> Option<SessionEnd> {
        match self.codec.decode(text) {
            Ok(Decoded::Trade(event)) => {
                let started = Instant::now();
                match self.router.route(&event).await {
                    Ok(RouteOutcome::Delivered(key)) => {
                        metrics::record_trade_routed(started.elapsed());
                        self.status.record_trade(self.chunk.index());
                        tracing::trace!(symbol = %event.symbol(), %key, price = event.price(), "Trade routed");
                    }
                    Ok(RouteOutcome::UnknownSymbol) => metrics::record_unknown_symbol(),
                    Err(e) => return Some(SessionEnd::SinkFailed(e)),
                }
            }
            Ok(Decoded::Skip(reason)) => {
                tracing::trace!(chunk = self.chunk.index(), ?reason, "Skipping frame");
                metrics::record_frame_skipped(reason);
            }
            Err(e) => self.log_decode_error(&e),
        }
        None
    }

    fn log_decode_error(&self, error: &DecodeError) {
        tracing::warn!(chunk = self.chunk.index(), error = %error, "Dropping malformed trade");
        metrics::record_decode_error();
    }

    fn mark_streaming(&self, lifecycle: &mut ConnectionLifecycle) {
        if lifecycle.state() == ConnectionState::Subscribed {
            lifecycle.on_streaming();
            self.publish(lifecycle);
            tracing::debug!(chunk = self.chunk.index(), "Trade stream active");
        }
    }

    fn publish(&self, lifecycle: &ConnectionLifecycle) {
        self.status
            .set_state(self.chunk.index(), lifecycle.state(), lifecycle.budget().used());
    }

    fn finish(
        &self,
        lifecycle: &mut ConnectionLifecycle,
        reason: TerminationReason,
    ) -> ConnectionOutcome {
        match reason.terminal_state() {
            ConnectionState::Failed => lifecycle.on_failed(),
            _ => lifecycle.on_closed(),
        }
        self.publish(lifecycle);
        metrics::record_connection_finished(&reason);

        tracing::info!(
            chunk = self.chunk.index(),
            state = lifecycle.state().as_str(),
            reason = %reason,
            "Connection stopped"
        );

        ConnectionOutcome {
            chunk: self.chunk.index(),
            state: lifecycle.state(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn closure_errors_are_retryable() {
        let errors = [
            tungstenite::Error::ConnectionClosed,
            tungstenite::Error::AlreadyClosed,
            tungstenite::Error::Io(io::Error::from(io::ErrorKind::ConnectionReset)),
            tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake),
        ];

        for error in errors {
            assert!(StreamError::from_transport(error).is_retryable());
        }
    }

    #[test]
    fn protocol_violations_are_fatal() {
        let error = tungstenite::Error::Protocol(ProtocolError::NonZeroReservedBits);
        assert!(!StreamError::from_transport(error).is_retryable());

        let error = tungstenite::Error::Url(tungstenite::error::UrlError::NoHostName);
        assert!(!StreamError::from_transport(error).is_retryable());
    }

    #[test]
    fn connect_errors_are_fatal() {
        let error = StreamError::Connect {
            url: "ws://127.0.0.1:1".to_string(),
            source: tungstenite::Error::Io(io::Error::from(io::ErrorKind::ConnectionRefused)),
        };
        assert!(!error.is_retryable());
    }

    #[test]
    fn termination_reason_states() {
        assert_eq!(TerminationReason::Shutdown.terminal_state(), ConnectionState::Closed);
        assert_eq!(
            TerminationReason::SinkWriteFailed("closed".into()).terminal_state(),
            ConnectionState::Closed
        );
        assert_eq!(
            TerminationReason::RetryBudgetExhausted { attempts: 5 }.terminal_state(),
            ConnectionState::Failed
        );
        assert_eq!(
            TerminationReason::Fatal("dns".into()).terminal_state(),
            ConnectionState::Failed
        );
    }

    #[test]
    fn termination_reason_labels() {
        assert_eq!(TerminationReason::Shutdown.label(), "shutdown");
        assert_eq!(
            TerminationReason::RetryBudgetExhausted { attempts: 5 }.to_string(),
            "gave up after 5 abnormal closures"
        );
    }
}
