//! Connection Supervisor
//!
//! Starts one `StreamConnection` per chunk and waits for all of them.
//! Connections share the registry and the sink but nothing else; a failure
//! in one never stops the others.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::connection::{
    ConnectionOutcome, StreamConnection, StreamConnectionConfig, TerminationReason,
};
use crate::application::ports::TradeSink;
use crate::application::services::{ConnectionStatusBoard, TradeRouter};
use crate::domain::connection::ConnectionState;
use crate::domain::symbols::{Chunk, SymbolRegistry};

/// Outcomes of every connection, ordered by chunk index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorReport {
    outcomes: Vec<ConnectionOutcome>,
}

impl SupervisorReport {
    /// All outcomes.
    #[must_use]
    pub fn outcomes(&self) -> &[ConnectionOutcome] {
        &self.outcomes
    }

    /// Connections that ended `Closed`.
    #[must_use]
    pub fn closed(&self) -> usize {
        self.count(ConnectionState::Closed)
    }

    /// Connections that ended `Failed`.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(ConnectionState::Failed)
    }

    /// Number of connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Check whether no connection was started.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    fn count(&self, state: ConnectionState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }
}

/// Fans out connections over chunks.
#[derive(Debug)]
pub struct ConnectionSupervisor {
    config: StreamConnectionConfig,
    router: TradeRouter,
    status: Arc<ConnectionStatusBoard>,
    cancel: CancellationToken,
}

impl ConnectionSupervisor {
    /// Create a supervisor over a fully built registry.
    #[must_use]
    pub fn new(
        config: StreamConnectionConfig,
        registry: Arc<SymbolRegistry>,
        sink: Arc<dyn TradeSink>,
        status: Arc<ConnectionStatusBoard>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            router: TradeRouter::new(registry, sink),
            status,
            cancel,
        }
    }

    /// Run one connection per chunk and wait until every one has stopped.
    ///
    /// Returns immediately for an empty chunk list.
    pub async fn run(&self, chunks: Vec<Chunk>) -> SupervisorReport {
        if chunks.is_empty() {
            tracing::warn!("No chunks to stream");
            return SupervisorReport::default();
        }

        tracing::info!(
            connections = chunks.len(),
            symbols = self.router.registry().len(),
            "Starting stream connections"
        );

        let handles: Vec<(usize, JoinHandle<ConnectionOutcome>)> = chunks
            .into_iter()
            .map(|chunk| {
                let index = chunk.index();
                let connection = StreamConnection::new(
                    chunk,
                    self.config.clone(),
                    self.router.clone(),
                    Arc::clone(&self.status),
                    self.cancel.clone(),
                );
                let span = tracing::info_span!("stream_connection", chunk = index);
                (index, tokio::spawn(connection.run().instrument(span)))
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (index, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(chunk = index, error = %e, "Connection task aborted");
                    self.status.set_state(index, ConnectionState::Failed, 0);
                    self.status.record_error(index, &e.to_string());
                    ConnectionOutcome {
                        chunk: index,
                        state: ConnectionState::Failed,
                        reason: TerminationReason::Fatal(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        outcomes.sort_by_key(|o| o.chunk);
        let report = SupervisorReport { outcomes };

        tracing::info!(
            connections = report.len(),
            closed = report.closed(),
            failed = report.failed(),
            "All stream connections stopped"
        );

        report
    }
}
