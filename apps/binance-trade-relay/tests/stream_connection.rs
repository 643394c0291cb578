//! Stream Connection Integration Tests
//!
//! Drives real WebSocket sessions against a local feed server: streaming,
//! reconnects within the retry budget, and per-connection failure isolation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use binance_trade_relay::{
    Chunk, ConnectionOutcome, ConnectionState, ConnectionStatusBoard, ConnectionSupervisor,
    ReconnectConfig, SheetSink, SinkError, SinkKey, StreamConnection, StreamConnectionConfig,
    Symbol, SymbolRegistry, TerminationReason, TradeRouter, TradeSink, chunk_symbols,
};

const ACK: &str = r#"{"result":null,"id":1}"#;
const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Mock Feed
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
enum SessionEnd {
    /// Keep the socket open until the client leaves.
    #[default]
    Hold,
    /// Drop the TCP stream without a close handshake.
    Drop,
    /// Send a close frame.
    Close,
}

#[derive(Debug, Clone, Default)]
struct SessionPlan {
    ack: bool,
    frames: Vec<String>,
    end: SessionEnd,
}

struct MockFeed {
    url: String,
    sessions: Arc<AtomicUsize>,
    subscribes: Arc<Mutex<Vec<String>>>,
    _server: JoinHandle<()>,
}

impl MockFeed {
    async fn start<F>(plan: F) -> Self
    where
        F: Fn(usize, &str) -> SessionPlan + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let sessions = Arc::new(AtomicUsize::new(0));
        let subscribes = Arc::new(Mutex::new(Vec::new()));
        let plan = Arc::new(plan);

        let server = {
            let sessions = Arc::clone(&sessions);
            let subscribes = Arc::clone(&subscribes);
            tokio::spawn(async move {
                while let Ok((tcp, _)) = listener.accept().await {
                    let session = sessions.fetch_add(1, Ordering::SeqCst);
                    let plan = Arc::clone(&plan);
                    let subscribes = Arc::clone(&subscribes);

                    tokio::spawn(async move {
                        let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await else {
                            return;
                        };
                        let Some(Ok(Message::Text(subscribe))) = ws.next().await else {
                            return;
                        };
                        subscribes.lock().push(subscribe.to_string());
                        let plan = plan(session, subscribe.as_str());

                        if plan.ack && ws.send(Message::text(ACK)).await.is_err() {
                            return;
                        }
                        for frame in plan.frames {
                            if ws.send(Message::text(frame)).await.is_err() {
                                return;
                            }
                        }

                        match plan.end {
                            SessionEnd::Hold => while let Some(Ok(_)) = ws.next().await {},
                            SessionEnd::Drop => drop(ws),
                            SessionEnd::Close => {
                                let _ = ws.close(None).await;
                                while let Some(Ok(_)) = ws.next().await {}
                            }
                        }
                    });
                }
            })
        };

        Self {
            url: format!("ws://{addr}/stream"),
            sessions,
            subscribes,
            _server: server,
        }
    }

    fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    fn subscribes(&self) -> Vec<String> {
        self.subscribes.lock().clone()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn trade_frame(symbol: &str, price: &str, millis: i64) -> String {
    format!(
        r#"{{"stream":"{}@trade","data":{{"e":"trade","E":{millis},"s":"{symbol}","t":1,"p":"{price}","q":"1","T":{millis},"m":true,"M":true}}}}"#,
        symbol.to_lowercase()
    )
}

/// Trade for the first symbol named in a subscribe request.
fn first_subscribed(subscribe: &str) -> String {
    let request: serde_json::Value = serde_json::from_str(subscribe).unwrap();
    let stream = request["params"][0].as_str().unwrap();
    stream.trim_end_matches("@trade").to_uppercase()
}

fn connection_config(url: &str, max_retries: u32, delay: Duration) -> StreamConnectionConfig {
    StreamConnectionConfig {
        url: url.to_string(),
        reconnect: ReconnectConfig {
            delay,
            max_retries,
            jitter_factor: 0.0,
        },
    }
}

async fn sheet(symbols: &[&str]) -> (Arc<SheetSink>, Arc<SymbolRegistry>) {
    let sink = Arc::new(SheetSink::in_memory());
    let symbols: Vec<Symbol> = symbols.iter().map(|s| Symbol::new(s)).collect();
    let registry = Arc::new(sink.initialize(&symbols).await.unwrap());
    (sink, registry)
}

fn spawn_connection(
    config: StreamConnectionConfig,
    registry: &Arc<SymbolRegistry>,
    sink: Arc<dyn TradeSink>,
    status: &Arc<ConnectionStatusBoard>,
    cancel: &CancellationToken,
) -> JoinHandle<ConnectionOutcome> {
    let chunk = Chunk::new(0, registry.symbols().to_vec());
    let connection = StreamConnection::new(
        chunk,
        config,
        TradeRouter::new(Arc::clone(registry), sink),
        Arc::clone(status),
        cancel.clone(),
    );
    tokio::spawn(connection.run())
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn join<T>(handle: JoinHandle<T>) -> T {
    tokio::time::timeout(WAIT, handle)
        .await
        .expect("task did not finish in time")
        .unwrap()
}

/// Sink that rejects writes to one key.
struct RejectingSink {
    inner: SheetSink,
    reject: Mutex<Option<SinkKey>>,
}

#[async_trait]
impl TradeSink for RejectingSink {
    async fn initialize(&self, symbols: &[Symbol]) -> Result<SymbolRegistry, SinkError> {
        self.inner.initialize(symbols).await
    }

    async fn update(&self, key: SinkKey, price: &str, display_time: &str) -> Result<(), SinkError> {
        if *self.reject.lock() == Some(key) {
            return Err(SinkError::Rejected("cell is locked".to_string()));
        }
        self.inner.update(key, price, display_time).await
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.inner.close().await
    }
}

// =============================================================================
// Streaming
// =============================================================================

#[tokio::test]
async fn streams_trades_and_closes_on_shutdown() {
    let feed = MockFeed::start(|_, _| SessionPlan {
        ack: true,
        frames: vec![
            r#"{"stream":"btcusdt@trade","data":{"s":"BTCUSDT","p":"abc","T":1700000000000}}"#
                .to_string(),
            trade_frame("BTCUSDT", "50000.10", 1_700_000_000_000),
            trade_frame("DOGEUSDT", "0.08", 1_700_000_000_050),
            trade_frame("ETHUSDT", "2040.55", 1_700_000_000_123),
        ],
        end: SessionEnd::Hold,
    })
    .await;

    let (sink, registry) = sheet(&["BTCUSDT", "ETHUSDT"]).await;
    let status = Arc::new(ConnectionStatusBoard::new());
    let cancel = CancellationToken::new();
    let handle = spawn_connection(
        connection_config(&feed.url, 5, Duration::from_millis(10)),
        &registry,
        Arc::clone(&sink) as Arc<dyn TradeSink>,
        &status,
        &cancel,
    );

    wait_until(|| sink.row(SinkKey::new(3)).unwrap().price.is_some()).await;

    let btc = sink.row(SinkKey::new(2)).unwrap();
    assert_eq!(btc.price.as_deref(), Some("50000.10"));
    assert_eq!(btc.time.as_deref(), Some("14-11-2023 22:13:20.000"));

    let eth = sink.row(SinkKey::new(3)).unwrap();
    assert_eq!(eth.price.as_deref(), Some("2040.55"));
    assert_eq!(eth.time.as_deref(), Some("14-11-2023 22:13:20.123"));

    let snapshot = status.get(0).unwrap();
    assert_eq!(snapshot.state, ConnectionState::Streaming);
    assert_eq!(snapshot.trades_routed, 2);

    cancel.cancel();
    let outcome = join(handle).await;
    assert_eq!(outcome.state, ConnectionState::Closed);
    assert_eq!(outcome.reason, TerminationReason::Shutdown);

    assert_eq!(feed.sessions(), 1);
    assert_eq!(
        feed.subscribes(),
        vec![r#"{"method":"SUBSCRIBE","params":["btcusdt@trade","ethusdt@trade"],"id":1}"#]
    );
}

// =============================================================================
// Reconnects
// =============================================================================

#[tokio::test]
async fn reconnects_after_abnormal_closure_with_same_subscription() {
    let feed = MockFeed::start(|session, _| match session {
        0 => SessionPlan {
            ack: true,
            frames: vec![trade_frame("BTCUSDT", "50000.10", 1_700_000_000_000)],
            end: SessionEnd::Drop,
        },
        _ => SessionPlan {
            ack: true,
            frames: vec![trade_frame("ETHUSDT", "2040.55", 1_700_000_000_123)],
            end: SessionEnd::Hold,
        },
    })
    .await;

    let (sink, registry) = sheet(&["BTCUSDT", "ETHUSDT"]).await;
    let status = Arc::new(ConnectionStatusBoard::new());
    let cancel = CancellationToken::new();
    let handle = spawn_connection(
        connection_config(&feed.url, 5, Duration::from_millis(20)),
        &registry,
        Arc::clone(&sink) as Arc<dyn TradeSink>,
        &status,
        &cancel,
    );

    wait_until(|| sink.row(SinkKey::new(3)).unwrap().price.is_some()).await;
    assert_eq!(
        sink.row(SinkKey::new(2)).unwrap().price.as_deref(),
        Some("50000.10")
    );

    let snapshot = status.get(0).unwrap();
    assert_eq!(snapshot.state, ConnectionState::Streaming);
    assert_eq!(snapshot.retries, 0);
    assert!(snapshot.last_error.is_some());

    cancel.cancel();
    let outcome = join(handle).await;
    assert_eq!(outcome.reason, TerminationReason::Shutdown);

    let subscribes = feed.subscribes();
    assert_eq!(subscribes.len(), 2);
    assert_eq!(subscribes[0], subscribes[1]);
}

#[tokio::test]
async fn fails_after_retry_budget_is_spent() {
    let feed = MockFeed::start(|_, _| SessionPlan {
        ack: false,
        frames: vec![],
        end: SessionEnd::Close,
    })
    .await;

    let (sink, registry) = sheet(&["BTCUSDT"]).await;
    let status = Arc::new(ConnectionStatusBoard::new());
    let cancel = CancellationToken::new();
    let handle = spawn_connection(
        connection_config(&feed.url, 3, Duration::from_millis(10)),
        &registry,
        Arc::clone(&sink) as Arc<dyn TradeSink>,
        &status,
        &cancel,
    );

    let outcome = join(handle).await;
    assert_eq!(outcome.state, ConnectionState::Failed);
    assert_eq!(
        outcome.reason,
        TerminationReason::RetryBudgetExhausted { attempts: 3 }
    );
    assert_eq!(feed.sessions(), 3);
    assert_eq!(status.get(0).unwrap().state, ConnectionState::Failed);
    assert!(sink.row(SinkKey::new(2)).unwrap().price.is_none());
}

#[tokio::test]
async fn budget_resets_after_a_session_streams() {
    // Closure counts per session: 1, reset then 1, 2 -> exhausted at max 2.
    let feed = MockFeed::start(|session, _| SessionPlan {
        ack: session == 1,
        frames: vec![],
        end: SessionEnd::Close,
    })
    .await;

    let (sink, registry) = sheet(&["BTCUSDT"]).await;
    let status = Arc::new(ConnectionStatusBoard::new());
    let cancel = CancellationToken::new();
    let handle = spawn_connection(
        connection_config(&feed.url, 2, Duration::from_millis(10)),
        &registry,
        sink as Arc<dyn TradeSink>,
        &status,
        &cancel,
    );

    let outcome = join(handle).await;
    assert_eq!(
        outcome.reason,
        TerminationReason::RetryBudgetExhausted { attempts: 2 }
    );
    assert_eq!(feed.sessions(), 3);
}

#[tokio::test]
async fn cancel_during_backoff_closes_promptly() {
    let feed = MockFeed::start(|_, _| SessionPlan {
        ack: false,
        frames: vec![],
        end: SessionEnd::Drop,
    })
    .await;

    let (sink, registry) = sheet(&["BTCUSDT"]).await;
    let status = Arc::new(ConnectionStatusBoard::new());
    let cancel = CancellationToken::new();
    let handle = spawn_connection(
        connection_config(&feed.url, 5, Duration::from_secs(60)),
        &registry,
        sink as Arc<dyn TradeSink>,
        &status,
        &cancel,
    );

    wait_until(|| status.get(0).unwrap().state == ConnectionState::Reconnecting).await;
    assert_eq!(status.get(0).unwrap().retries, 1);

    cancel.cancel();
    let outcome = join(handle).await;
    assert_eq!(outcome.state, ConnectionState::Closed);
    assert_eq!(outcome.reason, TerminationReason::Shutdown);
    assert_eq!(feed.sessions(), 1);
}

// =============================================================================
// Fatal Errors
// =============================================================================

#[tokio::test]
async fn connect_failure_is_fatal_without_retry() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (sink, registry) = sheet(&["BTCUSDT"]).await;
    let status = Arc::new(ConnectionStatusBoard::new());
    let cancel = CancellationToken::new();
    let handle = spawn_connection(
        connection_config(&format!("ws://{addr}/stream"), 5, Duration::from_secs(60)),
        &registry,
        sink as Arc<dyn TradeSink>,
        &status,
        &cancel,
    );

    let outcome = join(handle).await;
    assert_eq!(outcome.state, ConnectionState::Failed);
    assert!(matches!(outcome.reason, TerminationReason::Fatal(_)));
    assert_eq!(status.get(0).unwrap().retries, 0);
}

// =============================================================================
// Supervisor
// =============================================================================

#[tokio::test]
async fn sink_failure_stops_only_its_connection() {
    let feed = MockFeed::start(|_, subscribe| SessionPlan {
        ack: true,
        frames: vec![trade_frame(
            &first_subscribed(subscribe),
            "1.5",
            1_700_000_000_000,
        )],
        end: SessionEnd::Hold,
    })
    .await;

    let sink = Arc::new(RejectingSink {
        inner: SheetSink::in_memory(),
        reject: Mutex::new(None),
    });
    let symbols = vec![Symbol::new("BTCUSDT"), Symbol::new("ETHUSDT")];
    let registry = Arc::new(sink.initialize(&symbols).await.unwrap());
    *sink.reject.lock() = registry.get("BTCUSDT");

    let status = Arc::new(ConnectionStatusBoard::new());
    let cancel = CancellationToken::new();
    let supervisor = ConnectionSupervisor::new(
        connection_config(&feed.url, 5, Duration::from_millis(10)),
        Arc::clone(&registry),
        Arc::clone(&sink) as Arc<dyn TradeSink>,
        Arc::clone(&status),
        cancel.clone(),
    );

    let chunks = chunk_symbols(registry.symbols(), 1);
    assert_eq!(chunks.len(), 2);
    let run = tokio::spawn(async move { supervisor.run(chunks).await });

    wait_until(|| {
        status
            .get(0)
            .is_some_and(|s| s.state == ConnectionState::Closed)
            && status.get(1).is_some_and(|s| s.trades_routed == 1)
    })
    .await;
    assert_eq!(status.get(1).unwrap().state, ConnectionState::Streaming);

    cancel.cancel();
    let report = join(run).await;

    assert_eq!(report.len(), 2);
    assert_eq!(report.closed(), 2);
    assert!(matches!(
        report.outcomes()[0].reason,
        TerminationReason::SinkWriteFailed(_)
    ));
    assert_eq!(report.outcomes()[1].reason, TerminationReason::Shutdown);

    let eth = sink.inner.row(registry.get("ETHUSDT").unwrap()).unwrap();
    assert_eq!(eth.price.as_deref(), Some("1.5"));
}

#[tokio::test]
async fn supervisor_runs_one_session_per_chunk() {
    let feed = MockFeed::start(|_, _| SessionPlan {
        ack: true,
        frames: vec![],
        end: SessionEnd::Hold,
    })
    .await;

    let names: Vec<String> = (0..5).map(|i| format!("SYM{i}USDT")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let (sink, registry) = sheet(&refs).await;

    let status = Arc::new(ConnectionStatusBoard::new());
    let cancel = CancellationToken::new();
    let supervisor = ConnectionSupervisor::new(
        connection_config(&feed.url, 5, Duration::from_millis(10)),
        Arc::clone(&registry),
        sink as Arc<dyn TradeSink>,
        Arc::clone(&status),
        cancel.clone(),
    );

    let chunks = chunk_symbols(registry.symbols(), 2);
    let run = tokio::spawn(async move { supervisor.run(chunks).await });

    wait_until(|| status.counts().live == 3).await;
    assert_eq!(feed.sessions(), 3);

    cancel.cancel();
    let report = join(run).await;
    assert_eq!(report.len(), 3);
    assert_eq!(report.failed(), 0);

    let mut params: Vec<usize> = feed
        .subscribes()
        .iter()
        .map(|s| {
            let v: serde_json::Value = serde_json::from_str(s).unwrap();
            v["params"].as_array().unwrap().len()
        })
        .collect();
    params.sort_unstable();
    assert_eq!(params, vec![1, 2, 2]);
}

#[tokio::test]
async fn supervisor_with_no_chunks_returns_immediately() {
    let (sink, registry) = sheet(&["BTCUSDT"]).await;
    let supervisor = ConnectionSupervisor::new(
        connection_config("ws://127.0.0.1:9/stream", 5, Duration::from_millis(10)),
        registry,
        sink as Arc<dyn TradeSink>,
        Arc::new(ConnectionStatusBoard::new()),
        CancellationToken::new(),
    );

    let report = tokio::time::timeout(WAIT, supervisor.run(Vec::new()))
        .await
        .unwrap();
    assert!(report.is_empty());
}
