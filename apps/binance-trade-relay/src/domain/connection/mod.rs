//! Connection Lifecycle
//!
//! Pure state machine for one feed connection: its `ConnectionState` and
//! the `RetryBudget` that bounds consecutive reconnects.
//!
//! ```text
//! Connecting ──► Subscribed ──► Streaming ──► Closed
//!     │              │              │
//!     └──────────────┴──────────────┴──► Reconnecting ──► Connecting
//!                                              │
//!                                              └──► Failed (budget spent)
//! ```
//!
//! Any non-closure error moves straight to `Failed`. `Closed` and `Failed`
//! are terminal: once reached, every further transition is ignored.

use serde::Serialize;

/// Default number of consecutive abnormal closures tolerated per connection.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of a single feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Opening the transport.
    Connecting,
    /// Subscribe request sent, waiting for the feed to answer.
    Subscribed,
    /// Feed is delivering frames.
    Streaming,
    /// Waiting out the backoff after an abnormal closure.
    Reconnecting,
    /// Abandoned permanently.
    Failed,
    /// Stopped cleanly (shutdown or sink failure).
    Closed,
}

impl ConnectionState {
    /// Check whether the state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }

    /// Check whether the connection currently holds a live subscription.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Subscribed | Self::Streaming)
    }

    /// Get the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
            Self::Streaming => "streaming",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

// =============================================================================
// Retry Budget
// =============================================================================

/// Counter of consecutive abnormal closures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    used: u32,
    max: u32,
}

impl RetryBudget {
    /// Create a budget allowing `max` consecutive closures.
    #[must_use]
    pub const fn new(max: u32) -> Self {
        Self { used: 0, max }
    }

    /// Closures counted since the last reset.
    #[must_use]
    pub const fn used(&self) -> u32 {
        self.used
    }

    /// Configured maximum.
    #[must_use]
    pub const fn max(&self) -> u32 {
        self.max
    }

    /// Check whether the budget is spent.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.used >= self.max
    }

    /// Count one closure. Returns `true` while a retry is still allowed.
    const fn consume(&mut self) -> bool {
        self.used = self.used.saturating_add(1);
        !self.is_exhausted()
    }

    const fn reset(&mut self) {
        self.used = 0;
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Verdict after an abnormal closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureVerdict {
    /// Wait out the backoff, then reconnect.
    Reconnect {
        /// Consecutive closure count, starting at 1.
        attempt: u32,
    },
    /// Budget spent; the connection is now `Failed`.
    Exhausted {
        /// Consecutive closures counted.
        attempts: u32,
    },
}

/// State machine owned by one stream connection.
#[derive(Debug, Clone)]
pub struct ConnectionLifecycle {
    state: ConnectionState,
    budget: RetryBudget,
}

impl ConnectionLifecycle {
    /// Start a lifecycle in `Connecting`.
    #[must_use]
    pub const fn new(max_retries: u32) -> Self {
        Self {
            state: ConnectionState::Connecting,
            budget: RetryBudget::new(max_retries),
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current retry budget.
    #[must_use]
    pub const fn budget(&self) -> RetryBudget {
        self.budget
    }

    /// The subscribe request went out on a fresh transport.
    pub fn on_subscribed(&mut self) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Subscribed;
        }
    }

    /// The feed answered the subscription. Clears the retry budget.
    pub fn on_streaming(&mut self) {
        if self.state == ConnectionState::Subscribed {
            self.state = ConnectionState::Streaming;
            self.budget.reset();
        }
    }

    /// The transport closed abnormally.
    ///
    /// A terminal lifecycle never reconnects and reports `Exhausted`.
    pub fn on_abnormal_closure(&mut self) -> ClosureVerdict {
        if self.state.is_terminal() {
            return ClosureVerdict::Exhausted {
                attempts: self.budget.used(),
            };
        }

        if self.budget.consume() {
            self.state = ConnectionState::Reconnecting;
            ClosureVerdict::Reconnect {
                attempt: self.budget.used(),
            }
        } else {
            self.state = ConnectionState::Failed;
            ClosureVerdict::Exhausted {
                attempts: self.budget.used(),
            }
        }
    }

    /// Backoff elapsed; open a new transport.
    pub fn on_reconnect(&mut self) {
        if self.state == ConnectionState::Reconnecting {
            self.state = ConnectionState::Connecting;
        }
    }

    /// Unrecoverable error.
    pub fn on_failed(&mut self) {
        if !self.state.is_terminal() {
            self.state = ConnectionState::Failed;
        }
    }

    /// Clean stop.
    pub fn on_closed(&mut self) {
        if !self.state.is_terminal() {
            self.state = ConnectionState::Closed;
        }
    }
}
