//! Configuration Module
//!
//! Configuration loading for the relay.

mod settings;

pub use settings::{
    ConfigError, FeedSettings, FileSettings, MAX_STREAMS_PER_CONNECTION, RelayConfig,
    ServerSettings, StreamSettings,
};
