//! Configuration Module
//!
//! Configuration loading for the price stream.

mod settings;

pub use settings::{
    ChannelSelection, ConfigError, Credentials, DEFAULT_ORIGIN, DEFAULT_WS_URL, StreamConfig,
    WebSocketSettings,
};
