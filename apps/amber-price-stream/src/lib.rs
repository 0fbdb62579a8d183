#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Amber Price Stream - Live Electricity Price Subscription
//!
//! Keeps an authenticated WebSocket subscription to the live-prices feed
//! open indefinitely and republishes the latest per-channel prices to any
//! number of observers.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Payload views and the per-channel index
//!   - `payload`: loosely structured price payloads and channel entries
//!   - `cache`: channel type → latest entry
//!
//! - **Application**: Ports and services
//!   - `ports`: transport capability (connect, send, receive, close)
//!   - `services`: the state coordinator
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: subscription client, reconnect and heartbeat, tungstenite transport
//!   - `broadcast`: listener fan-out and host event bus
//!   - `config`: environment configuration
//!   - `metrics` / `telemetry`: observability
//!
//! # Data Flow
//!
//! ```text
//! WebSocket ──► SubscriptionClient ──► StateCoordinator ──► queries
//!                      │                      │
//!                      ├─► payload listeners  └─► update listeners
//!                      └─► EventBus (amber_websocket_event)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Payload types with no I/O.
pub mod domain;

/// Application layer - Ports and services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::cache::ChannelIndex;
pub use domain::payload::{
    CHANNEL_CONTROLLED_LOAD, CHANNEL_FEED_IN, CHANNEL_GENERAL, ChannelEntry, PricePayload,
};

// Ports and services
pub use application::ports::{
    ConnectRequest, FeedConnection, FeedConnector, Frame, TransportError,
};
pub use application::services::StateCoordinator;

// Infrastructure config
pub use infrastructure::config::{
    ChannelSelection, ConfigError, Credentials, StreamConfig, WebSocketSettings,
};

// Feed client
pub use infrastructure::feed::{
    FeedClientConfig, FeedError, SubscriptionClient, TungsteniteConnector,
};

// Fan-out
pub use infrastructure::broadcast::{
    EVENT_PRICE_UPDATE, EventBus, ListenerHandle, ListenerRegistry, PriceUpdateEvent,
};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
