//! Live-Prices Feed Adapter
//!
//! Implements the subscription client for the live-prices WebSocket feed:
//!
//! - **client**: connection loop, decode and fan-out
//! - **transport**: `tokio-tungstenite` implementation of the transport port
//! - **codec** / **messages**: inbound decoding, outbound subscribe request
//! - **reconnect** / **heartbeat**: backoff policy and liveness checks

pub mod client;
pub mod codec;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;
pub mod transport;

pub use client::{CycleEnd, FeedClientConfig, FeedError, SubscriptionClient};
pub use codec::{CodecError, FeedCodec};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
pub use messages::{LIVE_PRICES_SERVICE, SubscribeRequest};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use transport::{TungsteniteConnection, TungsteniteConnector};
