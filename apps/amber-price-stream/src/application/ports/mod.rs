//! Port Interfaces
//!
//! Defines the transport capability the subscription client depends on,
//! following the Hexagonal Architecture pattern. The client only needs to
//! open a streaming connection, send text frames, receive frames and close.
//!
//! ## Driven Ports (Outbound)
//!
//! - `FeedConnector`: opens one authenticated streaming connection
//! - `FeedConnection`: an open connection owned by the client loop

use async_trait::async_trait;

/// A boxed error type for transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Connect Request
// =============================================================================

/// Everything needed to open one authenticated connection.
#[derive(Clone)]
pub struct ConnectRequest {
    /// Endpoint URL (`wss://...`).
    pub url: String,
    /// Bearer token sent in the `authorization` header.
    pub auth_token: String,
    /// Value of the `Origin` header.
    pub origin: String,
}

impl ConnectRequest {
    /// The `authorization` header value.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.auth_token)
    }
}

impl std::fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("url", &self.url)
            .field("auth_token", &"[REDACTED]")
            .field("origin", &self.origin)
            .finish()
    }
}

// =============================================================================
// Frames
// =============================================================================

/// An inbound frame, independent of the WebSocket library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Ping from the server.
    Ping,
    /// Pong answering one of our pings.
    Pong,
    /// Graceful close, with the peer's reason if any.
    Close(Option<String>),
}

// =============================================================================
// Errors
// =============================================================================

/// Transport-level failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request could not be turned into a handshake.
    #[error("invalid connect request: {0}")]
    InvalidRequest(String),

    /// The handshake failed (refused, TLS, HTTP status, ...).
    #[error("connect failed: {0}")]
    Connect(#[source] BoxError),

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    Send(#[source] BoxError),

    /// Reading a frame failed, or the peer reported an error.
    #[error("receive failed: {0}")]
    Receive(#[source] BoxError),
}

// =============================================================================
// Ports
// =============================================================================

/// Opens streaming connections to the price feed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Open one authenticated connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails.
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<Box<dyn FeedConnection>, TransportError>;
}

/// An open streaming connection.
///
/// Owned exclusively by the subscription client's background loop.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedConnection: Send {
    /// Send a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame could not be written.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Send a keep-alive ping.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame could not be written.
    async fn send_ping(&mut self) -> Result<(), TransportError>;

    /// Wait for the next inbound frame.
    ///
    /// Returns `None` once the stream has ended.
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;

    /// Close the connection. Calling it more than once is harmless.
    async fn close(&mut self);
}
