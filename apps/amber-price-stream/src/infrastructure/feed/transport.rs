//! WebSocket Transport
//!
//! [`FeedConnector`] implementation over `tokio-tungstenite`. The handshake
//! carries the `authorization` and `Origin` headers the feed requires;
//! frames are translated into the library-independent [`Frame`] type.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, ORIGIN};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{
    ConnectRequest, FeedConnection, FeedConnector, Frame, TransportError,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens feed connections with `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    /// Create a new connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Build the handshake request with the feed's headers.
///
/// # Errors
///
/// Returns an error if the URL or a header value is invalid.
pub fn build_handshake(
    request: &ConnectRequest,
) -> Result<tungstenite::handshake::client::Request, TransportError> {
    let mut handshake = request
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

    let authorization = HeaderValue::from_str(&request.authorization())
        .map_err(|_| TransportError::InvalidRequest("authorization header".to_string()))?;
    let origin = HeaderValue::from_str(&request.origin)
        .map_err(|_| TransportError::InvalidRequest(format!("origin {:?}", request.origin)))?;

    let headers = handshake.headers_mut();
    headers.insert(AUTHORIZATION, authorization);
    headers.insert(ORIGIN, origin);

    Ok(handshake)
}

#[async_trait]
impl FeedConnector for TungsteniteConnector {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<Box<dyn FeedConnection>, TransportError> {
        let handshake = build_handshake(request)?;

        let (stream, response) = tokio_tungstenite::connect_async(handshake)
            .await
            .map_err(|e| TransportError::Connect(Box::new(e)))?;

        tracing::debug!(status = %response.status(), "WebSocket handshake complete");

        Ok(Box::new(TungsteniteConnection {
            stream,
            closed: false,
        }))
    }
}

/// An open `tokio-tungstenite` connection.
pub struct TungsteniteConnection {
    stream: WsStream,
    closed: bool,
}

#[async_trait]
impl FeedConnection for TungsteniteConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| TransportError::Send(Box::new(e)))
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.stream
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(|e| TransportError::Send(Box::new(e)))
    }

    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(Message::Text(text)) => Frame::Text(text.as_str().to_owned()),
                Ok(Message::Binary(data)) => Frame::Binary(data.to_vec()),
                Ok(Message::Ping(_)) => Frame::Ping,
                Ok(Message::Pong(_)) => Frame::Pong,
                Ok(Message::Close(close)) => {
                    Frame::Close(close.map(|frame| frame.reason.as_str().to_owned()))
                }
                Ok(Message::Frame(_)) => continue,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None;
                }
                Err(e) => return Some(Err(TransportError::Receive(Box::new(e)))),
            };
            return Some(Ok(frame));
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.close(None).await {
            tracing::trace!(error = %e, "Error while closing WebSocket");
        }
    }
}
