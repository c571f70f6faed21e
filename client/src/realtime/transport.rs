//! Message transports for the realtime channel.
//!
//! The channel speaks STOMP text frames over any [`Transport`]. Production
//! uses [`WsTransport`]; tests use the in-memory transport from `mocks`.

use super::ChannelError;
use futures::{SinkExt, StreamExt};
use std::future::Future;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

/// Opens connections.
pub trait Transport: Send + Sync + 'static {
    /// An open connection.
    type Connection: Connection;

    /// Open a connection to `url`.
    fn connect(&self, url: &Url) -> impl Future<Output = Result<Self::Connection, ChannelError>> + Send;
}

/// A bidirectional text connection.
pub trait Connection: Send + 'static {
    /// Send one text message.
    fn send(&mut self, text: String) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Next text message; `None` once the peer closed the connection.
    fn recv(&mut self) -> impl Future<Output = Option<Result<String, ChannelError>>> + Send;

    /// Close the connection.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// WebSocket transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl Transport for WsTransport {
    type Connection = WsConnection;

    async fn connect(&self, url: &Url) -> Result<WsConnection, ChannelError> {
        let (stream, response) = connect_async(url.as_str())
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        tracing::debug!(status = response.status().as_u16(), "WebSocket handshake complete");
        Ok(WsConnection { stream })
    }
}

/// An open WebSocket.
pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Connection for WsConnection {
    async fn send(&mut self, text: String) -> Result<(), ChannelError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ChannelError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => tracing::warn!("Dropping non-UTF-8 binary message"),
                },
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "WebSocket closed by server");
                    return None;
                },
                // Pings are answered by tungstenite itself
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {},
                Err(e) => return Some(Err(ChannelError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(error) = self.stream.close(None).await {
            tracing::debug!(%error, "WebSocket close failed");
        }
    }
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection").finish_non_exhaustive()
    }
}
