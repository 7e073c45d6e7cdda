//! WebSocket transport over `tokio-tungstenite`.

use crate::network::{Connector, Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by a WebSocket connection.
pub struct WebSocketTransport {
    ws: WsStream,
}

impl WebSocketTransport {
    /// Connect to a `ws://` or `wss://` URL.
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| TransportError::ConnectionFailed(format!("invalid url {}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(TransportError::ConnectionFailed(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        Ok(Self { ws })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.ws
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        loop {
            let event = match self.ws.next().await? {
                Ok(Message::Text(text)) => TransportEvent::Message(text.to_string()),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => TransportEvent::Message(text),
                    Err(_) => {
                        debug!(len = data.len(), "skipping non-utf8 binary frame");
                        continue;
                    }
                },
                Ok(Message::Close(_)) => TransportEvent::Close,
                // Control frames are answered by tungstenite itself.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Err(e) => TransportEvent::Error(e.to_string()),
            };
            return Some(event);
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.ws
            .close(None)
            .await
            .map_err(|e| TransportError::Other(e.to_string()))
    }
}

/// Connector opening [`WebSocketTransport`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self, url: &str) -> Result<Self::Transport, TransportError> {
        WebSocketTransport::connect(url).await
    }
}
