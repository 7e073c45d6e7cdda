//! Transport abstractions for the sync connection.
//!
//! A [`Connector`] opens one duplex, ordered text channel to the peer; a
//! successful `connect` is the "open" event. The resulting [`Transport`]
//! sends text frames and yields [`TransportEvent`]s until it closes.
//! Reconnecting means calling the connector again.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Something that happened on an open connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text payload from the peer.
    Message(String),
    /// The connection failed; it is no longer usable.
    Error(String),
    /// The peer closed the connection.
    Close,
}

/// Transport error type.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Connection closed")]
    Closed,
    #[error("{0}")]
    Other(String),
}

/// One open connection.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a text frame. Frames arrive in the order they were sent.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Wait for the next event. `None` means the connection is gone.
    async fn recv(&mut self) -> Option<TransportEvent>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens connections to a URL.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    async fn connect(&self, url: &str) -> Result<Self::Transport, TransportError>;
}

/// Client end of an in-memory connection.
pub struct MemoryTransport {
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedReceiver<TransportEvent>,
    closed: bool,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.outgoing
            .send(text)
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        if self.closed {
            return None;
        }
        self.incoming.recv().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.incoming.close();
        Ok(())
    }
}

/// Server end of an in-memory connection, handed out by [`MemoryListener`].
pub struct MemoryPeer {
    url: String,
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<TransportEvent>,
}

impl MemoryPeer {
    /// The URL the client connected to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Next frame sent by the client, `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.incoming.recv().await
    }

    /// Next frame if one is already buffered.
    pub fn try_recv(&mut self) -> Option<String> {
        self.incoming.try_recv().ok()
    }

    /// Every frame buffered so far.
    pub fn drain(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    pub fn send(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.push(TransportEvent::Message(text.into()))
    }

    pub fn send_error(&self, error: impl Into<String>) -> Result<(), TransportError> {
        self.push(TransportEvent::Error(error.into()))
    }

    /// Close the connection from the server side.
    pub fn close(self) {
        let _ = self.outgoing.send(TransportEvent::Close);
    }

    fn push(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.outgoing
            .send(event)
            .map_err(|_| TransportError::Closed)
    }
}

/// Connects clients to a [`MemoryListener`].
#[derive(Clone)]
pub struct MemoryConnector {
    online: Arc<RwLock<bool>>,
    accept: mpsc::UnboundedSender<MemoryPeer>,
}

/// Accepts in-memory connections. Used for tests and simulation.
pub struct MemoryListener {
    online: Arc<RwLock<bool>>,
    accept: mpsc::UnboundedReceiver<MemoryPeer>,
}

/// Create a connected connector/listener pair. The listener starts online.
pub fn memory_network() -> (MemoryConnector, MemoryListener) {
    let online = Arc::new(RwLock::new(true));
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MemoryConnector {
            online: online.clone(),
            accept: tx,
        },
        MemoryListener { online, accept: rx },
    )
}

impl MemoryListener {
    /// While offline, every connection attempt is refused.
    pub fn set_online(&self, online: bool) {
        *self.online.write() = online;
    }

    pub fn is_online(&self) -> bool {
        *self.online.read()
    }

    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept.recv().await
    }

    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.accept.try_recv().ok()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Transport = MemoryTransport;

    async fn connect(&self, url: &str) -> Result<MemoryTransport, TransportError> {
        if !*self.online.read() {
            return Err(TransportError::ConnectionFailed(format!(
                "{} is unreachable",
                url
            )));
        }

        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            url: url.to_string(),
            incoming: from_client,
            outgoing: to_client,
        };
        self.accept
            .send(peer)
            .map_err(|_| TransportError::ConnectionFailed("listener dropped".to_string()))?;

        Ok(MemoryTransport {
            outgoing: to_server,
            incoming: from_server,
            closed: false,
        })
    }
}
