//! The synchronization client.

use crate::config::{ClientConfig, ClientHooks};
use crate::error::{Result, SdkError};
use crate::network::{Connector, Transport, TransportError, TransportEvent};
use crate::queue::SendQueue;
use dsync_core::{Document, DocumentId, JsonPatchStrategy, Message, PatchMessage, Shadow, Strategy};
use dsync_engine::{EngineError, PatchOutcome, SyncEngine};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Connection state of a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
}

/// Keeps a set of documents convergent with one remote peer.
///
/// The client owns a [`SyncEngine`], one connection obtained from its
/// [`Connector`], and a [`SendQueue`] holding work produced while the
/// connection is down. It is driven by the caller: local changes go through
/// [`add_document`](Self::add_document) and [`sync`](Self::sync), inbound
/// traffic through [`next_event`](Self::next_event) or [`run`](Self::run).
/// It never reconnects on its own.
///
/// # Example
///
/// ```rust
/// use dsync_core::Document;
/// use dsync_sdk::{memory_network, ClientConfigBuilder, SyncClient};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let (connector, mut listener) = memory_network();
/// let config = ClientConfigBuilder::new()
///     .server_url("mem://sync")
///     .client_id("client-1")
///     .build();
/// let mut client = SyncClient::new(config, connector).unwrap();
///
/// // Offline work is queued...
/// let doc = Document::new("notes", "client-1", json!({ "title": "draft" }));
/// client.add_document(doc).await.unwrap();
/// assert_eq!(client.queue().len(), 1);
///
/// // ...and delivered on connect.
/// client.connect().await.unwrap();
/// let mut peer = listener.try_accept().unwrap();
/// assert_eq!(peer.drain().len(), 1);
/// # });
/// ```
pub struct SyncClient<C: Connector, S: Strategy = JsonPatchStrategy> {
    server_url: String,
    client_id: String,
    connector: C,
    transport: Option<C::Transport>,
    state: ConnectionState,
    engine: SyncEngine<S>,
    queue: SendQueue<S::Content, S::Diff>,
    hooks: ClientHooks<S::Content>,
}

impl<C: Connector, S: Strategy> SyncClient<C, S> {
    /// Create a client. Fails immediately when no server URL is configured;
    /// no connection is attempted here.
    pub fn new(config: ClientConfig<S>, connector: C) -> Result<Self> {
        let server_url = match config.server_url {
            Some(url) if !url.trim().is_empty() => url,
            _ => return Err(SdkError::MissingServerUrl),
        };

        Ok(Self {
            server_url,
            client_id: config.client_id,
            connector,
            transport: None,
            state: ConnectionState::Disconnected,
            engine: SyncEngine::with_policy(config.strategy, config.registration),
            queue: SendQueue::new(),
            hooks: config.hooks,
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn engine(&self) -> &SyncEngine<S> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SyncEngine<S> {
        &mut self.engine
    }

    pub fn queue(&self) -> &SendQueue<S::Content, S::Diff> {
        &self.queue
    }

    pub fn document(&self, id: &DocumentId) -> Option<&Document<S::Content>> {
        self.engine.get_document(id)
    }

    /// The live shadow of a document; stage local edits here before
    /// calling [`sync`](Self::sync).
    pub fn shadow_mut(&mut self, id: &DocumentId) -> Option<&mut Shadow<S::Content>> {
        self.engine.shadow_mut(id)
    }

    /// Open the connection and deliver everything queued.
    ///
    /// Calling this while open does nothing; calling it after a close or
    /// error reconnects.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Open {
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        info!(url = %self.server_url, client_id = %self.client_id, "connecting");

        match self.connector.connect(&self.server_url).await {
            Ok(transport) => {
                self.transport = Some(transport);
                self.state = ConnectionState::Open;
                info!(url = %self.server_url, queued = self.queue.len(), "connection open");
                self.hooks.open();
                self.flush().await
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                warn!(url = %self.server_url, error = %e, "connection failed");
                let err = SdkError::from(e);
                self.hooks.error(&err);
                Err(err)
            }
        }
    }

    /// Close the connection. Queued work is kept for the next `connect`.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!(error = %e, "error while closing transport");
            }
        }
        let was_connected = self.state != ConnectionState::Disconnected;
        self.state = ConnectionState::Disconnected;
        if was_connected {
            info!(url = %self.server_url, "disconnected");
            self.hooks.close();
        }
        Ok(())
    }

    /// Register a document locally and with the peer.
    pub async fn add_document(&mut self, doc: Document<S::Content>) -> Result<()> {
        self.engine.add_document(doc.clone())?;
        self.send_or_queue(Message::Add(doc)).await
    }

    /// Send the edit staged in a document's shadow.
    ///
    /// The diff runs from the stored document to the shadow; the stored
    /// document then takes on the shadow's content.
    pub async fn sync(&mut self, id: &DocumentId) -> Result<()> {
        let doc = self
            .engine
            .get_document(id)
            .cloned()
            .ok_or_else(|| EngineError::DocumentNotFound(id.clone()))?;

        let msg = self.engine.diff(&doc)?;
        if let Some(shadow) = self.engine.get_shadow(id).cloned() {
            if !self.engine.patch_document(&shadow)? {
                warn!(doc_id = %id, "document did not take the staged edit");
            }
        }
        self.send_edits(msg).await
    }

    /// Ask for the peer's latest state of a document.
    ///
    /// With an empty queue this sends a fresh diff; otherwise it delivers
    /// the queue instead, so a new diff never overtakes queued edits.
    pub async fn fetch(&mut self, id: &DocumentId) -> Result<()> {
        if self.queue.is_empty() {
            self.sync(id).await
        } else {
            self.flush().await
        }
    }

    /// Wait for the next transport event and handle it.
    ///
    /// Returns `None` when there is no open connection.
    pub async fn next_event(&mut self) -> Option<Result<()>> {
        let event = match self.transport.as_mut() {
            Some(transport) => transport.recv().await.unwrap_or(TransportEvent::Close),
            None => return None,
        };
        Some(self.handle_event(event).await)
    }

    /// Handle events until the connection closes.
    pub async fn run(&mut self) -> Result<()> {
        while let Some(result) = self.next_event().await {
            result?;
        }
        Ok(())
    }

    /// Handle one transport event.
    pub async fn handle_event(&mut self, event: TransportEvent) -> Result<()> {
        match event {
            TransportEvent::Message(text) => self.handle_message(&text).await,
            TransportEvent::Error(e) => {
                self.drop_connection();
                warn!(url = %self.server_url, error = %e, "transport error");
                self.hooks
                    .error(&SdkError::Transport(TransportError::Other(e)));
                Ok(())
            }
            TransportEvent::Close => {
                self.drop_connection();
                info!(url = %self.server_url, "connection closed by peer");
                self.hooks.close();
                Ok(())
            }
        }
    }

    /// Apply an inbound payload.
    ///
    /// Payloads that do not decode, or name an unknown document, are
    /// dropped without surfacing an error.
    pub async fn handle_message(&mut self, text: &str) -> Result<()> {
        let msg: PatchMessage<S::Diff> = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %e, "ignoring malformed payload");
                return Ok(());
            }
        };

        let outcome = match self.engine.patch_shadow(&msg) {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(error = %e, "ignoring payload for unregistered document");
                return Ok(());
            }
        };

        match outcome {
            PatchOutcome::VersionGap { expected, received } => {
                self.hooks.error(&SdkError::VersionGap {
                    id: msg.id.clone(),
                    expected,
                    received,
                });
                self.resync(&msg.id).await
            }
            PatchOutcome::Rejected { reason } => {
                self.hooks.error(&SdkError::PatchRejected {
                    id: msg.id.clone(),
                    reason,
                });
                Ok(())
            }
            _ => {
                if let Some(doc) = self.engine.get_document(&msg.id) {
                    self.hooks.sync(doc);
                }
                Ok(())
            }
        }
    }

    /// Start a document over: reset its shadow and register it again.
    /// Queued work for the document is dropped; the fresh registration
    /// replaces it.
    pub async fn resync(&mut self, id: &DocumentId) -> Result<()> {
        self.engine.reset(id)?;
        let dropped = self.queue.remove_document(id);
        info!(doc_id = %id, dropped, "resyncing document");

        let doc = self
            .engine
            .get_document(id)
            .cloned()
            .ok_or_else(|| EngineError::DocumentNotFound(id.clone()))?;
        self.send_or_queue(Message::Add(doc)).await
    }

    async fn send_edits(&mut self, msg: PatchMessage<S::Diff>) -> Result<()> {
        if self.is_open() {
            return self.send_or_queue(Message::Patch(msg)).await;
        }

        let id = msg.id.clone();
        let coalesced = self.queue.push_patch(msg, self.engine.strategy());
        debug!(doc_id = %id, coalesced, queued = self.queue.len(), "edit queued");
        Ok(())
    }

    async fn send_or_queue(&mut self, message: Message<S::Content, S::Diff>) -> Result<()> {
        if !self.is_open() {
            debug!(doc_id = %message.id(), "offline, message queued");
            self.enqueue(message);
            return Ok(());
        }

        if let Err(e) = self.transmit(&message).await {
            self.enqueue(message);
            return Err(self.fail(e));
        }
        Ok(())
    }

    /// Deliver the queue in order. Stops at the first failed send, keeping
    /// the failed entry at the head.
    async fn flush(&mut self) -> Result<()> {
        if !self.is_open() {
            return Ok(());
        }

        let mut sent = 0;
        while let Some(message) = self.queue.pop_front() {
            if let Err(e) = self.transmit(&message).await {
                self.queue.push_front(message);
                return Err(self.fail(e));
            }
            sent += 1;
        }
        if sent > 0 {
            debug!(sent, "queue flushed");
        }
        Ok(())
    }

    async fn transmit(&mut self, message: &Message<S::Content, S::Diff>) -> Result<()> {
        let text = serde_json::to_string(message)?;
        let transport = self.transport.as_mut().ok_or(TransportError::Closed)?;
        transport.send(text).await?;
        Ok(())
    }

    fn enqueue(&mut self, message: Message<S::Content, S::Diff>) {
        match message {
            Message::Patch(msg) => {
                self.queue.push_patch(msg, self.engine.strategy());
            }
            add => self.queue.push(add),
        }
    }

    fn drop_connection(&mut self) {
        self.transport = None;
        self.state = ConnectionState::Disconnected;
    }

    fn fail(&mut self, err: SdkError) -> SdkError {
        if matches!(err, SdkError::Transport(_)) {
            self.drop_connection();
            warn!(url = %self.server_url, error = %err, "send failed, connection dropped");
        }
        self.hooks.error(&err);
        err
    }
}
