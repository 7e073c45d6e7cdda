//! DSync SDK - Differential synchronization client
//!
//! Keeps local documents convergent with a remote peer over a single
//! message channel, with offline queueing and recovery from lost or
//! duplicated edits.
//!
//! # Quick Start
//!
//! ```rust
//! use dsync_core::{Document, DocumentId};
//! use dsync_sdk::{memory_network, ClientConfigBuilder, SyncClient};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let (connector, _listener) = memory_network();
//! let config = ClientConfigBuilder::new()
//!     .server_url("mem://sync")
//!     .on_sync(|doc| println!("{} updated: {}", doc.id, doc.content))
//!     .build();
//! let mut client = SyncClient::new(config, connector).unwrap();
//! client.connect().await.unwrap();
//!
//! // Register a document, then stage an edit on its shadow and sync it.
//! let id = DocumentId::from("todo");
//! client
//!     .add_document(Document::new(id.clone(), client.client_id(), json!({ "items": [] })))
//!     .await
//!     .unwrap();
//! client.shadow_mut(&id).unwrap().content = json!({ "items": ["milk"] });
//! client.sync(&id).await.unwrap();
//! # });
//! ```
//!
//! # Architecture
//!
//! - [`client`] - The [`SyncClient`] connection and message flow
//! - [`config`] - Client configuration and hooks
//! - [`queue`] - Offline send queue with edit coalescing
//! - [`network`] - Transport abstractions and an in-memory network
//! - `websocket` - WebSocket transport (feature `websocket`)
//! - [`error`] - Error types

pub mod client;
pub mod config;
pub mod error;
pub mod network;
pub mod queue;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use client::{ConnectionState, SyncClient};
pub use config::{ClientConfig, ClientConfigBuilder, ClientHooks};
pub use error::{Result, SdkError};
pub use network::{
    memory_network, Connector, MemoryConnector, MemoryListener, MemoryPeer, MemoryTransport,
    Transport, TransportError, TransportEvent,
};
pub use queue::SendQueue;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};

pub use dsync_core::{
    ApplyError, Document, DocumentId, Edit, JsonPatchStrategy, Message, PatchMessage,
    PatchOperation, Shadow, Strategy, TextDiff, TextDiffStrategy,
};
pub use dsync_engine::{DocState, PatchOutcome, RegistrationPolicy, SyncEngine};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::SyncClient;
    pub use crate::config::{ClientConfig, ClientConfigBuilder};
    pub use crate::error::SdkError;
    pub use crate::network::{memory_network, Connector, Transport};
    pub use dsync_core::{Document, DocumentId, JsonPatchStrategy, Strategy, TextDiffStrategy};
}
