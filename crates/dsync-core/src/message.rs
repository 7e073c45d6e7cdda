//! Wire messages exchanged with the synchronization peer.
//!
//! ```text
//! client -> server  {"msgType":"add",   "id", "clientId", "content"}
//! client -> server  {"msgType":"patch", "id", "clientId", "edits":[Edit]}
//! server -> client  any object with an "id", decoded as a PatchMessage
//! ```

use crate::document::{Document, DocumentId};
use serde::{Deserialize, Serialize};

/// An atomic set of diffs paired with the versions it was computed against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edit<D> {
    pub client_version: u64,
    pub server_version: u64,
    /// Reserved. Carried on the wire, never computed or verified.
    #[serde(default)]
    pub checksum: String,
    pub diffs: Vec<D>,
}

impl<D> Edit<D> {
    pub fn new(client_version: u64, server_version: u64, diffs: Vec<D>) -> Self {
        Self {
            client_version,
            server_version,
            checksum: String::new(),
            diffs,
        }
    }
}

/// A batch of edits for one document.
///
/// Inbound payloads only need an `id`; a missing `clientId` or `edits`
/// decodes as empty.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchMessage<D> {
    pub id: DocumentId,
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "Vec::new")]
    pub edits: Vec<Edit<D>>,
}

impl<D> PatchMessage<D> {
    /// Total number of diff operations across all edits.
    pub fn diff_count(&self) -> usize {
        self.edits.iter().map(|e| e.diffs.len()).sum()
    }
}

/// Outbound message, tagged by `msgType`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msgType", rename_all = "lowercase")]
pub enum Message<C, D> {
    /// Register a document with the peer.
    Add(Document<C>),
    /// Send edits for a registered document.
    Patch(PatchMessage<D>),
}

impl<C, D> Message<C, D> {
    pub fn id(&self) -> &DocumentId {
        match self {
            Message::Add(doc) => &doc.id,
            Message::Patch(msg) => &msg.id,
        }
    }
}
