//! Documents and their shadows.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a synchronized document.
///
/// Peers may address documents by number or by string; the id keeps the
/// kind it arrived with so it round-trips unchanged on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentId {
    Number(u64),
    Text(String),
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentId::Number(n) => write!(f, "{}", n),
            DocumentId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<u64> for DocumentId {
    fn from(id: u64) -> Self {
        DocumentId::Number(id)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        DocumentId::Text(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        DocumentId::Text(id)
    }
}

/// A document owned by the application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document<C> {
    pub id: DocumentId,
    pub client_id: String,
    pub content: C,
}

impl<C> Document<C> {
    pub fn new(id: impl Into<DocumentId>, client_id: impl Into<String>, content: C) -> Self {
        Self {
            id: id.into(),
            client_id: client_id.into(),
            content,
        }
    }
}

/// The last state known to be synchronized with the remote peer.
///
/// `client_version` counts local diffs sent, `server_version` counts remote
/// edits applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shadow<C> {
    pub id: DocumentId,
    pub client_id: String,
    pub content: C,
    pub client_version: u64,
    pub server_version: u64,
}

impl<C: Clone> Shadow<C> {
    /// A fresh shadow at version (0, 0) mirroring `doc`.
    pub fn from_document(doc: &Document<C>) -> Self {
        Self {
            id: doc.id.clone(),
            client_id: doc.client_id.clone(),
            content: doc.content.clone(),
            client_version: 0,
            server_version: 0,
        }
    }
}
