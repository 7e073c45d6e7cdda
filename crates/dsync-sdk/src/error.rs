//! Error types for the SDK.

use crate::network::TransportError;
use dsync_core::{ApplyError, DocumentId};
use dsync_engine::EngineError;
use thiserror::Error;

/// Error type for SDK operations.
#[derive(Error, Debug, Clone)]
pub enum SdkError {
    /// No server URL was configured.
    #[error("serverUrl is required")]
    MissingServerUrl,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An inbound edit could not be applied.
    #[error("Edit rejected for document {id}: {reason}")]
    PatchRejected { id: DocumentId, reason: ApplyError },

    /// An inbound edit skipped server versions; the document is resynced.
    #[error("Version gap on document {id}: expected {expected}, received {received}")]
    VersionGap {
        id: DocumentId,
        expected: u64,
        received: u64,
    },
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Serialization(err.to_string())
    }
}

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;
