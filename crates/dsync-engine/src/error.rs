//! Error types for the synchronization engine.

use dsync_core::DocumentId;
use thiserror::Error;

/// Errors returned by [`SyncEngine`](crate::SyncEngine) operations.
///
/// Inapplicable diffs and version mismatches are not errors; they are
/// reported through [`PatchOutcome`](crate::PatchOutcome).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Document not found: {0}")]
    DocumentNotFound(DocumentId),

    #[error("Document already registered: {0}")]
    AlreadyRegistered(DocumentId),

    #[error("Strategy cannot diff the content of {0}")]
    Undiffable(DocumentId),
}

pub type Result<T> = std::result::Result<T, EngineError>;
