//! Error types for diff application.

use thiserror::Error;

/// Why a list of diffs could not be applied to a content value.
///
/// Strategies report failure through this type instead of panicking; the
/// caller must not commit anything when it sees one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("Invalid JSON pointer: {0}")]
    InvalidPointer(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Invalid array index {index} at {path}")]
    InvalidIndex { path: String, index: String },

    #[error("Cannot {op} at {path}: {reason}")]
    InvalidOperation {
        op: &'static str,
        path: String,
        reason: String,
    },

    #[error("Test failed at {0}")]
    TestFailed(String),

    #[error("Text mismatch at offset {offset}: expected {expected:?}")]
    TextMismatch { offset: usize, expected: String },

    #[error("{0} characters of source text left unconsumed")]
    TrailingContent(usize),

    #[error("Cannot decode value: {0}")]
    Decode(String),

    #[error("Strategy produced no diff between differing values")]
    Undiffable,
}

impl From<serde_json::Error> for ApplyError {
    fn from(err: serde_json::Error) -> Self {
        ApplyError::Decode(err.to_string())
    }
}
