//! The pluggable diff/patch contract.

use crate::error::ApplyError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// A diff/patch algorithm.
///
/// Implementations must satisfy:
/// - `diff(a, a)` is empty
/// - `apply(a, &diff(a, b)) == Ok(b)`
/// - `apply` reports inapplicable diffs as `Err` and never panics
pub trait Strategy: Send + Sync + 'static {
    /// The document content this strategy operates on.
    type Content: Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;
    /// A single diff operation.
    type Diff: Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Registry name of this strategy.
    fn name(&self) -> &str;

    /// Ordered operations transforming `before` into `after`.
    fn diff(&self, before: &Self::Content, after: &Self::Content) -> Vec<Self::Diff>;

    /// Apply `diffs` to `content`, all or nothing.
    fn apply(
        &self,
        content: &Self::Content,
        diffs: &[Self::Diff],
    ) -> Result<Self::Content, ApplyError>;

    /// Merge two consecutive diff lists into one list with the combined
    /// effect. Used to coalesce queued edits.
    fn compose(&self, mut first: Vec<Self::Diff>, second: Vec<Self::Diff>) -> Vec<Self::Diff> {
        first.extend(second);
        first
    }
}
