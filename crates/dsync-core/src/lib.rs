//! # dsync-core
//!
//! Core types for differential synchronization.
//!
//! This crate provides:
//! - The document model: [`Document`], [`Shadow`] and their identifiers
//! - The wire format: [`Edit`], [`PatchMessage`] and the tagged [`Message`]
//! - The [`Strategy`] contract for computing and applying diffs
//! - Two strategies: structured JSON patches and character-level text diffs
//! - A name-keyed [`StrategyRegistry`] for runtime selection
//!
//! ## The strategy contract
//!
//! ```text
//! diff(a, a)              == []
//! apply(a, diff(a, b))    == Ok(b)
//! apply(a, garbage)       == Err(..)   // never panics, caller must not commit
//! ```
//!
//! ## Example
//!
//! ```rust
//! use dsync_core::{JsonPatchStrategy, Strategy};
//! use serde_json::json;
//!
//! let strategy = JsonPatchStrategy;
//! let before = json!({ "name": "Fletch" });
//! let after = json!({ "name": "Mr.Poon" });
//!
//! let diffs = strategy.diff(&before, &after);
//! assert_eq!(strategy.apply(&before, &diffs).unwrap(), after);
//! ```

pub mod document;
pub mod error;
pub mod json_patch;
pub mod message;
pub mod registry;
pub mod strategy;
pub mod text_diff;

pub use document::{Document, DocumentId, Shadow};
pub use error::ApplyError;
pub use json_patch::{JsonPatchStrategy, PatchOperation};
pub use message::{Edit, Message, PatchMessage};
pub use registry::{DynStrategy, NamedStrategy, StrategyRegistry};
pub use strategy::Strategy;
pub use text_diff::{Operation, TextDiff, TextDiffStrategy};
