//! # dsync-engine
//!
//! Client half of differential synchronization.
//!
//! For every registered document the engine keeps three things:
//!
//! ```text
//! document   authoritative working copy, owned by the application
//! shadow     last synchronized content + (client_version, server_version)
//! backup     the last committed shadow, used to roll back
//! ```
//!
//! ## Protocol
//!
//! ```text
//! local edit:    stage content in the shadow
//!                diff(document -> shadow), client_version += 1, save
//!
//! remote edit:   edit.server_version == shadow.server_version
//!                    apply to shadow, server_version += 1, save,
//!                    bring document up to the shadow
//!                edit.server_version <  shadow.server_version
//!                    already seen: restore shadow from backup
//!                edit.server_version >  shadow.server_version
//!                    gap: report, needs a full resync
//! ```
//!
//! ## Example
//!
//! ```rust
//! use dsync_core::{Document, JsonPatchStrategy};
//! use dsync_engine::SyncEngine;
//! use serde_json::json;
//!
//! let mut engine = SyncEngine::new(JsonPatchStrategy);
//! let doc = Document::new(1234, "c1", json!({ "name": "Fletch" }));
//! engine.add_document(doc.clone()).unwrap();
//!
//! engine.shadow_mut(&doc.id).unwrap().content["name"] = json!("Mr.Poon");
//! let msg = engine.diff(&doc).unwrap();
//! assert_eq!(msg.edits[0].diffs.len(), 1);
//! ```

pub mod engine;
pub mod error;

pub use engine::{DocState, PatchOutcome, RegistrationPolicy, SyncEngine};
pub use error::{EngineError, Result};
