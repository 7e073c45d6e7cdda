//! Per-document shadow state and the patch/rollback protocol.

use crate::error::{EngineError, Result};
use dsync_core::{ApplyError, Document, DocumentId, Edit, PatchMessage, Shadow, Strategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// What `add_document` does when the id is already registered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationPolicy {
    /// Replace the document and reset its shadow to (0, 0).
    #[default]
    Overwrite,
    /// Refuse with [`EngineError::AlreadyRegistered`].
    Reject,
}

/// Synchronization state of a single document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocState {
    /// Nothing in flight.
    Clean,
    /// A local diff is being computed.
    Diffing,
    /// A local diff was handed out and no remote edit has arrived since.
    AwaitingAck,
    /// A stale edit is being rolled back. Always left before returning.
    Recovering,
}

/// Result of feeding a [`PatchMessage`] to [`SyncEngine::patch_shadow`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatchOutcome {
    /// One or more edits were applied to the shadow and the document.
    Applied { server_version: u64, edits: usize },
    /// Every edit had already been seen; the shadow was restored from the
    /// backup.
    Restored { server_version: u64 },
    /// The message carried no edits.
    Unchanged,
    /// An edit could not be applied. Neither shadow nor document changed
    /// for that edit.
    Rejected { reason: ApplyError },
    /// An edit is ahead of the shadow; a full resync is required.
    VersionGap { expected: u64, received: u64 },
}

impl PatchOutcome {
    /// Whether the shadow is consistent with the peer afterwards.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            PatchOutcome::Applied { .. } | PatchOutcome::Restored { .. } | PatchOutcome::Unchanged
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            PatchOutcome::Applied { .. } => "applied",
            PatchOutcome::Restored { .. } => "restored",
            PatchOutcome::Unchanged => "unchanged",
            PatchOutcome::Rejected { .. } => "rejected",
            PatchOutcome::VersionGap { .. } => "versionGap",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry<C> {
    document: Document<C>,
    shadow: Shadow<C>,
    backup: Option<Shadow<C>>,
    state: DocState,
}

impl<C: Clone> Entry<C> {
    fn new(document: Document<C>) -> Self {
        let shadow = Shadow::from_document(&document);
        let mut entry = Self {
            document,
            shadow: shadow.clone(),
            backup: None,
            state: DocState::Clean,
        };
        entry.save_shadow(shadow);
        entry
    }

    /// Commit `shadow` and snapshot it as the backup.
    ///
    /// The backup is always the last committed shadow, so a restore drops
    /// anything staged in the live shadow since then.
    fn save_shadow(&mut self, shadow: Shadow<C>) {
        self.backup = Some(shadow.clone());
        self.shadow = shadow;
    }

    fn restore_backup(&mut self) {
        if let Some(backup) = &self.backup {
            self.shadow = backup.clone();
        }
    }

    fn leave_recovery(&mut self) {
        if self.state == DocState::Recovering {
            self.state = DocState::Clean;
        }
    }
}

/// The synchronization engine.
///
/// Owns one document, one shadow and at most one backup per document id.
/// The engine never talks to the network; it produces [`PatchMessage`]s
/// and consumes them.
#[derive(Debug)]
pub struct SyncEngine<S: Strategy> {
    strategy: S,
    policy: RegistrationPolicy,
    entries: HashMap<DocumentId, Entry<S::Content>>,
}

impl<S: Strategy> SyncEngine<S> {
    pub fn new(strategy: S) -> Self {
        Self::with_policy(strategy, RegistrationPolicy::default())
    }

    pub fn with_policy(strategy: S, policy: RegistrationPolicy) -> Self {
        Self {
            strategy,
            policy,
            entries: HashMap::new(),
        }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn policy(&self) -> RegistrationPolicy {
        self.policy
    }

    /// Register `doc` and create its shadow at version (0, 0).
    pub fn add_document(&mut self, doc: Document<S::Content>) -> Result<()> {
        if self.entries.contains_key(&doc.id) {
            match self.policy {
                RegistrationPolicy::Reject => {
                    return Err(EngineError::AlreadyRegistered(doc.id));
                }
                RegistrationPolicy::Overwrite => {
                    info!(doc_id = %doc.id, "re-registering document, shadow reset");
                }
            }
        } else {
            debug!(doc_id = %doc.id, client_id = %doc.client_id, "document registered");
        }

        self.entries.insert(doc.id.clone(), Entry::new(doc));
        Ok(())
    }

    /// Deregister a document, dropping its shadow and backup.
    pub fn remove_document(&mut self, id: &DocumentId) -> Option<Document<S::Content>> {
        let removed = self.entries.remove(id).map(|entry| entry.document);
        if removed.is_some() {
            debug!(doc_id = %id, "document removed");
        }
        removed
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn document_ids(&self) -> impl Iterator<Item = &DocumentId> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_document(&self, id: &DocumentId) -> Option<&Document<S::Content>> {
        self.entries.get(id).map(|entry| &entry.document)
    }

    pub fn get_shadow(&self, id: &DocumentId) -> Option<&Shadow<S::Content>> {
        self.entries.get(id).map(|entry| &entry.shadow)
    }

    /// The live shadow. Mutate its content to stage a local edit, then call
    /// [`diff`](Self::diff).
    pub fn shadow_mut(&mut self, id: &DocumentId) -> Option<&mut Shadow<S::Content>> {
        self.entries.get_mut(id).map(|entry| &mut entry.shadow)
    }

    pub fn backup(&self, id: &DocumentId) -> Option<&Shadow<S::Content>> {
        self.entries.get(id).and_then(|entry| entry.backup.as_ref())
    }

    pub fn state(&self, id: &DocumentId) -> Option<DocState> {
        self.entries.get(id).map(|entry| entry.state)
    }

    /// Compute the edit from `doc`'s content to the staged shadow content.
    ///
    /// The edit carries the shadow's versions from before the call; the
    /// shadow's `client_version` is then incremented and saved. Nothing is
    /// transmitted.
    ///
    /// Fails with [`EngineError::Undiffable`] when the contents differ but
    /// the strategy yields no operations; the shadow is left as staged.
    pub fn diff(&mut self, doc: &Document<S::Content>) -> Result<PatchMessage<S::Diff>> {
        let strategy = &self.strategy;
        let entry = self
            .entries
            .get_mut(&doc.id)
            .ok_or_else(|| EngineError::DocumentNotFound(doc.id.clone()))?;

        let previous = entry.state;
        entry.state = DocState::Diffing;
        let diffs = strategy.diff(&doc.content, &entry.shadow.content);
        if diffs.is_empty() && doc.content != entry.shadow.content {
            entry.state = previous;
            warn!(doc_id = %doc.id, "strategy produced no diff for changed content");
            return Err(EngineError::Undiffable(doc.id.clone()));
        }
        let edit = Edit::new(
            entry.shadow.client_version,
            entry.shadow.server_version,
            diffs,
        );
        let msg = PatchMessage {
            id: doc.id.clone(),
            client_id: entry.shadow.client_id.clone(),
            edits: vec![edit],
        };

        let mut next = entry.shadow.clone();
        next.client_version += 1;
        entry.save_shadow(next);
        entry.state = DocState::AwaitingAck;

        debug!(
            doc_id = %doc.id,
            diffs = msg.diff_count(),
            client_version = entry.shadow.client_version,
            "local diff computed"
        );
        Ok(msg)
    }

    /// Apply remote edits to the shadow, then to the document.
    ///
    /// Edits are processed in order, each one atomically. Processing stops
    /// at the first edit that is rejected or ahead of the shadow.
    pub fn patch_shadow(&mut self, msg: &PatchMessage<S::Diff>) -> Result<PatchOutcome> {
        let strategy = &self.strategy;
        let entry = self
            .entries
            .get_mut(&msg.id)
            .ok_or_else(|| EngineError::DocumentNotFound(msg.id.clone()))?;

        let mut applied = 0;
        let mut restored = false;

        for edit in &msg.edits {
            let expected = entry.shadow.server_version;
            match edit.server_version.cmp(&expected) {
                Ordering::Less => {
                    entry.state = DocState::Recovering;
                    entry.restore_backup();
                    restored = true;
                    debug!(
                        doc_id = %msg.id,
                        received = edit.server_version,
                        expected,
                        "stale edit, shadow restored from backup"
                    );
                }
                Ordering::Greater => {
                    entry.leave_recovery();
                    warn!(
                        doc_id = %msg.id,
                        received = edit.server_version,
                        expected,
                        "version gap, resync required"
                    );
                    return Ok(PatchOutcome::VersionGap {
                        expected,
                        received: edit.server_version,
                    });
                }
                Ordering::Equal => {
                    let content = match strategy.apply(&entry.shadow.content, &edit.diffs) {
                        Ok(content) => content,
                        Err(reason) => {
                            entry.leave_recovery();
                            warn!(doc_id = %msg.id, %reason, "edit rejected");
                            return Ok(PatchOutcome::Rejected { reason });
                        }
                    };

                    let document = match follow(strategy, &entry.document.content, &content) {
                        Ok(document) => document,
                        Err(reason) => {
                            entry.leave_recovery();
                            warn!(doc_id = %msg.id, %reason, "document could not follow shadow");
                            return Ok(PatchOutcome::Rejected { reason });
                        }
                    };

                    let mut next = entry.shadow.clone();
                    next.content = content;
                    next.server_version += 1;
                    entry.save_shadow(next);
                    entry.document.content = document;
                    applied += 1;
                }
            }
        }

        entry.state = DocState::Clean;
        let server_version = entry.shadow.server_version;

        Ok(if applied > 0 {
            debug!(doc_id = %msg.id, applied, server_version, "remote edits applied");
            PatchOutcome::Applied {
                server_version,
                edits: applied,
            }
        } else if restored {
            PatchOutcome::Restored { server_version }
        } else {
            PatchOutcome::Unchanged
        })
    }

    /// Bring the stored document up to `shadow`'s content.
    ///
    /// Returns `Ok(false)` when the strategy could not produce the update;
    /// the document is left unchanged in that case.
    pub fn patch_document(&mut self, shadow: &Shadow<S::Content>) -> Result<bool> {
        let strategy = &self.strategy;
        let entry = self
            .entries
            .get_mut(&shadow.id)
            .ok_or_else(|| EngineError::DocumentNotFound(shadow.id.clone()))?;

        match follow(strategy, &entry.document.content, &shadow.content) {
            Ok(content) => {
                entry.document.content = content;
                Ok(true)
            }
            Err(reason) => {
                warn!(doc_id = %shadow.id, %reason, "document patch failed");
                Ok(false)
            }
        }
    }

    /// Re-base the shadow on the current document at version (0, 0).
    ///
    /// Used after a version gap, together with re-registering the document
    /// with the peer.
    pub fn reset(&mut self, id: &DocumentId) -> Result<&Shadow<S::Content>> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| EngineError::DocumentNotFound(id.clone()))?;

        let shadow = Shadow::from_document(&entry.document);
        entry.save_shadow(shadow);
        entry.state = DocState::Clean;
        info!(doc_id = %id, "shadow reset for resync");
        Ok(&entry.shadow)
    }
}

/// The document content that takes on `target`, computed through the
/// strategy so a failing apply is reported instead of committed.
fn follow<S: Strategy>(
    strategy: &S,
    current: &S::Content,
    target: &S::Content,
) -> std::result::Result<S::Content, ApplyError> {
    if current == target {
        return Ok(current.clone());
    }
    let diffs = strategy.diff(current, target);
    if diffs.is_empty() {
        return Err(ApplyError::Undiffable);
    }
    strategy.apply(current, &diffs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsync_core::{JsonPatchStrategy, PatchOperation, StrategyRegistry, TextDiffStrategy};
    use serde_json::{json, Value};

    fn fletch() -> Document<Value> {
        Document::new(1234, "c1", json!({"name": "Fletch"}))
    }

    fn server_edit(
        server_version: u64,
        diffs: Vec<PatchOperation>,
    ) -> PatchMessage<PatchOperation> {
        PatchMessage {
            id: DocumentId::from(1234),
            client_id: "c1".to_string(),
            edits: vec![Edit::new(0, server_version, diffs)],
        }
    }

    fn rename(value: &str) -> Vec<PatchOperation> {
        vec![PatchOperation::Replace {
            path: "/name".to_string(),
            value: json!(value),
        }]
    }

    #[test]
    fn test_add_document_creates_shadow() {
        let mut engine = SyncEngine::new(JsonPatchStrategy);
        let doc = fletch();
        engine.add_document(doc.clone()).unwrap();

        assert_eq!(engine.get_document(&doc.id).unwrap().content, doc.content);
        let shadow = engine.get_shadow(&doc.id).unwrap();
        assert_eq!(shadow.client_version, 0);
        assert_eq!(shadow.server_version, 0);
        assert_eq!(engine.backup(&doc.id), Some(shadow));
        assert_eq!(engine.state(&doc.id), Some(DocState::Clean));
    }

    #[test]
    fn test_overwrite_policy_resets_shadow() {
        let mut engine = SyncEngine::new(JsonPatchStrategy);
        let doc = fletch();
        engine.add_document(doc.clone()).unwrap();
        engine.diff(&doc).unwrap();
        assert_eq!(engine.get_shadow(&doc.id).unwrap().client_version, 1);

        let replacement = Document::new(1234, "c1", json!({"name": "Gordon"}));
        engine.add_document(replacement.clone()).unwrap();

        assert_eq!(engine.len(), 1);
        assert_eq!(engine.get_document(&doc.id), Some(&replacement));
        assert_eq!(engine.get_shadow(&doc.id).unwrap().client_version, 0);
    }

    #[test]
    fn test_reject_policy() {
        let mut engine = SyncEngine::with_policy(JsonPatchStrategy, RegistrationPolicy::Reject);
        engine.add_document(fletch()).unwrap();

        let err = engine.add_document(fletch()).unwrap_err();
        assert_eq!(err, EngineError::AlreadyRegistered(DocumentId::from(1234)));
    }

    #[test]
    fn test_diff_stages_from_shadow() {
        let mut engine = SyncEngine::new(JsonPatchStrategy);
        let doc = fletch();
        engine.add_document(doc.clone()).unwrap();

        engine.shadow_mut(&doc.id).unwrap().content = json!({"name": "Mr.Poon"});
        let msg = engine.diff(&doc).unwrap();

        assert_eq!(msg.id, doc.id);
        assert_eq!(msg.client_id, "c1");
        assert_eq!(msg.edits.len(), 1);
        assert_eq!(msg.edits[0].client_version, 0);
        assert_eq!(msg.edits[0].server_version, 0);
        assert_eq!(msg.edits[0].diffs, rename("Mr.Poon"));

        let shadow = engine.get_shadow(&doc.id).unwrap().clone();
        assert_eq!(shadow.client_version, 1);
        assert_eq!(engine.backup(&doc.id), Some(&shadow));
        assert_eq!(engine.state(&doc.id), Some(DocState::AwaitingAck));

        assert!(engine.patch_document(&shadow).unwrap());
        assert_eq!(
            engine.get_document(&doc.id).unwrap().content,
            json!({"name": "Mr.Poon"})
        );
    }

    #[test]
    fn test_diff_unknown_document() {
        let mut engine = SyncEngine::new(JsonPatchStrategy);
        let err = engine.diff(&fletch()).unwrap_err();
        assert_eq!(err, EngineError::DocumentNotFound(DocumentId::from(1234)));
    }

    #[test]
    fn test_patch_shadow_in_order() {
        let mut engine = SyncEngine::new(JsonPatchStrategy);
        let doc = fletch();
        engine.add_document(doc.clone()).unwrap();

        let outcome = engine.patch_shadow(&server_edit(0, rename("Gordon"))).unwrap();
        assert_eq!(
            outcome,
            PatchOutcome::Applied {
                server_version: 1,
                edits: 1
            }
        );
        assert_eq!(
            engine.get_document(&doc.id).unwrap().content,
            json!({"name": "Gordon"})
        );
        assert_eq!(engine.state(&doc.id), Some(DocState::Clean));
    }

    #[test]
    fn test_duplicate_delivery_is_idempotent() {
        let mut engine = SyncEngine::new(JsonPatchStrategy);
        let doc = fletch();
        engine.add_document(doc.clone()).unwrap();
        let msg = server_edit(0, rename("Gordon"));

        engine.patch_shadow(&msg).unwrap();
        let after_first = engine.get_shadow(&doc.id).unwrap().clone();

        let outcome = engine.patch_shadow(&msg).unwrap();
        let after_second = engine.get_shadow(&doc.id).unwrap();

        assert_eq!(outcome, PatchOutcome::Restored { server_version: 1 });
        assert_eq!(after_second.content, after_first.content);
        assert_eq!(after_second.server_version, 1);
    }

    #[test]
    fn test_stale_edit_discards_staged_content() {
        let mut engine = SyncEngine::new(JsonPatchStrategy);
        let doc = fletch();
        engine.add_document(doc.clone()).unwrap();
        engine.patch_shadow(&server_edit(0, rename("Gordon"))).unwrap();
        let backup = engine.backup(&doc.id).unwrap().clone();

        engine.shadow_mut(&doc.id).unwrap().content = json!({"name": "staged"});
        engine.patch_shadow(&server_edit(0, rename("Gordon"))).unwrap();

        let shadow = engine.get_shadow(&doc.id).unwrap();
        assert_eq!(shadow.content, backup.content);
        assert_eq!(shadow.server_version, 1);
    }

    #[test]
    fn test_version_gap_is_reported() {
        let mut engine = SyncEngine::new(JsonPatchStrategy);
        let doc = fletch();
        engine.add_document(doc.clone()).unwrap();

        let outcome = engine.patch_shadow(&server_edit(3, rename("Gordon"))).unwrap();
        assert_eq!(
            outcome,
            PatchOutcome::VersionGap {
                expected: 0,
                received: 3
            }
        );
        assert!(!outcome.is_success());
        assert_eq!(engine.get_document(&doc.id).unwrap().content, doc.content);
        assert_eq!(engine.get_shadow(&doc.id).unwrap().server_version, 0);
    }

    #[test]
    fn test_rejected_edit_changes_nothing() {
        let mut engine = SyncEngine::new(JsonPatchStrategy);
        let doc = fletch();
        engine.add_document(doc.clone()).unwrap();

        let bad = vec![PatchOperation::Remove {
            path: "/missing".to_string(),
        }];
        let outcome = engine.patch_shadow(&server_edit(0, bad)).unwrap();

        assert!(matches!(outcome, PatchOutcome::Rejected { .. }));
        assert_eq!(outcome.name(), "rejected");
        let shadow = engine.get_shadow(&doc.id).unwrap();
        assert_eq!(shadow.server_version, 0);
        assert_eq!(shadow.content, doc.content);
        assert_eq!(engine.get_document(&doc.id).unwrap().content, doc.content);
    }

    /// Whole-value replacement that refuses to overwrite anything locked.
    #[derive(Clone, Copy, Debug)]
    struct Lockable;

    impl Strategy for Lockable {
        type Content = String;
        type Diff = String;

        fn name(&self) -> &str {
            "lockable"
        }

        fn diff(&self, before: &String, after: &String) -> Vec<String> {
            if before == after {
                Vec::new()
            } else {
                vec![after.clone()]
            }
        }

        fn apply(
            &self,
            content: &String,
            diffs: &[String],
        ) -> std::result::Result<String, ApplyError> {
            if content.starts_with("locked") {
                return Err(ApplyError::TestFailed(content.clone()));
            }
            Ok(diffs.last().cloned().unwrap_or_else(|| content.clone()))
        }
    }

    #[test]
    fn test_document_failure_leaves_shadow_uncommitted() {
        let mut engine = SyncEngine::new(Lockable);
        let doc = Document::new("memo", "c1", "draft".to_string());
        engine.add_document(doc.clone()).unwrap();

        let mut pinned = engine.get_shadow(&doc.id).unwrap().clone();
        pinned.content = "locked by admin".to_string();
        assert!(engine.patch_document(&pinned).unwrap());

        let msg = PatchMessage {
            id: doc.id.clone(),
            client_id: "c1".to_string(),
            edits: vec![Edit::new(0, 0, vec!["remote".to_string()])],
        };
        let outcome = engine.patch_shadow(&msg).unwrap();
        assert!(matches!(outcome, PatchOutcome::Rejected { .. }));

        let shadow = engine.get_shadow(&doc.id).unwrap();
        assert_eq!(shadow.server_version, 0);
        assert_eq!(shadow.content, "draft");
        let backup = engine.backup(&doc.id).unwrap();
        assert_eq!(backup.server_version, 0);
        assert_eq!(backup.content, "draft");
        assert_eq!(engine.get_document(&doc.id).unwrap().content, "locked by admin");
    }

    #[test]
    fn test_undecodable_content_is_not_lost() {
        let strategy = StrategyRegistry::with_defaults().get("text-diff").unwrap();
        let mut engine = SyncEngine::new(strategy);
        let doc = Document::new("cfg", "c1", json!({"a": 1}));
        engine.add_document(doc.clone()).unwrap();
        engine.shadow_mut(&doc.id).unwrap().content = json!({"a": 2});

        let err = engine.diff(&doc).unwrap_err();
        assert_eq!(err, EngineError::Undiffable(doc.id.clone()));
        assert_eq!(engine.get_shadow(&doc.id).unwrap().client_version, 0);
        assert_eq!(engine.state(&doc.id), Some(DocState::Clean));

        let shadow = engine.get_shadow(&doc.id).unwrap().clone();
        assert!(!engine.patch_document(&shadow).unwrap());
        assert_eq!(engine.get_document(&doc.id).unwrap().content, json!({"a": 1}));
    }

    #[test]
    fn test_multiple_edits_in_one_message() {
        let mut engine = SyncEngine::new(JsonPatchStrategy);
        let doc = fletch();
        engine.add_document(doc.clone()).unwrap();

        let msg = PatchMessage {
            id: doc.id.clone(),
            client_id: "c1".to_string(),
            edits: vec![
                Edit::new(0, 0, rename("Gordon")),
                Edit::new(0, 1, rename("Larry")),
            ],
        };
        let outcome = engine.patch_shadow(&msg).unwrap();

        assert_eq!(
            outcome,
            PatchOutcome::Applied {
                server_version: 2,
                edits: 2
            }
        );
        assert_eq!(
            engine.get_document(&doc.id).unwrap().content,
            json!({"name": "Larry"})
        );
    }

    #[test]
    fn test_empty_message_is_unchanged() {
        let mut engine = SyncEngine::new(JsonPatchStrategy);
        engine.add_document(fletch()).unwrap();

        let msg: PatchMessage<PatchOperation> = PatchMessage {
            id: DocumentId::from(1234),
            client_id: String::new(),
            edits: Vec::new(),
        };
        assert_eq!(engine.patch_shadow(&msg).unwrap(), PatchOutcome::Unchanged);
    }

    #[test]
    fn test_reset_and_remove() {
        let mut engine = SyncEngine::new(TextDiffStrategy);
        let doc = Document::new("notes", "c1", "hello".to_string());
        engine.add_document(doc.clone()).unwrap();
        engine.shadow_mut(&doc.id).unwrap().content = "hello world".to_string();
        engine.diff(&doc).unwrap();

        let shadow = engine.reset(&doc.id).unwrap();
        assert_eq!(shadow.client_version, 0);
        assert_eq!(shadow.content, "hello");

        assert_eq!(engine.remove_document(&doc.id), Some(doc.clone()));
        assert!(engine.get_shadow(&doc.id).is_none());
        assert!(engine.backup(&doc.id).is_none());
        assert!(engine.is_empty());
    }
}
