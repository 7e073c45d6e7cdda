//! Recovery and idempotence tests for the sync engine
//!
//! These tests drive the engine the way a peer would: in-order edits,
//! retransmitted edits, edits from the future, and garbage.

use dsync_core::{
    Document, DocumentId, Edit, JsonPatchStrategy, Operation, PatchMessage, Strategy, TextDiff,
    TextDiffStrategy,
};
use dsync_engine::{DocState, PatchOutcome, SyncEngine};
use proptest::prelude::*;
use serde_json::json;

fn text_engine(content: &str) -> (SyncEngine<TextDiffStrategy>, Document<String>) {
    let mut engine = SyncEngine::new(TextDiffStrategy);
    let doc = Document::new("notes", "client-1", content.to_string());
    engine.add_document(doc.clone()).unwrap();
    (engine, doc)
}

fn remote(id: &DocumentId, server_version: u64, diffs: Vec<TextDiff>) -> PatchMessage<TextDiff> {
    PatchMessage {
        id: id.clone(),
        client_id: "client-1".to_string(),
        edits: vec![Edit::new(0, server_version, diffs)],
    }
}

// ============================================================================
// Scenario from the protocol description
// ============================================================================

#[test]
fn test_fletch_becomes_mr_poon() {
    let mut engine = SyncEngine::new(JsonPatchStrategy);
    let doc = Document::new(1234, "c1", json!({"name": "Fletch"}));
    engine.add_document(doc.clone()).unwrap();

    engine.shadow_mut(&doc.id).unwrap().content["name"] = json!("Mr.Poon");
    let msg = engine.diff(&doc).unwrap();

    let diffs = serde_json::to_value(&msg.edits[0].diffs).unwrap();
    assert_eq!(
        diffs,
        json!([{"op": "replace", "path": "/name", "value": "Mr.Poon"}])
    );

    let shadow = engine.get_shadow(&doc.id).unwrap().clone();
    assert!(engine.patch_document(&shadow).unwrap());
    assert_eq!(
        engine.get_document(&doc.id).unwrap().content["name"],
        json!("Mr.Poon")
    );
}

// ============================================================================
// Text documents
// ============================================================================

#[test]
fn test_text_remote_edit_reaches_document() {
    let (mut engine, doc) = text_engine("Hello world");
    let diffs = TextDiffStrategy.diff(&doc.content, &"Hello there".to_string());

    let outcome = engine.patch_shadow(&remote(&doc.id, 0, diffs)).unwrap();

    assert!(outcome.is_success());
    assert_eq!(engine.get_document(&doc.id).unwrap().content, "Hello there");
    assert_eq!(engine.get_shadow(&doc.id).unwrap().server_version, 1);
}

#[test]
fn test_text_edit_against_wrong_base_is_rejected() {
    let (mut engine, doc) = text_engine("Hello world");
    let diffs = vec![
        TextDiff::new(Operation::Unchanged, "Goodbye"),
        TextDiff::new(Operation::Add, "!"),
    ];

    let outcome = engine.patch_shadow(&remote(&doc.id, 0, diffs)).unwrap();

    assert!(matches!(outcome, PatchOutcome::Rejected { .. }));
    assert_eq!(engine.get_document(&doc.id).unwrap().content, "Hello world");
    assert_eq!(engine.get_shadow(&doc.id).unwrap().server_version, 0);
}

#[test]
fn test_backup_restore_keeps_server_version() {
    let (mut engine, doc) = text_engine("one");
    let diffs = TextDiffStrategy.diff(&doc.content, &"one two".to_string());
    engine.patch_shadow(&remote(&doc.id, 0, diffs)).unwrap();
    assert_eq!(engine.get_shadow(&doc.id).unwrap().server_version, 1);
    let backup = engine.backup(&doc.id).unwrap().content.clone();

    let stale = remote(&doc.id, 0, vec![TextDiff::new(Operation::Add, "ignored")]);
    let outcome = engine.patch_shadow(&stale).unwrap();

    assert_eq!(outcome, PatchOutcome::Restored { server_version: 1 });
    let shadow = engine.get_shadow(&doc.id).unwrap();
    assert_eq!(shadow.content, backup);
    assert_eq!(shadow.server_version, 1);
    assert_eq!(engine.get_document(&doc.id).unwrap().content, "one two");
}

#[test]
fn test_local_round_trip_state_machine() {
    let (mut engine, doc) = text_engine("draft");
    assert_eq!(engine.state(&doc.id), Some(DocState::Clean));

    engine.shadow_mut(&doc.id).unwrap().content = "draft v2".to_string();
    let msg = engine.diff(&doc).unwrap();
    assert_eq!(engine.state(&doc.id), Some(DocState::AwaitingAck));
    assert_eq!(
        TextDiffStrategy
            .apply(&doc.content, &msg.edits[0].diffs)
            .unwrap(),
        "draft v2"
    );

    // The peer acknowledges with an empty edit at the current server version.
    engine.patch_shadow(&remote(&doc.id, 0, Vec::new())).unwrap();
    assert_eq!(engine.state(&doc.id), Some(DocState::Clean));
}

#[test]
fn test_unknown_document_is_an_error() {
    let (mut engine, _) = text_engine("x");
    let msg = remote(&DocumentId::from("other"), 0, Vec::new());
    assert!(engine.patch_shadow(&msg).is_err());
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn duplicate_delivery_advances_once(
        start in "[a-z ]{0,20}",
        target in "[a-z ]{0,20}",
        repeats in 1usize..5
    ) {
        let (mut engine, doc) = text_engine(&start);
        let msg = remote(&doc.id, 0, TextDiffStrategy.diff(&start, &target));

        engine.patch_shadow(&msg).unwrap();
        let first = engine.get_shadow(&doc.id).unwrap().clone();

        for _ in 0..repeats {
            engine.patch_shadow(&msg).unwrap();
        }

        let shadow = engine.get_shadow(&doc.id).unwrap();
        prop_assert_eq!(&shadow.content, &first.content);
        prop_assert_eq!(shadow.server_version, 1);
        prop_assert_eq!(&engine.get_document(&doc.id).unwrap().content, &target);
    }

    #[test]
    fn client_version_counts_local_diffs(edits in prop::collection::vec("[a-z]{0,8}", 1..10)) {
        let (mut engine, mut doc) = text_engine("");

        for (i, content) in edits.iter().enumerate() {
            engine.shadow_mut(&doc.id).unwrap().content = content.clone();
            let msg = engine.diff(&doc).unwrap();
            prop_assert_eq!(msg.edits[0].client_version, i as u64);

            let shadow = engine.get_shadow(&doc.id).unwrap().clone();
            prop_assert!(engine.patch_document(&shadow).unwrap());
            doc = engine.get_document(&doc.id).unwrap().clone();
        }

        prop_assert_eq!(engine.get_shadow(&doc.id).unwrap().client_version, edits.len() as u64);
        prop_assert_eq!(&doc.content, edits.last().unwrap());
    }
}
