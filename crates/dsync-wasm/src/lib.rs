//! # DSync WebAssembly Bindings
//!
//! Exposes the differential synchronization engine to JavaScript. The host
//! owns the connection; this crate computes and applies edits.
//!
//! ## Usage
//!
//! ```javascript
//! import init, { WasmSyncEngine } from 'dsync-wasm';
//!
//! await init();
//!
//! const engine = new WasmSyncEngine('json-patch');
//! engine.addDocument({ id: 'todo', clientId: 'alice', content: { items: [] } });
//!
//! engine.stage('todo', { items: ['milk'] });
//! const patch = engine.diff('todo');   // send as { msgType: 'patch', ...patch }
//! engine.patchDocument('todo');
//!
//! socket.onmessage = (e) => {
//!   const outcome = engine.patchShadow(JSON.parse(e.data));
//!   if (outcome === 'versionGap') { ... }
//! };
//! ```

use dsync_core::{
    Document, DocumentId, JsonPatchStrategy, NamedStrategy, PatchMessage, StrategyRegistry,
};
use dsync_engine::{PatchOutcome, SyncEngine};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;

// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn init_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

// ============================================================================
// WasmSyncEngine
// ============================================================================

/// A sync engine whose strategy is picked by name.
#[wasm_bindgen]
pub struct WasmSyncEngine {
    engine: SyncEngine<NamedStrategy>,
}

#[wasm_bindgen]
impl WasmSyncEngine {
    /// Create an engine. `strategy` is a registry name and defaults to
    /// `json-patch`.
    #[wasm_bindgen(constructor)]
    pub fn new(strategy: Option<String>) -> Result<WasmSyncEngine, JsValue> {
        let name = strategy.as_deref().unwrap_or(JsonPatchStrategy::NAME);
        Self::create(name).map_err(js_error)
    }

    /// Names accepted by the constructor.
    #[wasm_bindgen]
    pub fn strategies() -> Vec<String> {
        StrategyRegistry::with_defaults()
            .names()
            .map(str::to_string)
            .collect()
    }

    #[wasm_bindgen(getter)]
    pub fn strategy(&self) -> String {
        self.strategy_name().to_string()
    }

    /// Number of registered documents.
    #[wasm_bindgen(getter)]
    pub fn size(&self) -> usize {
        self.engine.len()
    }

    /// Register a document `{ id, clientId, content }`.
    #[wasm_bindgen(js_name = addDocument)]
    pub fn add_document(&mut self, doc: JsValue) -> Result<(), JsValue> {
        let doc: Document<Value> = from_js(&doc)?;
        self.add(doc).map_err(js_error)
    }

    /// The stored document, or `undefined`.
    #[wasm_bindgen(js_name = getDocument)]
    pub fn get_document(&self, id: JsValue) -> Result<JsValue, JsValue> {
        match self.engine.get_document(&doc_id(&id)?) {
            Some(doc) => to_js(doc),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    /// The live shadow, or `undefined`.
    #[wasm_bindgen(js_name = getShadow)]
    pub fn get_shadow(&self, id: JsValue) -> Result<JsValue, JsValue> {
        match self.engine.get_shadow(&doc_id(&id)?) {
            Some(shadow) => to_js(shadow),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    /// Replace the staged shadow content with a local edit.
    #[wasm_bindgen]
    pub fn stage(&mut self, id: JsValue, content: JsValue) -> Result<(), JsValue> {
        let id = doc_id(&id)?;
        let content: Value = from_js(&content)?;
        self.stage_content(&id, content).map_err(js_error)
    }

    /// Diff the stored document against the staged shadow and return the
    /// patch message to send.
    #[wasm_bindgen]
    pub fn diff(&mut self, id: JsValue) -> Result<JsValue, JsValue> {
        let msg = self.diff_document(&doc_id(&id)?).map_err(js_error)?;
        to_js(&msg)
    }

    /// Apply an inbound patch message. Returns the outcome name:
    /// `applied`, `restored`, `unchanged`, `rejected` or `versionGap`.
    #[wasm_bindgen(js_name = patchShadow)]
    pub fn patch_shadow(&mut self, msg: JsValue) -> Result<String, JsValue> {
        let msg: PatchMessage<Value> = from_js(&msg)?;
        let outcome = self.apply_patch(&msg).map_err(js_error)?;
        match &outcome {
            PatchOutcome::Rejected { reason } => {
                warn(&format!("edit for {} rejected: {}", msg.id, reason));
            }
            PatchOutcome::VersionGap { expected, received } => {
                warn(&format!(
                    "version gap on {}: expected {}, received {}",
                    msg.id, expected, received
                ));
            }
            _ => {}
        }
        Ok(outcome.name().to_string())
    }

    /// Bring the stored document up to its shadow.
    #[wasm_bindgen(js_name = patchDocument)]
    pub fn patch_document(&mut self, id: JsValue) -> Result<bool, JsValue> {
        self.commit(&doc_id(&id)?).map_err(js_error)
    }

    /// Re-base the shadow on the document at version (0, 0).
    #[wasm_bindgen]
    pub fn reset(&mut self, id: JsValue) -> Result<(), JsValue> {
        let id = doc_id(&id)?;
        self.engine.reset(&id).map_err(js_error)?;
        Ok(())
    }

    /// Deregister a document. Returns whether it was registered.
    #[wasm_bindgen(js_name = removeDocument)]
    pub fn remove_document(&mut self, id: JsValue) -> Result<bool, JsValue> {
        Ok(self.engine.remove_document(&doc_id(&id)?).is_some())
    }
}

impl WasmSyncEngine {
    fn create(name: &str) -> Result<Self, String> {
        let strategy = StrategyRegistry::with_defaults()
            .get(name)
            .ok_or_else(|| format!("unknown strategy: {}", name))?;
        Ok(Self {
            engine: SyncEngine::new(strategy),
        })
    }

    fn strategy_name(&self) -> &str {
        dsync_core::Strategy::name(self.engine.strategy())
    }

    fn add(&mut self, doc: Document<Value>) -> Result<(), String> {
        self.check(&doc.content)?;
        self.engine.add_document(doc).map_err(|e| e.to_string())
    }

    fn stage_content(&mut self, id: &DocumentId, content: Value) -> Result<(), String> {
        self.check(&content)?;
        let shadow = self
            .engine
            .shadow_mut(id)
            .ok_or_else(|| format!("Document not found: {}", id))?;
        shadow.content = content;
        Ok(())
    }

    /// Content the strategy cannot read would otherwise diff to nothing.
    fn check(&self, content: &Value) -> Result<(), String> {
        self.engine
            .strategy()
            .check_content(content)
            .map_err(|e| format!("{} content rejected: {}", self.strategy_name(), e))
    }

    fn diff_document(&mut self, id: &DocumentId) -> Result<PatchMessage<Value>, String> {
        let doc = self
            .engine
            .get_document(id)
            .cloned()
            .ok_or_else(|| format!("Document not found: {}", id))?;
        self.engine.diff(&doc).map_err(|e| e.to_string())
    }

    fn apply_patch(&mut self, msg: &PatchMessage<Value>) -> Result<PatchOutcome, String> {
        self.engine.patch_shadow(msg).map_err(|e| e.to_string())
    }

    fn commit(&mut self, id: &DocumentId) -> Result<bool, String> {
        let shadow = self
            .engine
            .get_shadow(id)
            .cloned()
            .ok_or_else(|| format!("Document not found: {}", id))?;
        self.engine
            .patch_document(&shadow)
            .map_err(|e| e.to_string())
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

fn js_error(message: impl ToString) -> JsValue {
    JsValue::from_str(&message.to_string())
}

/// Accepts a string or a non-negative integral number.
fn doc_id(id: &JsValue) -> Result<DocumentId, JsValue> {
    if let Some(text) = id.as_string() {
        return Ok(DocumentId::from(text));
    }
    match id.as_f64() {
        Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= MAX_SAFE_INTEGER => {
            Ok(DocumentId::from(n as u64))
        }
        _ => Err(js_error("document id must be a string or a non-negative integer")),
    }
}

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

// JSON text is the interchange so numbers keep their integer form.
fn from_js<T: DeserializeOwned>(value: &JsValue) -> Result<T, JsValue> {
    let text: String = js_sys::JSON::stringify(value)
        .map_err(|e| js_error(format!("JSON stringify error: {:?}", e)))?
        .into();
    serde_json::from_str(&text).map_err(|e| js_error(format!("Deserialization error: {}", e)))
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| js_error(format!("Serialization error: {}", e)))
}

fn warn(message: &str) {
    web_sys::console::warn_1(&JsValue::from_str(message));
}
