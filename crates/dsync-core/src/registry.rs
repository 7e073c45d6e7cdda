//! Runtime strategy selection.
//!
//! Strategies are statically typed, but configuration files and foreign
//! hosts pick them by name. [`DynStrategy`] erases a [`Strategy`] down to
//! `serde_json::Value` so it can live in a [`StrategyRegistry`], and
//! [`NamedStrategy`] turns a registry entry back into a `Strategy` that an
//! engine can own.

use crate::error::ApplyError;
use crate::json_patch::JsonPatchStrategy;
use crate::strategy::Strategy;
use crate::text_diff::TextDiffStrategy;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Object-safe view of a [`Strategy`] over JSON values.
pub trait DynStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Fails when `content` does not decode as this strategy's content type.
    fn check_content(&self, content: &Value) -> Result<(), ApplyError>;

    fn diff_value(&self, before: &Value, after: &Value) -> Result<Vec<Value>, ApplyError>;

    fn apply_value(&self, content: &Value, diffs: &[Value]) -> Result<Value, ApplyError>;

    fn compose_value(&self, first: Vec<Value>, second: Vec<Value>)
        -> Result<Vec<Value>, ApplyError>;
}

impl<S: Strategy> DynStrategy for S {
    fn name(&self) -> &str {
        Strategy::name(self)
    }

    fn check_content(&self, content: &Value) -> Result<(), ApplyError> {
        serde_json::from_value::<S::Content>(content.clone())?;
        Ok(())
    }

    fn diff_value(&self, before: &Value, after: &Value) -> Result<Vec<Value>, ApplyError> {
        let before: S::Content = serde_json::from_value(before.clone())?;
        let after: S::Content = serde_json::from_value(after.clone())?;
        encode_diffs(&self.diff(&before, &after))
    }

    fn apply_value(&self, content: &Value, diffs: &[Value]) -> Result<Value, ApplyError> {
        let content: S::Content = serde_json::from_value(content.clone())?;
        let diffs = decode_diffs::<S>(diffs.to_vec())?;
        let patched = self.apply(&content, &diffs)?;
        Ok(serde_json::to_value(patched)?)
    }

    fn compose_value(
        &self,
        first: Vec<Value>,
        second: Vec<Value>,
    ) -> Result<Vec<Value>, ApplyError> {
        let first = decode_diffs::<S>(first)?;
        let second = decode_diffs::<S>(second)?;
        encode_diffs(&self.compose(first, second))
    }
}

fn decode_diffs<S: Strategy>(diffs: Vec<Value>) -> Result<Vec<S::Diff>, ApplyError> {
    diffs
        .into_iter()
        .map(|d| serde_json::from_value(d).map_err(ApplyError::from))
        .collect()
}

fn encode_diffs<D: serde::Serialize>(diffs: &[D]) -> Result<Vec<Value>, ApplyError> {
    diffs
        .iter()
        .map(|d| serde_json::to_value(d).map_err(ApplyError::from))
        .collect()
}

/// A registry entry usable wherever a [`Strategy`] is expected.
///
/// Content that the underlying strategy cannot decode yields an empty diff
/// and a failed apply. Hosts should vet content with
/// [`check_content`](Self::check_content) before handing it to an engine.
#[derive(Clone)]
pub struct NamedStrategy {
    inner: Arc<dyn DynStrategy>,
}

impl NamedStrategy {
    pub fn new(strategy: Arc<dyn DynStrategy>) -> Self {
        Self { inner: strategy }
    }

    pub fn check_content(&self, content: &Value) -> Result<(), ApplyError> {
        self.inner.check_content(content)
    }
}

impl fmt::Debug for NamedStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NamedStrategy")
            .field(&self.inner.name())
            .finish()
    }
}

impl Strategy for NamedStrategy {
    type Content = Value;
    type Diff = Value;

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn diff(&self, before: &Value, after: &Value) -> Vec<Value> {
        self.inner.diff_value(before, after).unwrap_or_default()
    }

    fn apply(&self, content: &Value, diffs: &[Value]) -> Result<Value, ApplyError> {
        self.inner.apply_value(content, diffs)
    }

    fn compose(&self, first: Vec<Value>, second: Vec<Value>) -> Vec<Value> {
        match self.inner.compose_value(first.clone(), second.clone()) {
            Ok(composed) => composed,
            Err(_) => {
                let mut all = first;
                all.extend(second);
                all
            }
        }
    }
}

/// Name-keyed collection of strategies.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Arc<dyn DynStrategy>>,
}

impl StrategyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `json-patch` and `text-diff`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(JsonPatchStrategy);
        registry.register(TextDiffStrategy);
        registry
    }

    /// Register a strategy under its own name, replacing any previous entry.
    pub fn register<S: Strategy>(&mut self, strategy: S) {
        let name = Strategy::name(&strategy).to_string();
        self.strategies.insert(name, Arc::new(strategy));
    }

    pub fn get(&self, name: &str) -> Option<NamedStrategy> {
        self.strategies.get(name).cloned().map(NamedStrategy::new)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.strategies.keys()).finish()
    }
}
