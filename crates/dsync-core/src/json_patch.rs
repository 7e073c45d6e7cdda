//! Structured patch strategy over JSON values.
//!
//! Diffs are RFC 6902 operations addressed by RFC 6901 pointers. A diff list
//! is applied to a copy of the content and only returned when every
//! operation succeeded, so a failed patch never leaves a half-applied value.

use crate::error::ApplyError;
use crate::strategy::Strategy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single JSON patch operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

impl PatchOperation {
    pub fn path(&self) -> &str {
        match self {
            PatchOperation::Add { path, .. }
            | PatchOperation::Remove { path }
            | PatchOperation::Replace { path, .. }
            | PatchOperation::Move { path, .. }
            | PatchOperation::Copy { path, .. }
            | PatchOperation::Test { path, .. } => path,
        }
    }
}

/// Structured strategy: content is any JSON value.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonPatchStrategy;

impl JsonPatchStrategy {
    pub const NAME: &'static str = "json-patch";
}

impl Strategy for JsonPatchStrategy {
    type Content = Value;
    type Diff = PatchOperation;

    fn name(&self) -> &str {
        Self::NAME
    }

    fn diff(&self, before: &Value, after: &Value) -> Vec<PatchOperation> {
        let mut ops = Vec::new();
        diff_values("", before, after, &mut ops);
        ops
    }

    fn apply(&self, content: &Value, diffs: &[PatchOperation]) -> Result<Value, ApplyError> {
        let mut doc = content.clone();
        for op in diffs {
            apply_operation(&mut doc, op)?;
        }
        Ok(doc)
    }
}

fn diff_values(path: &str, before: &Value, after: &Value, ops: &mut Vec<PatchOperation>) {
    if before == after {
        return;
    }

    match (before, after) {
        (Value::Object(old), Value::Object(new)) => {
            for (key, old_value) in old {
                let child = format!("{}/{}", path, escape(key));
                match new.get(key) {
                    Some(new_value) => diff_values(&child, old_value, new_value, ops),
                    None => ops.push(PatchOperation::Remove { path: child }),
                }
            }
            for (key, new_value) in new {
                if !old.contains_key(key) {
                    ops.push(PatchOperation::Add {
                        path: format!("{}/{}", path, escape(key)),
                        value: new_value.clone(),
                    });
                }
            }
        }
        (Value::Array(old), Value::Array(new)) => {
            let common = old.len().min(new.len());
            for i in 0..common {
                diff_values(&format!("{}/{}", path, i), &old[i], &new[i], ops);
            }
            // Highest index first so earlier removals don't shift later ones.
            for i in (common..old.len()).rev() {
                ops.push(PatchOperation::Remove {
                    path: format!("{}/{}", path, i),
                });
            }
            for (i, value) in new.iter().enumerate().skip(common) {
                ops.push(PatchOperation::Add {
                    path: format!("{}/{}", path, i),
                    value: value.clone(),
                });
            }
        }
        _ => ops.push(PatchOperation::Replace {
            path: path.to_string(),
            value: after.clone(),
        }),
    }
}

fn apply_operation(doc: &mut Value, op: &PatchOperation) -> Result<(), ApplyError> {
    match op {
        PatchOperation::Add { path, value } => add(doc, path, value.clone()),
        PatchOperation::Remove { path } => remove(doc, path).map(|_| ()),
        PatchOperation::Replace { path, value } => {
            let target = pointer_mut(doc, path)?;
            *target = value.clone();
            Ok(())
        }
        PatchOperation::Move { from, path } => {
            if from == path {
                return Ok(());
            }
            if path.starts_with(&format!("{}/", from)) {
                return Err(ApplyError::InvalidOperation {
                    op: "move",
                    path: path.clone(),
                    reason: format!("{} is a child of {}", path, from),
                });
            }
            let value = remove(doc, from)?;
            add(doc, path, value)
        }
        PatchOperation::Copy { from, path } => {
            let value = pointer(doc, from)?.clone();
            add(doc, path, value)
        }
        PatchOperation::Test { path, value } => {
            if pointer(doc, path)? == value {
                Ok(())
            } else {
                Err(ApplyError::TestFailed(path.clone()))
            }
        }
    }
}

fn add(doc: &mut Value, path: &str, value: Value) -> Result<(), ApplyError> {
    let (parent_tokens, last) = match split_last(path)? {
        Some(split) => split,
        None => {
            *doc = value;
            return Ok(());
        }
    };

    let parent = walk_mut(doc, &parent_tokens, path)?;
    match parent {
        Value::Object(map) => {
            map.insert(last, value);
            Ok(())
        }
        Value::Array(items) => {
            if last == "-" {
                items.push(value);
                return Ok(());
            }
            let index = parse_index(&last, path)?;
            if index > items.len() {
                return Err(ApplyError::InvalidIndex {
                    path: path.to_string(),
                    index: last,
                });
            }
            items.insert(index, value);
            Ok(())
        }
        _ => Err(ApplyError::InvalidOperation {
            op: "add",
            path: path.to_string(),
            reason: "parent is not a container".to_string(),
        }),
    }
}

fn remove(doc: &mut Value, path: &str) -> Result<Value, ApplyError> {
    let (parent_tokens, last) = split_last(path)?.ok_or_else(|| ApplyError::InvalidOperation {
        op: "remove",
        path: path.to_string(),
        reason: "cannot remove the document root".to_string(),
    })?;

    let parent = walk_mut(doc, &parent_tokens, path)?;
    match parent {
        Value::Object(map) => map
            .remove(&last)
            .ok_or_else(|| ApplyError::PathNotFound(path.to_string())),
        Value::Array(items) => {
            let index = parse_index(&last, path)?;
            if index >= items.len() {
                return Err(ApplyError::InvalidIndex {
                    path: path.to_string(),
                    index: last,
                });
            }
            Ok(items.remove(index))
        }
        _ => Err(ApplyError::PathNotFound(path.to_string())),
    }
}

fn pointer<'a>(doc: &'a Value, path: &str) -> Result<&'a Value, ApplyError> {
    let tokens = parse_pointer(path)?;
    let mut current = doc;
    for token in &tokens {
        current = match current {
            Value::Object(map) => map.get(token),
            Value::Array(items) => items.get(parse_index(token, path)?),
            _ => None,
        }
        .ok_or_else(|| ApplyError::PathNotFound(path.to_string()))?;
    }
    Ok(current)
}

fn pointer_mut<'a>(doc: &'a mut Value, path: &str) -> Result<&'a mut Value, ApplyError> {
    let tokens = parse_pointer(path)?;
    walk_mut(doc, &tokens, path)
}

fn walk_mut<'a>(
    doc: &'a mut Value,
    tokens: &[String],
    path: &str,
) -> Result<&'a mut Value, ApplyError> {
    let mut current = doc;
    for token in tokens {
        current = match current {
            Value::Object(map) => map.get_mut(token),
            Value::Array(items) => {
                let index = parse_index(token, path)?;
                items.get_mut(index)
            }
            _ => None,
        }
        .ok_or_else(|| ApplyError::PathNotFound(path.to_string()))?;
    }
    Ok(current)
}

fn split_last(path: &str) -> Result<Option<(Vec<String>, String)>, ApplyError> {
    let mut tokens = parse_pointer(path)?;
    Ok(tokens.pop().map(|last| (tokens, last)))
}

fn parse_pointer(path: &str) -> Result<Vec<String>, ApplyError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| ApplyError::InvalidPointer(path.to_string()))?;
    rest.split('/').map(|token| unescape(token, path)).collect()
}

fn parse_index(token: &str, path: &str) -> Result<usize, ApplyError> {
    let invalid = || ApplyError::InvalidIndex {
        path: path.to_string(),
        index: token.to_string(),
    };
    if token.is_empty() || (token.len() > 1 && token.starts_with('0')) {
        return Err(invalid());
    }
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    token.parse().map_err(|_| invalid())
}

fn escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

fn unescape(token: &str, path: &str) -> Result<String, ApplyError> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return Err(ApplyError::InvalidPointer(path.to_string())),
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}
