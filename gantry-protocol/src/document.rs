//! Settings document model
//!
//! A nested JSON document addressed by dot-delimited keys, with the merge
//! and change-detection semantics shared by the controller's canonical
//! store and anything that needs to mirror it.
//!
//! Merge rules: scalar (and array) values replace outright; when both the
//! old and the new value at a path are objects, the new fields are laid
//! over a shallow copy of the old ones, so siblings not mentioned in the
//! write survive. Change detection is by value equality, never identity.

use serde_json::{Map, Value};

use crate::types::{flatten_value, ChangeSet, JsonValue};

/// Merge `new` onto `old` at a single path.
///
/// Returns the merged value and whether the result differs from `old`.
pub fn merge_value(old: Option<&Value>, new: &Value) -> (Value, bool) {
    match (old, new) {
        (Some(Value::Object(old_map)), Value::Object(new_map)) => {
            let mut merged = old_map.clone();
            for (key, value) in new_map {
                merged.insert(key.clone(), value.clone());
            }
            let changed = &merged != old_map;
            (Value::Object(merged), changed)
        }
        (old, new) => {
            let changed = old != Some(new);
            (new.clone(), changed)
        }
    }
}

/// A nested settings document addressed by dotted keys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsDocument {
    root: Map<String, Value>,
}

impl SettingsDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document from an existing JSON object
    pub fn from_object(root: Map<String, Value>) -> Self {
        Self { root }
    }

    /// Read the full document (no key) or the subtree/leaf at a dotted key.
    /// Returns None for a key that has never been written.
    pub fn get(&self, key: Option<&str>) -> Option<Value> {
        match key {
            None => Some(Value::Object(self.root.clone())),
            Some(key) => self.lookup(key).cloned(),
        }
    }

    /// Whether a dotted key currently exists
    pub fn contains(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Write to the document.
    ///
    /// With a key, `body` is merged at that single path. Without a key,
    /// `body` is flattened into dotted leaf keys and each is written
    /// independently; the aggregate change set is the union of the
    /// individually changed keys.
    ///
    /// The returned change set holds the final (post-merge) value for every
    /// key whose value actually changed; an unchanged write yields an empty
    /// set.
    pub fn set(&mut self, key: Option<&str>, body: Value) -> ChangeSet {
        let mut changes = ChangeSet::new();

        match key {
            Some(key) => {
                let old = self.lookup(key).cloned();
                let (merged, changed) = merge_value(old.as_ref(), &body);
                if !changed {
                    return changes;
                }

                // Report per-field leaf keys for an object merge so callers
                // learn exactly which siblings moved; otherwise the key
                // itself changed.
                match (&old, &body) {
                    (Some(Value::Object(old_map)), Value::Object(new_map)) => {
                        for (field, value) in new_map {
                            if old_map.get(field) != Some(value) {
                                changes.insert(
                                    format!("{}.{}", key, field),
                                    JsonValue::new(value.clone()),
                                );
                            }
                        }
                    }
                    _ => {
                        changes.insert(key.to_string(), JsonValue::new(merged.clone()));
                    }
                }

                self.write_path(key, merged);
            }
            None => {
                for (leaf_key, leaf_value) in flatten_value(&body) {
                    if leaf_key.is_empty() {
                        // Non-object body with no key addresses nothing
                        continue;
                    }
                    let old = self.lookup(&leaf_key).cloned();
                    let (merged, changed) = merge_value(old.as_ref(), &leaf_value);
                    if changed {
                        changes.insert(leaf_key.clone(), JsonValue::new(merged.clone()));
                        self.write_path(&leaf_key, merged);
                    }
                }
            }
        }

        changes
    }

    /// Remove a dotted key. Returns the change set (`key: null`) on
    /// success, or None if the key has never been written.
    pub fn unset(&mut self, key: &str) -> Option<ChangeSet> {
        if !self.remove_path(key) {
            return None;
        }
        let mut changes = ChangeSet::new();
        changes.insert(key.to_string(), JsonValue::new(Value::Null));
        Some(changes)
    }

    /// Number of top-level entries
    pub fn len(&self) -> usize {
        self.root.len()
    }

    /// Whether the document holds nothing
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    fn lookup(&self, key: &str) -> Option<&Value> {
        let mut current: &Value = self.root.get(first_segment(key)?)?;
        for segment in key.split('.').skip(1) {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Set the value at a dotted path, creating intermediate objects and
    /// replacing non-object intermediates.
    fn write_path(&mut self, key: &str, value: Value) {
        let segments: Vec<&str> = key.split('.').collect();
        let mut current = &mut self.root;

        for segment in &segments[..segments.len() - 1] {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = entry.as_object_mut().expect("just ensured object");
        }

        current.insert(segments[segments.len() - 1].to_string(), value);
    }

    /// Remove the value at a dotted path. Returns false if absent.
    fn remove_path(&mut self, key: &str) -> bool {
        let segments: Vec<&str> = key.split('.').collect();
        let mut current = &mut self.root;

        for segment in &segments[..segments.len() - 1] {
            match current.get_mut(*segment).and_then(Value::as_object_mut) {
                Some(next) => current = next,
                None => return false,
            }
        }

        current.remove(segments[segments.len() - 1]).is_some()
    }
}

fn first_segment(key: &str) -> Option<&str> {
    key.split('.').next()
}
