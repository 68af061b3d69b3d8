//! Canonical settings store
//!
//! The single authoritative key/value store of configuration state, owned
//! by the controller process. Sessions read and write through it; their
//! local caches are never authoritative.

use parking_lot::RwLock;
use serde_json::Value;

use gantry_protocol::{ChangeSet, SettingsDocument};
use gantry_utils::{GantryError, Result};

/// The controller's canonical settings store.
///
/// Each logical request (get/set/unset) runs under a single lock
/// acquisition, so the compute-merged-value-then-apply step of one write
/// can never interleave with another request's write. Writes to the same
/// key race last-write-wins; there is no versioning.
#[derive(Debug, Default)]
pub struct SettingsStore {
    document: RwLock<SettingsDocument>,
}

impl SettingsStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the full state (no key) or the subtree/leaf at a dotted key.
    ///
    /// A missing key is an expected condition (first run with no prior
    /// config) and surfaces as `KeyNotFound`, not a crash.
    pub fn get(&self, key: Option<&str>) -> Result<Value> {
        self.document
            .read()
            .get(key)
            .ok_or_else(|| GantryError::key_not_found(key.unwrap_or_default()))
    }

    /// Write settings.
    ///
    /// With a key: merge at that single path (scalars replace, objects
    /// shallow-merge). Without a key: `body` is flattened into dotted leaf
    /// keys, each written independently. Returns the set of keys whose
    /// final value differs from its value immediately before the call;
    /// callers broadcast that set exactly once per request.
    pub fn set(&self, key: Option<&str>, body: Value) -> Result<ChangeSet> {
        if let Some(key) = key {
            if key.is_empty() {
                return Err(GantryError::InvalidKey(key.to_string()));
            }
        }
        Ok(self.document.write().set(key, body))
    }

    /// Remove a key. `KeyNotFound` if it has never been written.
    ///
    /// The returned change set carries the key with JSON `null`, the wire
    /// convention for a removed setting.
    pub fn unset(&self, key: &str) -> Result<ChangeSet> {
        self.document
            .write()
            .unset(key)
            .ok_or_else(|| GantryError::key_not_found(key))
    }

    /// Whether a key currently exists
    pub fn contains(&self, key: &str) -> bool {
        self.document.read().contains(key)
    }
}
