//! One-shot migration of legacy per-session settings
//!
//! Older releases kept all workspace settings in a local JSON file owned by
//! each session. Those values belong in the controller's canonical store so
//! every session sees them. The runner reads the legacy file through the
//! `LegacyStore` trait, accumulates everything present into a single batch
//! write, and refuses to run twice in the same process.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tracing::{debug, info, warn};

use gantry_protocol::SettingsDocument;
use gantry_utils::{paths, GantryError, Result};

use crate::api::ApiClient;

/// Read access to the legacy per-session settings store
pub trait LegacyStore: Send + Sync {
    /// Read the value at a dotted key, or None if the legacy store never
    /// had it (a skip, not an error)
    fn get(&self, key: &str) -> Option<Value>;
}

/// The legacy JSON settings file, loaded once
pub struct LegacySettingsFile {
    document: SettingsDocument,
}

impl LegacySettingsFile {
    /// Load the legacy file from its default location. `Ok(None)` when the
    /// file does not exist (fresh install, nothing to migrate).
    pub fn load_default() -> Result<Option<Self>> {
        let path = paths::legacy_settings_file();
        if !path.exists() {
            return Ok(None);
        }
        Self::load(&path).map(Some)
    }

    /// Load a legacy settings file from a specific path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| GantryError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let root: Value = serde_json::from_str(&content).map_err(|e| GantryError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(Self::from_value(root))
    }

    /// Build from an in-memory JSON value
    pub fn from_value(root: Value) -> Self {
        let document = match root {
            Value::Object(map) => SettingsDocument::from_object(map),
            _ => SettingsDocument::new(),
        };
        Self { document }
    }
}

impl LegacyStore for LegacySettingsFile {
    fn get(&self, key: &str) -> Option<Value> {
        self.document.get(Some(key))
    }
}

/// One (legacy key, canonical key) pair to transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationEntry {
    pub legacy_key: String,
    pub canonical_key: String,
}

impl MigrationEntry {
    pub fn new(legacy_key: impl Into<String>, canonical_key: impl Into<String>) -> Self {
        Self {
            legacy_key: legacy_key.into(),
            canonical_key: canonical_key.into(),
        }
    }
}

/// The settings carried over from legacy sessions
pub fn default_migration_table() -> Vec<MigrationEntry> {
    [
        // Basic settings
        "workspace.units",
        "workspace.defaultFirmware",
        "workspace.safeRetractHeight",
        "workspace.outlineMode",
        "workspace.sendUsageData",
        "workspace.enableDarkMode",
        "workspace.customDecimalPlaces",
        "workspace.shouldWarnZero",
        // Probe settings
        "workspace.probeProfile.touchplateType",
        "workspace.probeProfile.zThickness",
        "workspace.probeProfile.xyThickness",
        "workspace.probeProfile.ballDiameter",
        "workspace.probeProfile.zPlungeDistance",
        // Machine settings
        "workspace.park",
        "workspace.spindleFunctions",
        "workspace.coolantFunctions",
        // Rotary settings
        "workspace.rotaryAxis.firmwareSettings",
        // Tool changing settings
        "workspace.toolChangeOption",
        "workspace.toolChangePosition",
        "workspace.toolChange.passthrough",
        "workspace.toolChange.skipDialog",
        "workspace.toolChangeHooks.preHook",
        "workspace.toolChangeHooks.postHook",
        // Other settings
        "workspace.repurposeDoorAsPause",
    ]
    .into_iter()
    .map(|key| MigrationEntry::new(key, key))
    .collect()
}

/// Summary of one migration pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated_count: usize,
    pub error_count: usize,
}

/// Runs the legacy transfer at most once per process lifetime
///
/// Owned by session bootstrap and passed where needed; the completion flag
/// lives on the instance, resetting on restart.
#[derive(Debug, Default)]
pub struct MigrationRunner {
    completed: AtomicBool,
}

impl MigrationRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a pass already ran in this process
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Transfer every legacy value named by `table` into the canonical
    /// store as one batch write.
    ///
    /// A missing legacy value is a skip, not an error. Re-invocation before
    /// process restart is a no-op returning zero counts. If the batch write
    /// fails, the accumulated entries are counted as errors and the pass
    /// still counts as completed; the next restart retries.
    pub async fn migrate(
        &self,
        table: &[MigrationEntry],
        legacy: &dyn LegacyStore,
        api: &ApiClient,
    ) -> MigrationReport {
        if self.completed.swap(true, Ordering::SeqCst) {
            debug!("Legacy settings migration already ran, skipping");
            return MigrationReport::default();
        }

        info!("Starting legacy settings migration ({} entries)", table.len());

        let mut batch = serde_json::Map::new();
        for entry in table {
            match legacy.get(&entry.legacy_key) {
                Some(value) => {
                    debug!("Migrating {} -> {}", entry.legacy_key, entry.canonical_key);
                    batch.insert(entry.canonical_key.clone(), value);
                }
                None => {
                    // Never set in the legacy store
                }
            }
        }

        if batch.is_empty() {
            info!("Migration complete: nothing to transfer");
            return MigrationReport::default();
        }

        let pending = batch.len();
        match api.set_state(Value::Object(batch)).await {
            Ok(_) => {
                info!("Migration complete: {} settings migrated", pending);
                MigrationReport {
                    migrated_count: pending,
                    error_count: 0,
                }
            }
            Err(e) => {
                warn!("Migration batch write failed: {}", e);
                MigrationReport {
                    migrated_count: 0,
                    error_count: pending,
                }
            }
        }
    }
}
