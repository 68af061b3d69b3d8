//! Batch coordinator for grouped "apply all" actions
//!
//! Settings panels stage edits locally; each one registers an applier that
//! reports its pending changes when asked. An explicit apply-all action
//! runs every registered applier, merges the non-empty outcomes, and
//! submits them to the controller in a single network round trip.
//!
//! One slow or broken panel must not block unrelated settings from being
//! saved: a failing applier is counted and skipped, and the rest of the
//! batch still goes out.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use gantry_utils::Result;

use crate::api::ApiClient;

/// Pending changes reported by one applier
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplierOutcome {
    /// Dotted key -> staged value
    pub settings: BTreeMap<String, Value>,
    /// Number of changed leaves the applier counted
    pub changed: usize,
}

impl ApplierOutcome {
    /// Nothing to apply
    pub fn empty() -> Self {
        Self::default()
    }

    /// Stage a batch of dotted key -> value pairs
    pub fn with_settings(settings: BTreeMap<String, Value>) -> Self {
        let changed = settings.len();
        Self { settings, changed }
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }
}

/// An applier owned by one settings panel
pub type ApplierFn = Arc<dyn Fn() -> BoxFuture<'static, Result<ApplierOutcome>> + Send + Sync>;

/// Wrap an async closure as an applier
pub fn applier<F, Fut>(f: F) -> ApplierFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ApplierOutcome>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

/// Result of one apply-all pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub success_count: usize,
    pub failed_count: usize,
    pub total_components: usize,
}

type Registry = Arc<Mutex<Vec<(String, ApplierFn)>>>;

/// Coordinates registered appliers into single-round-trip batch writes
///
/// The registry is owned here and handed to the panels that need it; it is
/// not reachable through any ambient global state.
pub struct BatchCoordinator {
    api: ApiClient,
    registry: Registry,
}

impl BatchCoordinator {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            registry: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register an applier under a panel id.
    ///
    /// A duplicate id overwrites the stored applier but keeps its original
    /// registration slot. The returned handle unregisters the entry;
    /// unregistering twice is a no-op.
    pub fn register_applier(&self, id: impl Into<String>, applier: ApplierFn) -> ApplierHandle {
        let id = id.into();
        let mut registry = self.registry.lock();

        if let Some(slot) = registry.iter_mut().find(|(existing, _)| *existing == id) {
            slot.1 = applier;
        } else {
            registry.push((id.clone(), applier));
        }

        ApplierHandle {
            registry: Arc::downgrade(&self.registry),
            id,
        }
    }

    /// Number of currently registered appliers
    pub fn applier_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Run every registered applier concurrently, merge their staged
    /// settings, and submit them to the controller in one write.
    ///
    /// Appliers run isolated: one that fails (or panics) is counted in
    /// `failed_count` and does not stop the others. Outcomes are merged in
    /// registration order, so if two appliers stage the same key the
    /// later-registered one wins deterministically.
    ///
    /// The snapshot is taken up front: unregistering an applier mid-flight
    /// does not cancel its participation in this pass.
    pub async fn apply_all(&self) -> BatchReport {
        let appliers: Vec<(String, ApplierFn)> = self.registry.lock().clone();
        let total = appliers.len();

        if total == 0 {
            return BatchReport::default();
        }

        debug!("Collecting staged settings from {} panels", total);

        let handles: Vec<_> = appliers
            .into_iter()
            .map(|(id, applier)| (id, tokio::spawn(applier())))
            .collect();

        let mut combined: BTreeMap<String, Value> = BTreeMap::new();
        let mut success_count = 0;
        let mut failed_count = 0;
        let mut total_changes = 0;

        for (id, handle) in handles {
            match handle.await {
                Ok(Ok(outcome)) => {
                    success_count += 1;
                    total_changes += outcome.changed;
                    for (key, value) in outcome.settings {
                        combined.insert(key, value);
                    }
                }
                Ok(Err(e)) => {
                    failed_count += 1;
                    warn!("Applier '{}' failed: {}", id, e);
                }
                Err(e) => {
                    failed_count += 1;
                    warn!("Applier '{}' panicked: {}", id, e);
                }
            }
        }

        if combined.is_empty() {
            debug!("No staged settings changes to apply");
            return BatchReport {
                success_count,
                failed_count,
                total_components: total,
            };
        }

        info!(
            "Applying {} staged settings ({} changed leaves) in one batch",
            combined.len(),
            total_changes
        );

        let body = Value::Object(combined.into_iter().collect());
        match self.api.set_state(body).await {
            Ok(changed_keys) => {
                debug!("Batch applied, {} keys changed", changed_keys.len());
                BatchReport {
                    success_count,
                    failed_count,
                    total_components: total,
                }
            }
            Err(e) => {
                // Collection succeeded but nothing landed
                warn!("Failed to apply settings batch: {}", e);
                BatchReport {
                    success_count: 0,
                    failed_count: total,
                    total_components: total,
                }
            }
        }
    }
}

/// Unregistration handle returned by `register_applier`
///
/// Calling `unregister` removes the entry; calling it again (or after the
/// coordinator is gone) is a no-op.
pub struct ApplierHandle {
    registry: Weak<Mutex<Vec<(String, ApplierFn)>>>,
    id: String,
}

impl ApplierHandle {
    pub fn unregister(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().retain(|(id, _)| *id != self.id);
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}
