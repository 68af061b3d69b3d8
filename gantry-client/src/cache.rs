//! Local cache & debounced writer
//!
//! Each session keeps its own cache of configuration values. Reads are
//! synchronous and never block on the network; writes land in the cache
//! immediately (so the same session sees them instantly) and are pushed to
//! the controller after a debounce interval, coalescing bursts like a
//! slider drag into one outbound request carrying only the final value.
//!
//! The cache is never authoritative: the controller's canonical store is,
//! and this cache converges on it through `sync_from_server` and the
//! broadcast change notifications applied by `handle_remote_change`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use gantry_protocol::{flatten_value, ChangeSet, SettingsDocument};
use gantry_utils::Result;

use crate::api::ApiClient;

/// Default quiet period before a staged write goes out
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Session-local event raised when cached values changed underneath the UI
///
/// Carries no payload: consumers re-read whatever they need from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    Repopulate,
}

/// Per-session settings cache with debounced write-through
#[derive(Clone)]
pub struct SessionCache {
    api: ApiClient,
    document: Arc<Mutex<SettingsDocument>>,
    /// Pending debounced writer per dotted key; arming a key aborts the
    /// previous task for that exact key
    writers: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
    debounce: Duration,
    events_tx: broadcast::Sender<CacheEvent>,
    /// Serializes concurrent full syncs
    sync_lock: Arc<tokio::sync::Mutex<()>>,
}

impl SessionCache {
    /// Create a cache with the default debounce interval
    pub fn new(api: ApiClient) -> Self {
        Self::with_debounce(api, DEFAULT_DEBOUNCE)
    }

    /// Create a cache with a custom debounce interval
    pub fn with_debounce(api: ApiClient, debounce: Duration) -> Self {
        let (events_tx, _) = broadcast::channel(16);
        Self {
            api,
            document: Arc::new(Mutex::new(SettingsDocument::new())),
            writers: Arc::new(Mutex::new(HashMap::new())),
            debounce,
            events_tx,
            sync_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Synchronous read of the last known cached value, or `default` if the
    /// key was never cached. Never blocks on the network.
    pub fn get(&self, key: &str, default: Value) -> Value {
        self.document.lock().get(Some(key)).unwrap_or(default)
    }

    /// Synchronous read without a default
    pub fn get_opt(&self, key: &str) -> Option<Value> {
        self.document.lock().get(Some(key))
    }

    /// Write to the cache immediately and schedule a debounced network
    /// write. Another `set` for the same key within the interval cancels
    /// and restarts the pending write, so only the final value goes out.
    pub fn set(&self, key: &str, value: Value) {
        self.document.lock().set(Some(key), value.clone());

        let mut writers = self.writers.lock();
        if let Some(prev) = writers.remove(key) {
            prev.abort();
        }

        let api = self.api.clone();
        let debounce = self.debounce;
        let task_key = key.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Err(e) = api.set_state_at(&task_key, value).await {
                // Keep the optimistic local value; the next user write or
                // full sync reconciles
                warn!("Failed to sync '{}' to controller: {}", task_key, e);
            }
        });
        writers.insert(key.to_string(), handle);
    }

    /// Fetch the full canonical snapshot and fold it into the cache. Keys
    /// whose cached value differs are updated; if anything changed, one
    /// repopulate signal is raised (never one per key).
    pub async fn sync_from_server(&self) -> Result<()> {
        let _guard = self.sync_lock.lock().await;

        let snapshot = match self.api.get_state(None).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to sync from controller: {}", e);
                return Err(e);
            }
        };

        let mut changed = false;
        {
            let mut document = self.document.lock();
            for (key, value) in flatten_value(&snapshot) {
                if key.is_empty() {
                    continue;
                }
                if !document.set(Some(key.as_str()), value).is_empty() {
                    changed = true;
                }
            }
        }

        if changed {
            let _ = self.events_tx.send(CacheEvent::Repopulate);
        }
        Ok(())
    }

    /// Apply a change notification pushed by the controller.
    ///
    /// For each key, the value is applied only if it differs from the
    /// cached one; `null` drops the entry. One repopulate signal is raised
    /// if anything changed. This path never arms the debounced writer, so
    /// a session's own change echoed back cannot start a write loop.
    pub fn handle_remote_change(&self, changes: &ChangeSet) {
        let mut changed = false;
        {
            let mut document = self.document.lock();
            // BTreeMap iteration applies multiple keys in dotted-key order
            for (key, value) in changes {
                match value.inner() {
                    Value::Null => {
                        if document.unset(key).is_some() {
                            changed = true;
                        }
                    }
                    value => {
                        if !document.set(Some(key.as_str()), value.clone()).is_empty() {
                            changed = true;
                        }
                    }
                }
            }
        }

        if changed {
            let _ = self.events_tx.send(CacheEvent::Repopulate);
        }
    }

    /// Remove a key locally and issue an immediate (non-debounced) delete.
    ///
    /// A key the controller never had is an expected condition and is
    /// swallowed; transport failures are logged and returned, with the
    /// local removal kept either way.
    pub async fn unset(&self, key: &str) -> Result<()> {
        self.document.lock().unset(key);

        // A pending debounced write would resurrect the key
        if let Some(prev) = self.writers.lock().remove(key) {
            prev.abort();
        }

        match self.api.unset_state(key).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("Unset '{}': controller never had it", key);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to unset '{}' on controller: {}", key, e);
                Err(e)
            }
        }
    }

    /// Spawn the task that feeds controller change notifications into this
    /// cache. A lagged subscription (missed broadcasts) falls back to a
    /// full sync.
    pub fn spawn_remote_listener(&self) -> JoinHandle<()> {
        let cache = self.clone();
        let mut changes_rx = cache.api.subscribe_changes();
        tokio::spawn(async move {
            loop {
                match changes_rx.recv().await {
                    Ok(changes) => cache.handle_remote_change(&changes),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Missed {} change notifications, resyncing", missed);
                        let _ = cache.sync_from_server().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Subscribe to repopulate signals
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events_tx.subscribe()
    }

    /// Number of debounced writes not yet sent
    pub fn pending_writes(&self) -> usize {
        self.writers
            .lock()
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Abort all pending debounced writes (session teardown)
    pub fn destroy(&self) {
        let mut writers = self.writers.lock();
        for (_, handle) in writers.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_mock_controller;
    use gantry_protocol::{ClientKind, JsonValue};
    use serde_json::json;

    const TEST_DEBOUNCE: Duration = Duration::from_millis(50);

    async fn connected_cache() -> (crate::test_support::MockController, SessionCache) {
        let controller = spawn_mock_controller().await;
        let api = ApiClient::connect(&controller.addr, ClientKind::Desktop)
            .await
            .unwrap();
        let cache = SessionCache::with_debounce(api, TEST_DEBOUNCE);
        (controller, cache)
    }

    fn change_set(key: &str, value: Value) -> ChangeSet {
        let mut changes = ChangeSet::new();
        changes.insert(key.to_string(), JsonValue::new(value));
        changes
    }

    // ==================== Read Tests ====================

    #[tokio::test]
    async fn test_get_uncached_returns_default() {
        let (_controller, cache) = connected_cache().await;
        assert_eq!(cache.get("workspace.units", json!("mm")), json!("mm"));
        assert_eq!(cache.get_opt("workspace.units"), None);
    }

    #[tokio::test]
    async fn test_set_is_visible_immediately() {
        let (_controller, cache) = connected_cache().await;
        cache.set("workspace.units", json!("in"));
        // No await between set and get: the local cache already has it
        assert_eq!(cache.get("workspace.units", json!("mm")), json!("in"));
    }

    // ==================== Debounce Tests ====================

    #[tokio::test]
    async fn test_burst_of_sets_coalesces_to_one_write() {
        let (controller, cache) = connected_cache().await;

        for step in 0..5 {
            cache.set("jog.feedRate", json!(1000 + step));
        }
        assert_eq!(cache.pending_writes(), 1);

        tokio::time::sleep(TEST_DEBOUNCE * 4).await;

        // Exactly one outbound write, carrying the final value
        let writes = controller.set_requests();
        assert_eq!(writes.len(), 1);
        assert_eq!(
            controller.document().get(Some("jog.feedRate")),
            Some(json!(1004))
        );
    }

    #[tokio::test]
    async fn test_sets_to_different_keys_do_not_coalesce() {
        let (controller, cache) = connected_cache().await;

        cache.set("jog.feedRate", json!(1000));
        cache.set("jog.stepSize", json!(0.1));
        assert_eq!(cache.pending_writes(), 2);

        tokio::time::sleep(TEST_DEBOUNCE * 4).await;

        assert_eq!(controller.set_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_write_failure_keeps_local_value() {
        let (controller, cache) = connected_cache().await;

        cache.set("theme", json!("dark"));
        controller.shutdown();

        tokio::time::sleep(TEST_DEBOUNCE * 4).await;

        // The optimistic local value survives the failed push
        assert_eq!(cache.get("theme", json!("light")), json!("dark"));
    }

    // ==================== Remote Change Tests ====================

    #[tokio::test]
    async fn test_remote_change_updates_cache_and_signals_once() {
        let (_controller, cache) = connected_cache().await;
        let mut events = cache.subscribe();

        let mut changes = ChangeSet::new();
        changes.insert("theme".into(), JsonValue::new(json!("dark")));
        changes.insert("workspace.units".into(), JsonValue::new(json!("in")));
        cache.handle_remote_change(&changes);

        assert_eq!(cache.get("theme", json!("light")), json!("dark"));
        assert_eq!(cache.get("workspace.units", json!("mm")), json!("in"));

        // One signal for the whole notification, not one per key
        assert_eq!(events.try_recv().unwrap(), CacheEvent::Repopulate);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remote_change_matching_cache_is_a_no_op() {
        let (_controller, cache) = connected_cache().await;
        cache.set("theme", json!("dark"));
        tokio::time::sleep(TEST_DEBOUNCE * 4).await;

        let mut events = cache.subscribe();
        let before = cache.pending_writes();

        // The session's own change echoed back
        cache.handle_remote_change(&change_set("theme", json!("dark")));

        // No signal, and no outbound write armed: loop freedom
        assert!(events.try_recv().is_err());
        assert_eq!(cache.pending_writes(), before);
    }

    #[tokio::test]
    async fn test_remote_null_drops_entry() {
        let (_controller, cache) = connected_cache().await;
        cache.set("workspace.park", json!({"x": 0}));

        cache.handle_remote_change(&change_set("workspace.park", Value::Null));
        assert_eq!(cache.get_opt("workspace.park"), None);
    }

    // ==================== Sync Tests ====================

    #[tokio::test]
    async fn test_sync_from_server_populates_and_signals() {
        let (controller, cache) = connected_cache().await;
        controller.seed(json!({"workspace": {"units": "mm", "safeHeight": 10.0}}));

        let mut events = cache.subscribe();
        cache.sync_from_server().await.unwrap();

        assert_eq!(cache.get("workspace.units", json!("in")), json!("mm"));
        assert_eq!(events.try_recv().unwrap(), CacheEvent::Repopulate);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sync_with_no_differences_raises_no_signal() {
        let (controller, cache) = connected_cache().await;
        controller.seed(json!({"theme": "dark"}));

        cache.sync_from_server().await.unwrap();
        let mut events = cache.subscribe();

        // Second sync finds nothing new
        cache.sync_from_server().await.unwrap();
        assert!(events.try_recv().is_err());
    }

    // ==================== Unset Tests ====================

    #[tokio::test]
    async fn test_unset_is_immediate_and_tolerates_missing() {
        let (controller, cache) = connected_cache().await;
        cache.set("workspace.park", json!({"x": 0}));
        tokio::time::sleep(TEST_DEBOUNCE * 4).await;

        cache.unset("workspace.park").await.unwrap();
        assert_eq!(cache.get_opt("workspace.park"), None);
        assert!(!controller.document().contains("workspace.park"));

        // Unsetting a key the controller never had is not an error
        cache.unset("never.written").await.unwrap();
    }

    #[tokio::test]
    async fn test_unset_cancels_pending_write_for_key() {
        let (controller, cache) = connected_cache().await;

        cache.set("workspace.park", json!({"x": 0}));
        cache.unset("workspace.park").await.unwrap();

        tokio::time::sleep(TEST_DEBOUNCE * 4).await;

        // The staged write must not resurrect the key
        assert!(!controller.document().contains("workspace.park"));
    }

    // ==================== Listener Tests ====================

    #[tokio::test]
    async fn test_remote_listener_feeds_cache() {
        let controller = spawn_mock_controller().await;
        let api_a = ApiClient::connect(&controller.addr, ClientKind::Desktop)
            .await
            .unwrap();
        let api_b = ApiClient::connect(&controller.addr, ClientKind::Browser)
            .await
            .unwrap();

        let cache_b = SessionCache::with_debounce(api_b, TEST_DEBOUNCE);
        let _task = cache_b.spawn_remote_listener();
        let mut events = cache_b.subscribe();

        api_a.set_state_at("theme", json!("dark")).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("no repopulate signal")
            .unwrap();
        assert_eq!(cache_b.get("theme", json!("light")), json!("dark"));
    }

    #[tokio::test]
    async fn test_destroy_aborts_pending_writes() {
        let (controller, cache) = connected_cache().await;

        cache.set("theme", json!("dark"));
        cache.destroy();

        tokio::time::sleep(TEST_DEBOUNCE * 4).await;
        assert!(controller.set_requests().is_empty());
    }
}
