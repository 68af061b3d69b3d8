//! gantry-client: session-side settings engine
//!
//! Everything one UI session needs to stay in sync with the controller's
//! canonical settings store: a connection with a request/reply API client,
//! a local cache with a debounced write-through path, a batch coordinator
//! for grouped "apply all" actions, and the one-shot legacy settings
//! migration.
//!
//! Services are constructed explicitly and passed by reference; their
//! lifecycle is tied to session startup and teardown. There is no global
//! singleton to reach for.

pub mod api;
pub mod batch;
pub mod cache;
pub mod connection;
pub mod migration;

#[cfg(test)]
mod test_support;

pub use api::ApiClient;
pub use batch::{applier, ApplierFn, ApplierHandle, ApplierOutcome, BatchCoordinator, BatchReport};
pub use cache::{CacheEvent, SessionCache, DEFAULT_DEBOUNCE};
pub use connection::{Connection, ConnectionState};
pub use migration::{
    default_migration_table, LegacySettingsFile, LegacyStore, MigrationEntry, MigrationReport,
    MigrationRunner,
};
