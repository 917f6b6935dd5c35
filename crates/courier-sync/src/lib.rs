//! Offline-resilient sync queue for the Courier task dispatcher.
//!
//! Tasks that cannot be executed while the device is offline are persisted as
//! [`OfflineEntry`] records in a durable store and replayed with bounded
//! retries once connectivity returns. The crate provides:
//!
//! - [`OfflineStore`] — durable key-value seam with a status index, with
//!   in-memory and SQLite backends.
//! - [`SafetyClassifier`] — policy gate that keeps financial payloads and
//!   sensitive data out of the at-rest queue.
//! - [`ExecutionBackend`] / [`BackendRegistry`] — pluggable per-capability
//!   execution seam so tests inject deterministic outcomes.
//! - [`SyncEngine`] — the retry state machine, single-flight sync passes, and
//!   the cancellable periodic sync timer.

/// Pluggable execution backends keyed by capability.
pub mod backend;
/// Online/offline signal shared between host and engine.
pub mod connectivity;
/// The sync engine and its retry state machine.
pub mod engine;
/// The durable offline entry model.
pub mod entry;
/// Offline-deferral safety policy.
pub mod safety;
/// Durable store trait and backends.
pub mod store;

pub use backend::{BackendRegistry, DispatchRequest, ExecutionBackend};
pub use connectivity::ConnectivityMonitor;
pub use engine::{SyncEngine, SyncReport, SyncStats};
pub use entry::{EntryStatus, OfflineEntry};
pub use safety::SafetyClassifier;
pub use store::{MemoryOfflineStore, OfflineStore};

#[cfg(feature = "sqlite")]
pub use store::SqliteOfflineStore;
