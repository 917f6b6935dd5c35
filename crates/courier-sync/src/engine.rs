use crate::backend::{BackendRegistry, DispatchRequest};
use crate::connectivity::ConnectivityMonitor;
use crate::entry::{EntryStatus, OfflineEntry};
use crate::safety::SafetyClassifier;
use crate::store::OfflineStore;
use courier_core::{CourierError, CourierResult, Priority};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Default periodic sync interval.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Default per-dispatch timeout, after which an attempt counts as a
/// transport failure.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(8);

/// Outcome of one sync pass.
///
/// `failed` counts entries that did not sync this pass: transport failures
/// (which return to `pending` for a later pass) and entries dropped for an
/// exhausted retry budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Entries delivered during this pass.
    pub synced: usize,
    /// Entries that failed or were dropped during this pass.
    pub failed: usize,
}

/// Per-status counts over the durable store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Entries awaiting a sync pass.
    pub pending: usize,
    /// Entries with a dispatch in flight.
    pub syncing: usize,
    /// Entries delivered successfully.
    pub completed: usize,
    /// Entries terminally failed.
    pub failed: usize,
    /// Total entries in the store.
    pub total: usize,
}

/// Offline-resilient sync engine.
///
/// Persists entries before any dispatch attempt (crash safety), replays
/// pending entries in insertion order with bounded retries, and runs a
/// cancellable periodic timer so a missed connectivity event still drains the
/// queue eventually. `sync_all` is single-flight: an overlapping call is
/// dropped rather than double-submitting entries.
pub struct SyncEngine {
    store: Arc<dyn OfflineStore>,
    backends: Arc<BackendRegistry>,
    classifier: SafetyClassifier,
    connectivity: ConnectivityMonitor,
    sync_gate: Mutex<()>,
    /// Entries with a dispatch in flight in this process. Claimed before any
    /// store access so concurrent callers cannot double-submit an entry.
    in_flight: Mutex<HashSet<Uuid>>,
    dispatch_timeout: Duration,
    sync_interval: Duration,
}

impl SyncEngine {
    /// Create an engine over the given store, backends, and connectivity
    /// signal, with default timeout and interval.
    pub fn new(
        store: Arc<dyn OfflineStore>,
        backends: Arc<BackendRegistry>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        Self {
            store,
            backends,
            classifier: SafetyClassifier::new(),
            connectivity,
            sync_gate: Mutex::new(()),
            in_flight: Mutex::new(HashSet::new()),
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
            sync_interval: DEFAULT_SYNC_INTERVAL,
        }
    }

    /// Override the per-dispatch timeout.
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    /// Override the periodic sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// The connectivity signal this engine observes.
    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Whether this type/payload may be deferred to the offline store.
    pub fn is_safe_for_offline(&self, entry_type: &str, payload: &serde_json::Value) -> bool {
        self.classifier.is_safe_for_offline(entry_type, payload)
    }

    /// Execute a dispatch immediately, bounded by the engine timeout.
    ///
    /// A missing backend or an elapsed timeout both surface as
    /// [`CourierError::Transport`], keeping them on the recoverable path.
    pub async fn dispatch(&self, request: &DispatchRequest) -> CourierResult<serde_json::Value> {
        let backend = self.backends.resolve(&request.entry_type).ok_or_else(|| {
            CourierError::Transport(format!(
                "no execution backend for '{}'",
                request.entry_type
            ))
        })?;

        match tokio::time::timeout(self.dispatch_timeout, backend.execute(request)).await {
            Ok(result) => result,
            Err(_) => Err(CourierError::Transport(format!(
                "dispatch of '{}' timed out after {:?}",
                request.entry_type, self.dispatch_timeout
            ))),
        }
    }

    /// Queue a task for deferred execution.
    ///
    /// The entry is vetted by the safety classifier, persisted first, and —
    /// when currently online — dispatched immediately as a best effort. The
    /// entry ID is returned either way; a failed immediate attempt leaves the
    /// entry pending with its retry count advanced.
    pub async fn enqueue(
        &self,
        entry_type: impl Into<String>,
        payload: serde_json::Value,
        priority: Priority,
    ) -> CourierResult<Uuid> {
        let entry_type = entry_type.into();
        self.classifier.check(&entry_type, &payload)?;

        let entry = OfflineEntry::new(entry_type, payload, priority);
        let id = entry.id;
        self.store.put(&entry).await?;
        info!(entry = %id, entry_type = %entry.entry_type, "offline entry persisted");

        if self.connectivity.is_online() {
            match self.dispatch_pending(id).await {
                Ok(true) => info!(entry = %id, "immediate dispatch succeeded"),
                Ok(false) => warn!(entry = %id, "immediate dispatch failed; entry left pending"),
                Err(e) => warn!(entry = %id, error = %e, "immediate dispatch errored"),
            }
        }

        Ok(id)
    }

    /// Attempt to sync one specific entry.
    ///
    /// Returns `Ok(true)` when the entry is (now) completed, `Ok(false)` when
    /// the attempt failed and the entry went back to pending, and
    /// [`CourierError::RetryLimitExceeded`] for a terminally failed entry.
    pub async fn sync_one(&self, id: Uuid) -> CourierResult<bool> {
        let entry = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| CourierError::NotFound(format!("offline entry {id}")))?;

        match entry.status {
            EntryStatus::Completed => Ok(true),
            EntryStatus::Syncing => Ok(false),
            EntryStatus::Failed => Err(CourierError::RetryLimitExceeded(id)),
            EntryStatus::Pending => {
                if entry.retries_exhausted() {
                    self.mark_failed(entry).await?;
                    Err(CourierError::RetryLimitExceeded(id))
                } else {
                    self.dispatch_pending(id).await
                }
            }
        }
    }

    /// Run one sync pass over all pending entries, in insertion order.
    ///
    /// Returns `Ok(None)` when another pass is already in flight (the call is
    /// dropped; entries are never double-submitted). Entries left in `syncing`
    /// by a crashed process are reset to `pending` first so they re-enter the
    /// retry state machine. Entries at their retry budget are marked failed
    /// and skipped; transport failures return the entry to pending for a
    /// later pass. Storage errors abort the pass.
    pub async fn sync_all(&self) -> CourierResult<Option<SyncReport>> {
        let Ok(_guard) = self.sync_gate.try_lock() else {
            info!("sync pass already in flight; dropping overlapping call");
            return Ok(None);
        };

        self.recover_stale_syncing().await?;

        let pending = self.store.list_by_status(EntryStatus::Pending).await?;
        let mut report = SyncReport::default();

        for entry in pending {
            if entry.retries_exhausted() {
                let id = entry.id;
                self.mark_failed(entry).await?;
                warn!(
                    entry = %id,
                    error = %CourierError::RetryLimitExceeded(id),
                    "offline entry dropped"
                );
                report.failed += 1;
                continue;
            }

            if self.dispatch_pending(entry.id).await? {
                report.synced += 1;
            } else {
                report.failed += 1;
            }
        }

        info!(synced = report.synced, failed = report.failed, "sync pass complete");
        Ok(Some(report))
    }

    /// Notify the engine that connectivity returned; drains the queue.
    pub async fn on_connectivity_restored(&self) -> CourierResult<Option<SyncReport>> {
        self.connectivity.set_online(true);
        self.sync_all().await
    }

    /// Per-status counts over the durable store.
    pub async fn statistics(&self) -> CourierResult<SyncStats> {
        let entries = self.store.list().await?;
        let mut stats = SyncStats {
            total: entries.len(),
            ..SyncStats::default()
        };
        for entry in &entries {
            match entry.status {
                EntryStatus::Pending => stats.pending += 1,
                EntryStatus::Syncing => stats.syncing += 1,
                EntryStatus::Completed => stats.completed += 1,
                EntryStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    /// Start the periodic sync timer.
    ///
    /// The spawned task runs `sync_all` every interval while online, drains
    /// the queue immediately when connectivity is restored, and exits when
    /// the shutdown channel fires — no dangling timers on shutdown.
    pub fn spawn(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut conn_rx = engine.connectivity.subscribe();
            let first_tick = tokio::time::Instant::now() + engine.sync_interval;
            let mut ticker = tokio::time::interval_at(first_tick, engine.sync_interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if engine.connectivity.is_online() {
                            if let Err(e) = engine.sync_all().await {
                                error!(error = %e, "periodic sync pass failed");
                            }
                        }
                    }
                    changed = conn_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if *conn_rx.borrow_and_update() {
                            info!("connectivity restored; draining offline queue");
                            if let Err(e) = engine.sync_all().await {
                                error!(error = %e, "restore-triggered sync failed");
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("sync timer stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Reset entries stuck in `syncing` back to `pending`.
    ///
    /// An entry is durably marked `syncing` before its dispatch, so a crash
    /// between that write and the post-dispatch update strands it there. Any
    /// `syncing` entry without an in-process dispatch is such a leftover; its
    /// retry count is not advanced (the attempt's outcome is unknown).
    async fn recover_stale_syncing(&self) -> CourierResult<()> {
        let stuck = self.store.list_by_status(EntryStatus::Syncing).await?;
        for mut entry in stuck {
            if self.in_flight.lock().await.contains(&entry.id) {
                continue;
            }
            warn!(entry = %entry.id, "recovering entry left in syncing; returning to pending");
            entry.status = EntryStatus::Pending;
            self.store.update(&entry).await?;
        }
        Ok(())
    }

    /// Dispatch one pending entry through its backend.
    ///
    /// The entry id is claimed in an in-process set before any store access,
    /// so a sync pass racing an immediate dispatch (or `sync_one`) of the
    /// same entry cannot double-submit it; the losing caller backs off with
    /// `Ok(false)`. Returns whether the entry completed.
    async fn dispatch_pending(&self, id: Uuid) -> CourierResult<bool> {
        if !self.in_flight.lock().await.insert(id) {
            return Ok(false);
        }
        let result = self.dispatch_claimed(id).await;
        self.in_flight.lock().await.remove(&id);
        result
    }

    async fn dispatch_claimed(&self, id: Uuid) -> CourierResult<bool> {
        let mut entry = match self.store.get(id).await? {
            Some(entry) => entry,
            None => return Err(CourierError::NotFound(format!("offline entry {id}"))),
        };
        if entry.status != EntryStatus::Pending {
            return Ok(entry.status == EntryStatus::Completed);
        }

        entry.status = EntryStatus::Syncing;
        self.store.update(&entry).await?;

        let request = DispatchRequest::new(
            entry.entry_type.clone(),
            entry.payload.clone(),
            entry.priority,
        );

        match self.dispatch(&request).await {
            Ok(_result) => {
                entry.status = EntryStatus::Completed;
                self.store.update(&entry).await?;
                info!(entry = %entry.id, entry_type = %entry.entry_type, "offline entry synced");
                Ok(true)
            }
            Err(e) => {
                entry.retry_count += 1;
                entry.status = EntryStatus::Pending;
                self.store.update(&entry).await?;
                warn!(
                    entry = %entry.id,
                    retry_count = entry.retry_count,
                    max_retries = entry.max_retries,
                    error = %e,
                    "dispatch failed; entry returned to pending"
                );
                Ok(false)
            }
        }
    }

    async fn mark_failed(&self, mut entry: OfflineEntry) -> CourierResult<()> {
        entry.status = EntryStatus::Failed;
        self.store.update(&entry).await
    }
}
