use std::sync::Arc;
use tokio::sync::watch;

/// Shared online/offline flag.
///
/// The host environment flips the flag from its network-change events (or
/// polling); the sync engine reads it before dispatching and subscribes to
/// flips so a restored connection triggers an immediate sync pass.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    /// Create a monitor with the given initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Current connectivity state.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update the connectivity state. No-op notification when unchanged.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|state| {
            let changed = *state != online;
            *state = online;
            changed
        });
    }

    /// Subscribe to connectivity changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
