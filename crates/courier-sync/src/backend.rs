use async_trait::async_trait;
use courier_core::{CourierResult, Priority};
use std::collections::HashMap;
use std::sync::Arc;

/// A single dispatch handed to an execution backend.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Capability key the dispatch was routed under.
    pub entry_type: String,
    /// Opaque payload for the backend.
    pub payload: serde_json::Value,
    /// Urgency carried from the originating task.
    pub priority: Priority,
}

impl DispatchRequest {
    /// Build a request.
    pub fn new(
        entry_type: impl Into<String>,
        payload: serde_json::Value,
        priority: Priority,
    ) -> Self {
        Self {
            entry_type: entry_type.into(),
            payload,
            priority,
        }
    }
}

/// One callable per agent capability.
///
/// Backends are the only network-bound seam in the system; the sync engine
/// wraps every call in a timeout and treats timeouts as transport failures.
/// Tests implement this trait to inject deterministic success or failure.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Perform the work and return a result payload.
    async fn execute(&self, request: &DispatchRequest) -> CourierResult<serde_json::Value>;
}

/// Registry mapping capability keys to execution backends.
///
/// Resolution falls back to the default backend (when configured) so that a
/// generalized handler can absorb capabilities without a dedicated backend.
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn ExecutionBackend>>,
    fallback: Option<Arc<dyn ExecutionBackend>>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend for a capability key. Replaces any previous binding.
    pub fn register(&mut self, key: impl Into<String>, backend: Arc<dyn ExecutionBackend>) {
        self.backends.insert(key.into(), backend);
    }

    /// Set the fallback backend used when no key matches.
    pub fn set_fallback(&mut self, backend: Arc<dyn ExecutionBackend>) {
        self.fallback = Some(backend);
    }

    /// Resolve a backend for the given key, falling back if configured.
    pub fn resolve(&self, key: &str) -> Option<Arc<dyn ExecutionBackend>> {
        self.backends
            .get(key)
            .cloned()
            .or_else(|| self.fallback.clone())
    }

    /// Number of keyed backends (excluding the fallback).
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// True when no keyed backend is registered.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct EchoBackend;

    #[async_trait]
    impl ExecutionBackend for EchoBackend {
        async fn execute(&self, request: &DispatchRequest) -> CourierResult<serde_json::Value> {
            Ok(serde_json::json!({ "echo": request.entry_type }))
        }
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let mut registry = BackendRegistry::new();
        registry.register("order_groceries", Arc::new(EchoBackend));
        assert_eq!(registry.len(), 1);

        let backend = registry.resolve("order_groceries").unwrap();
        let request = DispatchRequest::new(
            "order_groceries",
            serde_json::json!({}),
            Priority::Medium,
        );
        let result = backend.execute(&request).await.unwrap();
        assert_eq!(result["echo"], "order_groceries");
    }

    #[test]
    fn test_resolve_unknown_without_fallback() {
        let registry = BackendRegistry::new();
        assert!(registry.resolve("missing").is_none());
    }

    #[test]
    fn test_fallback_absorbs_unknown_keys() {
        let mut registry = BackendRegistry::new();
        registry.set_fallback(Arc::new(EchoBackend));
        assert!(registry.resolve("anything").is_some());
        assert!(registry.is_empty());
    }
}
