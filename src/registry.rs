//! Ordered stub registry.
//!
//! Insertion order is match priority. Readers take a snapshot, so a matcher
//! never sees a half-applied registration.

use crate::stub::{Stub, StubBuilder};
use hyper::Method;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
pub struct StubRegistry {
    stubs: RwLock<Vec<Arc<Stub>>>,
}

impl StubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start declaring a stub that registers here when finalized.
    pub fn stub(self: &Arc<Self>, method: Method, path: impl Into<String>) -> StubBuilder {
        StubBuilder::attached(Arc::clone(self), method, path)
    }

    pub fn add(&self, stub: Arc<Stub>) {
        debug!(method = %stub.method(), path = %stub.path(), "Registering stub");
        self.stubs.write().push(stub);
    }

    /// Drop every stub. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let removed = std::mem::take(&mut *self.stubs.write());
        removed.len()
    }

    /// Stubs in registration order.
    pub fn snapshot(&self) -> Vec<Arc<Stub>> {
        self.stubs.read().clone()
    }

    /// First stub registered for (method, path), ignoring constraints.
    pub fn find(&self, method: &Method, path: &str) -> Option<Arc<Stub>> {
        self.stubs
            .read()
            .iter()
            .find(|stub| stub.is_endpoint_match(method, path))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.stubs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_order_is_kept() {
        let registry = Arc::new(StubRegistry::new());
        registry.stub(Method::GET, "/first").ok();
        registry.stub(Method::GET, "/second").ok();
        registry.stub(Method::POST, "/third").ok();

        let paths: Vec<_> = registry
            .snapshot()
            .iter()
            .map(|s| s.path().to_string())
            .collect();
        assert_eq!(paths, vec!["/first", "/second", "/third"]);
    }

    #[test]
    fn test_find_ignores_constraints() {
        let registry = Arc::new(StubRegistry::new());
        registry
            .stub(Method::POST, "/orders")
            .with_body_constraint(|_: &str| false)
            .returns("first")
            .ok();
        registry.stub(Method::POST, "/orders").returns("second").ok();

        let found = registry.find(&Method::POST, "/orders").unwrap();
        assert!(!found.can_verify_constraints_for("/orders", ""));
        assert!(registry.find(&Method::GET, "/orders").is_none());
    }

    #[test]
    fn test_clear() {
        let registry = Arc::new(StubRegistry::new());
        registry.stub(Method::GET, "/a").ok();
        registry.stub(Method::GET, "/b").ok();

        let snapshot = registry.snapshot();
        assert_eq!(registry.clear(), 2);
        assert!(registry.is_empty());
        // Earlier snapshots are unaffected
        assert_eq!(snapshot.len(), 2);

        registry.stub(Method::GET, "/c").ok();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_append_and_iterate() {
        let registry = Arc::new(StubRegistry::new());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        registry.stub(Method::GET, format!("/w{w}/{i}")).ok();
                    }
                })
            })
            .collect();
        let reader = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for _ in 0..100 {
                    let snapshot = registry.snapshot();
                    assert!(snapshot.iter().all(|s| s.path().starts_with("/w")));
                }
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        reader.join().unwrap();
        assert_eq!(registry.len(), 400);
    }
}
