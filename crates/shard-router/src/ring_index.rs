//! Per-service hash rings for ring-hash routing.

use std::collections::HashMap;
use std::sync::Arc;

use crate::method::service_key;
use crate::registry::ConnectionRegistry;
use crate::ring::HashRing;

/// Maps `package.Service` to the current version of its hash ring.
///
/// Ring nodes are canonical server identity strings. Each write replaces the
/// stored `Arc<HashRing>` with a new version; older versions stay valid for
/// whoever holds them.
#[derive(Clone, Debug)]
pub struct RingIndex {
    virtual_nodes: usize,
    rings: HashMap<String, Arc<HashRing>>,
}

impl RingIndex {
    /// Creates an empty index whose rings use `virtual_nodes` units per node.
    #[must_use]
    pub fn new(virtual_nodes: usize) -> Self {
        Self {
            virtual_nodes,
            rings: HashMap::new(),
        }
    }

    /// Adds `node` to the service's ring, creating the ring if needed.
    pub fn add(&mut self, package: &str, service: &str, node: impl Into<String>) {
        let key = service_key(package, service);
        let current = self
            .rings
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Arc::new(HashRing::with_virtual_nodes(self.virtual_nodes)));

        self.rings.insert(key, current.add_node(node.into()));
    }

    /// Removes `node` from the service's ring.
    ///
    /// Does nothing if the service has no ring. A ring left without nodes is
    /// dropped.
    pub fn del(&mut self, package: &str, service: &str, node: &str) {
        let key = service_key(package, service);
        let Some(current) = self.rings.get(&key) else {
            return;
        };

        let next = current.remove_node(node);
        if next.is_empty() {
            self.rings.remove(&key);
        } else {
            self.rings.insert(key, next);
        }
    }

    /// Resolves `key` to a live connection: ring, then node, then registry.
    ///
    /// Returns `None` if any stage misses.
    pub fn get<C>(
        &self,
        package: &str,
        service: &str,
        key: &str,
        registry: &ConnectionRegistry<C>,
    ) -> Option<Arc<C>> {
        let ring = self.rings.get(&service_key(package, service))?;
        let node = ring.get_node(key)?;
        registry.find(node)
    }

    /// Returns the current ring version for `package.Service`.
    pub fn ring(&self, service_key: &str) -> Option<Arc<HashRing>> {
        self.rings.get(service_key).cloned()
    }

    /// Number of services with a ring.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rings.len()
    }

    /// Whether no service has a ring.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }
}
