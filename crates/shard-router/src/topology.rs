//! Immutable topology snapshots.
//!
//! The registry and both per-service indexes live together in one
//! [`Topology`]. The routing engine publishes whole snapshots, so a reader
//! never sees a connection that is registered but not yet indexed.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::connection::Connection;
use crate::identity::ServerIdentity;
use crate::method::service_key;
use crate::registry::ConnectionRegistry;
use crate::ring_index::RingIndex;
use crate::service_index::{ConnectionList, ServiceConnectionIndex};

/// One consistent view of every backend the router knows about.
pub struct Topology<C> {
    generation: u64,
    registry: ConnectionRegistry<C>,
    services: ServiceConnectionIndex<C>,
    rings: RingIndex,
    /// `(package, service)` pairs each identity node is registered for.
    memberships: HashMap<String, BTreeSet<(String, String)>>,
}

impl<C: Connection> Topology<C> {
    /// Creates an empty topology at generation zero.
    #[must_use]
    pub fn new(virtual_nodes: usize) -> Self {
        Self {
            generation: 0,
            registry: ConnectionRegistry::new(),
            services: ServiceConnectionIndex::new(),
            rings: RingIndex::new(virtual_nodes),
            memberships: HashMap::new(),
        }
    }

    /// Monotonic version of this snapshot. Bumped on every published change.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The identity to connection registry.
    #[must_use]
    pub const fn registry(&self) -> &ConnectionRegistry<C> {
        &self.registry
    }

    /// The per-service sorted connection index.
    #[must_use]
    pub const fn services(&self) -> &ServiceConnectionIndex<C> {
        &self.services
    }

    /// The per-service ring index.
    #[must_use]
    pub const fn rings(&self) -> &RingIndex {
        &self.rings
    }

    /// Connections for `package.Service`, ascending by id.
    pub fn connections(&self, service_key: &str) -> Option<ConnectionList<C>> {
        self.services.get(service_key)
    }

    /// Resolves `key` on the service's ring to a live connection.
    pub fn ring_lookup(&self, package: &str, service: &str, key: &str) -> Option<Arc<C>> {
        self.rings.get(package, service, key, &self.registry)
    }

    /// The `package.Service` keys `identity` is registered for, ascending.
    pub fn services_of(&self, identity: &ServerIdentity) -> Vec<String> {
        self.memberships
            .get(&identity.to_node())
            .map(|services| {
                services
                    .iter()
                    .map(|(package, service)| service_key(package, service))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Registers `conn` under `identity` and indexes it for the service.
    ///
    /// Registering the connection already held by the identity adds another
    /// service to it. Registering a different connection replaces the old
    /// one in every service the identity was registered for, and the old
    /// connection is returned.
    pub(crate) fn insert(
        &mut self,
        identity: &ServerIdentity,
        conn: Arc<C>,
        package: &str,
        service: &str,
    ) -> Option<Arc<C>> {
        let node = identity.to_node();

        let replaced = self
            .registry
            .add(node.clone(), Arc::clone(&conn))
            .filter(|previous| !Arc::ptr_eq(previous, &conn));

        if let Some(previous) = &replaced {
            self.services.del(previous);
            for (old_package, old_service) in self.memberships.remove(&node).unwrap_or_default() {
                self.rings.del(&old_package, &old_service, &node);
            }
        }

        self.services.add(package, service, conn);
        self.rings.add(package, service, node.clone());
        self.memberships
            .entry(node)
            .or_default()
            .insert((package.to_string(), service.to_string()));

        replaced
    }

    /// Unregisters `identity` and drops it from every service it was
    /// registered for.
    ///
    /// Returns the removed connection, or `None` if the identity is unknown.
    pub(crate) fn remove(
        &mut self,
        identity: &ServerIdentity,
        package: &str,
        service: &str,
    ) -> Option<Arc<C>> {
        let node = identity.to_node();

        let conn = self.registry.del(&node)?;
        self.services.del(&conn);

        let mut memberships = self.memberships.remove(&node).unwrap_or_default();
        memberships.insert((package.to_string(), service.to_string()));
        for (member_package, member_service) in &memberships {
            self.rings.del(member_package, member_service, &node);
        }

        Some(conn)
    }

    pub(crate) fn advance(&mut self) {
        self.generation += 1;
    }
}

impl<C> Clone for Topology<C> {
    fn clone(&self) -> Self {
        Self {
            generation: self.generation,
            registry: self.registry.clone(),
            services: self.services.clone(),
            rings: self.rings.clone(),
            memberships: self.memberships.clone(),
        }
    }
}

impl<C: Connection> fmt::Debug for Topology<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topology")
            .field("generation", &self.generation)
            .field("registry", &self.registry)
            .field("services", &self.services)
            .field("rings", &self.rings)
            .field("memberships", &self.memberships)
            .finish()
    }
}
