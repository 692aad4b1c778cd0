//! Per-service connection sequences for modulo routing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::connection::Connection;
use crate::method::service_key;

/// A point-in-time view of one service's connections, ascending by id.
pub type ConnectionList<C> = Arc<[Arc<C>]>;

/// Maps `package.Service` to its connections, ascending by connection id.
///
/// Every write builds a fresh sequence, so a [`ConnectionList`] handed out by
/// [`ServiceConnectionIndex::get`] never changes underneath its holder. The
/// ordering does not depend on insertion history, which keeps a shard key
/// pinned to the same position across processes.
pub struct ServiceConnectionIndex<C> {
    services: HashMap<String, ConnectionList<C>>,
}

impl<C: Connection> ServiceConnectionIndex<C> {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
        }
    }

    /// Appends `conn` to the service and re-sorts by connection id.
    ///
    /// Does nothing if the service already lists this connection.
    pub fn add(&mut self, package: &str, service: &str, conn: Arc<C>) {
        let key = service_key(package, service);

        let mut list: Vec<Arc<C>> = match self.services.get(&key) {
            Some(existing) if existing.iter().any(|listed| Arc::ptr_eq(listed, &conn)) => return,
            Some(existing) => existing.to_vec(),
            None => Vec::new(),
        };
        list.push(conn);
        list.sort_by(|a, b| a.id().cmp(b.id()));

        self.services.insert(key, list.into());
    }

    /// Removes `conn` from every service that lists it.
    ///
    /// Services left without connections are dropped. Returns how many
    /// services listed the connection.
    pub fn del(&mut self, conn: &Arc<C>) -> usize {
        let mut removed = 0;

        self.services.retain(|_, list| {
            if !list.iter().any(|candidate| Arc::ptr_eq(candidate, conn)) {
                return true;
            }

            removed += 1;
            let remaining: Vec<Arc<C>> = list
                .iter()
                .filter(|candidate| !Arc::ptr_eq(*candidate, conn))
                .cloned()
                .collect();

            if remaining.is_empty() {
                false
            } else {
                *list = remaining.into();
                true
            }
        });

        removed
    }

    /// Returns the current connections for `package.Service`.
    pub fn get(&self, service_key: &str) -> Option<ConnectionList<C>> {
        self.services.get(service_key).cloned()
    }

    /// Number of services with at least one connection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether no service has a connection.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl<C: Connection> Default for ServiceConnectionIndex<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for ServiceConnectionIndex<C> {
    fn clone(&self) -> Self {
        Self {
            services: self.services.clone(),
        }
    }
}

impl<C: Connection> fmt::Debug for ServiceConnectionIndex<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.services.iter().map(|(service, list)| {
                (service, list.iter().map(|conn| conn.id()).collect::<Vec<_>>())
            }))
            .finish()
    }
}
