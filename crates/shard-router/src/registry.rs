//! Canonical server identity to connection registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Maps canonical server identity strings to live connections.
///
/// Holds at most one connection per identity. Connections are shared by
/// `Arc` and never copied.
pub struct ConnectionRegistry<C> {
    connections: HashMap<String, Arc<C>>,
}

impl<C> ConnectionRegistry<C> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }

    /// Registers `conn` under `id`, replacing any previous entry.
    ///
    /// Returns the replaced connection.
    pub fn add(&mut self, id: impl Into<String>, conn: Arc<C>) -> Option<Arc<C>> {
        self.connections.insert(id.into(), conn)
    }

    /// Returns a handle to the connection registered under `id`.
    pub fn find(&self, id: &str) -> Option<Arc<C>> {
        self.connections.get(id).cloned()
    }

    /// Borrows the connection registered under `id`.
    pub fn get(&self, id: &str) -> Option<&Arc<C>> {
        self.connections.get(id)
    }

    /// Whether a connection is registered under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    /// Removes and returns the connection registered under `id`.
    pub fn del(&mut self, id: &str) -> Option<Arc<C>> {
        self.connections.remove(id)
    }

    /// Visits every registered identity and connection.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Arc<C>),
    {
        for (id, conn) in &self.connections {
            f(id, conn);
        }
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl<C> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for ConnectionRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            connections: self.connections.clone(),
        }
    }
}

impl<C: fmt::Debug> fmt::Debug for ConnectionRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.connections.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestConnection;

    #[test]
    fn test_add_and_find() {
        let mut registry = ConnectionRegistry::new();
        let conn = TestConnection::shared("a");

        assert!(registry.add("000000001.svc.000000001", Arc::clone(&conn)).is_none());

        let found = registry.find("000000001.svc.000000001").unwrap();
        assert!(Arc::ptr_eq(&found, &conn));
        assert!(registry.get("000000001.svc.000000001").is_some());
        assert!(registry.find("000000001.svc.000000002").is_none());
        assert!(registry.get("000000001.svc.000000002").is_none());
    }

    #[test]
    fn test_add_is_last_write_wins() {
        let mut registry = ConnectionRegistry::new();
        let first = TestConnection::shared("a");
        let second = TestConnection::shared("b");

        registry.add("id", Arc::clone(&first));
        let replaced = registry.add("id", Arc::clone(&second)).unwrap();

        assert!(Arc::ptr_eq(&replaced, &first));
        assert!(Arc::ptr_eq(&registry.find("id").unwrap(), &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_del_removes_entry() {
        let mut registry = ConnectionRegistry::new();
        registry.add("id", TestConnection::shared("a"));

        assert!(registry.del("id").is_some());
        assert!(registry.del("id").is_none());
        assert!(!registry.contains("id"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_for_each_visits_all_entries() {
        let mut registry = ConnectionRegistry::new();
        registry.add("x", TestConnection::shared("a"));
        registry.add("y", TestConnection::shared("b"));

        let mut seen = Vec::new();
        registry.for_each(|id, conn| seen.push(format!("{id}={}", conn.name)));
        seen.sort();

        assert_eq!(seen, vec!["x=a", "y=b"]);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut registry = ConnectionRegistry::new();
        registry.add("x", TestConnection::shared("a"));

        let snapshot = registry.clone();
        registry.del("x");

        assert!(snapshot.contains("x"));
        assert!(!registry.contains("x"));
    }
}
