//! The routing engine.
//!
//! [`RoutingEngine`] owns the current [`Topology`] and the selector tables.
//! Selection reads the published snapshot without taking a lock. Membership
//! changes are serialized by a writer lock, applied to a private copy and
//! published as a whole, so a reader sees either all of a change or none of
//! it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use http::HeaderMap;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::config::{MethodConfig, RouterConfig};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::identity::ServerIdentity;
use crate::selector::SelectorRegistry;
use crate::shard_key::ShardKey;
use crate::topology::Topology;

/// Client-side shard router over a set of backend connections.
pub struct RoutingEngine<C> {
    topology: ArcSwap<Topology<C>>,
    writer: Mutex<()>,
    selectors: SelectorRegistry<C>,
    config: RouterConfig,
}

impl<C: Connection> RoutingEngine<C> {
    /// Create a new routing engine with no servers.
    ///
    /// # Errors
    ///
    /// Returns an error if any configured method is invalid. Nothing is
    /// routed until the configuration is fixed.
    pub fn new(config: RouterConfig) -> Result<Self> {
        let selectors = SelectorRegistry::from_config(&config).inspect_err(|e| {
            error!("Refusing to build routing tables: {}", e);
        })?;

        info!(
            "Routing engine ready with {} methods, {} virtual nodes per server",
            config.methods.len(),
            config.virtual_nodes
        );

        Ok(Self {
            topology: ArcSwap::from_pointee(Topology::new(config.virtual_nodes)),
            writer: Mutex::new(()),
            selectors,
            config,
        })
    }

    /// Registers a server connection for `package.Service`.
    ///
    /// The connection becomes visible to selection through the registry, the
    /// modulo list and the service's ring at the same time. Registering the
    /// same connection again under its identity adds another service to it.
    /// Registering a different connection replaces the old one in every
    /// service and returns it, left for the caller to release.
    pub fn add_server(
        &self,
        group_id: u32,
        server_name: &str,
        server_id: u32,
        conn: Arc<C>,
        package: &str,
        service: &str,
    ) -> Option<Arc<C>> {
        let identity = ServerIdentity::new(group_id, server_name, server_id);
        let conn_id = conn.id().to_string();

        let replaced = self
            .update(|topology| Some(topology.insert(&identity, conn, package, service)))
            .flatten();

        match &replaced {
            Some(previous) => warn!(
                "Replaced connection {} for {} on {}.{} with {}",
                previous.id(),
                identity,
                package,
                service,
                conn_id
            ),
            None => info!(
                "Added server {} on {}.{} via connection {}",
                identity, package, service, conn_id
            ),
        }

        replaced
    }

    /// Unregisters a server and releases its connection.
    ///
    /// The server leaves every service it was registered for. The connection
    /// is dropped from selection first, then disabled and stopped. A failure
    /// to stop is logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no server is registered under the
    /// identity.
    pub fn remove_server(
        &self,
        group_id: u32,
        server_name: &str,
        server_id: u32,
        package: &str,
        service: &str,
    ) -> Result<Arc<C>> {
        let identity = ServerIdentity::new(group_id, server_name, server_id);

        let (conn, services) = self
            .update(|topology| {
                let services = topology.services_of(&identity);
                let conn = topology.remove(&identity, package, service)?;
                Some((conn, services))
            })
            .ok_or_else(|| Error::not_found(format!("server {identity}")))?;

        conn.disable();
        if let Err(e) = conn.stop() {
            warn!("Failed to stop connection {} for {}: {}", conn.id(), identity, e);
        }

        info!("Removed server {} from {}", identity, services.join(", "));

        Ok(conn)
    }

    /// Selects a connection for `method` and records `key` in `metadata`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotExist`] if the method is not configured for this
    /// kind of key, [`Error::InvalidMethod`] for a malformed method name and
    /// [`Error::NotFound`] if the service has nothing to route to.
    pub fn select(
        &self,
        metadata: &mut HeaderMap,
        method: &str,
        key: impl Into<ShardKey>,
    ) -> Result<Arc<C>> {
        let topology = self.topology.load();
        self.selectors.select(&topology, metadata, method, &key.into())
    }

    /// Like [`RoutingEngine::select`] for a type-erased key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupport`] if `key` is not a supported shard key
    /// type, otherwise as [`RoutingEngine::select`].
    pub fn select_any(
        &self,
        metadata: &mut HeaderMap,
        method: &str,
        key: &dyn Any,
    ) -> Result<Arc<C>> {
        let key = ShardKey::from_any(key)?;
        self.select(metadata, method, key)
    }

    /// Returns the connection registered for a server, if any.
    pub fn find_server(&self, group_id: u32, server_name: &str, server_id: u32) -> Option<Arc<C>> {
        let identity = ServerIdentity::new(group_id, server_name, server_id);
        self.topology.load().registry().find(&identity.to_node())
    }

    /// The currently published topology.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Topology<C>> {
        self.topology.load_full()
    }

    /// Number of registered servers.
    #[must_use]
    pub fn server_count(&self) -> usize {
        self.topology.load().registry().len()
    }

    /// Validated settings for `method`, for an outer interceptor to apply.
    pub fn method_config(&self, method: &str) -> Option<&MethodConfig> {
        self.selectors.method_config(method)
    }

    /// The configuration the engine was built from.
    #[must_use]
    pub const fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Applies `change` to a copy of the topology. The copy is published
    /// under a new generation only if `change` returns `Some`.
    fn update<T>(&self, change: impl FnOnce(&mut Topology<C>) -> Option<T>) -> Option<T> {
        let _writer = self.writer.lock();

        let mut next = Topology::clone(&self.topology.load());
        let result = change(&mut next)?;

        next.advance();
        self.topology.store(Arc::new(next));

        Some(result)
    }
}

impl<C: Connection> fmt::Debug for RoutingEngine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingEngine")
            .field("topology", &self.topology.load_full())
            .field("selectors", &self.selectors)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::RawMethodConfig;
    use crate::error::ErrorKind;
    use crate::testing::TestConnection;

    const METHOD: &str = "/pkg.Svc/Get";

    fn engine(policy: &str, key_type: &str) -> RoutingEngine<TestConnection> {
        let config = RouterConfig::default().with_method(
            METHOD,
            RawMethodConfig::new(policy, key_type, Duration::from_secs(1)),
        );
        RoutingEngine::new(config).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = RouterConfig::default().with_method(
            METHOD,
            RawMethodConfig::new("mod", "float", Duration::from_secs(1)),
        );

        let err = RoutingEngine::<TestConnection>::new(config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupport);
    }

    #[test]
    fn test_add_and_select() {
        let engine = engine("mod", "string");
        engine.add_server(1, "svc", 1, TestConnection::shared("a"), "pkg", "Svc");

        let mut metadata = HeaderMap::new();
        let conn = engine.select(&mut metadata, METHOD, "user123").unwrap();

        assert_eq!(conn.name, "a");
        assert_eq!(engine.server_count(), 1);
        assert_eq!(engine.snapshot().generation(), 1);
    }

    #[test]
    fn test_add_replaces_existing_identity() {
        let engine = engine("mod", "uint32");
        let old = TestConnection::shared("old");
        engine.add_server(1, "svc", 1, Arc::clone(&old), "pkg", "Svc");

        let replaced = engine
            .add_server(1, "svc", 1, TestConnection::shared("new"), "pkg", "Svc")
            .unwrap();

        assert!(Arc::ptr_eq(&replaced, &old));
        assert!(!old.is_stopped());
        assert_eq!(engine.server_count(), 1);
        assert_eq!(engine.snapshot().generation(), 2);

        let mut metadata = HeaderMap::new();
        let conn = engine.select(&mut metadata, METHOD, 7u32).unwrap();
        assert_eq!(conn.name, "new");
    }

    #[test]
    fn test_same_connection_serves_two_services() {
        let config = RouterConfig::default()
            .with_method(
                "/pkg.One/Get",
                RawMethodConfig::new("mod", "string", Duration::from_secs(1)),
            )
            .with_method(
                "/pkg.Two/Get",
                RawMethodConfig::new("mod", "string", Duration::from_secs(1)),
            );
        let engine = RoutingEngine::new(config).unwrap();
        let conn = TestConnection::shared("a");

        assert!(engine.add_server(1, "svc", 1, Arc::clone(&conn), "pkg", "One").is_none());
        assert!(engine.add_server(1, "svc", 1, Arc::clone(&conn), "pkg", "Two").is_none());

        let mut metadata = HeaderMap::new();
        for method in ["/pkg.One/Get", "/pkg.Two/Get"] {
            let selected = engine.select(&mut metadata, method, "user").unwrap();
            assert!(Arc::ptr_eq(&selected, &conn));
        }
        assert!(!conn.is_stopped());
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_remove_leaves_every_service() {
        let engine = engine("ring_hash", "uint32");
        let conn = TestConnection::shared("a");
        engine.add_server(1, "svc", 1, Arc::clone(&conn), "pkg", "Svc");
        engine.add_server(1, "svc", 1, Arc::clone(&conn), "pkg", "Other");

        engine.remove_server(1, "svc", 1, "pkg", "Svc").unwrap();

        assert!(engine.snapshot().rings().is_empty());
        assert!(logs_contain("from pkg.Other, pkg.Svc"));
    }

    #[test]
    fn test_remove_disables_and_stops() {
        let engine = engine("ring_hash", "uint32");
        let conn = TestConnection::shared("a");
        engine.add_server(1, "svc", 1, Arc::clone(&conn), "pkg", "Svc");

        let removed = engine.remove_server(1, "svc", 1, "pkg", "Svc").unwrap();

        assert!(Arc::ptr_eq(&removed, &conn));
        assert!(conn.is_disabled());
        assert!(conn.is_stopped());
        assert!(engine.find_server(1, "svc", 1).is_none());

        let mut metadata = HeaderMap::new();
        let err = engine.select(&mut metadata, METHOD, 42u32).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_remove_unknown_server_is_not_found() {
        let engine = engine("mod", "string");

        let err = engine.remove_server(1, "svc", 1, "pkg", "Svc").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(engine.snapshot().generation(), 0);
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_stop_failure_is_swallowed() {
        let engine = engine("mod", "string");
        engine.add_server(1, "svc", 1, TestConnection::failing("a"), "pkg", "Svc");

        let removed = engine.remove_server(1, "svc", 1, "pkg", "Svc").unwrap();

        assert!(removed.is_stopped());
        assert!(logs_contain("Failed to stop connection a"));
    }

    #[test]
    fn test_select_any() {
        let engine = engine("mod", "int64");
        engine.add_server(1, "svc", 1, TestConnection::shared("a"), "pkg", "Svc");
        let mut metadata = HeaderMap::new();

        assert!(engine.select_any(&mut metadata, METHOD, &5i64).is_ok());

        let err = engine.select_any(&mut metadata, METHOD, &5.0f32).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupport);

        let err = engine.select_any(&mut metadata, METHOD, &5u64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotExist);
    }

    #[test]
    fn test_method_config_is_exposed() {
        let engine = engine("ring_hash", "string");

        let config = engine.method_config(METHOD).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert!(engine.method_config("/pkg.Svc/Other").is_none());
    }
}
