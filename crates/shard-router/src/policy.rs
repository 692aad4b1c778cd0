//! Backend selection policies.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::DEFAULT_MOD_CACHE_CAPACITY;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::method::MethodName;
use crate::shard_key::ShardKey;
use crate::topology::Topology;

/// Picks one connection for a call.
pub trait Policy<C>: Send + Sync {
    /// Selects the connection that should serve `key` on `method`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMethod`] for a malformed method name and
    /// [`Error::NotFound`] if the service has nothing to route to.
    fn select(&self, topology: &Topology<C>, method: &str, key: &ShardKey) -> Result<Arc<C>>;
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
struct CacheKey {
    method: String,
    key: ShardKey,
}

/// A memoized selection, valid only for the topology it was made against.
struct CacheEntry<C> {
    generation: u64,
    conn: Arc<C>,
}

/// Routes by shard key modulo the length of the id-sorted connection list.
///
/// Selections are memoized in a bounded LRU cache. Each entry records the
/// topology generation it was computed from and is ignored once the topology
/// moves on, so a removed connection is never served from the cache.
pub struct ModPolicy<C> {
    cache: Mutex<LruCache<CacheKey, CacheEntry<C>>>,
}

impl<C: Connection> ModPolicy<C> {
    /// Create a new modulo policy caching up to `capacity` selections.
    ///
    /// A zero capacity falls back to [`DEFAULT_MOD_CACHE_CAPACITY`].
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or_else(|| NonZeroUsize::new(DEFAULT_MOD_CACHE_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);

        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of cached selections, stale ones included.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    fn cached(&self, cache_key: &CacheKey, generation: u64) -> Option<Arc<C>> {
        let mut cache = self.cache.lock();

        match cache.get(cache_key) {
            Some(entry) if entry.generation == generation => {
                trace!("mod cache hit for {} key {}", cache_key.method, cache_key.key);
                Some(Arc::clone(&entry.conn))
            }
            Some(_) => {
                cache.pop(cache_key);
                trace!("mod cache stale for {} key {}", cache_key.method, cache_key.key);
                None
            }
            None => None,
        }
    }

    fn remember(&self, cache_key: CacheKey, entry: CacheEntry<C>) {
        let mut cache = self.cache.lock();

        // `push` also hands back the old value when the key was already cached.
        if let Some((evicted, _)) = cache.push(cache_key.clone(), entry) {
            if evicted != cache_key {
                debug!(
                    "evicted mod selection for {} key {}",
                    evicted.method, evicted.key
                );
            }
        }
    }
}

impl<C: Connection> Policy<C> for ModPolicy<C> {
    fn select(&self, topology: &Topology<C>, method: &str, key: &ShardKey) -> Result<Arc<C>> {
        let cache_key = CacheKey {
            method: method.to_string(),
            key: key.clone(),
        };

        if let Some(conn) = self.cached(&cache_key, topology.generation()) {
            return Ok(conn);
        }

        let name = MethodName::parse(method)?;
        let service = name.service_key();
        let list = topology
            .connections(&service)
            .filter(|list| !list.is_empty())
            .ok_or_else(|| Error::not_found(format!("no connections for service {service}")))?;

        let conn = Arc::clone(&list[key.modulo_index(list.len())]);

        self.remember(
            cache_key,
            CacheEntry {
                generation: topology.generation(),
                conn: Arc::clone(&conn),
            },
        );

        Ok(conn)
    }
}

impl<C> fmt::Debug for ModPolicy<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cache = self.cache.lock();
        f.debug_struct("ModPolicy")
            .field("cached", &cache.len())
            .field("capacity", &cache.cap())
            .finish()
    }
}

/// Routes by consistent hashing of the key's string form.
#[derive(Clone, Copy, Debug, Default)]
pub struct RingHashPolicy;

impl RingHashPolicy {
    /// Create a new ring-hash policy.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl<C: Connection> Policy<C> for RingHashPolicy {
    fn select(&self, topology: &Topology<C>, method: &str, key: &ShardKey) -> Result<Arc<C>> {
        let name = MethodName::parse(method)?;

        topology
            .ring_lookup(name.package(), name.service(), &key.to_string())
            .ok_or_else(|| {
                Error::not_found(format!(
                    "no ring node for service {} key {key}",
                    name.service_key()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::identity::ServerIdentity;
    use crate::ring::DEFAULT_VIRTUAL_NODES;
    use crate::testing::TestConnection;

    const METHOD: &str = "/pkg.Svc/Get";

    fn topology(names: &[&str]) -> Topology<TestConnection> {
        let mut topology = Topology::new(DEFAULT_VIRTUAL_NODES);
        for (id, name) in (1u32..).zip(names) {
            let identity = ServerIdentity::new(1, "svc", id);
            topology.insert(&identity, TestConnection::shared(name), "pkg", "Svc");
        }
        topology.advance();
        topology
    }

    #[test]
    fn test_mod_integer_keys_index_sorted_list() {
        let topology = topology(&["c", "a", "b"]);
        let policy = ModPolicy::new(16);

        for (key, expected) in [(0u32, "a"), (1, "b"), (2, "c"), (5, "c")] {
            let conn = policy.select(&topology, METHOD, &ShardKey::U32(key)).unwrap();
            assert_eq!(conn.name, expected);
        }
    }

    #[test]
    fn test_mod_string_keys_are_hashed() {
        let topology = topology(&["a", "b", "c"]);
        let policy = ModPolicy::new(16);

        let expected = ["a", "b", "c"][crc32fast::hash(b"user123") as usize % 3];
        let conn = policy.select(&topology, METHOD, &ShardKey::from("user123")).unwrap();
        assert_eq!(conn.name, expected);
    }

    #[test]
    fn test_mod_cache_serves_repeat_selections() {
        let topology = topology(&["a", "b", "c"]);
        let policy = ModPolicy::new(16);
        let key = ShardKey::from("user123");

        let first = policy.select(&topology, METHOD, &key).unwrap();
        let second = policy.select(&topology, METHOD, &key).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(policy.cache_len(), 1);
    }

    #[test]
    fn test_mod_cache_ignores_older_generations() {
        let mut topology = topology(&["a", "b"]);
        let policy = ModPolicy::new(16);
        let key = ShardKey::U32(1);

        assert_eq!(policy.select(&topology, METHOD, &key).unwrap().name, "b");

        topology.remove(&ServerIdentity::new(1, "svc", 2), "pkg", "Svc");
        topology.advance();

        assert_eq!(policy.select(&topology, METHOD, &key).unwrap().name, "a");
    }

    #[test]
    fn test_mod_cache_is_bounded() {
        let topology = topology(&["a", "b"]);
        let policy = ModPolicy::new(2);

        for key in 0u64..5 {
            policy.select(&topology, METHOD, &ShardKey::U64(key)).unwrap();
        }

        assert_eq!(policy.cache_len(), 2);
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_mod_eviction_is_logged() {
        let topology = topology(&["a", "b"]);
        let policy = ModPolicy::new(1);

        policy.select(&topology, METHOD, &ShardKey::from("first")).unwrap();
        policy.select(&topology, METHOD, &ShardKey::from("first")).unwrap();
        assert!(!logs_contain("evicted mod selection"));

        policy.select(&topology, METHOD, &ShardKey::from("second")).unwrap();
        assert!(logs_contain("evicted mod selection for /pkg.Svc/Get key first"));
    }

    #[test]
    fn test_mod_errors() {
        let topology = topology(&["a"]);
        let policy = ModPolicy::new(16);
        let key = ShardKey::U32(1);

        let err = policy.select(&topology, "pkg.Svc.Get", &key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMethod);

        let err = policy.select(&topology, "/pkg.Other/Get", &key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_ring_hash_is_stable() {
        let topology = topology(&["a", "b", "c"]);
        let policy = RingHashPolicy::new();
        let key = ShardKey::U32(42);

        let first = policy.select(&topology, METHOD, &key).unwrap();
        let second = policy.select(&topology, METHOD, &key).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_ring_hash_uses_string_form_of_key() {
        let topology = topology(&["a", "b", "c"]);
        let policy = RingHashPolicy::new();

        for value in [0u32, 7, 42, 1000, u32::MAX] {
            let numeric = policy.select(&topology, METHOD, &ShardKey::U32(value)).unwrap();
            let textual = policy
                .select(&topology, METHOD, &ShardKey::Str(value.to_string()))
                .unwrap();
            assert!(Arc::ptr_eq(&numeric, &textual));
        }
    }

    #[test]
    fn test_ring_hash_errors() {
        let topology = topology(&[]);
        let policy = RingHashPolicy::new();

        let err = policy.select(&topology, METHOD, &ShardKey::U32(42)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = policy.select(&topology, "/Svc/Get", &ShardKey::U32(42)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMethod);
    }
}
