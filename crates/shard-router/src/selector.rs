//! Per-key-type selector tables.
//!
//! Each configured method lands in exactly one table, chosen by its shard key
//! type. A call is dispatched on the runtime kind of its key, so a method
//! configured for string keys is simply absent from the `uint32` table.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use http::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use crate::config::{LoadBalancePolicy, MethodConfig, RouterConfig};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::policy::{ModPolicy, Policy, RingHashPolicy};
use crate::shard_key::{ShardKey, ShardKeyKind};
use crate::topology::Topology;

/// Outgoing metadata header carrying the shard key that drove routing.
pub static SHARD_KEY_HEADER: HeaderName = HeaderName::from_static("x-shard-key");

type PolicyTable<C> = HashMap<String, Arc<dyn Policy<C>>>;

/// Method to policy tables, one per shard key kind.
pub struct SelectorRegistry<C> {
    tables: HashMap<ShardKeyKind, PolicyTable<C>>,
    methods: BTreeMap<String, MethodConfig>,
}

impl<C: Connection> SelectorRegistry<C> {
    /// Builds the tables from validated configuration.
    ///
    /// Ring-hash methods share one policy. Every modulo method gets its own
    /// cache sized by `mod_cache_capacity`.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error, see
    /// [`RouterConfig::method_configs`].
    pub fn from_config(config: &RouterConfig) -> Result<Self> {
        let methods = config.method_configs()?;
        let ring_hash: Arc<dyn Policy<C>> = Arc::new(RingHashPolicy::new());

        let mut tables: HashMap<ShardKeyKind, PolicyTable<C>> = HashMap::new();
        for (method, method_config) in &methods {
            let policy: Arc<dyn Policy<C>> = match method_config.load_balance_policy {
                LoadBalancePolicy::Mod => Arc::new(ModPolicy::new(config.mod_cache_capacity)),
                LoadBalancePolicy::RingHash => Arc::clone(&ring_hash),
            };

            debug!(
                "registered {method} as {} on {} keys",
                method_config.load_balance_policy, method_config.shard_key_type
            );

            tables
                .entry(method_config.shard_key_type)
                .or_default()
                .insert(method.clone(), policy);
        }

        Ok(Self { tables, methods })
    }

    /// Selects a connection for `method` and stamps `key` onto `metadata`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotExist`] if `method` is not configured for keys of
    /// this kind, [`Error::InvalidShardKey`] if the key cannot be carried in a
    /// header, and any error from the method's policy.
    pub fn select(
        &self,
        topology: &Topology<C>,
        metadata: &mut HeaderMap,
        method: &str,
        key: &ShardKey,
    ) -> Result<Arc<C>> {
        let policy = self.policy(key.kind(), method).ok_or_else(|| {
            Error::not_exist(format!("method {method} has no {} key selector", key.kind()))
        })?;

        let conn = policy.select(topology, method, key)?;

        let value = HeaderValue::from_str(&key.to_string())
            .map_err(|e| Error::invalid_shard_key(format!("'{key}': {e}")))?;
        metadata.insert(SHARD_KEY_HEADER.clone(), value);

        Ok(conn)
    }

    /// The policy for `method` in the `kind` table.
    pub fn policy(&self, kind: ShardKeyKind, method: &str) -> Option<&Arc<dyn Policy<C>>> {
        self.tables.get(&kind)?.get(method)
    }

    /// Validated settings for `method`.
    pub fn method_config(&self, method: &str) -> Option<&MethodConfig> {
        self.methods.get(method)
    }

    /// Every configured method and its settings.
    pub fn methods(&self) -> impl Iterator<Item = (&str, &MethodConfig)> {
        self.methods
            .iter()
            .map(|(method, config)| (method.as_str(), config))
    }
}

impl<C> fmt::Debug for SelectorRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorRegistry")
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}
