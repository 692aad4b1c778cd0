//! Router configuration.
//!
//! Per-method settings normally come from protocol metadata. They arrive here
//! as [`RawMethodConfig`] with every field optional and are validated into a
//! [`MethodConfig`] before any selector table is built.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::method::MethodName;
use crate::ring::{DEFAULT_VIRTUAL_NODES, MAX_VIRTUAL_NODES};
use crate::shard_key::ShardKeyKind;

/// Default capacity of each modulo policy's selection cache.
pub const DEFAULT_MOD_CACHE_CAPACITY: usize = 1024;

/// How a method picks a backend.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LoadBalancePolicy {
    /// Position in the id-sorted connection list, key modulo list length.
    Mod,
    /// Consistent hash ring over server identities.
    RingHash,
}

impl LoadBalancePolicy {
    /// Returns the configuration name of this policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mod => "mod",
            Self::RingHash => "ring_hash",
        }
    }
}

impl fmt::Display for LoadBalancePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadBalancePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mod" => Ok(Self::Mod),
            "ring_hash" | "ringhash" | "ring-hash" => Ok(Self::RingHash),
            _ => Err(Error::not_support(format!("load balance policy '{s}'"))),
        }
    }
}

/// Per-method settings as supplied, before validation.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RawMethodConfig {
    /// `mod` or `ring_hash`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balance_policy: Option<String>,

    /// `string`, `int32`, `int64`, `uint32` or `uint64`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_key_type: Option<String>,

    /// Call timeout, e.g. `"3s"`.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl RawMethodConfig {
    /// Creates a fully populated raw configuration.
    pub fn new(
        load_balance_policy: impl Into<String>,
        shard_key_type: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            load_balance_policy: Some(load_balance_policy.into()),
            shard_key_type: Some(shard_key_type.into()),
            timeout: Some(timeout),
        }
    }

    /// Validates the settings for `method`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configure`] if the policy, key type or timeout is
    /// missing or the timeout is zero, and [`Error::NotSupport`] if the policy
    /// or key type is not recognised.
    pub fn validate(&self, method: &str) -> Result<MethodConfig> {
        let timeout = self
            .timeout
            .filter(|timeout| !timeout.is_zero())
            .ok_or_else(|| Error::configure(format!("method {method} has no timeout")))?;

        let load_balance_policy = self
            .load_balance_policy
            .as_deref()
            .ok_or_else(|| Error::configure(format!("method {method} has no load balance policy")))?
            .parse()?;

        let shard_key_type = self
            .shard_key_type
            .as_deref()
            .ok_or_else(|| Error::configure(format!("method {method} has no shard key type")))?
            .parse()?;

        Ok(MethodConfig {
            load_balance_policy,
            shard_key_type,
            timeout,
        })
    }
}

/// Validated per-method settings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MethodConfig {
    /// How the method picks a backend.
    pub load_balance_policy: LoadBalancePolicy,
    /// Which shard key type calls to the method carry.
    pub shard_key_type: ShardKeyKind,
    /// Call timeout for an outer interceptor to apply.
    pub timeout: Duration,
}

/// Configuration for a routing engine.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Entries in each modulo policy's selection cache.
    pub mod_cache_capacity: usize,

    /// Virtual units per weight-normalized ring node.
    pub virtual_nodes: usize,

    /// Settings keyed by `/package.Service/Method`.
    pub methods: BTreeMap<String, RawMethodConfig>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            mod_cache_capacity: DEFAULT_MOD_CACHE_CAPACITY,
            virtual_nodes: DEFAULT_VIRTUAL_NODES,
            methods: BTreeMap::new(),
        }
    }
}

impl RouterConfig {
    /// Adds or replaces the settings for `method`.
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>, config: RawMethodConfig) -> Self {
        self.methods.insert(method.into(), config);
        self
    }

    /// Parses configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configure`] if the TOML cannot be parsed.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::configure(format!("Failed to parse config: {e}")))
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configure`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::configure(format!("Failed to read config file: {e}")))?;

        Self::from_toml_str(&contents)
    }

    /// Saves configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configure`] if the configuration cannot be serialized
    /// or written.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::configure(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, contents)
            .map_err(|e| Error::configure(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validates every method and returns the checked settings.
    ///
    /// # Errors
    ///
    /// Returns the first problem found: [`Error::Configure`] for a zero cache
    /// capacity, out of range virtual nodes or missing method settings,
    /// [`Error::InvalidMethod`] for a malformed method name and
    /// [`Error::NotSupport`] for unknown policies or key types.
    pub fn method_configs(&self) -> Result<BTreeMap<String, MethodConfig>> {
        if self.mod_cache_capacity == 0 {
            return Err(Error::configure("mod_cache_capacity must be non-zero"));
        }

        if self.virtual_nodes == 0 || self.virtual_nodes > MAX_VIRTUAL_NODES {
            return Err(Error::configure(format!(
                "virtual_nodes must be between 1 and {MAX_VIRTUAL_NODES}, got {}",
                self.virtual_nodes
            )));
        }

        self.methods
            .iter()
            .map(|(method, raw)| {
                MethodName::parse(method)?;
                Ok((method.clone(), raw.validate(method)?))
            })
            .collect()
    }

    /// Validates configuration.
    ///
    /// # Errors
    ///
    /// See [`RouterConfig::method_configs`].
    pub fn validate(&self) -> Result<()> {
        self.method_configs().map(|_| ())
    }
}
