//! Client-side shard routing for RPC backends.
//!
//! Routes each outgoing call to one backend connection, chosen by the call's
//! method and shard key.
//!
//! # Features
//!
//! - **Modulo routing**: key modulo the id-sorted connection list, memoized
//!   per method in a bounded LRU cache
//! - **Ring-hash routing**: weighted consistent hashing over server identities
//! - **Per-key-type tables**: a method is only reachable with the key type it
//!   was configured for
//! - **Lock-free reads**: selection works on an immutable topology snapshot
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use http::HeaderMap;
//! use proven_shard_router::{Connection, RawMethodConfig, RouterConfig, RoutingEngine};
//!
//! #[derive(Debug)]
//! struct Backend(String);
//!
//! impl Connection for Backend {
//!     type Transport = ();
//!     type Error = std::io::Error;
//!
//!     fn transport(&self) -> &() {
//!         &()
//!     }
//!
//!     fn id(&self) -> &str {
//!         &self.0
//!     }
//!
//!     fn is_available(&self) -> bool {
//!         true
//!     }
//!
//!     fn disable(&self) {}
//!
//!     fn stop(&self) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> proven_shard_router::Result<()> {
//! let config = RouterConfig::default().with_method(
//!     "/users.Directory/Lookup",
//!     RawMethodConfig::new("ring_hash", "uint64", Duration::from_secs(3)),
//! );
//! let engine = RoutingEngine::new(config)?;
//!
//! for id in 1..=3 {
//!     let backend = Arc::new(Backend(format!("backend-{id}")));
//!     engine.add_server(1, "directory", id, backend, "users", "Directory");
//! }
//!
//! let mut metadata = HeaderMap::new();
//! let backend = engine.select(&mut metadata, "/users.Directory/Lookup", 42u64)?;
//! assert!(backend.id().starts_with("backend-"));
//! assert_eq!(metadata["x-shard-key"], "42");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod identity;
pub mod method;
pub mod policy;
pub mod registry;
pub mod ring;
pub mod ring_index;
pub mod selector;
pub mod service_index;
pub mod shard_key;
pub mod topology;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::{LoadBalancePolicy, MethodConfig, RawMethodConfig, RouterConfig};
pub use connection::Connection;
pub use engine::RoutingEngine;
pub use error::{Error, ErrorKind, Result};
pub use identity::ServerIdentity;
pub use method::MethodName;
pub use policy::{ModPolicy, Policy, RingHashPolicy};
pub use registry::ConnectionRegistry;
pub use ring::HashRing;
pub use ring_index::RingIndex;
pub use selector::{SHARD_KEY_HEADER, SelectorRegistry};
pub use service_index::{ConnectionList, ServiceConnectionIndex};
pub use shard_key::{ShardKey, ShardKeyKind};
pub use topology::Topology;
