//! Copy-on-write consistent hash ring.
//!
//! A [`HashRing`] is immutable once built. Adding, updating or removing a
//! node builds a fresh ring and leaves the receiver untouched, so any
//! `Arc<HashRing>` a reader already holds keeps answering with the
//! membership it was built from.
//!
//! Each node gets `floor(virtual_nodes * node_count * weight / total_weight)`
//! virtual units. Unit `i` of node `N` hashes the string `"N.i"` with MD5 and
//! splits the 16-byte digest into four little-endian `u32` ring positions.
//! Lookups hash the key the same way, take the first window, and pick the
//! first position at or after it, wrapping to the start of the ring.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::sync::Arc;

/// Default virtual units per weight-normalized node (four ring positions each).
pub const DEFAULT_VIRTUAL_NODES: usize = 30;

/// Upper bound on virtual units per weight-normalized node. Larger values
/// are lowered to it.
pub const MAX_VIRTUAL_NODES: usize = 4096;

/// Ring positions produced by one virtual unit.
const POSITIONS_PER_DIGEST: usize = 4;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
struct RingPoint {
    hash: u32,
    /// Index into `HashRing::nodes`.
    node: usize,
}

/// An immutable consistent hash ring over node identities.
#[derive(Clone)]
pub struct HashRing<N = String> {
    virtual_nodes: usize,
    /// Physical nodes, ascending.
    nodes: Vec<N>,
    weights: BTreeMap<N, u32>,
    /// Ascending by hash, one entry per distinct hash.
    points: Vec<RingPoint>,
}

impl<N> HashRing<N>
where
    N: Clone + Ord + Display,
{
    /// Creates an empty ring with [`DEFAULT_VIRTUAL_NODES`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_virtual_nodes(DEFAULT_VIRTUAL_NODES)
    }

    /// Creates an empty ring with a custom number of virtual units per node.
    ///
    /// The value is clamped to `1..=MAX_VIRTUAL_NODES`.
    #[must_use]
    pub fn with_virtual_nodes(virtual_nodes: usize) -> Self {
        Self {
            virtual_nodes: virtual_nodes.clamp(1, MAX_VIRTUAL_NODES),
            nodes: Vec::new(),
            weights: BTreeMap::new(),
            points: Vec::new(),
        }
    }

    /// Builds a ring holding every node with weight one.
    #[must_use]
    pub fn from_nodes<I>(virtual_nodes: usize, nodes: I) -> Self
    where
        I: IntoIterator<Item = N>,
    {
        let weights = nodes.into_iter().map(|node| (node, 1)).collect();
        Self::build(virtual_nodes.clamp(1, MAX_VIRTUAL_NODES), weights)
    }

    fn build(virtual_nodes: usize, weights: BTreeMap<N, u32>) -> Self {
        let nodes: Vec<N> = weights.keys().cloned().collect();
        let total_weight: u128 = weights.values().map(|weight| u128::from(*weight)).sum();
        let node_count = nodes.len() as u128;

        let mut points = Vec::new();
        if total_weight > 0 {
            for (index, (node, weight)) in weights.iter().enumerate() {
                // Bounded by `virtual_nodes * node_count`.
                let units = virtual_nodes as u128 * node_count * u128::from(*weight) / total_weight;
                let units = u64::try_from(units).unwrap_or(u64::MAX);
                points.reserve(usize::try_from(units).unwrap_or(0) * POSITIONS_PER_DIGEST);

                for unit in 0..units {
                    let digest = md5::compute(format!("{node}.{unit}"));
                    for window in digest.0.chunks_exact(4) {
                        points.push(RingPoint {
                            hash: u32::from_le_bytes([window[0], window[1], window[2], window[3]]),
                            node: index,
                        });
                    }
                }
            }
        }

        // Nodes are ascending, so on a hash collision the smaller node wins
        // no matter which order the nodes were added in.
        points.sort_unstable();
        points.dedup_by_key(|point| point.hash);

        Self {
            virtual_nodes,
            nodes,
            weights,
            points,
        }
    }

    fn rebuilt(&self, weights: BTreeMap<N, u32>) -> Arc<Self> {
        Arc::new(Self::build(self.virtual_nodes, weights))
    }

    /// Returns a ring that also holds `node` with weight one.
    ///
    /// Returns the receiver itself if the node is already present.
    #[must_use]
    pub fn add_node(self: &Arc<Self>, node: N) -> Arc<Self> {
        self.add_weighted_node(node, 1)
    }

    /// Returns a ring that also holds `node` with `weight`.
    ///
    /// Returns the receiver itself if the node is already present, whatever
    /// its weight. A weight of zero is raised to one.
    #[must_use]
    pub fn add_weighted_node(self: &Arc<Self>, node: N, weight: u32) -> Arc<Self> {
        if self.weights.contains_key(&node) {
            return Arc::clone(self);
        }

        let mut weights = self.weights.clone();
        weights.insert(node, weight.max(1));
        self.rebuilt(weights)
    }

    /// Returns a ring where `node` carries `weight`.
    ///
    /// Returns the receiver itself if the node is absent or already has that
    /// weight.
    #[must_use]
    pub fn update_weighted_node(self: &Arc<Self>, node: &N, weight: u32) -> Arc<Self> {
        let weight = weight.max(1);
        match self.weights.get(node) {
            Some(current) if *current != weight => {
                let mut weights = self.weights.clone();
                weights.insert(node.clone(), weight);
                self.rebuilt(weights)
            }
            _ => Arc::clone(self),
        }
    }

    /// Returns a ring without `node`.
    ///
    /// Returns the receiver itself if the node is absent.
    #[must_use]
    pub fn remove_node<Q>(self: &Arc<Self>, node: &Q) -> Arc<Self>
    where
        N: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        if !self.weights.contains_key(node) {
            return Arc::clone(self);
        }

        let mut weights = self.weights.clone();
        weights.remove(node);
        self.rebuilt(weights)
    }

    /// Returns the node owning `key`, or `None` if the ring has no positions.
    pub fn get_node(&self, key: &str) -> Option<&N> {
        let start = self.position_for(key)?;
        Some(&self.nodes[self.points[start].node])
    }

    /// Returns up to `count` distinct nodes for `key`, walking clockwise from
    /// the key's position.
    pub fn get_nodes(&self, key: &str, count: usize) -> Vec<&N> {
        let Some(start) = self.position_for(key) else {
            return Vec::new();
        };

        let wanted = count.min(self.nodes.len());
        let mut seen = vec![false; self.nodes.len()];
        let mut found = Vec::with_capacity(wanted);

        for offset in 0..self.points.len() {
            if found.len() == wanted {
                break;
            }
            let node = self.points[(start + offset) % self.points.len()].node;
            if !seen[node] {
                seen[node] = true;
                found.push(&self.nodes[node]);
            }
        }

        found
    }

    fn position_for(&self, key: &str) -> Option<usize> {
        if self.points.is_empty() {
            return None;
        }

        let hash = key_hash(key);
        let index = self.points.partition_point(|point| point.hash < hash);
        Some(if index == self.points.len() { 0 } else { index })
    }

    /// Whether `node` is a member of this ring.
    pub fn contains<Q>(&self, node: &Q) -> bool
    where
        N: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.weights.contains_key(node)
    }

    /// The weight of `node`, if present.
    pub fn weight<Q>(&self, node: &Q) -> Option<u32>
    where
        N: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.weights.get(node).copied()
    }

    /// Physical nodes, ascending.
    #[must_use]
    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    /// Number of physical nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the ring has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of positions on the ring.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Virtual units per weight-normalized node.
    #[must_use]
    pub const fn virtual_nodes(&self) -> usize {
        self.virtual_nodes
    }
}

impl<N> Default for HashRing<N>
where
    N: Clone + Ord + Display,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<N> fmt::Debug for HashRing<N>
where
    N: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashRing")
            .field("virtual_nodes", &self.virtual_nodes)
            .field("weights", &self.weights)
            .field("points", &self.points.len())
            .finish()
    }
}

fn key_hash(key: &str) -> u32 {
    let digest = md5::compute(key.as_bytes());
    u32::from_le_bytes([digest.0[0], digest.0[1], digest.0[2], digest.0[3]])
}
