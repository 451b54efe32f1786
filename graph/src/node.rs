use std::collections::{BTreeMap, HashSet};

use engine::Fingerprint;

use super::tree::TreeId;

/// One logical chess position in the deduplicating graph.
///
/// Identity is the canonical fingerprint; transpositions merge into a single
/// node no matter how many paths reach it. The serialization tree keeps one
/// alias per distinct arrival path.
#[derive(Clone, Debug)]
pub struct PositionNode {
    pub fingerprint: Fingerprint,
    /// Fingerprints of every parent position; empty only at the root.
    pub parents: HashSet<Fingerprint>,
    /// Outgoing edges keyed by UCI move.
    pub children: BTreeMap<String, Fingerprint>,
    /// Serialization-tree nodes presenting this position, in discovery order.
    pub aliases: Vec<TreeId>,
    /// Externally-sourced reach count, when annotated.
    pub games_reached: Option<u64>,
}

impl PositionNode {
    pub fn new(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            parents: HashSet::new(),
            children: BTreeMap::new(),
            aliases: Vec::new(),
            games_reached: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}
