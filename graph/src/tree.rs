use std::collections::BTreeSet;

use engine::Fingerprint;

/// Index of a node within a [`PgnTree`] arena.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TreeId(usize);

impl TreeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One position in the externally-visible notation document.
///
/// Many tree nodes may present the same graph position when transpositions
/// occur; the PGN format requires a proper tree, so each arrival path gets
/// its own node.
#[derive(Clone, Debug)]
pub struct TreeNode {
    /// Canonical key of the position this node presents.
    pub fingerprint: Fingerprint,
    /// Move leading into this node; absent at the document root.
    pub uci: Option<String>,
    pub san: Option<String>,
    /// Free-form annotation text, carried verbatim.
    pub comment: String,
    pub nags: BTreeSet<u8>,
    /// Ordered child variations.
    pub variations: Vec<TreeId>,
}

/// Ordered PGN header tags (insertion order is preserved on output).
#[derive(Clone, Debug, Default)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value;
        } else {
            self.0.push((key.to_string(), value));
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.0.retain(|(k, _)| k != key);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Arena-backed serialization tree. Nodes are owned by the arena and referred
/// to by [`TreeId`]; ids stay valid for the lifetime of the tree (nodes are
/// never removed).
#[derive(Clone, Debug)]
pub struct PgnTree {
    nodes: Vec<TreeNode>,
    root: TreeId,
    pub headers: Headers,
}

impl PgnTree {
    pub fn new(root_fingerprint: Fingerprint) -> Self {
        let root = TreeNode {
            fingerprint: root_fingerprint,
            uci: None,
            san: None,
            comment: String::new(),
            nags: BTreeSet::new(),
            variations: Vec::new(),
        };
        Self {
            nodes: vec![root],
            root: TreeId(0),
            headers: Headers::default(),
        }
    }

    pub fn root(&self) -> TreeId {
        self.root
    }

    pub fn node(&self, id: TreeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: TreeId) -> &mut TreeNode {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Find the variation under `parent` entered by `uci`, if present.
    pub fn variation_with_uci(&self, parent: TreeId, uci: &str) -> Option<TreeId> {
        self.nodes[parent.0]
            .variations
            .iter()
            .copied()
            .find(|id| self.nodes[id.0].uci.as_deref() == Some(uci))
    }

    /// Append a new variation under `parent` unconditionally.
    pub fn add_variation(
        &mut self,
        parent: TreeId,
        uci: &str,
        san: &str,
        fingerprint: Fingerprint,
    ) -> TreeId {
        let id = TreeId(self.nodes.len());
        self.nodes.push(TreeNode {
            fingerprint,
            uci: Some(uci.to_string()),
            san: Some(san.to_string()),
            comment: String::new(),
            nags: BTreeSet::new(),
            variations: Vec::new(),
        });
        self.nodes[parent.0].variations.push(id);
        id
    }

    /// Find or create the variation under `parent` entered by `uci`.
    /// Returns the id and whether it was newly created.
    pub fn ensure_variation(
        &mut self,
        parent: TreeId,
        uci: &str,
        san: &str,
        fingerprint: Fingerprint,
    ) -> (TreeId, bool) {
        if let Some(existing) = self.variation_with_uci(parent, uci) {
            (existing, false)
        } else {
            (self.add_variation(parent, uci, san, fingerprint), true)
        }
    }
}
