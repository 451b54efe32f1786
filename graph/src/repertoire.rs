use std::collections::HashMap;

use engine::{Board, Color, Fingerprint, PlayedMove};

use super::node::PositionNode;
use super::pgn::RawNode;
use super::tags::extract_reach_count;
use super::tree::{PgnTree, TreeId};
use super::GraphError;

/// The deduplicating position graph together with its synchronized
/// serialization tree.
///
/// The graph merges transpositions into one [`PositionNode`] per canonical
/// fingerprint; the tree keeps one alias per distinct arrival path so the
/// PGN output stays a proper tree. All mutation goes through
/// [`Repertoire::commit_edge`] (or the single-alias [`Repertoire::link_under`]
/// used when replaying an existing document).
#[derive(Clone, Debug)]
pub struct Repertoire {
    side: Color,
    root: Fingerprint,
    nodes: HashMap<Fingerprint, PositionNode>,
    tree: PgnTree,
}

impl Repertoire {
    pub fn new(side: Color) -> Self {
        Self::from_root(side, &Board::initial())
    }

    pub fn from_root(side: Color, board: &Board) -> Self {
        let root = board.fingerprint();
        let tree = PgnTree::new(root.clone());
        let mut root_node = PositionNode::new(root.clone());
        root_node.aliases.push(tree.root());

        let mut nodes = HashMap::new();
        nodes.insert(root.clone(), root_node);

        Self {
            side,
            root,
            nodes,
            tree,
        }
    }

    pub fn side(&self) -> Color {
        self.side
    }

    pub fn root(&self) -> &Fingerprint {
        &self.root
    }

    pub fn tree(&self) -> &PgnTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut PgnTree {
        &mut self.tree
    }

    pub fn node(&self, fingerprint: &Fingerprint) -> Option<&PositionNode> {
        self.nodes.get(fingerprint)
    }

    pub fn node_mut(&mut self, fingerprint: &Fingerprint) -> Option<&mut PositionNode> {
        self.nodes.get_mut(fingerprint)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PositionNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_player_turn(&self, fingerprint: &Fingerprint) -> bool {
        fingerprint.side_to_move() == self.side
    }

    /// Frontier positions with no recorded continuation, in fingerprint order.
    pub fn leaves(&self) -> Vec<Fingerprint> {
        let mut leaves: Vec<_> = self
            .nodes
            .values()
            .filter(|node| node.is_leaf())
            .map(|node| node.fingerprint.clone())
            .collect();
        leaves.sort();
        leaves
    }

    /// Player-turn positions, in fingerprint order.
    pub fn player_nodes(&self) -> Vec<Fingerprint> {
        let mut player: Vec<_> = self
            .nodes
            .values()
            .filter(|node| self.is_player_turn(&node.fingerprint))
            .map(|node| node.fingerprint.clone())
            .collect();
        player.sort();
        player
    }

    /// Record the edge `parent --mv--> child`, fanning the move out under
    /// every alias the parent currently has.
    ///
    /// Creates the child node on first sight; otherwise merges. Exactly one
    /// alias is anchored per (parent-alias, move) pair, so repeating the call
    /// with identical arguments leaves the graph unchanged. Existing children
    /// of a merged node are not replayed onto late-arriving aliases; only
    /// edges committed afterwards fan out to them.
    pub fn commit_edge(
        &mut self,
        parent: &Fingerprint,
        mv: &PlayedMove,
        child: Fingerprint,
    ) -> Result<TreeId, GraphError> {
        let parent_aliases = self
            .nodes
            .get(parent)
            .ok_or_else(|| GraphError::MissingNode(parent.clone()))?
            .aliases
            .clone();
        if parent_aliases.is_empty() {
            return Err(GraphError::MissingAlias(parent.clone()));
        }

        let mut representative = None;
        for alias in parent_aliases {
            let id = self.link_under(parent, alias, mv, child.clone())?;
            representative.get_or_insert(id);
        }

        Ok(representative.expect("parent had at least one alias"))
    }

    /// Record the edge under one specific parent alias only. Used when
    /// replaying a document whose variation structure must be reproduced
    /// exactly; expansion goes through [`Repertoire::commit_edge`] instead.
    pub fn link_under(
        &mut self,
        parent: &Fingerprint,
        parent_alias: TreeId,
        mv: &PlayedMove,
        child: Fingerprint,
    ) -> Result<TreeId, GraphError> {
        if !self.nodes.contains_key(parent) {
            return Err(GraphError::MissingNode(parent.clone()));
        }

        let (id, _created) =
            self.tree
                .ensure_variation(parent_alias, mv.uci(), mv.san(), child.clone());

        let child_node = self
            .nodes
            .entry(child.clone())
            .or_insert_with(|| PositionNode::new(child.clone()));
        child_node.parents.insert(parent.clone());
        if !child_node.aliases.contains(&id) {
            child_node.aliases.push(id);
        }

        let parent_node = self
            .nodes
            .get_mut(parent)
            .expect("parent presence checked above");
        parent_node.children.insert(mv.uci().to_string(), child);

        Ok(id)
    }

    /// Seed the graph with an initial SAN line played from the root.
    /// Returns the fingerprint of the final position.
    pub fn play_initial_moves(&mut self, line: &str) -> Result<Fingerprint, GraphError> {
        let sans: Vec<&str> = line.split_whitespace().collect();
        self.branch_from(&self.root.clone(), &sans)
    }

    /// Replay a SAN sequence below an existing node, committing each edge.
    pub fn branch_from(
        &mut self,
        from: &Fingerprint,
        sans: &[&str],
    ) -> Result<Fingerprint, GraphError> {
        if !self.nodes.contains_key(from) {
            return Err(GraphError::MissingNode(from.clone()));
        }

        let mut board = Board::from_fingerprint(from)?;
        let mut current = from.clone();
        for san in sans {
            let mv = board.parse_san(san)?;
            board = board.play(&mv);
            let next = board.fingerprint();
            self.commit_edge(&current, &mv, next.clone())?;
            current = next;
        }
        Ok(current)
    }

    /// Rebuild a repertoire graph (including transposition merging) from a
    /// parsed PGN document.
    pub fn from_pgn(side: Color, text: &str) -> Result<Self, GraphError> {
        let raw = super::pgn::parse_document(text)?;

        let board = match raw.headers.get("FEN") {
            Some(fen) => Board::from_fen(fen)?,
            None => Board::initial(),
        };

        let mut rep = Self::from_root(side, &board);
        rep.tree.headers = raw.headers.clone();

        let root_id = rep.tree.root();
        rep.absorb_annotations(root_id, &raw.root);

        let root = rep.root.clone();
        rep.replay_variations(&root, root_id, &board, &raw.root)?;
        Ok(rep)
    }

    fn replay_variations(
        &mut self,
        parent: &Fingerprint,
        parent_alias: TreeId,
        board: &Board,
        raw: &RawNode,
    ) -> Result<(), GraphError> {
        for child_raw in &raw.variations {
            let san = child_raw
                .san
                .as_deref()
                .expect("non-root parsed nodes always carry a move");
            let mv = board.parse_san(san)?;
            let next_board = board.play(&mv);
            let child = next_board.fingerprint();

            let id = self.link_under(parent, parent_alias, &mv, child.clone())?;
            self.absorb_annotations(id, child_raw);
            self.replay_variations(&child, id, &next_board, child_raw)?;
        }
        Ok(())
    }

    fn absorb_annotations(&mut self, id: TreeId, raw: &RawNode) {
        {
            let node = self.tree.node_mut(id);
            node.comment = raw.comment.clone();
            node.nags = raw.nags.clone();
        }

        if let (Some(count), _) = extract_reach_count(&raw.comment) {
            let fingerprint = self.tree.node(id).fingerprint.clone();
            if let Some(node) = self.nodes.get_mut(&fingerprint) {
                node.games_reached = Some(count);
            }
        }
    }
}
