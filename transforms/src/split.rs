//! Split a repertoire into documents whose subtrees stay within a move cap.
//!
//! Recursion walks from the root toward the leaves; as soon as a subtree fits
//! the cap (or a leaf is reached) one event is emitted carrying the move
//! prefix that leads there. Children already on the active prefix path are
//! skipped, which keeps cyclic transpositions from recursing forever.

use std::collections::{HashMap, HashSet};

use engine::{Board, Color, Fingerprint};
use graph::{PgnTree, Repertoire, TreeId};
use log::warn;

use super::TransformError;

/// One emitted document: the subtree below `node`, reached via `prefix`
/// (UCI moves from the repertoire root).
#[derive(Clone, Debug)]
pub struct SplitEvent {
    pub node: Fingerprint,
    pub prefix: Vec<String>,
    pub move_count: u64,
}

/// Descendant-edge counts for every node, memoized. A node revisited while
/// still on the recursion path contributes zero.
pub fn subtree_sizes(repertoire: &Repertoire) -> HashMap<Fingerprint, u64> {
    let mut memo = HashMap::new();
    let mut visiting = HashSet::new();
    for node in repertoire.nodes() {
        count_moves(repertoire, &node.fingerprint, &mut memo, &mut visiting);
    }
    memo
}

fn count_moves(
    repertoire: &Repertoire,
    fingerprint: &Fingerprint,
    memo: &mut HashMap<Fingerprint, u64>,
    visiting: &mut HashSet<Fingerprint>,
) -> u64 {
    if let Some(&count) = memo.get(fingerprint) {
        return count;
    }
    if !visiting.insert(fingerprint.clone()) {
        return 0;
    }

    let mut total = 0;
    if let Some(node) = repertoire.node(fingerprint) {
        total += node.children.len() as u64;
        for child in node.children.values() {
            total += count_moves(repertoire, child, memo, visiting);
        }
    }

    visiting.remove(fingerprint);
    memo.insert(fingerprint.clone(), total);
    total
}

/// Compute the split points for `max_moves`. Leaf chains longer than the cap
/// are emitted whole; the cap is best-effort for those.
pub fn split_events(
    repertoire: &Repertoire,
    max_moves: u64,
) -> Result<Vec<SplitEvent>, TransformError> {
    let max_moves = max_moves.max(1);
    let sizes = subtree_sizes(repertoire);
    let root = repertoire.root().clone();

    let mut events = Vec::new();
    let mut prefix_moves = Vec::new();
    let mut prefix_nodes = HashSet::from([root.clone()]);
    split_node(
        repertoire,
        &root,
        &sizes,
        max_moves,
        &mut prefix_moves,
        &mut prefix_nodes,
        &mut events,
    )?;
    Ok(events)
}

fn split_node(
    repertoire: &Repertoire,
    fingerprint: &Fingerprint,
    sizes: &HashMap<Fingerprint, u64>,
    max_moves: u64,
    prefix_moves: &mut Vec<String>,
    prefix_nodes: &mut HashSet<Fingerprint>,
    events: &mut Vec<SplitEvent>,
) -> Result<(), TransformError> {
    let count = sizes.get(fingerprint).copied().unwrap_or(0);
    let children = sorted_children(repertoire, fingerprint)?;

    if count <= max_moves || children.is_empty() {
        events.push(SplitEvent {
            node: fingerprint.clone(),
            prefix: prefix_moves.clone(),
            move_count: count,
        });
        return Ok(());
    }

    for (uci, child) in children {
        if prefix_nodes.contains(&child) {
            continue;
        }
        prefix_moves.push(uci);
        prefix_nodes.insert(child.clone());
        split_node(
            repertoire,
            &child,
            sizes,
            max_moves,
            prefix_moves,
            prefix_nodes,
            events,
        )?;
        prefix_nodes.remove(&child);
        prefix_moves.pop();
    }
    Ok(())
}

/// Children in ascending printed-notation order for deterministic output.
pub(crate) fn sorted_children(
    repertoire: &Repertoire,
    fingerprint: &Fingerprint,
) -> Result<Vec<(String, Fingerprint)>, TransformError> {
    let node = repertoire
        .node(fingerprint)
        .ok_or_else(|| TransformError::MissingNode(fingerprint.clone()))?;
    let board = Board::from_fingerprint(fingerprint)?;

    let mut decorated: Vec<(String, String, Fingerprint)> = node
        .children
        .iter()
        .map(|(uci, child)| {
            let label = board
                .parse_uci(uci)
                .map(|mv| mv.san().to_string())
                .unwrap_or_else(|_| uci.clone());
            (label, uci.clone(), child.clone())
        })
        .collect();
    decorated.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(decorated
        .into_iter()
        .map(|(_, uci, child)| (uci, child))
        .collect())
}

/// Build the standalone document for one event: the prefix is replayed as
/// the opening moves, then the subtree below the event node is copied with
/// transposition sharing honored inside the subtree only.
pub fn build_document(
    repertoire: &Repertoire,
    event: &SplitEvent,
    event_index: usize,
) -> Result<PgnTree, TransformError> {
    let root = repertoire.root().clone();
    let mut board = Board::from_fingerprint(&root)?;
    let mut tree = PgnTree::new(root.clone());

    tree.headers = repertoire.tree().headers.clone();
    if let Some(label) = format_prefix(repertoire, &event.prefix)? {
        tree.headers.set("Event", label);
    } else if tree.headers.get("Event").is_none() {
        tree.headers.set("Event", "Repertoire Split");
    }
    if root == Board::initial().fingerprint() {
        tree.headers.remove("SetUp");
        tree.headers.remove("FEN");
    } else {
        tree.headers.set("SetUp", "1");
        tree.headers.set("FEN", root.as_str());
    }
    if matches!(tree.headers.get("Round"), None | Some("?")) {
        tree.headers.set("Round", event_index.to_string());
    }

    let mut cursor = tree.root();
    for uci in &event.prefix {
        let mv = board.parse_uci(uci)?;
        board = board.play(&mv);
        cursor = tree.add_variation(cursor, mv.uci(), mv.san(), board.fingerprint());
    }

    copy_annotations(repertoire, &event.node, &mut tree, cursor);
    let mut visited = HashSet::from([event.node.clone()]);
    copy_subtree(repertoire, &event.node, &board, &mut tree, cursor, &mut visited)?;
    Ok(tree)
}

/// Render every event as one multi-game document, with compacted labels.
pub fn write_events(
    repertoire: &Repertoire,
    events: &[SplitEvent],
) -> Result<String, TransformError> {
    let labels = compact_labels(repertoire, events)?;
    let mut documents = Vec::with_capacity(events.len());
    for (index, (event, label)) in events.iter().zip(labels).enumerate() {
        let mut tree = build_document(repertoire, event, index + 1)?;
        if let Some(label) = label {
            tree.headers.set("Event", label);
        }
        documents.push(tree);
    }
    Ok(graph::pgn::write_documents(documents.iter()))
}

fn copy_annotations(
    repertoire: &Repertoire,
    fingerprint: &Fingerprint,
    tree: &mut PgnTree,
    id: TreeId,
) {
    if let Some(node) = repertoire.node(fingerprint) {
        if let Some(&alias) = node.aliases.first() {
            let source = repertoire.tree().node(alias);
            let comment = source.comment.clone();
            let nags = source.nags.clone();
            let target = tree.node_mut(id);
            target.comment = comment;
            target.nags = nags;
        }
    }
}

fn copy_subtree(
    repertoire: &Repertoire,
    fingerprint: &Fingerprint,
    board: &Board,
    tree: &mut PgnTree,
    target_id: TreeId,
    visited: &mut HashSet<Fingerprint>,
) -> Result<(), TransformError> {
    for (uci, child) in sorted_children(repertoire, fingerprint)? {
        if visited.contains(&child) {
            continue;
        }
        let mv = match board.parse_uci(&uci) {
            Ok(mv) => mv,
            Err(err) => {
                warn!("Skipping unplayable edge {uci} at {fingerprint}: {err}");
                continue;
            }
        };
        let next = board.play(&mv);

        visited.insert(child.clone());
        let id = tree.add_variation(target_id, mv.uci(), mv.san(), next.fingerprint());
        copy_annotations(repertoire, &child, tree, id);
        copy_subtree(repertoire, &child, &next, tree, id, visited)?;
        visited.remove(&child);
    }
    Ok(())
}

/// The prefix in move-number notation, or `None` for an empty prefix.
fn format_prefix(
    repertoire: &Repertoire,
    prefix: &[String],
) -> Result<Option<String>, TransformError> {
    if prefix.is_empty() {
        return Ok(None);
    }
    let board = Board::from_fingerprint(repertoire.root())?;
    let tokens = tokenize_moves(board, prefix)?;
    Ok(Some(tokens.join(" ")))
}

fn tokenize_moves(mut board: Board, ucis: &[String]) -> Result<Vec<String>, TransformError> {
    let mut tokens: Vec<String> = Vec::with_capacity(ucis.len());
    for uci in ucis {
        let mv = board.parse_uci(uci)?;
        let number = board.fullmove_number();
        if board.turn() == Color::White {
            tokens.push(format!("{number}.{}", mv.san()));
        } else if tokens
            .last()
            .map_or(false, |last| last.starts_with(&format!("{number}.")))
        {
            tokens.push(mv.san().to_string());
        } else {
            tokens.push(format!("{number}...{}", mv.san()));
        }
        board = board.play(&mv);
    }
    Ok(tokens)
}

/// Labels relative to the longest shared prefix. Events sitting exactly at
/// the shared prefix get `None`.
pub fn compact_labels(
    repertoire: &Repertoire,
    events: &[SplitEvent],
) -> Result<Vec<Option<String>>, TransformError> {
    let shared = shared_prefix(events);
    if shared.is_empty() {
        return Ok(vec![None; events.len()]);
    }

    let mut labels = Vec::with_capacity(events.len());
    for event in events {
        if event.prefix.len() <= shared.len() {
            labels.push(None);
            continue;
        }
        let mut board = Board::from_fingerprint(repertoire.root())?;
        for uci in &shared {
            let mv = board.parse_uci(uci)?;
            board = board.play(&mv);
        }
        let tokens = tokenize_moves(board, &event.prefix[shared.len()..])?;
        labels.push(if tokens.is_empty() {
            None
        } else {
            Some(tokens.join(" "))
        });
    }
    Ok(labels)
}

fn shared_prefix(events: &[SplitEvent]) -> Vec<String> {
    let mut sequences = events.iter().map(|e| &e.prefix).filter(|p| !p.is_empty());
    let Some(first) = sequences.next() else {
        return Vec::new();
    };
    let mut prefix = first.clone();
    for sequence in sequences {
        let limit = prefix.len().min(sequence.len());
        let mut index = 0;
        while index < limit && prefix[index] == sequence[index] {
            index += 1;
        }
        prefix.truncate(index);
        if prefix.is_empty() {
            break;
        }
    }
    prefix
}
