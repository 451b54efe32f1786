//! Prune a repertoire down to one move per player-turn position.
//!
//! Moves are chosen by preferred-label membership, then by how often the same
//! move shape appears across the whole repertoire (a repertoire that plays
//! Nf3 from many positions should keep playing it), then by notation.

use std::collections::{HashMap, HashSet};

use engine::{Board, Fingerprint, MoveShape};
use graph::{PgnTree, Repertoire, TreeId};

use super::TransformError;

/// One ranked candidate move at a player-turn position.
#[derive(Clone, Debug)]
pub struct RankedMove {
    pub uci: String,
    pub san: String,
    pub frequency: u32,
    pub preferred: bool,
    pub child: Fingerprint,
}

/// Case-insensitive, with trailing check and mate punctuation stripped, so
/// "Nf3+" and "nf3" name the same move.
fn normalize_label(label: &str) -> String {
    label.trim_end_matches(['+', '#']).to_lowercase()
}

/// Count move shapes over every (player-turn node, outgoing edge) pair.
/// Shapes merge promotion choices; edges are counted once per parent even
/// when transpositions share the child.
pub fn move_frequencies(
    repertoire: &Repertoire,
) -> Result<HashMap<MoveShape, u32>, TransformError> {
    let mut counts = HashMap::new();
    for fingerprint in repertoire.player_nodes() {
        let board = Board::from_fingerprint(&fingerprint)?;
        let node = repertoire
            .node(&fingerprint)
            .expect("player_nodes lists known fingerprints");
        for uci in node.children.keys() {
            let mv = board.parse_uci(uci)?;
            *counts.entry(mv.shape()?).or_insert(0) += 1;
        }
    }
    Ok(counts)
}

/// Candidates per player-turn position, best first.
pub fn rankings(
    repertoire: &Repertoire,
    preferred_labels: &[String],
    frequencies: &HashMap<MoveShape, u32>,
) -> Result<HashMap<Fingerprint, Vec<RankedMove>>, TransformError> {
    let preferred: HashSet<String> = preferred_labels.iter().map(|l| normalize_label(l)).collect();

    let mut rankings = HashMap::new();
    for fingerprint in repertoire.player_nodes() {
        let board = Board::from_fingerprint(&fingerprint)?;
        let node = repertoire
            .node(&fingerprint)
            .expect("player_nodes lists known fingerprints");

        let mut ranked = Vec::with_capacity(node.children.len());
        for (uci, child) in &node.children {
            let mv = board.parse_uci(uci)?;
            let frequency = frequencies.get(&mv.shape()?).copied().unwrap_or(0);
            let is_preferred = preferred.contains(&normalize_label(mv.san()))
                || preferred.contains(&normalize_label(uci));
            ranked.push(RankedMove {
                uci: uci.clone(),
                san: mv.san().to_string(),
                frequency,
                preferred: is_preferred,
                child: child.clone(),
            });
        }
        ranked.sort_by(|a, b| {
            b.preferred
                .cmp(&a.preferred)
                .then(b.frequency.cmp(&a.frequency))
                .then(a.san.cmp(&b.san))
        });
        rankings.insert(fingerprint, ranked);
    }
    Ok(rankings)
}

/// The chosen move per player-turn position (top-ranked candidate).
pub fn select_line(
    repertoire: &Repertoire,
    preferred_labels: &[String],
) -> Result<HashMap<Fingerprint, RankedMove>, TransformError> {
    let frequencies = move_frequencies(repertoire)?;
    let rankings = rankings(repertoire, preferred_labels, &frequencies)?;
    Ok(rankings
        .into_iter()
        .filter_map(|(fingerprint, ranked)| {
            ranked.into_iter().next().map(|top| (fingerprint, top))
        })
        .collect())
}

/// Copy of the serialization tree keeping only the selected variation at
/// player-turn nodes; all variations survive elsewhere. Annotations are
/// copied verbatim.
pub fn pruned_tree(
    repertoire: &Repertoire,
    preferred_labels: &[String],
) -> Result<PgnTree, TransformError> {
    let selection = select_line(repertoire, preferred_labels)?;
    let source = repertoire.tree();

    let source_root = source.node(source.root());
    let mut target = PgnTree::new(source_root.fingerprint.clone());
    target.headers = source.headers.clone();
    {
        let root = target.root();
        let node = target.node_mut(root);
        node.comment = source_root.comment.clone();
        node.nags = source_root.nags.clone();
    }

    let target_root = target.root();
    copy_variations(
        repertoire,
        &selection,
        source,
        source.root(),
        &mut target,
        target_root,
    )?;
    Ok(target)
}

fn copy_variations(
    repertoire: &Repertoire,
    selection: &HashMap<Fingerprint, RankedMove>,
    source: &PgnTree,
    source_id: TreeId,
    target: &mut PgnTree,
    target_id: TreeId,
) -> Result<(), TransformError> {
    let source_node = source.node(source_id);
    let fingerprint = &source_node.fingerprint;
    if repertoire.node(fingerprint).is_none() {
        return Err(TransformError::MissingNode(fingerprint.clone()));
    }

    let is_player_turn = repertoire.is_player_turn(fingerprint);
    let selected_uci = selection.get(fingerprint).map(|s| s.uci.as_str());

    for &child_id in &source.node(source_id).variations.clone() {
        let child = source.node(child_id);
        let uci = child
            .uci
            .clone()
            .expect("non-root tree nodes carry a move");
        if is_player_turn {
            if let Some(selected) = selected_uci {
                if uci != selected {
                    continue;
                }
            }
        }

        let san = child.san.clone().unwrap_or_else(|| uci.clone());
        let comment = child.comment.clone();
        let nags = child.nags.clone();
        let new_id = target.add_variation(target_id, &uci, &san, child.fingerprint.clone());
        {
            let node = target.node_mut(new_id);
            node.comment = comment;
            node.nags = nags;
        }
        copy_variations(repertoire, selection, source, child_id, target, new_id)?;
    }
    Ok(())
}
