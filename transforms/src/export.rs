//! Export a repertoire as flashcard rows, one root-to-leaf line per row.
//!
//! Each row carries an id, a short description, the root position and the
//! SAN move sequence, optionally followed by the line's reach count. Rows
//! render as a fully-quoted CSV document for spaced-repetition imports.

use std::collections::HashSet;

use engine::{Board, Fingerprint};
use graph::{Headers, Repertoire};
use log::warn;

use super::split::sorted_children;
use super::TransformError;

#[derive(Clone, Debug)]
pub struct ExportOptions {
    /// Cap move sequences to this many plies.
    pub max_plies: Option<usize>,
    /// Skip lines shorter than this many plies after capping.
    pub min_plies: Option<usize>,
    /// SAN tokens shown in the description when no header supplies one.
    pub description_plies: usize,
    /// Drop duplicate move sequences (after applying the ply bounds).
    pub dedupe: bool,
    /// Append the reach count as a trailing column.
    pub include_games_reached: bool,
    /// Order rows by reach count, most-played lines first.
    pub sort_by_games_reached: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            max_plies: None,
            min_plies: None,
            description_plies: 8,
            dedupe: false,
            include_games_reached: false,
            sort_by_games_reached: false,
        }
    }
}

/// SAN move lists from the root to every leaf, paired with the leaf, in
/// ascending-SAN order at every branch. A child already on the current path
/// (a repetition) is skipped, as is any edge that fails to resolve.
pub fn san_lines(
    repertoire: &Repertoire,
) -> Result<Vec<(Vec<String>, Fingerprint)>, TransformError> {
    let root = repertoire.root().clone();
    let board = Board::from_fingerprint(&root)?;

    let mut lines = Vec::new();
    let mut moves = Vec::new();
    let mut visited = HashSet::from([root.clone()]);
    walk_lines(repertoire, &root, &board, &mut moves, &mut visited, &mut lines)?;
    Ok(lines)
}

fn walk_lines(
    repertoire: &Repertoire,
    fingerprint: &Fingerprint,
    board: &Board,
    moves: &mut Vec<String>,
    visited: &mut HashSet<Fingerprint>,
    lines: &mut Vec<(Vec<String>, Fingerprint)>,
) -> Result<(), TransformError> {
    let node = repertoire
        .node(fingerprint)
        .ok_or_else(|| TransformError::MissingNode(fingerprint.clone()))?;
    if node.is_leaf() {
        lines.push((moves.clone(), fingerprint.clone()));
        return Ok(());
    }

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
        moves.push(mv.san().to_string());
        walk_lines(repertoire, &child, &next, moves, visited, lines)?;
        moves.pop();
        visited.remove(&child);
    }
    Ok(())
}

/// Build the export rows: `[id, description, root position, moves]`, plus a
/// reach-count column when requested. Ids start at 1 after filtering and
/// sorting.
pub fn export_rows(
    repertoire: &Repertoire,
    options: &ExportOptions,
) -> Result<Vec<Vec<String>>, TransformError> {
    let root_fen = repertoire.root().to_string();
    let headers = &repertoire.tree().headers;
    let min_required = options.min_plies.unwrap_or(0);

    let mut seen = HashSet::new();
    let mut rows: Vec<(String, String, u64)> = Vec::new();
    for (sans, leaf) in san_lines(repertoire)? {
        let limited = match options.max_plies {
            Some(cap) => &sans[..sans.len().min(cap)],
            None => &sans[..],
        };
        if limited.len() < min_required {
            continue;
        }
        let moves = limited.join(" ");
        if moves.is_empty() {
            continue;
        }
        if options.dedupe && !seen.insert(moves.clone()) {
            continue;
        }
        let description = describe(limited, headers, options.description_plies);
        let games_reached = repertoire
            .node(&leaf)
            .and_then(|node| node.games_reached)
            .unwrap_or(0);
        rows.push((description, moves, games_reached));
    }

    if options.sort_by_games_reached {
        rows.sort_by(|a, b| b.2.cmp(&a.2));
    }

    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(index, (description, moves, games_reached))| {
            let mut row = vec![(index + 1).to_string(), description, root_fen.clone(), moves];
            if options.include_games_reached {
                row.push(games_reached.to_string());
            }
            row
        })
        .collect())
}

/// Description preference: the `Variation` header, then `ECO`, then the
/// opening SAN tokens of the line itself.
fn describe(moves: &[String], headers: &Headers, description_plies: usize) -> String {
    for key in ["Variation", "ECO"] {
        if let Some(value) = headers.get(key) {
            if !value.is_empty() && value != "?" {
                return value.to_string();
            }
        }
    }
    if description_plies < 1 {
        return String::new();
    }
    moves
        .iter()
        .take(description_plies)
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render rows as CSV with every field quoted, `"` doubled, CRLF-terminated.
pub fn write_csv(rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    for row in rows {
        let quoted: Vec<String> = row
            .iter()
            .map(|field| format!("\"{}\"", field.replace('"', "\"\"")))
            .collect();
        out.push_str(&quoted.join(","));
        out.push_str("\r\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::Color;

    fn rep_with_two_lines() -> Repertoire {
        let mut rep = Repertoire::new(Color::White);
        rep.play_initial_moves("e4 e5 Nf3").unwrap();
        rep.play_initial_moves("e4 c5").unwrap();
        rep
    }

    #[test]
    fn lines_run_root_to_leaf_in_notation_order() {
        let rep = rep_with_two_lines();
        let lines = san_lines(&rep).unwrap();
        let sans: Vec<String> = lines.iter().map(|(moves, _)| moves.join(" ")).collect();
        // "c5" sorts before "e5" at the reply branch.
        assert_eq!(sans, vec!["e4 c5", "e4 e5 Nf3"]);
    }

    #[test]
    fn repeated_positions_do_not_loop_the_walk() {
        let mut rep = Repertoire::new(Color::White);
        rep.play_initial_moves("Nf3 Nf6 c4 g6").unwrap();
        rep.play_initial_moves("c4 Nf6 Nf3 g6").unwrap();

        let lines = san_lines(&rep).unwrap();
        assert!(!lines.is_empty());
        for (moves, _) in &lines {
            assert!(moves.len() <= rep.len());
        }
    }

    #[test]
    fn rows_carry_id_description_root_and_moves() {
        let rep = rep_with_two_lines();
        let rows = export_rows(&rep, &ExportOptions::default()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "1");
        assert_eq!(rows[0][1], "e4 c5");
        assert_eq!(rows[0][2], rep.root().to_string());
        assert_eq!(rows[0][3], "e4 c5");
        assert_eq!(rows[1][0], "2");
        assert_eq!(rows[1][3], "e4 e5 Nf3");
    }

    #[test]
    fn ply_bounds_cap_and_filter_lines() {
        let rep = rep_with_two_lines();
        let rows = export_rows(
            &rep,
            &ExportOptions {
                max_plies: Some(2),
                dedupe: true,
                ..ExportOptions::default()
            },
        )
        .unwrap();
        // Both lines cap to two plies; "e4 e5" and "e4 c5" stay distinct.
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][3], "e4 e5");

        let rows = export_rows(
            &rep,
            &ExportOptions {
                min_plies: Some(3),
                ..ExportOptions::default()
            },
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][3], "e4 e5 Nf3");
    }

    #[test]
    fn capped_duplicates_collapse_when_deduped() {
        let mut rep = Repertoire::new(Color::White);
        rep.play_initial_moves("e4 e5 Nf3").unwrap();
        rep.play_initial_moves("e4 e5 Bc4").unwrap();

        let options = ExportOptions {
            max_plies: Some(2),
            ..ExportOptions::default()
        };
        assert_eq!(export_rows(&rep, &options).unwrap().len(), 2);

        let options = ExportOptions {
            dedupe: true,
            ..options
        };
        assert_eq!(export_rows(&rep, &options).unwrap().len(), 1);
    }

    #[test]
    fn description_prefers_headers_over_moves() {
        let mut rep = rep_with_two_lines();
        let rows = export_rows(
            &rep,
            &ExportOptions {
                description_plies: 1,
                ..ExportOptions::default()
            },
        )
        .unwrap();
        assert_eq!(rows[0][1], "e4");

        rep.tree_mut().headers.set("ECO", "B20");
        let rows = export_rows(&rep, &ExportOptions::default()).unwrap();
        assert_eq!(rows[0][1], "B20");

        rep.tree_mut().headers.set("Variation", "Sicilian");
        let rows = export_rows(&rep, &ExportOptions::default()).unwrap();
        assert_eq!(rows[0][1], "Sicilian");

        // A "?" placeholder does not count as a description.
        rep.tree_mut().headers.set("Variation", "?");
        let rows = export_rows(&rep, &ExportOptions::default()).unwrap();
        assert_eq!(rows[0][1], "B20");
    }

    #[test]
    fn reach_counts_append_and_sort_rows() {
        let mut rep = rep_with_two_lines();
        let leaves = rep.leaves();
        // The leaf of the longer line, where black is to move.
        let open_game_leaf = leaves
            .iter()
            .find(|fp| fp.side_to_move() == Color::Black)
            .unwrap()
            .clone();
        rep.node_mut(&open_game_leaf).unwrap().games_reached = Some(70);

        let rows = export_rows(
            &rep,
            &ExportOptions {
                include_games_reached: true,
                sort_by_games_reached: true,
                ..ExportOptions::default()
            },
        )
        .unwrap();

        // The counted line sorts ahead of the notation-first one.
        assert_eq!(rows[0][0], "1");
        assert_eq!(rows[0][3], "e4 e5 Nf3");
        assert_eq!(rows[0][4], "70");
        assert_eq!(rows[1][3], "e4 c5");
        assert_eq!(rows[1][4], "0");
    }

    #[test]
    fn csv_quotes_every_field_and_doubles_quotes() {
        let rows = vec![vec![
            "1".to_string(),
            "the \"Dragon\"".to_string(),
            "e4 c5".to_string(),
        ]];
        assert_eq!(
            write_csv(&rows),
            "\"1\",\"the \"\"Dragon\"\"\",\"e4 c5\"\r\n"
        );
    }
}
