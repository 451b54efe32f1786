//! Move selection policies for the two expansion routes.

use super::advisors::{EvalResponse, MoveTotal, StatsResponse};

/// Keep moves whose evaluation is within `threshold` centipawns of the best.
pub fn moves_within_threshold(response: &EvalResponse, threshold: i32) -> Vec<String> {
    let Some(best) = response.best_score() else {
        return Vec::new();
    };
    response
        .moves
        .iter()
        .filter(|m| m.score.within(best, threshold))
        .map(|m| m.uci.clone())
        .collect()
}

/// Stop conditions for [`top_share_moves`].
#[derive(Clone, Copy, Debug)]
pub struct SharePolicy {
    /// Target coverage as a percentage of total games.
    pub pct: f64,
    /// Hard cap on the branching factor; `None` for unlimited.
    pub max_moves: Option<usize>,
    /// Floor (0..1) for the share of a move appended after the coverage
    /// target is already met; blocks a long tail of near-zero moves.
    pub min_game_share: f64,
}

impl Default for SharePolicy {
    fn default() -> Self {
        Self {
            pct: 90.0,
            max_moves: Some(8),
            min_game_share: 0.01,
        }
    }
}

/// Most-played moves covering `pct` percent of games, most popular first.
pub fn top_share_moves(response: &StatsResponse, policy: &SharePolicy) -> Vec<MoveTotal> {
    let mut totals: Vec<&MoveTotal> = response.moves.iter().collect();
    totals.sort_by(|a, b| b.total.cmp(&a.total));

    let total_games: u64 = totals.iter().map(|m| m.total).sum();
    if total_games == 0 {
        return Vec::new();
    }

    let threshold = total_games as f64 * policy.pct.max(0.0) / 100.0;
    let mut cumulative = 0u64;
    let mut result: Vec<MoveTotal> = Vec::new();

    for candidate in totals {
        if candidate.total == 0 {
            continue;
        }
        let share = candidate.total as f64 / total_games as f64;
        let previous_cumulative = cumulative as f64;
        cumulative += candidate.total;
        result.push(candidate.clone());

        let hit_cap = policy
            .max_moves
            .map_or(false, |cap| result.len() >= cap);

        let already_met_pct = previous_cumulative >= threshold && threshold > 0.0;
        if already_met_pct && share < policy.min_game_share.max(0.0) {
            result.pop();
            break;
        }

        if cumulative as f64 >= threshold || hit_cap || threshold == 0.0 {
            break;
        }
    }

    result
}
