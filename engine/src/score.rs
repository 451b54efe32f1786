use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

const MATE_VALUE: i32 = 32_000;

/// An evaluation from the side to move's point of view: centipawns or a
/// mate-in-N sentinel. Positive favors the side to move.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Score {
    Cp(i32),
    Mate(i32),
}

impl Score {
    /// Map onto a single centipawn axis so mates order above (or below) any
    /// centipawn value, nearer mates first.
    pub fn signed_cp(&self) -> i32 {
        match *self {
            Score::Cp(cp) => cp,
            Score::Mate(n) if n > 0 => MATE_VALUE - n,
            Score::Mate(n) => -MATE_VALUE - n,
        }
    }

    pub fn is_mate(&self) -> bool {
        matches!(self, Score::Mate(_))
    }

    /// Whether this score is within `threshold` centipawns of `best`.
    pub fn within(&self, best: Score, threshold: i32) -> bool {
        (best.signed_cp() - self.signed_cp()).abs() <= threshold
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.signed_cp().cmp(&other.signed_cp())
    }
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mates_order_above_centipawns() {
        assert!(Score::Mate(3) > Score::Cp(900));
        assert!(Score::Mate(2) > Score::Mate(3));
        assert!(Score::Mate(-2) < Score::Cp(-900));
        assert!(Score::Mate(-2) < Score::Mate(-5));
    }

    #[test]
    fn within_uses_centipawn_distance() {
        assert!(Score::Cp(10).within(Score::Cp(30), 20));
        assert!(!Score::Cp(0).within(Score::Cp(30), 20));
        assert!(Score::Mate(2).within(Score::Mate(2), 0));
        assert!(!Score::Cp(500).within(Score::Mate(2), 25));
    }
}
