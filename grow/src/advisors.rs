//! Traits for the two external advisory services: a move-search engine that
//! evaluates candidate moves, and a statistics service that reports how often
//! moves are actually played. Transport is out of scope; implementations wrap
//! whatever protocol the service speaks and surface [`FetchError`] so retry
//! classification works.

use async_trait::async_trait;
use engine::{Fingerprint, Score};
use fetch::{CacheContext, FetchError};
use serde::{Deserialize, Serialize};

/// Evaluation request for a single position.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvalRequest {
    pub fen: String,
    pub multi_pv: usize,
}

impl EvalRequest {
    pub fn new(fingerprint: &Fingerprint, multi_pv: usize) -> Self {
        Self {
            fen: fingerprint.to_string(),
            multi_pv,
        }
    }
}

impl CacheContext for EvalRequest {
    fn key(&self) -> String {
        format!("eval|{}|{}", self.fen, self.multi_pv)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvalMove {
    pub uci: String,
    pub score: Score,
}

/// Ranked evaluations, best first.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EvalResponse {
    pub moves: Vec<EvalMove>,
}

impl EvalResponse {
    pub fn best_score(&self) -> Option<Score> {
        self.moves.iter().map(|m| m.score).max()
    }
}

/// Play-count request for a single position.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatsRequest {
    pub fen: String,
    pub speeds: String,
    pub ratings: String,
    pub max_listed_moves: usize,
}

impl StatsRequest {
    pub fn new(fingerprint: &Fingerprint, speeds: &str, ratings: &str) -> Self {
        Self {
            fen: fingerprint.to_string(),
            speeds: speeds.to_string(),
            ratings: ratings.to_string(),
            max_listed_moves: 15,
        }
    }
}

impl CacheContext for StatsRequest {
    fn key(&self) -> String {
        format!(
            "stats|{}|{}|{}|{}",
            self.fen, self.speeds, self.ratings, self.max_listed_moves
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MoveTotal {
    pub san: String,
    pub total: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatsResponse {
    pub moves: Vec<MoveTotal>,
    /// Aggregate game count for the position itself.
    pub total_games: u64,
}

#[async_trait]
pub trait MoveSearch: Send + Sync {
    async fn evaluate(&self, request: &EvalRequest) -> Result<EvalResponse, FetchError>;
}

#[async_trait]
pub trait MoveStats: Send + Sync {
    async fn totals(&self, request: &StatsRequest) -> Result<StatsResponse, FetchError>;
}
