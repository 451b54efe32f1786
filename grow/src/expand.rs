//! Turn-routed frontier expansion.
//!
//! Player-turn leaves are widened with engine candidates, opponent-turn
//! leaves with the most-played replies from the statistics service. Each
//! partition is drained by a bounded pool of cooperative workers pulling
//! from a shared queue; fetches run outside the graph lock and all of one
//! leaf's commits happen inside a single critical section.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use engine::{Board, Fingerprint, PlayedMove};
use fetch::{CacheStore, FetchError, Fetcher, RateLimiter};
use futures::stream::{FuturesUnordered, StreamExt};
use graph::Repertoire;
use log::{info, warn};
use tokio::sync::Mutex;

use super::advisors::{EvalRequest, EvalResponse, MoveSearch, MoveStats, StatsRequest, StatsResponse};
use super::options::GrowOptions;
use super::selection;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Route {
    Search,
    Stats,
}

/// Outcome of one frontier batch. A failed leaf stays a leaf and can be
/// retried on the next pass.
#[derive(Debug, Default)]
pub struct ExpansionReport {
    /// UCI moves committed per expanded leaf.
    pub committed: HashMap<Fingerprint, Vec<String>>,
    pub failed: Vec<(Fingerprint, anyhow::Error)>,
}

impl ExpansionReport {
    pub fn committed_moves(&self) -> usize {
        self.committed.values().map(Vec::len).sum()
    }

    fn merge(&mut self, other: ExpansionReport) {
        self.committed.extend(other.committed);
        self.failed.extend(other.failed);
    }
}

pub struct Expander {
    search: Arc<dyn MoveSearch>,
    stats: Arc<dyn MoveStats>,
    eval_fetcher: Fetcher<Arc<dyn CacheStore>>,
    stats_fetcher: Fetcher<Arc<dyn CacheStore>>,
    options: GrowOptions,
}

impl Expander {
    pub fn new(
        search: Arc<dyn MoveSearch>,
        stats: Arc<dyn MoveStats>,
        store: Arc<dyn CacheStore>,
        options: GrowOptions,
    ) -> Self {
        // The search engine is local, so it gets concurrency but no pacing;
        // the statistics service gets the configured limiter.
        let eval_fetcher = Fetcher::new(
            store.clone(),
            RateLimiter::new(options.max_concurrency, Duration::ZERO),
            options.retry_policy(),
        );
        let stats_fetcher = Fetcher::new(store, options.stats_limiter(), options.retry_policy());

        Self {
            search,
            stats,
            eval_fetcher,
            stats_fetcher,
            options,
        }
    }

    pub fn options(&self) -> &GrowOptions {
        &self.options
    }

    /// Expand every current leaf of the repertoire by one ply.
    pub async fn expand_frontier(&self, repertoire: &Mutex<Repertoire>) -> ExpansionReport {
        let (player, opponent): (Vec<_>, Vec<_>) = {
            let rep = repertoire.lock().await;
            rep.leaves()
                .into_iter()
                .partition(|leaf| rep.is_player_turn(leaf))
        };

        info!(
            "Expanding frontier: {} player-turn, {} opponent-turn",
            player.len(),
            opponent.len()
        );

        let (mut report, stats_report) = futures::join!(
            self.drain_partition(player, Route::Search, repertoire),
            self.drain_partition(opponent, Route::Stats, repertoire),
        );
        report.merge(stats_report);
        report
    }

    async fn drain_partition(
        &self,
        frontier: Vec<Fingerprint>,
        route: Route,
        repertoire: &Mutex<Repertoire>,
    ) -> ExpansionReport {
        let mut report = ExpansionReport::default();
        if frontier.is_empty() {
            return report;
        }

        let worker_count = self.options.max_concurrency.max(1).min(frontier.len());
        let queue = Arc::new(Mutex::new(VecDeque::from(frontier)));

        let mut workers: FuturesUnordered<_> = (0..worker_count)
            .map(|_| self.worker(queue.clone(), route, repertoire))
            .collect();

        while let Some(partial) = workers.next().await {
            report.merge(partial);
        }
        report
    }

    async fn worker(
        &self,
        queue: Arc<Mutex<VecDeque<Fingerprint>>>,
        route: Route,
        repertoire: &Mutex<Repertoire>,
    ) -> ExpansionReport {
        let mut report = ExpansionReport::default();
        loop {
            let Some(leaf) = queue.lock().await.pop_front() else {
                break;
            };
            match self.expand_leaf(&leaf, route, repertoire).await {
                Ok(committed) => {
                    report.committed.insert(leaf, committed);
                }
                Err(err) => {
                    warn!("Expansion failed for {leaf}: {err:#}");
                    report.failed.push((leaf, err));
                }
            }
        }
        report
    }

    async fn expand_leaf(
        &self,
        leaf: &Fingerprint,
        route: Route,
        repertoire: &Mutex<Repertoire>,
    ) -> Result<Vec<String>> {
        let board = Board::from_fingerprint(leaf)?;

        let candidates: Vec<PlayedMove> = match route {
            Route::Search => {
                let request = EvalRequest::new(leaf, self.options.multi_pv);
                let response = self.evaluate(&request).await?;
                selection::moves_within_threshold(&response, self.options.best_score_threshold)
                    .iter()
                    .filter_map(|uci| match board.parse_uci(uci) {
                        Ok(mv) => Some(mv),
                        Err(err) => {
                            warn!("Skipping engine move {uci} at {leaf}: {err}");
                            None
                        }
                    })
                    .collect()
            }
            Route::Stats => {
                let request =
                    StatsRequest::new(leaf, &self.options.speeds, &self.options.ratings);
                let response = self.totals(&request).await?;
                selection::top_share_moves(&response, &self.options.share_policy())
                    .iter()
                    .filter_map(|candidate| match board.parse_san(&candidate.san) {
                        Ok(mv) => Some(mv),
                        Err(err) => {
                            warn!("Skipping reported move {} at {leaf}: {err}", candidate.san);
                            None
                        }
                    })
                    .collect()
            }
        };

        // One critical section per leaf: the duplicate-edge checks and every
        // commit for this fan-out happen under the same guard.
        let mut committed = Vec::new();
        let mut rep = repertoire.lock().await;
        for mv in candidates {
            let exists = rep
                .node(leaf)
                .map_or(false, |node| node.children.contains_key(mv.uci()));
            if exists {
                continue;
            }
            let child = board.play(&mv).fingerprint();
            rep.commit_edge(leaf, &mv, child)?;
            committed.push(mv.uci().to_string());
        }
        Ok(committed)
    }

    async fn evaluate(&self, request: &EvalRequest) -> Result<EvalResponse, FetchError> {
        let fetched = self
            .eval_fetcher
            .fetch(request, || async {
                let response = self.search.evaluate(request).await?;
                serde_json::to_value(&response).map_err(|err| FetchError::Payload(err.to_string()))
            })
            .await?;
        serde_json::from_value(fetched.value).map_err(|err| FetchError::Payload(err.to_string()))
    }

    async fn totals(&self, request: &StatsRequest) -> Result<StatsResponse, FetchError> {
        let fetched = self
            .stats_fetcher
            .fetch(request, || async {
                let response = self.stats.totals(request).await?;
                serde_json::to_value(&response).map_err(|err| FetchError::Payload(err.to_string()))
            })
            .await?;
        serde_json::from_value(fetched.value).map_err(|err| FetchError::Payload(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisors::{EvalMove, MoveTotal};
    use async_trait::async_trait;
    use engine::{Color, Score};
    use fetch::MemoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct ScriptedSearch {
        by_fen: HashMap<String, Vec<(&'static str, i32)>>,
        calls: AtomicU32,
    }

    impl ScriptedSearch {
        fn script(mut self, board: &Board, moves: &[(&'static str, i32)]) -> Self {
            self.by_fen
                .insert(board.fingerprint().to_string(), moves.to_vec());
            self
        }
    }

    #[async_trait]
    impl MoveSearch for ScriptedSearch {
        async fn evaluate(&self, request: &EvalRequest) -> Result<EvalResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let moves = self
                .by_fen
                .get(&request.fen)
                .map(|entries| {
                    entries
                        .iter()
                        .map(|(uci, cp)| EvalMove {
                            uci: uci.to_string(),
                            score: Score::Cp(*cp),
                        })
                        .collect()
                })
                .unwrap_or_default();
            Ok(EvalResponse { moves })
        }
    }

    #[derive(Default)]
    struct ScriptedStats {
        by_fen: HashMap<String, Vec<(&'static str, u64)>>,
        fail_fens: Vec<String>,
    }

    impl ScriptedStats {
        fn script(mut self, board: &Board, moves: &[(&'static str, u64)]) -> Self {
            self.by_fen
                .insert(board.fingerprint().to_string(), moves.to_vec());
            self
        }

        fn failing_at(mut self, board: &Board) -> Self {
            self.fail_fens.push(board.fingerprint().to_string());
            self
        }
    }

    #[async_trait]
    impl MoveStats for ScriptedStats {
        async fn totals(&self, request: &StatsRequest) -> Result<StatsResponse, FetchError> {
            if self.fail_fens.contains(&request.fen) {
                return Err(FetchError::Rejected {
                    status: 404,
                    message: "position not indexed".to_string(),
                });
            }
            let moves: Vec<MoveTotal> = self
                .by_fen
                .get(&request.fen)
                .map(|entries| {
                    entries
                        .iter()
                        .map(|(san, total)| MoveTotal {
                            san: san.to_string(),
                            total: *total,
                        })
                        .collect()
                })
                .unwrap_or_default();
            let total_games = moves.iter().map(|m| m.total).sum();
            Ok(StatsResponse { moves, total_games })
        }
    }

    fn options() -> GrowOptions {
        GrowOptions {
            top_pct: 70.0,
            stats_min_delay_secs: 0.0,
            jitter_secs: 0.0,
            ..GrowOptions::default()
        }
    }

    fn expander(search: ScriptedSearch, stats: ScriptedStats, opts: GrowOptions) -> Expander {
        Expander::new(
            Arc::new(search),
            Arc::new(stats),
            Arc::new(MemoryStore::new()),
            opts,
        )
    }

    fn after(board: &Board, san: &str) -> Board {
        board.play(&board.parse_san(san).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn player_leaves_widen_with_near_best_engine_moves() {
        let start = Board::initial();
        let search =
            ScriptedSearch::default().script(&start, &[("e2e4", 30), ("d2d4", 25), ("a2a3", -80)]);
        let expander = expander(search, ScriptedStats::default(), options());
        let repertoire = Mutex::new(Repertoire::new(Color::White));

        let report = expander.expand_frontier(&repertoire).await;

        assert!(report.failed.is_empty());
        assert_eq!(report.committed_moves(), 2);
        let rep = repertoire.lock().await;
        let root = rep.node(rep.root()).unwrap();
        assert!(root.children.contains_key("e2e4"));
        assert!(root.children.contains_key("d2d4"));
        assert!(!root.children.contains_key("a2a3"));
    }

    #[tokio::test(start_paused = true)]
    async fn opponent_leaves_widen_with_popular_replies() {
        let start = Board::initial();
        let after_e4 = after(&start, "e4");
        let stats =
            ScriptedStats::default().script(&after_e4, &[("e5", 50), ("c5", 30), ("d6", 20)]);
        let expander = expander(ScriptedSearch::default(), stats, options());

        let mut rep = Repertoire::new(Color::White);
        rep.play_initial_moves("e4").unwrap();
        let repertoire = Mutex::new(rep);

        let report = expander.expand_frontier(&repertoire).await;

        assert!(report.failed.is_empty());
        let rep = repertoire.lock().await;
        let node = rep.node(&after_e4.fingerprint()).unwrap();
        // 70% coverage: e5 (50%) then c5 crossing the line; d6 stays out.
        assert!(node.children.contains_key("e7e5"));
        assert!(node.children.contains_key("c7c5"));
        assert!(!node.children.contains_key("d7d6"));
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_leaf_does_not_abort_the_batch() {
        let start = Board::initial();
        let after_e4 = after(&start, "e4");
        let after_d4 = after(&start, "d4");
        let stats = ScriptedStats::default()
            .script(&after_e4, &[("e5", 100)])
            .failing_at(&after_d4);
        let expander = expander(ScriptedSearch::default(), stats, options());

        let mut rep = Repertoire::new(Color::White);
        rep.play_initial_moves("e4").unwrap();
        rep.play_initial_moves("d4").unwrap();
        let repertoire = Mutex::new(rep);

        let report = expander.expand_frontier(&repertoire).await;

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, after_d4.fingerprint());
        let rep = repertoire.lock().await;
        assert!(rep
            .node(&after_e4.fingerprint())
            .unwrap()
            .children
            .contains_key("e7e5"));
        // The failed leaf is untouched and remains on the frontier.
        assert!(rep.node(&after_d4.fingerprint()).unwrap().is_leaf());
    }

    #[tokio::test(start_paused = true)]
    async fn existing_edges_are_not_committed_again() {
        let start = Board::initial();
        let search = ScriptedSearch::default().script(&start, &[("e2e4", 30), ("d2d4", 25)]);
        let expander = expander(search, ScriptedStats::default(), options());

        let mut rep = Repertoire::new(Color::White);
        let root = rep.root().clone();
        let e4 = start.parse_san("e4").unwrap();
        rep.commit_edge(&root, &e4, start.play(&e4).fingerprint())
            .unwrap();
        assert_eq!(rep.node(&root).unwrap().children.len(), 1);
        let repertoire = Mutex::new(rep);

        let committed = expander
            .expand_leaf(&root, Route::Search, &repertoire)
            .await
            .unwrap();

        // e2e4 already exists as an edge and is skipped; only d2d4 lands.
        assert_eq!(committed, vec!["d2d4"]);
        let rep = repertoire.lock().await;
        assert_eq!(rep.node(&root).unwrap().children.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_sessions_hit_the_cache() {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        let start = Board::initial();
        let search = Arc::new(ScriptedSearch::default().script(&start, &[("e2e4", 30)]));

        for _ in 0..2 {
            let expander = Expander::new(
                search.clone(),
                Arc::new(ScriptedStats::default()),
                store.clone(),
                options(),
            );
            let repertoire = Mutex::new(Repertoire::new(Color::White));
            expander.expand_frontier(&repertoire).await;

            let rep = repertoire.lock().await;
            assert!(rep.node(rep.root()).unwrap().children.contains_key("e2e4"));
        }

        // The second session was served entirely from the shared cache.
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    }
}
