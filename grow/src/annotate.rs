//! Reach-count annotation: record how many games reach each position.
//!
//! Totals come from the statistics service through the same rate-limited,
//! cached fetch path as expansion. The count is stored on the graph node and
//! mirrored into every tree alias comment as a `[rg:games=N]` tag, so it
//! survives a PGN round trip.

use std::collections::VecDeque;
use std::sync::Arc;

use engine::Fingerprint;
use fetch::{CacheStore, FetchError, Fetcher};
use futures::stream::{FuturesUnordered, StreamExt};
use graph::tags::upsert_reach_count_tag;
use graph::Repertoire;
use log::{info, warn};
use tokio::sync::Mutex;

use super::advisors::{MoveStats, StatsRequest, StatsResponse};
use super::options::GrowOptions;

#[derive(Clone, Copy, Debug, Default)]
pub struct AnnotateOptions {
    /// Overwrite counts on nodes that already carry one.
    pub force: bool,
    /// Annotate every node instead of only player-turn ones.
    pub include_opponent: bool,
}

pub struct Annotator {
    stats: Arc<dyn MoveStats>,
    fetcher: Fetcher<Arc<dyn CacheStore>>,
    options: GrowOptions,
}

impl Annotator {
    pub fn new(stats: Arc<dyn MoveStats>, store: Arc<dyn CacheStore>, options: GrowOptions) -> Self {
        let fetcher = Fetcher::new(store, options.stats_limiter(), options.retry_policy());
        Self {
            stats,
            fetcher,
            options,
        }
    }

    /// Annotate the repertoire; returns how many nodes were updated.
    /// Individual fetch failures are logged and skipped.
    pub async fn annotate_reach_counts(
        &self,
        repertoire: &Mutex<Repertoire>,
        annotate_options: &AnnotateOptions,
    ) -> usize {
        let targets: Vec<Fingerprint> = {
            let rep = repertoire.lock().await;
            let mut candidates = if annotate_options.include_opponent {
                let mut all: Vec<_> = rep.nodes().map(|n| n.fingerprint.clone()).collect();
                all.sort();
                all
            } else {
                rep.player_nodes()
            };
            if !annotate_options.force {
                candidates.retain(|fp| {
                    rep.node(fp)
                        .map_or(false, |node| node.games_reached.is_none())
                });
            }
            candidates
        };

        if targets.is_empty() {
            return 0;
        }
        info!("Annotating reach counts for {} positions", targets.len());

        let worker_count = self.options.max_concurrency.max(1).min(targets.len());
        let queue = Arc::new(Mutex::new(VecDeque::from(targets)));

        let mut workers: FuturesUnordered<_> = (0..worker_count)
            .map(|_| self.worker(queue.clone(), repertoire))
            .collect();

        let mut updated = 0;
        while let Some(partial) = workers.next().await {
            updated += partial;
        }
        updated
    }

    async fn worker(
        &self,
        queue: Arc<Mutex<VecDeque<Fingerprint>>>,
        repertoire: &Mutex<Repertoire>,
    ) -> usize {
        let mut updated = 0;
        loop {
            let Some(fingerprint) = queue.lock().await.pop_front() else {
                break;
            };
            let request =
                StatsRequest::new(&fingerprint, &self.options.speeds, &self.options.ratings);
            match self.totals(&request).await {
                Ok(response) => {
                    self.record(&fingerprint, response.total_games, repertoire)
                        .await;
                    updated += 1;
                }
                Err(err) => {
                    warn!("Reach-count fetch failed for {fingerprint}: {err}");
                }
            }
        }
        updated
    }

    async fn record(&self, fingerprint: &Fingerprint, total: u64, repertoire: &Mutex<Repertoire>) {
        let mut rep = repertoire.lock().await;
        let Some(node) = rep.node_mut(fingerprint) else {
            return;
        };
        node.games_reached = Some(total);
        let aliases = node.aliases.clone();
        for alias in aliases {
            let tree_node = rep.tree_mut().node_mut(alias);
            tree_node.comment = upsert_reach_count_tag(&tree_node.comment, total);
        }
    }

    async fn totals(&self, request: &StatsRequest) -> Result<StatsResponse, FetchError> {
        let fetched = self
            .fetcher
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
    use async_trait::async_trait;
    use engine::{Board, Color};
    use fetch::MemoryStore;
    use std::collections::HashMap;

    #[derive(Default)]
    struct TotalsByFen {
        by_fen: HashMap<String, u64>,
    }

    impl TotalsByFen {
        fn with(mut self, board: &Board, total: u64) -> Self {
            self.by_fen.insert(board.fingerprint().to_string(), total);
            self
        }
    }

    #[async_trait]
    impl MoveStats for TotalsByFen {
        async fn totals(&self, request: &StatsRequest) -> Result<StatsResponse, FetchError> {
            match self.by_fen.get(&request.fen) {
                Some(total) => Ok(StatsResponse {
                    moves: Vec::new(),
                    total_games: *total,
                }),
                None => Err(FetchError::Rejected {
                    status: 404,
                    message: "position not indexed".to_string(),
                }),
            }
        }
    }

    fn annotator(stats: TotalsByFen) -> Annotator {
        let options = GrowOptions {
            stats_min_delay_secs: 0.0,
            jitter_secs: 0.0,
            retries: 0,
            ..GrowOptions::default()
        };
        Annotator::new(Arc::new(stats), Arc::new(MemoryStore::new()), options)
    }

    fn small_repertoire() -> (Repertoire, Board, Board) {
        let start = Board::initial();
        let after_e4 = start.play(&start.parse_san("e4").unwrap());
        let after_e5 = after_e4.play(&after_e4.parse_san("e5").unwrap());
        let mut rep = Repertoire::new(Color::White);
        rep.play_initial_moves("e4 e5").unwrap();
        (rep, start, after_e5)
    }

    #[tokio::test(start_paused = true)]
    async fn player_nodes_get_counts_and_comment_tags() {
        let (rep, start, after_e5) = small_repertoire();
        let stats = TotalsByFen::default().with(&start, 1000).with(&after_e5, 400);
        let annotator = annotator(stats);
        let repertoire = Mutex::new(rep);

        let updated = annotator
            .annotate_reach_counts(&repertoire, &AnnotateOptions::default())
            .await;

        assert_eq!(updated, 2);
        let rep = repertoire.lock().await;
        let node = rep.node(&after_e5.fingerprint()).unwrap();
        assert_eq!(node.games_reached, Some(400));
        let alias = node.aliases[0];
        assert_eq!(rep.tree().node(alias).comment, "[rg:games=400]");
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_skipped_not_fatal() {
        let (rep, start, _after_e5) = small_repertoire();
        // Only the root is scripted; the other player node fails its fetch.
        let stats = TotalsByFen::default().with(&start, 1000);
        let annotator = annotator(stats);
        let repertoire = Mutex::new(rep);

        let updated = annotator
            .annotate_reach_counts(&repertoire, &AnnotateOptions::default())
            .await;

        assert_eq!(updated, 1);
        let rep = repertoire.lock().await;
        assert_eq!(rep.node(rep.root()).unwrap().games_reached, Some(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn annotated_nodes_are_skipped_unless_forced() {
        let (mut rep, start, after_e5) = small_repertoire();
        let root = rep.root().clone();
        rep.node_mut(&root).unwrap().games_reached = Some(5);
        let stats = TotalsByFen::default().with(&start, 1000).with(&after_e5, 400);
        let annotator = annotator(stats);
        let repertoire = Mutex::new(rep);

        let updated = annotator
            .annotate_reach_counts(&repertoire, &AnnotateOptions::default())
            .await;
        assert_eq!(updated, 1);
        assert_eq!(
            repertoire.lock().await.node(&root).unwrap().games_reached,
            Some(5)
        );

        let updated = annotator
            .annotate_reach_counts(
                &repertoire,
                &AnnotateOptions {
                    force: true,
                    ..AnnotateOptions::default()
                },
            )
            .await;
        assert_eq!(updated, 2);
        assert_eq!(
            repertoire.lock().await.node(&root).unwrap().games_reached,
            Some(1000)
        );
    }
}
