use std::time::Duration;

use anyhow::Result;
use common::Config;
use fetch::{RateLimiter, RetryPolicy};
use serde::{Deserialize, Serialize};

use super::selection::SharePolicy;

const DEFAULT_SPEEDS: &str = "ultraBullet,bullet,blitz,rapid";
const DEFAULT_RATINGS: &str = "0,1000,1200,1400,1600,1800,2000,2200,2500";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GrowOptions {
    /// Principal variations requested from the search engine.
    pub multi_pv: usize,
    /// Centipawn window below the best evaluation for player-turn moves.
    pub best_score_threshold: i32,
    /// Coverage target (percent of games) for opponent-turn moves.
    pub top_pct: f32,
    /// Cap on opponent replies kept per position.
    pub max_moves: usize,
    /// Share floor for opponent replies once the target is met.
    pub min_game_share: f32,
    /// Worker pool bound per partition.
    pub max_concurrency: usize,
    pub retries: usize,
    pub backoff_secs: f32,
    pub jitter_secs: f32,
    /// Concurrency ceiling for the statistics service.
    pub stats_max_concurrent: usize,
    /// Minimum spacing between statistics requests.
    pub stats_min_delay_secs: f32,
    pub speeds: String,
    pub ratings: String,
}

impl Default for GrowOptions {
    fn default() -> Self {
        Self {
            multi_pv: 10,
            best_score_threshold: 20,
            top_pct: 90.0,
            max_moves: 8,
            min_game_share: 0.01,
            max_concurrency: 4,
            retries: 6,
            backoff_secs: 1.0,
            jitter_secs: 0.3,
            stats_max_concurrent: 1,
            stats_min_delay_secs: 1.0,
            speeds: DEFAULT_SPEEDS.to_string(),
            ratings: DEFAULT_RATINGS.to_string(),
        }
    }
}

impl GrowOptions {
    pub fn share_policy(&self) -> SharePolicy {
        SharePolicy {
            pct: f64::from(self.top_pct),
            max_moves: Some(self.max_moves),
            min_game_share: f64::from(self.min_game_share),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries as u32,
            backoff_base_secs: f64::from(self.backoff_secs),
            backoff_cap_secs: 30.0,
            jitter_secs: f64::from(self.jitter_secs),
        }
    }

    pub fn stats_limiter(&self) -> RateLimiter {
        RateLimiter::new(
            self.stats_max_concurrent,
            Duration::from_secs_f32(self.stats_min_delay_secs.max(0.0)),
        )
    }
}

impl Config for GrowOptions {
    fn load(config: &common::ConfigLoader) -> Result<Self> {
        let defaults = GrowOptions::default();
        Ok(Self {
            multi_pv: config.get_usize("multi_pv").unwrap_or(defaults.multi_pv),
            best_score_threshold: config
                .get_usize("best_score_threshold")
                .map(|v| v as i32)
                .unwrap_or(defaults.best_score_threshold),
            top_pct: config.get_f32("top_pct").unwrap_or(defaults.top_pct),
            max_moves: config.get_usize("max_moves").unwrap_or(defaults.max_moves),
            min_game_share: config
                .get_f32("min_game_share")
                .unwrap_or(defaults.min_game_share),
            max_concurrency: config
                .get_usize("max_concurrency")
                .unwrap_or(defaults.max_concurrency),
            retries: config.get_usize("retries").unwrap_or(defaults.retries),
            backoff_secs: config
                .get_f32("backoff_secs")
                .unwrap_or(defaults.backoff_secs),
            jitter_secs: config
                .get_f32("jitter_secs")
                .unwrap_or(defaults.jitter_secs),
            stats_max_concurrent: config
                .get_usize("stats_max_concurrent")
                .unwrap_or(defaults.stats_max_concurrent),
            stats_min_delay_secs: config
                .get_f32("stats_min_delay_secs")
                .unwrap_or(defaults.stats_min_delay_secs),
            speeds: config.get_str("speeds").unwrap_or(defaults.speeds),
            ratings: config.get_str("ratings").unwrap_or(defaults.ratings),
        })
    }
}
