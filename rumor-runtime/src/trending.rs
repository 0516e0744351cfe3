//! Trending players sidebar
//!
//! Aggregates every player's visible mentions into daily buckets, scores
//! them with the configured momentum algorithm and ranks the result.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use rumor_core::{
    fill_timeline, normalize_name, window_dates, MomentumScorer, RumorError, TrendAlgorithm,
    TrendConfig, TrendingPlayer,
};
use rumor_store::{PlayerMentions, RumorStore};

/// Dense daily series for one player, oldest day first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerTimeline {
    pub name: String,
    pub normalized_name: String,
    pub dates: Vec<NaiveDate>,
    pub counts: Vec<u32>,
}

/// Builds trending rows and timelines from stored mentions
pub struct TrendingService {
    store: Arc<RumorStore>,
    scorer: MomentumScorer,
}

impl TrendingService {
    pub fn new(store: Arc<RumorStore>, config: TrendConfig) -> Self {
        Self {
            store,
            scorer: MomentumScorer::new(config),
        }
    }

    pub fn config(&self) -> &TrendConfig {
        self.scorer.config()
    }

    /// Top `limit` players by momentum as of `today`
    pub fn trending(&self, limit: usize, today: NaiveDate) -> Result<Vec<TrendingPlayer>, RumorError> {
        if limit == 0 {
            return Err(RumorError::validation("limit must be at least 1"));
        }
        let mut rows: Vec<TrendingPlayer> = self
            .store
            .mention_timelines(None)?
            .into_iter()
            .filter_map(|mentions| self.build_row(mentions, today))
            .collect();
        debug!("Scored {} players with mentions", rows.len());

        match self.config().algorithm {
            TrendAlgorithm::Decay => rows.sort_by(|a, b| {
                desc(a.trend_score, b.trend_score)
                    .then_with(|| desc(a.velocity, b.velocity))
                    .then_with(|| b.rumor_count.cmp(&a.rumor_count))
                    .then_with(|| a.normalized_name.cmp(&b.normalized_name))
            }),
            TrendAlgorithm::Legacy => rows.sort_by(|a, b| {
                b.is_active
                    .cmp(&a.is_active)
                    .then_with(|| desc(Some(a.momentum_pct), Some(b.momentum_pct)))
                    .then_with(|| b.rumor_count.cmp(&a.rumor_count))
                    .then_with(|| a.normalized_name.cmp(&b.normalized_name))
            }),
        }
        rows.truncate(limit);
        Ok(rows)
    }

    /// Densified series for one player over the configured window
    pub fn timeline_for(&self, name: &str, today: NaiveDate) -> Result<PlayerTimeline, RumorError> {
        self.timeline_with_days(name, self.config().timeline_days, today)
    }

    pub fn timeline_with_days(
        &self,
        name: &str,
        days: i64,
        today: NaiveDate,
    ) -> Result<PlayerTimeline, RumorError> {
        self.config().check_timeline_days(days)?;
        let player = self
            .store
            .find_by_normalized(name)?
            .ok_or_else(|| RumorError::not_found("player", normalize_name(name)))?;
        let mentions = self.store.player_mentions(player.id, None)?;
        let counts = fill_timeline(&mentions.mentions, days, today)?;
        Ok(PlayerTimeline {
            name: player.presentation_name().to_string(),
            normalized_name: player.normalized_name,
            dates: window_dates(days, today)?,
            counts,
        })
    }

    fn build_row(&self, mentions: PlayerMentions, today: NaiveDate) -> Option<TrendingPlayer> {
        let config = self.config();
        let score = self.scorer.score(&mentions.mentions, today)?;
        let first_seen = mentions.mentions.first()?.date;
        let last_seen = mentions.mentions.last()?.date;

        let window_start = today
            .checked_sub_signed(Duration::days(config.timeline_days - 1))
            .unwrap_or(NaiveDate::MIN);
        let timeline = mentions
            .mentions
            .into_iter()
            .filter(|m| m.date >= window_start && m.date <= today)
            .collect();

        Some(TrendingPlayer {
            name: mentions.player.presentation_name().to_string(),
            normalized_name: mentions.player.normalized_name,
            rumor_count: mentions.player.rumor_count,
            first_seen,
            last_seen,
            is_active: score.days_since_last_mention <= config.active_window_days,
            timeline,
            phase: score.phase,
            momentum_pct: score.momentum_pct,
            days_since_last_mention: score.days_since_last_mention,
            trend_score: score.trend_score,
            velocity: score.velocity,
        })
    }
}

/// Descending order for optional scores, missing values last
fn desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
