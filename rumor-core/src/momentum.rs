//! Momentum scoring for player mention activity
//!
//! Two independent signals over the same daily mention events:
//! - Legacy momentum percentage: recent half of a lookback vs the earlier half
//! - Decay trend score: every mention weighs `0.5 ^ (age_days / half_life)`,
//!   velocity compares the score over the latest window with the score the
//!   player had one window ago

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{DailyMention, Phase, TrendAlgorithm, TrendConfig};

/// Weight of a mention `age_days` old. Future mentions weigh 1.0.
pub fn decay_weight(age_days: f64, half_life_days: f64) -> f64 {
    0.5f64.powf(age_days.max(0.0) / half_life_days)
}

/// Time-weighted magnitude of all mention events as of `today`
pub fn trend_score(events: &[DailyMention], today: NaiveDate, half_life_days: f64) -> f64 {
    events
        .iter()
        .map(|m| {
            let age = (today - m.date).num_days() as f64;
            m.count as f64 * decay_weight(age, half_life_days)
        })
        .sum()
}

/// Decayed score of the events inside `[as_of - window + 1, as_of]`, aged from `as_of`
pub fn windowed_score(
    events: &[DailyMention],
    as_of: NaiveDate,
    window_days: u32,
    half_life_days: f64,
) -> f64 {
    events
        .iter()
        .filter_map(|m| {
            let age = (as_of - m.date).num_days();
            (0..window_days as i64)
                .contains(&age)
                .then(|| m.count as f64 * decay_weight(age as f64, half_life_days))
        })
        .sum()
}

/// Positive when activity over the latest window outweighs the window before it
pub fn velocity(
    events: &[DailyMention],
    today: NaiveDate,
    window_days: u32,
    half_life_days: f64,
) -> f64 {
    // A prior window before the calendar's start holds nothing
    let previous = today
        .checked_sub_signed(Duration::days(window_days as i64))
        .map_or(0.0, |end| windowed_score(events, end, window_days, half_life_days));
    windowed_score(events, today, window_days, half_life_days) - previous
}

/// Legacy ratio signal: `((recent - previous) / max(previous, 1)) * 100`
pub fn momentum_pct(events: &[DailyMention], today: NaiveDate, lookback_days: u32) -> f64 {
    let half = (lookback_days / 2).max(1) as i64;
    let lookback = lookback_days as i64;

    let (mut recent, mut previous) = (0u64, 0u64);
    for m in events {
        let age = (today - m.date).num_days();
        if (0..half).contains(&age) {
            recent += m.count as u64;
        } else if (half..lookback).contains(&age) {
            previous += m.count as u64;
        }
    }

    (recent as f64 - previous as f64) / previous.max(1) as f64 * 100.0
}

/// Days since the most recent mention, `None` without events
pub fn days_since_last_mention(events: &[DailyMention], today: NaiveDate) -> Option<i64> {
    events
        .iter()
        .map(|m| m.date)
        .max()
        .map(|last| (today - last).num_days().max(0))
}

/// Phase from the decay signals; first matching rule wins
pub fn classify_phase(
    trend_score: f64,
    velocity: f64,
    days_since_last_mention: i64,
    config: &TrendConfig,
) -> Phase {
    if days_since_last_mention > config.dormant_after_days {
        Phase::Dormant
    } else if trend_score >= config.hot_threshold && velocity > 0.0 {
        Phase::Hot
    } else if velocity > 0.0 {
        Phase::Rising
    } else if velocity < 0.0 {
        Phase::Cooling
    } else {
        Phase::Stable
    }
}

/// Phase from the legacy momentum percentage
pub fn classify_legacy_phase(
    momentum_pct: f64,
    days_since_last_mention: i64,
    config: &TrendConfig,
) -> Phase {
    if days_since_last_mention > config.dormant_after_days {
        Phase::Dormant
    } else if momentum_pct >= config.hot_momentum_pct {
        Phase::Hot
    } else if momentum_pct > 0.0 {
        Phase::Rising
    } else if momentum_pct < 0.0 {
        Phase::Cooling
    } else {
        Phase::Stable
    }
}

/// All momentum signals for one player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumScore {
    pub momentum_pct: f64,
    pub days_since_last_mention: i64,
    pub phase: Phase,
    /// Only computed by the decay algorithm
    pub trend_score: Option<f64>,
    pub velocity: Option<f64>,
}

/// Scores mention events with a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct MomentumScorer {
    config: TrendConfig,
}

impl MomentumScorer {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrendConfig {
        &self.config
    }

    /// Score a player's events as of `today`. Players without events are not scored.
    pub fn score(&self, events: &[DailyMention], today: NaiveDate) -> Option<MomentumScore> {
        let days_since = days_since_last_mention(events, today)?;
        let pct = momentum_pct(events, today, self.config.momentum_lookback_days);

        match self.config.algorithm {
            TrendAlgorithm::Decay => {
                let score = trend_score(events, today, self.config.half_life_days);
                let vel = velocity(
                    events,
                    today,
                    self.config.velocity_window_days,
                    self.config.half_life_days,
                );
                Some(MomentumScore {
                    momentum_pct: pct,
                    days_since_last_mention: days_since,
                    phase: classify_phase(score, vel, days_since, &self.config),
                    trend_score: Some(score),
                    velocity: Some(vel),
                })
            }
            TrendAlgorithm::Legacy => Some(MomentumScore {
                momentum_pct: pct,
                days_since_last_mention: days_since,
                phase: classify_legacy_phase(pct, days_since, &self.config),
                trend_score: None,
                velocity: None,
            }),
        }
    }
}
