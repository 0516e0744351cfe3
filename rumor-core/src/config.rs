//! Tuning knobs for scoring, player validation and feed paging
//!
//! Every field has a default so partial TOML sections deserialize.

use serde::{Deserialize, Serialize};

use crate::{
    RumorError, DEFAULT_DORMANT_AFTER_DAYS, DEFAULT_HALF_LIFE_DAYS, DEFAULT_HOT_THRESHOLD,
    DEFAULT_MAX_TIMELINE_DAYS, DEFAULT_TIMELINE_DAYS, DEFAULT_VELOCITY_WINDOW_DAYS,
    MAX_TIMELINE_DAYS,
};

/// Which signal drives phase classification and ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrendAlgorithm {
    /// Half-life decay: trend score + velocity
    #[default]
    Decay,
    /// Ratio of recent half to earlier half of the lookback
    Legacy,
}

/// Momentum scorer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub algorithm: TrendAlgorithm,
    /// Age at which a mention weighs half as much
    pub half_life_days: f64,
    /// Length of the recent and prior windows compared by velocity
    pub velocity_window_days: u32,
    /// Trend score needed (with positive velocity) for `hot`
    pub hot_threshold: f64,
    /// More than this many days since the last mention is `dormant`
    pub dormant_after_days: i64,
    /// Full lookback for the legacy momentum percentage
    pub momentum_lookback_days: u32,
    /// Legacy phase: momentum percentage needed for `hot`
    pub hot_momentum_pct: f64,
    /// A player mentioned within this many days is active
    pub active_window_days: i64,
    /// Trailing days rendered into a dense timeline
    pub timeline_days: i64,
    /// Largest window a caller may request for a single timeline
    pub max_timeline_days: i64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            algorithm: TrendAlgorithm::default(),
            half_life_days: DEFAULT_HALF_LIFE_DAYS,
            velocity_window_days: DEFAULT_VELOCITY_WINDOW_DAYS,
            hot_threshold: DEFAULT_HOT_THRESHOLD,
            dormant_after_days: DEFAULT_DORMANT_AFTER_DAYS,
            momentum_lookback_days: 14,
            hot_momentum_pct: 50.0,
            active_window_days: 7,
            timeline_days: DEFAULT_TIMELINE_DAYS,
            max_timeline_days: DEFAULT_MAX_TIMELINE_DAYS,
        }
    }
}

impl TrendConfig {
    pub fn with_half_life(mut self, days: f64) -> Self {
        self.half_life_days = days;
        self
    }

    pub fn with_hot_threshold(mut self, threshold: f64) -> Self {
        self.hot_threshold = threshold;
        self
    }

    pub fn with_algorithm(mut self, algorithm: TrendAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn validate(&self) -> Result<(), RumorError> {
        if !self.half_life_days.is_finite() || self.half_life_days <= 0.0 {
            return Err(RumorError::validation(format!(
                "half_life_days must be positive, got {}",
                self.half_life_days
            )));
        }
        if self.velocity_window_days == 0 {
            return Err(RumorError::validation("velocity_window_days must be at least 1"));
        }
        if self.momentum_lookback_days < 2 {
            return Err(RumorError::validation(
                "momentum_lookback_days must be at least 2",
            ));
        }
        if self.hot_threshold < 0.0 || self.hot_momentum_pct < 0.0 {
            return Err(RumorError::validation("hot thresholds must not be negative"));
        }
        if self.dormant_after_days < 0 || self.active_window_days < 0 {
            return Err(RumorError::validation("day windows must not be negative"));
        }
        if self.timeline_days <= 0 {
            return Err(RumorError::validation("timeline_days must be at least 1"));
        }
        if self.max_timeline_days < self.timeline_days || self.max_timeline_days > MAX_TIMELINE_DAYS
        {
            return Err(RumorError::validation(format!(
                "max_timeline_days must be between timeline_days and {}",
                MAX_TIMELINE_DAYS
            )));
        }
        Ok(())
    }

    /// Reject a requested timeline window outside `1..=max_timeline_days`
    pub fn check_timeline_days(&self, days: i64) -> Result<(), RumorError> {
        if days <= 0 || days > self.max_timeline_days {
            return Err(RumorError::validation(format!(
                "timeline window must be between 1 and {} days, got {}",
                self.max_timeline_days, days
            )));
        }
        Ok(())
    }
}

/// Bounds for player names and aliases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerLimits {
    pub max_aliases: usize,
    pub max_alias_len: usize,
    pub max_name_len: usize,
    pub max_display_name_len: usize,
}

impl Default for PlayerLimits {
    fn default() -> Self {
        Self {
            max_aliases: 20,
            max_alias_len: 60,
            max_name_len: 80,
            max_display_name_len: 80,
        }
    }
}

/// Feed page size bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedLimits {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for FeedLimits {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

impl FeedLimits {
    /// Resolve a requested page size; zero is rejected rather than returning nothing
    pub fn resolve(&self, requested: Option<usize>) -> Result<usize, RumorError> {
        match requested {
            None => Ok(self.default_limit),
            Some(0) => Err(RumorError::validation("limit must be at least 1")),
            Some(n) => Ok(n.min(self.max_limit)),
        }
    }
}
