//! Engine configuration file
//!
//! ```toml
//! [trend]
//! half_life_days = 3.0
//! hot_threshold = 5.0
//!
//! [reassess]
//! batch_concurrency = 3
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use rumor_agents::AnalyzerConfig;
use rumor_core::{FeedLimits, PlayerLimits, RumorError, TrendConfig};
use rumor_fetch::FetchConfig;
use serde::{Deserialize, Serialize};

/// Reassessment orchestration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassessConfig {
    /// Queue concurrent reassessments of the same rumor behind each other
    pub serialize_per_rumor: bool,
    /// Rumors reassessed at once by a batch run
    pub batch_concurrency: usize,
    /// Most flagged rumors picked up by one batch run
    pub batch_limit: usize,
}

impl Default for ReassessConfig {
    fn default() -> Self {
        Self {
            serialize_per_rumor: true,
            batch_concurrency: 3,
            batch_limit: 50,
        }
    }
}

/// Every tunable of the engine; missing sections fall back to defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub trend: TrendConfig,
    pub players: PlayerLimits,
    pub feed: FeedLimits,
    pub fetch: FetchConfig,
    pub analyzer: AnalyzerConfig,
    pub reassess: ReassessConfig,
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("Failed to parse engine config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), RumorError> {
        self.trend.validate()?;
        if self.feed.default_limit == 0 || self.feed.default_limit > self.feed.max_limit {
            return Err(RumorError::validation(
                "feed.default_limit must be between 1 and feed.max_limit",
            ));
        }
        if self.players.max_name_len == 0 || self.players.max_alias_len == 0 {
            return Err(RumorError::validation("player name limits must be positive"));
        }
        if self.fetch.timeout_secs == 0 || self.analyzer.timeout_secs == 0 {
            return Err(RumorError::validation("timeouts must be at least one second"));
        }
        if self.reassess.batch_concurrency == 0 || self.reassess.batch_limit == 0 {
            return Err(RumorError::validation(
                "reassess.batch_concurrency and reassess.batch_limit must be at least 1",
            ));
        }
        Ok(())
    }
}
