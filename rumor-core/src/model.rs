//! Rumors, players and the links between them
//!
//! A rumor moves through review states as it is analyzed:
//! - `ai_probability = None` means nobody has looked at it yet
//! - `Some(0)` means the analyzer confirmed it is not a transfer rumor
//! - `Some(1..=100)` is a credibility score

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{RumorError, MAX_PROBABILITY};

/// A single ingested news item about a potential transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rumor {
    pub id: i64,
    pub title: String,
    /// Unique per source item
    pub link: String,
    /// Feed ordering key
    pub pub_date: DateTime<Utc>,
    pub source: String,
    pub description: Option<String>,
    pub ai_probability: Option<u8>,
    pub ai_analysis: Option<String>,
    pub ai_analyzed_at: Option<DateTime<Utc>>,
    pub is_duplicate: bool,
    pub is_hidden: bool,
    pub hidden_at: Option<DateTime<Utc>>,
    pub hidden_by: Option<String>,
    pub hidden_reason: Option<String>,
    pub admin_context: Option<String>,
    pub needs_reassessment: bool,
    pub reassessed_at: Option<DateTime<Utc>>,
    pub reassessed_by: Option<String>,
}

impl Rumor {
    pub fn analysis_state(&self) -> AnalysisState {
        AnalysisState::from_probability(self.ai_probability)
    }

    pub fn review_state(&self) -> ReviewState {
        if self.needs_reassessment {
            ReviewState::NeedsReassessment
        } else if self.reassessed_at.is_some() {
            ReviewState::Reassessed
        } else if self.ai_probability.is_some() {
            ReviewState::Analyzed
        } else {
            ReviewState::Unanalyzed
        }
    }

    pub fn is_transfer_rumor(&self) -> bool {
        is_transfer_rumor(self.ai_probability)
    }

    /// Whether the public feed may show this rumor
    pub fn is_visible(&self) -> bool {
        !self.is_duplicate && !self.is_hidden
    }
}

/// A raw record handed over by the article source feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRumor {
    pub title: String,
    pub link: String,
    pub pub_date: DateTime<Utc>,
    pub source: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// What the credibility score says about a rumor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisState {
    Unanalyzed,
    NotARumor,
    Scored(u8),
}

impl AnalysisState {
    pub fn from_probability(probability: Option<u8>) -> Self {
        match probability {
            None => Self::Unanalyzed,
            Some(0) => Self::NotARumor,
            Some(p) => Self::Scored(p),
        }
    }
}

/// Position of a rumor in the analyze/reassess lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Unanalyzed,
    Analyzed,
    NeedsReassessment,
    Reassessed,
}

/// Any positive score counts as a transfer rumor
pub fn is_transfer_rumor(probability: Option<u8>) -> bool {
    matches!(probability, Some(p) if p > 0)
}

/// Check a manual probability override
pub fn validate_probability(value: i64) -> Result<u8, RumorError> {
    if (0..=MAX_PROBABILITY as i64).contains(&value) {
        Ok(value as u8)
    } else {
        Err(RumorError::validation(format!(
            "probability must be between 0 and {}, got {}",
            MAX_PROBABILITY, value
        )))
    }
}

/// Coerce a probability the store handed back as text.
///
/// Blank text is an unanalyzed rumor. Fractional values are rounded.
pub fn parse_probability_text(raw: &str) -> Result<Option<u8>, RumorError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value: f64 = trimmed
        .parse()
        .map_err(|_| RumorError::validation(format!("malformed probability {:?}", raw)))?;
    coerce_probability_number(value).map(Some)
}

/// Coerce a numeric probability, rounding to the nearest integer
pub fn coerce_probability_number(value: f64) -> Result<u8, RumorError> {
    if !value.is_finite() {
        return Err(RumorError::validation(format!(
            "probability is not a number: {}",
            value
        )));
    }
    validate_probability(value.round() as i64)
}

/// A resolved player identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    /// Spelling as first seen
    pub name: String,
    /// Canonical lookup key, unique across players
    pub normalized_name: String,
    /// Admin override for presentation
    pub display_name: Option<String>,
    /// Normalized alternative spellings; never contains `normalized_name`
    pub aliases: BTreeSet<String>,
    pub rumor_count: u32,
    pub is_current_squad: bool,
}

impl Player {
    pub fn presentation_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn answers_to(&self, normalized: &str) -> bool {
        self.normalized_name == normalized || self.aliases.contains(normalized)
    }
}

/// How a rumor involves a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlayerRole {
    /// Player the club wants to sign
    Target,
    /// Player who may leave the club
    Departing,
    #[default]
    Mentioned,
}

impl PlayerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Target => "target",
            Self::Departing => "departing",
            Self::Mentioned => "mentioned",
        }
    }

    /// Lenient parse for analyzer output; unknown roles become `Mentioned`
    pub fn from_loose(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }
}

impl fmt::Display for PlayerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayerRole {
    type Err = RumorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "target" => Ok(Self::Target),
            "departing" => Ok(Self::Departing),
            "mentioned" => Ok(Self::Mentioned),
            other => Err(RumorError::validation(format!("unknown player role {:?}", other))),
        }
    }
}

/// Junction row between a rumor and a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsPlayer {
    pub news_id: i64,
    pub player_id: i64,
    pub role: PlayerRole,
}

/// A player as seen through one rumor's links
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedPlayer {
    pub news_id: i64,
    pub role: PlayerRole,
    pub player: Player,
}

/// Mentions of a player on one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyMention {
    pub date: NaiveDate,
    pub count: u32,
}

impl DailyMention {
    pub fn new(date: NaiveDate, count: u32) -> Self {
        Self { date, count }
    }
}

/// Qualitative bucket for a player's momentum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Hot,
    Rising,
    Stable,
    Cooling,
    Dormant,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Rising => "rising",
            Self::Stable => "stable",
            Self::Cooling => "cooling",
            Self::Dormant => "dormant",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived trending row for the sidebar; never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingPlayer {
    pub name: String,
    pub normalized_name: String,
    pub rumor_count: u32,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
    pub is_active: bool,
    /// Sparse: only days with at least one mention
    pub timeline: Vec<DailyMention>,
    pub phase: Phase,
    pub momentum_pct: f64,
    pub days_since_last_mention: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
}
