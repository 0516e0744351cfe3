//! Error taxonomy for rumor operations

use thiserror::Error;

/// Errors surfaced by the rumor engine
#[derive(Debug, Error)]
pub enum RumorError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Player {player_id} is already linked to rumor {news_id}")]
    DuplicateLink { news_id: i64, player_id: i64 },

    #[error("Credibility analyzer failed: {0}")]
    AnalyzerFailure(String),

    #[error("Content fetch failed: {0}")]
    ContentFetch(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl RumorError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Errors a moderator caused and can fix by changing the request
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Validation(_) | Self::DuplicateLink { .. }
        )
    }

    /// Errors worth retrying unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AnalyzerFailure(_) | Self::Store(_))
    }
}

pub type Result<T, E = RumorError> = std::result::Result<T, E>;
