//! Credibility analyzer seam and its request/response types

use async_trait::async_trait;
use rumor_core::{PlayerRole, RumorError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::LlmError;

/// Errors from credibility analysis
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid assessment: {0}")]
    Invalid(String),
}

impl From<AnalyzerError> for RumorError {
    fn from(err: AnalyzerError) -> Self {
        RumorError::AnalyzerFailure(err.to_string())
    }
}

/// Everything the analyzer sees about one rumor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub title: String,
    pub description: Option<String>,
    pub source: String,
    /// Full article text when the page could be fetched
    pub content: Option<String>,
    /// Moderator hint, e.g. "player already signed elsewhere"
    pub admin_context: Option<String>,
}

/// Analyzer's self-reported certainty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    #[default]
    Medium,
    High,
}

impl Confidence {
    pub fn from_loose(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "low" | "baja" => Self::Low,
            "high" | "alta" => Self::High,
            _ => Self::Medium,
        }
    }
}

/// A player name the analyzer pulled out of a rumor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedPlayer {
    pub name: String,
    pub role: PlayerRole,
}

/// Validated analyzer verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredibilityAssessment {
    /// 0 = not a transfer rumor, 1..=100 = credibility
    pub probability: u8,
    pub analysis: String,
    pub is_transfer_rumor: bool,
    pub confidence: Confidence,
    pub players: Vec<ExtractedPlayer>,
}

/// External classifier scoring rumor credibility
#[async_trait]
pub trait CredibilityAnalyzer: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest)
        -> Result<CredibilityAssessment, AnalyzerError>;

    /// Model or service identifier for logs
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_parsing() {
        assert_eq!(Confidence::from_loose("HIGH"), Confidence::High);
        assert_eq!(Confidence::from_loose("baja"), Confidence::Low);
        assert_eq!(Confidence::from_loose("???"), Confidence::Medium);
    }

    #[test]
    fn test_analyzer_error_maps_to_analyzer_failure() {
        let err: RumorError = AnalyzerError::Timeout(60).into();
        assert!(matches!(err, RumorError::AnalyzerFailure(_)));
        assert!(err.is_retryable());
    }
}
