//! LLM-backed credibility analyzer
//!
//! Scores how likely a rumor is a genuine, substantive transfer story and
//! extracts the players it involves.
//! - Input: title, description, source, optional article text and moderator context
//! - Output: validated `CredibilityAssessment`

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use rumor_core::{coerce_probability_number, normalize_name, parse_probability_text, PlayerRole};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    AnalysisRequest, AnalyzerError, Confidence, CredibilityAnalyzer, CredibilityAssessment,
    ExtractedPlayer, SharedBackend,
};

/// System prompt for credibility scoring
const CREDIBILITY_SYSTEM_PROMPT: &str = r#"
You are a football transfer market analyst covering Real Betis. You are given a news item (title, description, source and sometimes the full article text).

Your task: decide whether it is a genuine transfer rumor involving Real Betis and how credible it is.

Rules:
1. "probability" is an integer from 0 to 100
2. Use 0 only when the item is NOT a transfer rumor (match reports, injuries, interviews, official announcements of past deals)
3. Weigh source reliability, specificity (fees, contract length, named agents) and whether other outlets are cited
4. List every player the rumor involves with a role:
   - "target": Betis wants to sign him
   - "departing": he may leave Betis
   - "mentioned": named but not part of the move
5. If a moderator note is provided, treat it as authoritative context
6. Answer with a single JSON object and nothing else

Output Format:
{"probability": 65, "analysis": "short reasoning", "is_transfer_rumor": true, "confidence": "low|medium|high", "players": [{"name": "Player Name", "role": "target"}]}
"#;

/// Credibility analyzer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Per-attempt timeout in seconds
    pub timeout_secs: u64,
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Base pause between attempts, grows linearly
    pub retry_backoff_ms: u64,
    /// Article text beyond this many characters is cut
    pub max_content_chars: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 500,
            max_content_chars: 6000,
        }
    }
}

/// Credibility analyzer backed by an LLM
pub struct LlmCredibilityAnalyzer {
    backend: SharedBackend,
    config: AnalyzerConfig,
}

impl LlmCredibilityAnalyzer {
    pub fn new(backend: SharedBackend, config: AnalyzerConfig) -> Self {
        Self { backend, config }
    }

    fn build_input(&self, request: &AnalysisRequest) -> String {
        let mut input = String::new();
        input.push_str(&format!("Title: {}\n", request.title.trim()));
        input.push_str(&format!("Source: {}\n", request.source.trim()));
        if let Some(description) = request.description.as_deref().filter(|d| !d.trim().is_empty()) {
            input.push_str(&format!("Description: {}\n", description.trim()));
        }
        if let Some(content) = request.content.as_deref().filter(|c| !c.trim().is_empty()) {
            let truncated: String = content.chars().take(self.config.max_content_chars).collect();
            input.push_str(&format!("\nArticle text:\n{}\n", truncated));
        }
        if let Some(context) = request.admin_context.as_deref().filter(|c| !c.trim().is_empty()) {
            input.push_str(&format!("\nModerator note:\n{}\n", context.trim()));
        }
        input
    }

    async fn attempt(&self, input: &str) -> Result<CredibilityAssessment, AnalyzerError> {
        let response = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            self.backend.generate(CREDIBILITY_SYSTEM_PROMPT, input),
        )
        .await
        .map_err(|_| AnalyzerError::Timeout(self.config.timeout_secs))??;

        parse_assessment(&response)
    }
}

#[async_trait]
impl CredibilityAnalyzer for LlmCredibilityAnalyzer {
    async fn analyze(
        &self,
        request: &AnalysisRequest,
    ) -> Result<CredibilityAssessment, AnalyzerError> {
        let input = self.build_input(request);
        let attempts = self.config.max_retries + 1;

        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.attempt(&input).await {
                Ok(assessment) => {
                    info!(
                        "Analyzer {} scored {:?} at {} ({} players)",
                        self.backend.model_name(),
                        request.title,
                        assessment.probability,
                        assessment.players.len()
                    );
                    return Ok(assessment);
                }
                Err(AnalyzerError::Llm(e)) if !e.is_transient() => {
                    return Err(AnalyzerError::Llm(e));
                }
                Err(e) => {
                    warn!("Analyzer attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = Some(e);
                    if attempt < attempts {
                        let pause = self.config.retry_backoff_ms * attempt as u64;
                        tokio::time::sleep(Duration::from_millis(pause)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AnalyzerError::Invalid("no attempts made".to_string())))
    }

    fn name(&self) -> &str {
        self.backend.model_name()
    }
}

static JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{.*\}").expect("valid JSON object regex")
});

#[derive(Debug, Deserialize)]
struct RawAssessment {
    probability: Value,
    #[serde(default)]
    analysis: String,
    #[serde(default = "default_true")]
    is_transfer_rumor: bool,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    players: Vec<RawPlayer>,
}

#[derive(Debug, Deserialize)]
struct RawPlayer {
    name: String,
    #[serde(default)]
    role: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Parse and validate an LLM response into an assessment
pub fn parse_assessment(response: &str) -> Result<CredibilityAssessment, AnalyzerError> {
    let json = JSON_OBJECT
        .find(response)
        .map(|m| m.as_str())
        .ok_or_else(|| AnalyzerError::Parse("no JSON object in response".to_string()))?;

    let raw: RawAssessment =
        serde_json::from_str(json).map_err(|e| AnalyzerError::Parse(e.to_string()))?;

    let probability = match &raw.probability {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| AnalyzerError::Invalid(format!("probability {}", n)))
            .and_then(|v| {
                coerce_probability_number(v).map_err(|e| AnalyzerError::Invalid(e.to_string()))
            })?,
        Value::String(s) => parse_probability_text(s)
            .map_err(|e| AnalyzerError::Invalid(e.to_string()))?
            .ok_or_else(|| AnalyzerError::Invalid("empty probability".to_string()))?,
        other => {
            return Err(AnalyzerError::Invalid(format!(
                "probability must be a number, got {}",
                other
            )))
        }
    };

    // Zero is reserved for "not a transfer rumor"
    let is_transfer_rumor = raw.is_transfer_rumor && probability > 0;
    let probability = if is_transfer_rumor { probability } else { 0 };

    let mut players: Vec<ExtractedPlayer> = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    for player in raw.players {
        let key = normalize_name(&player.name);
        if key.is_empty() || seen.contains(&key) {
            debug!("Skipping extracted player {:?}", player.name);
            continue;
        }
        seen.push(key);
        players.push(ExtractedPlayer {
            name: player.name.trim().to_string(),
            role: player
                .role
                .as_deref()
                .map(PlayerRole::from_loose)
                .unwrap_or_default(),
        });
    }

    Ok(CredibilityAssessment {
        probability,
        analysis: raw.analysis.trim().to_string(),
        is_transfer_rumor,
        confidence: raw
            .confidence
            .as_deref()
            .map(Confidence::from_loose)
            .unwrap_or_default(),
        players,
    })
}
