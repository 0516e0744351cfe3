//! Reassessment Orchestrator
//!
//! One reassessment runs these steps in order:
//! 1. Load the rumor (missing rumor aborts)
//! 2. Fetch the article body, best-effort
//! 3. Ask the credibility analyzer (failure aborts, nothing is written)
//! 4. Persist the verdict
//! 5. Resolve and link the extracted players; failures are collected, not raised
//!
//! Steps 4 and 5 are separate writes so a linking problem never rolls
//! back a valid analysis.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use rumor_agents::{AnalysisRequest, Confidence, CredibilityAnalyzer, ExtractedPlayer};
use rumor_core::RumorError;
use rumor_fetch::ContentFetcher;
use rumor_store::{AnalysisRecord, RumorStore};

use crate::ReassessConfig;

/// A moderator's request to re-run analysis on one rumor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassessRequest {
    pub news_id: i64,
    pub admin_context: Option<String>,
    pub actor: String,
}

/// A player the analyzer named but who could not be linked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkFailure {
    pub name: String,
    pub error: String,
}

/// What a finished reassessment produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassessmentOutcome {
    pub run_id: Uuid,
    pub news_id: i64,
    pub probability: u8,
    pub analysis: String,
    pub is_transfer_rumor: bool,
    pub confidence: Confidence,
    pub players: Vec<ExtractedPlayer>,
    /// Ids of players linked to the rumor after this run
    pub linked_player_ids: Vec<i64>,
    pub link_failures: Vec<LinkFailure>,
    pub content_fetched: bool,
}

/// Per-rumor result of a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub news_id: i64,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub succeeded: Vec<ReassessmentOutcome>,
    pub failed: Vec<BatchFailure>,
}

/// Coordinates fetch, analysis, persistence and player linking
pub struct Reassessor {
    store: Arc<RumorStore>,
    fetcher: Arc<dyn ContentFetcher>,
    analyzer: Arc<dyn CredibilityAnalyzer>,
    config: ReassessConfig,
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl Reassessor {
    pub fn new(
        store: Arc<RumorStore>,
        fetcher: Arc<dyn ContentFetcher>,
        analyzer: Arc<dyn CredibilityAnalyzer>,
        config: ReassessConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            analyzer,
            config,
            locks: DashMap::new(),
        }
    }

    /// Re-run analysis for one rumor
    pub async fn reassess(
        &self,
        request: &ReassessRequest,
    ) -> Result<ReassessmentOutcome, RumorError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("reassess", %run_id, news_id = request.news_id);

        let guard = self.acquire(request.news_id).await;
        let result = self.run(run_id, request).instrument(span).await;
        if guard.is_some() {
            drop(guard);
            self.locks
                .remove_if(&request.news_id, |_, lock| Arc::strong_count(lock) == 1);
        }
        result
    }

    /// Reassess every rumor flagged `needs_reassessment`
    pub async fn reassess_pending(&self, actor: &str) -> Result<BatchReport, RumorError> {
        let pending = self.store.list_needing_reassessment(self.config.batch_limit)?;
        info!("Reassessing {} flagged rumors", pending.len());

        let results: Vec<(i64, Result<ReassessmentOutcome, RumorError>)> = stream::iter(pending)
            .map(|rumor| async move {
                let request = ReassessRequest {
                    news_id: rumor.id,
                    admin_context: None,
                    actor: actor.to_string(),
                };
                (rumor.id, self.reassess(&request).await)
            })
            .buffer_unordered(self.config.batch_concurrency.max(1))
            .collect()
            .await;

        let mut report = BatchReport::default();
        for (news_id, result) in results {
            match result {
                Ok(outcome) => report.succeeded.push(outcome),
                Err(e) => report.failed.push(BatchFailure {
                    news_id,
                    error: e.to_string(),
                }),
            }
        }
        report.succeeded.sort_by_key(|o| o.news_id);
        report.failed.sort_by_key(|f| f.news_id);
        info!(
            "Batch reassessment done: {} succeeded, {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn acquire(&self, news_id: i64) -> Option<OwnedMutexGuard<()>> {
        if !self.config.serialize_per_rumor {
            return None;
        }
        let lock = self
            .locks
            .entry(news_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Some(lock.lock_owned().await)
    }

    async fn run(
        &self,
        run_id: Uuid,
        request: &ReassessRequest,
    ) -> Result<ReassessmentOutcome, RumorError> {
        let news_id = request.news_id;
        let rumor = self.store.get_rumor(news_id)?;

        let content = match self.fetcher.fetch(&rumor.link).await {
            Ok(article) => {
                debug!("Fetched {} chars from {}", article.char_count, article.url);
                Some(article.text)
            }
            Err(e) => {
                warn!("Continuing without article text for {}: {}", rumor.link, e);
                None
            }
        };
        let content_fetched = content.is_some();

        let admin_context = request
            .admin_context
            .clone()
            .filter(|c| !c.trim().is_empty());
        let analysis_request = AnalysisRequest {
            title: rumor.title.clone(),
            description: rumor.description.clone(),
            source: rumor.source.clone(),
            content,
            admin_context: admin_context.clone().or_else(|| rumor.admin_context.clone()),
        };
        let assessment = self
            .analyzer
            .analyze(&analysis_request)
            .await
            .map_err(|e| {
                error!("Analyzer {} failed: {}", self.analyzer.name(), e);
                RumorError::from(e)
            })?;

        let record = AnalysisRecord {
            probability: assessment.probability,
            analysis: assessment.analysis.clone(),
            analyzed_at: Utc::now(),
            admin_context,
            reassessed_by: Some(request.actor.clone()),
        };
        self.store.record_analysis(news_id, &record)?;
        info!(
            "Rumor {} reassessed by {}: probability {}",
            news_id, request.actor, assessment.probability
        );

        let (linked_player_ids, link_failures) =
            if assessment.is_transfer_rumor && !rumor.is_hidden {
                self.link_players(news_id, &assessment.players)
            } else {
                debug!("Skipping player links for rumor {}", news_id);
                (Vec::new(), Vec::new())
            };

        Ok(ReassessmentOutcome {
            run_id,
            news_id,
            probability: assessment.probability,
            analysis: assessment.analysis,
            is_transfer_rumor: assessment.is_transfer_rumor,
            confidence: assessment.confidence,
            players: assessment.players,
            linked_player_ids,
            link_failures,
            content_fetched,
        })
    }

    fn link_players(
        &self,
        news_id: i64,
        players: &[ExtractedPlayer],
    ) -> (Vec<i64>, Vec<LinkFailure>) {
        let mut linked = Vec::new();
        let mut failures = Vec::new();
        for extracted in players {
            match self.store.link_player(news_id, &extracted.name, extracted.role) {
                Ok(link) => linked.push(link.player.id),
                Err(RumorError::DuplicateLink { player_id, .. }) => linked.push(player_id),
                Err(e) => {
                    warn!("Could not link {:?} to rumor {}: {}", extracted.name, news_id, e);
                    failures.push(LinkFailure {
                        name: extracted.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        (linked, failures)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use rumor_agents::{AnalyzerError, CredibilityAssessment, LlmError};
    use rumor_core::PlayerRole;
    use rumor_fetch::{FetchError, FetchedArticle};

    use super::*;

    pub struct StubFetcher {
        pub fail: bool,
    }

    #[async_trait]
    impl ContentFetcher for StubFetcher {
        async fn fetch(&self, link: &str) -> Result<FetchedArticle, FetchError> {
            if self.fail {
                return Err(FetchError::Status(503));
            }
            Ok(FetchedArticle {
                url: link.to_string(),
                title: None,
                text: "Full article body".to_string(),
                char_count: 17,
                truncated: false,
            })
        }
    }

    pub struct StubAnalyzer {
        pub assessment: Option<CredibilityAssessment>,
        pub calls: AtomicUsize,
        pub in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
        pub delay: Duration,
        pub last_request: SyncMutex<Option<AnalysisRequest>>,
    }

    impl StubAnalyzer {
        pub fn returning(assessment: CredibilityAssessment) -> Self {
            Self {
                assessment: Some(assessment),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay: Duration::ZERO,
                last_request: SyncMutex::new(None),
            }
        }

        pub fn failing() -> Self {
            Self {
                assessment: None,
                ..Self::returning(assessment(0, &[]))
            }
        }
    }

    #[async_trait]
    impl CredibilityAnalyzer for StubAnalyzer {
        async fn analyze(
            &self,
            request: &AnalysisRequest,
        ) -> Result<CredibilityAssessment, AnalyzerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock() = Some(request.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.assessment
                .clone()
                .ok_or(AnalyzerError::Llm(LlmError::Unavailable("503".to_string())))
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    pub fn assessment(probability: u8, players: &[(&str, PlayerRole)]) -> CredibilityAssessment {
        CredibilityAssessment {
            probability,
            analysis: format!("Scored {}", probability),
            is_transfer_rumor: probability > 0,
            confidence: Confidence::High,
            players: players
                .iter()
                .map(|(name, role)| ExtractedPlayer {
                    name: name.to_string(),
                    role: *role,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use rumor_core::{NewRumor, PlayerLimits, PlayerRole, ReviewState};

    use super::testing::*;
    use super::*;

    fn seeded_store() -> (Arc<RumorStore>, i64) {
        let store = RumorStore::open_in_memory(PlayerLimits::default()).unwrap();
        let id = store
            .insert_rumor(&NewRumor {
                title: "Betis close in on Fekir return".to_string(),
                link: "https://example.com/fekir".to_string(),
                pub_date: Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap(),
                source: "Estadio Deportivo".to_string(),
                description: Some("Talks advanced".to_string()),
            })
            .unwrap();
        (Arc::new(store), id)
    }

    fn reassessor(
        store: Arc<RumorStore>,
        fetch_fails: bool,
        analyzer: Arc<StubAnalyzer>,
    ) -> Reassessor {
        Reassessor::new(
            store,
            Arc::new(StubFetcher { fail: fetch_fails }),
            analyzer,
            ReassessConfig::default(),
        )
    }

    fn request(news_id: i64) -> ReassessRequest {
        ReassessRequest {
            news_id,
            admin_context: Some("Club denied interest".to_string()),
            actor: "mod-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_reassess_persists_and_links_players() {
        let (store, id) = seeded_store();
        let analyzer = Arc::new(StubAnalyzer::returning(assessment(
            72,
            &[("Nabil Fekir", PlayerRole::Target), ("Isco", PlayerRole::Mentioned)],
        )));
        let reassessor = reassessor(store.clone(), false, analyzer.clone());

        let outcome = reassessor.reassess(&request(id)).await.unwrap();
        assert_eq!(outcome.probability, 72);
        assert!(outcome.content_fetched);
        assert_eq!(outcome.linked_player_ids.len(), 2);
        assert!(outcome.link_failures.is_empty());

        let sent = analyzer.last_request.lock().clone().unwrap();
        assert_eq!(sent.content.as_deref(), Some("Full article body"));
        assert_eq!(sent.admin_context.as_deref(), Some("Club denied interest"));

        let rumor = store.get_rumor(id).unwrap();
        assert_eq!(rumor.ai_probability, Some(72));
        assert_eq!(rumor.review_state(), ReviewState::Reassessed);
        assert_eq!(rumor.reassessed_by.as_deref(), Some("mod-1"));
        assert_eq!(store.players_for_rumor(id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_content_fetch_failure_is_not_fatal() {
        let (store, id) = seeded_store();
        let analyzer = Arc::new(StubAnalyzer::returning(assessment(40, &[])));
        let reassessor = reassessor(store.clone(), true, analyzer.clone());

        let outcome = reassessor.reassess(&request(id)).await.unwrap();
        assert!(!outcome.content_fetched);
        assert!(analyzer.last_request.lock().as_ref().unwrap().content.is_none());
        assert_eq!(store.get_rumor(id).unwrap().ai_probability, Some(40));
    }

    #[tokio::test]
    async fn test_analyzer_failure_aborts_without_writing() {
        let (store, id) = seeded_store();
        store.flag_for_reassessment(id).unwrap();
        let reassessor = reassessor(store.clone(), false, Arc::new(StubAnalyzer::failing()));

        let err = reassessor.reassess(&request(id)).await.unwrap_err();
        assert!(matches!(err, RumorError::AnalyzerFailure(_)));

        let rumor = store.get_rumor(id).unwrap();
        assert_eq!(rumor.ai_probability, None);
        assert!(rumor.needs_reassessment);
        assert!(rumor.admin_context.is_none());
    }

    #[tokio::test]
    async fn test_missing_rumor_skips_analyzer() {
        let (store, _) = seeded_store();
        let analyzer = Arc::new(StubAnalyzer::returning(assessment(50, &[])));
        let reassessor = reassessor(store, false, analyzer.clone());

        let err = reassessor.reassess(&request(999)).await.unwrap_err();
        assert!(matches!(err, RumorError::NotFound { .. }));
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_link_failure_keeps_analysis() {
        let (store, id) = seeded_store();
        let long_name = "x".repeat(200);
        let analyzer = Arc::new(StubAnalyzer::returning(assessment(
            65,
            &[("Isco", PlayerRole::Target), (long_name.as_str(), PlayerRole::Mentioned)],
        )));
        let reassessor = reassessor(store.clone(), false, analyzer);

        let outcome = reassessor.reassess(&request(id)).await.unwrap();
        assert_eq!(outcome.linked_player_ids.len(), 1);
        assert_eq!(outcome.link_failures.len(), 1);
        assert_eq!(outcome.link_failures[0].name, long_name);
        assert_eq!(store.get_rumor(id).unwrap().ai_probability, Some(65));
    }

    #[tokio::test]
    async fn test_repeat_reassessment_reuses_links() {
        let (store, id) = seeded_store();
        let analyzer = Arc::new(StubAnalyzer::returning(assessment(
            80,
            &[("Isco", PlayerRole::Target)],
        )));
        let reassessor = reassessor(store.clone(), false, analyzer);

        let first = reassessor.reassess(&request(id)).await.unwrap();
        let second = reassessor.reassess(&request(id)).await.unwrap();
        assert_eq!(first.linked_player_ids, second.linked_player_ids);
        assert!(second.link_failures.is_empty());
        let player = store.get_player(first.linked_player_ids[0]).unwrap();
        assert_eq!(player.rumor_count, 1);
        assert_ne!(first.run_id, second.run_id);
    }

    #[tokio::test]
    async fn test_not_a_rumor_links_nothing() {
        let (store, id) = seeded_store();
        let mut verdict = assessment(0, &[("Isco", PlayerRole::Mentioned)]);
        verdict.is_transfer_rumor = false;
        let reassessor = reassessor(store.clone(), false, Arc::new(StubAnalyzer::returning(verdict)));

        let outcome = reassessor.reassess(&request(id)).await.unwrap();
        assert!(outcome.linked_player_ids.is_empty());
        assert!(store.players_for_rumor(id).unwrap().is_empty());
        assert!(!store.get_rumor(id).unwrap().is_transfer_rumor());
    }

    #[tokio::test(start_paused = true)]
    async fn test_analyzer_timeout_aborts_without_writing() {
        use async_trait::async_trait;
        use rumor_agents::{AnalyzerConfig, LlmBackend, LlmCredibilityAnalyzer, LlmError};

        struct StalledBackend;

        #[async_trait]
        impl LlmBackend for StalledBackend {
            async fn generate(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(r#"{"probability": 90}"#.to_string())
            }

            fn model_name(&self) -> &str {
                "stalled"
            }
        }

        let (store, id) = seeded_store();
        let analyzer = LlmCredibilityAnalyzer::new(
            Arc::new(StalledBackend),
            AnalyzerConfig {
                timeout_secs: 2,
                max_retries: 1,
                retry_backoff_ms: 10,
                ..AnalyzerConfig::default()
            },
        );
        let reassessor = Reassessor::new(
            store.clone(),
            Arc::new(StubFetcher { fail: false }),
            Arc::new(analyzer),
            ReassessConfig::default(),
        );

        let err = reassessor.reassess(&request(id)).await.unwrap_err();
        assert!(matches!(err, RumorError::AnalyzerFailure(_)));

        let rumor = store.get_rumor(id).unwrap();
        assert_eq!(rumor.ai_probability, None);
        assert!(rumor.ai_analyzed_at.is_none());
        assert!(rumor.reassessed_at.is_none());
        assert!(store.players_for_rumor(id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_rumor_reassessments_are_serialized() {
        let (store, id) = seeded_store();
        let mut analyzer = StubAnalyzer::returning(assessment(55, &[]));
        analyzer.delay = Duration::from_millis(20);
        let analyzer = Arc::new(analyzer);
        let reassessor = reassessor(store, false, analyzer.clone());

        let (first, second) = (request(id), request(id));
        let (a, b) = tokio::join!(reassessor.reassess(&first), reassessor.reassess(&second));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(analyzer.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(reassessor.locks.is_empty());
    }

    #[tokio::test]
    async fn test_reassess_pending_batch() {
        let (store, first) = seeded_store();
        let second = store
            .insert_rumor(&NewRumor {
                title: "Isco renewal talks".to_string(),
                link: "https://example.com/isco".to_string(),
                pub_date: Utc.with_ymd_and_hms(2024, 7, 2, 9, 0, 0).unwrap(),
                source: "ABC Sevilla".to_string(),
                description: None,
            })
            .unwrap();
        store.flag_for_reassessment(first).unwrap();
        store.flag_for_reassessment(second).unwrap();

        let analyzer = Arc::new(StubAnalyzer::returning(assessment(30, &[])));
        let reassessor = reassessor(store.clone(), false, analyzer);

        let report = reassessor.reassess_pending("batch").await.unwrap();
        assert_eq!(report.succeeded.len(), 2);
        assert!(report.failed.is_empty());
        assert!(store.list_needing_reassessment(10).unwrap().is_empty());
    }
}
