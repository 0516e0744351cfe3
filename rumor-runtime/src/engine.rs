//! Rumor engine facade
//!
//! The public feed and the moderator command surface. Commands that fail
//! because of the request itself (unknown rumor, bad probability, duplicate
//! link) come back as `success = false` responses; store and analyzer
//! failures are returned as errors so callers can decide to retry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use rumor_agents::CredibilityAnalyzer;
use rumor_core::{FeedLimits, PlayerRole, RumorError};
use rumor_fetch::ContentFetcher;
use rumor_store::{FeedCursor, FeedPage, MergeOutcome, RumorStore};

use crate::{EngineConfig, ReassessRequest, Reassessor, TrendingService};

/// Public feed query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRequest {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
    /// Restrict to rumors linked to this player. The filtered feed is one
    /// complete page: `cursor` is ignored, `limit` is only validated and
    /// `has_more` is always false.
    pub player: Option<String>,
}

/// Commands emitted by the moderation surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ModeratorCommand {
    SetHidden {
        news_id: i64,
        hide: bool,
        reason: Option<String>,
        actor: String,
    },
    Reassess {
        news_id: i64,
        admin_context: Option<String>,
        actor: String,
    },
    FlagForReassessment {
        news_id: i64,
    },
    SetProbability {
        news_id: i64,
        probability: i64,
    },
    LinkPlayer {
        news_id: i64,
        player_name: String,
        role: Option<PlayerRole>,
    },
    UnlinkPlayer {
        news_id: i64,
        player_id: i64,
    },
    MergePlayers {
        primary_id: i64,
        duplicate_id: i64,
    },
    SearchPlayers {
        query: String,
        limit: Option<usize>,
    },
    SetAliases {
        player_id: i64,
        aliases: Vec<String>,
    },
    SetDisplayName {
        player_id: i64,
        display_name: Option<String>,
    },
}

/// Uniform reply to a moderator command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

pub struct RumorEngine {
    store: Arc<RumorStore>,
    trending: TrendingService,
    reassessor: Option<Reassessor>,
    config: EngineConfig,
}

impl RumorEngine {
    /// Engine without an analyzer; reassessment commands fail until one is attached
    pub fn new(config: EngineConfig, store: Arc<RumorStore>) -> Self {
        let trending = TrendingService::new(store.clone(), config.trend.clone());
        Self {
            store,
            trending,
            reassessor: None,
            config,
        }
    }

    pub fn with_analysis(
        mut self,
        fetcher: Arc<dyn ContentFetcher>,
        analyzer: Arc<dyn CredibilityAnalyzer>,
    ) -> Self {
        self.reassessor = Some(Reassessor::new(
            self.store.clone(),
            fetcher,
            analyzer,
            self.config.reassess.clone(),
        ));
        self
    }

    pub fn store(&self) -> &Arc<RumorStore> {
        &self.store
    }

    pub fn trending(&self) -> &TrendingService {
        &self.trending
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn reassessor(&self) -> Result<&Reassessor, RumorError> {
        self.reassessor.as_ref().ok_or_else(|| {
            RumorError::AnalyzerFailure("no credibility analyzer configured".to_string())
        })
    }

    fn feed_limits(&self) -> &FeedLimits {
        &self.config.feed
    }

    /// Public feed page, optionally filtered by player
    pub fn feed(&self, request: &FeedRequest) -> Result<FeedPage, RumorError> {
        let limit = self.feed_limits().resolve(request.limit)?;

        if let Some(player) = request.player.as_deref().filter(|p| !p.trim().is_empty()) {
            let rumors = self.store.fetch_by_player(player)?;
            return Ok(FeedPage {
                rumors,
                has_more: false,
                next_cursor: None,
            });
        }

        match request.cursor.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(token) => self.store.fetch_more(FeedCursor::parse(token)?, limit),
            None => self.store.fetch_initial(limit),
        }
    }

    /// Run a moderator command
    pub async fn execute(&self, command: ModeratorCommand) -> Result<CommandResponse, RumorError> {
        debug!("Executing {:?}", command);
        match self.dispatch(command).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_user_facing() => {
                warn!("Moderator command rejected: {}", e);
                Ok(CommandResponse::failure(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn dispatch(&self, command: ModeratorCommand) -> Result<CommandResponse, RumorError> {
        match command {
            ModeratorCommand::SetHidden {
                news_id,
                hide,
                reason,
                actor,
            } => {
                let removed = self
                    .store
                    .set_hidden(news_id, hide, reason.as_deref(), &actor)?;
                let message = if hide {
                    format!("Rumor {} hidden ({} player links removed)", news_id, removed)
                } else {
                    format!("Rumor {} restored; re-analyze to relink players", news_id)
                };
                Ok(CommandResponse::ok(message, None))
            }
            ModeratorCommand::Reassess {
                news_id,
                admin_context,
                actor,
            } => {
                let request = ReassessRequest {
                    news_id,
                    admin_context,
                    actor,
                };
                let outcome = self.reassessor()?.reassess(&request).await?;
                let message = if outcome.link_failures.is_empty() {
                    format!("Rumor {} reassessed", news_id)
                } else {
                    format!(
                        "Rumor {} reassessed; {} players could not be linked",
                        news_id,
                        outcome.link_failures.len()
                    )
                };
                Ok(CommandResponse::ok(message, Some(to_data(&outcome)?)))
            }
            ModeratorCommand::FlagForReassessment { news_id } => {
                self.store.flag_for_reassessment(news_id)?;
                Ok(CommandResponse::ok(
                    format!("Rumor {} queued for reassessment", news_id),
                    None,
                ))
            }
            ModeratorCommand::SetProbability {
                news_id,
                probability,
            } => {
                let probability = self.store.update_probability(news_id, probability)?;
                Ok(CommandResponse::ok(
                    format!("Rumor {} probability set to {}", news_id, probability),
                    Some(json!({ "probability": probability })),
                ))
            }
            ModeratorCommand::LinkPlayer {
                news_id,
                player_name,
                role,
            } => {
                let linked = self
                    .store
                    .link_player(news_id, &player_name, role.unwrap_or_default())?;
                Ok(CommandResponse::ok(
                    format!(
                        "Linked {} to rumor {} as {}",
                        linked.player.presentation_name(),
                        news_id,
                        linked.role
                    ),
                    Some(to_data(&linked)?),
                ))
            }
            ModeratorCommand::UnlinkPlayer { news_id, player_id } => {
                self.store.unlink_player(news_id, player_id)?;
                Ok(CommandResponse::ok(
                    format!("Unlinked player {} from rumor {}", player_id, news_id),
                    None,
                ))
            }
            ModeratorCommand::MergePlayers {
                primary_id,
                duplicate_id,
            } => {
                let outcome = self.store.merge_players(primary_id, duplicate_id)?;
                let message = match &outcome {
                    MergeOutcome::Merged { .. } => {
                        format!("Merged player {} into {}", duplicate_id, primary_id)
                    }
                    MergeOutcome::AlreadyMerged { .. } => {
                        format!("Player {} was already merged", duplicate_id)
                    }
                };
                Ok(CommandResponse::ok(message, Some(to_data(&outcome)?)))
            }
            ModeratorCommand::SearchPlayers { query, limit } => {
                let limit = self.feed_limits().resolve(limit)?;
                let players = self.store.search_players(&query, limit)?;
                Ok(CommandResponse::ok(
                    format!("{} players match {:?}", players.len(), query),
                    Some(to_data(&players)?),
                ))
            }
            ModeratorCommand::SetAliases { player_id, aliases } => {
                let player = self.store.set_aliases(player_id, &aliases)?;
                Ok(CommandResponse::ok(
                    format!("Player {} now has {} aliases", player_id, player.aliases.len()),
                    Some(to_data(&player)?),
                ))
            }
            ModeratorCommand::SetDisplayName {
                player_id,
                display_name,
            } => {
                let player = self
                    .store
                    .set_display_name(player_id, display_name.as_deref())?;
                Ok(CommandResponse::ok(
                    format!("Player {} shown as {}", player_id, player.presentation_name()),
                    Some(to_data(&player)?),
                ))
            }
        }
    }
}

fn to_data<T: Serialize>(value: &T) -> Result<Value, RumorError> {
    serde_json::to_value(value)
        .map_err(|e| RumorError::Store(format!("failed to encode response: {}", e)))
}
