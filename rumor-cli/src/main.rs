//! Rumor Intel CLI
//!
//! Operator access to the rumor engine: feed, trending players, moderation
//! and reassessment. Every command prints pretty JSON on stdout.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rumor_agents::{
    create_anthropic_backend, create_backend, AnthropicConfig, LlmCredibilityAnalyzer,
    OpenAIBackendConfig, SharedBackend,
};
use rumor_core::{NewRumor, PlayerRole};
use rumor_fetch::HttpArticleFetcher;
use rumor_runtime::{CommandResponse, EngineConfig, FeedRequest, ModeratorCommand, RumorEngine};
use rumor_store::RumorStore;

#[derive(Parser)]
#[command(name = "rumor-intel")]
#[command(author, version, about = "Transfer-rumor intelligence engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine config file (TOML)
    #[arg(long, global = true, env = "RUMOR_INTEL_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true, env = "RUMOR_INTEL_DB", default_value = "rumor-intel.sqlite")]
    db: PathBuf,

    /// Verbosity level (0-3); RUST_LOG overrides it
    #[arg(short, long, global = true, default_value = "1")]
    verbose: u8,
}

/// Credibility analyzer provider selection
#[derive(Args)]
struct AnalyzerArgs {
    /// LLM model to use
    #[arg(short, long, default_value = "claude-sonnet-4-20250514")]
    model: String,

    /// Anthropic API key (or set ANTHROPIC_API_KEY env var)
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_key: Option<String>,

    /// OpenAI API key (or set OPENAI_API_KEY env var)
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OpenRouter API key (or set OPENROUTER_API_KEY env var)
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    openrouter_key: Option<String>,

    /// Use OpenAI instead of Anthropic
    #[arg(long)]
    openai: bool,

    /// Use OpenRouter instead of Anthropic
    #[arg(long)]
    openrouter: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Import raw rumors from a JSON array file
    Import {
        file: PathBuf,
    },

    /// Show a page of the public feed
    Feed {
        /// Cursor token from a previous page
        #[arg(long)]
        cursor: Option<String>,

        #[arg(short, long)]
        limit: Option<usize>,

        /// Only rumors linked to this player
        #[arg(short, long)]
        player: Option<String>,
    },

    /// Rank players by mention momentum
    Trending {
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Reference day (YYYY-MM-DD), defaults to today in UTC
        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// Dense daily mention counts for one player
    Timeline {
        player: String,

        /// Window length in days
        #[arg(short, long)]
        days: Option<i64>,

        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// Hide a rumor from the feed and drop its player links
    Hide {
        news_id: i64,

        #[arg(short, long)]
        reason: Option<String>,

        #[arg(long, default_value = "cli")]
        actor: String,
    },

    /// Return a hidden rumor to the feed
    Unhide {
        news_id: i64,

        #[arg(long, default_value = "cli")]
        actor: String,
    },

    /// Re-run credibility analysis for one rumor
    Reassess {
        news_id: i64,

        /// Moderator hint passed to the analyzer
        #[arg(short, long)]
        context: Option<String>,

        #[arg(long, default_value = "cli")]
        actor: String,

        #[command(flatten)]
        analyzer: AnalyzerArgs,
    },

    /// Reassess every rumor flagged for reassessment
    ReassessPending {
        #[arg(long, default_value = "cli")]
        actor: String,

        #[command(flatten)]
        analyzer: AnalyzerArgs,
    },

    /// Override a rumor's probability (0-100)
    SetProbability {
        news_id: i64,
        probability: i64,
    },

    /// Link a player to a rumor
    Link {
        news_id: i64,
        player: String,

        /// target, departing or mentioned
        #[arg(short, long)]
        role: Option<PlayerRole>,
    },

    /// Remove a player link
    Unlink {
        news_id: i64,
        player_id: i64,
    },

    /// Merge a duplicate player into a primary one
    Merge {
        primary_id: i64,
        duplicate_id: i64,
    },

    /// Search players for autocomplete
    SearchPlayers {
        query: String,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Replace a player's aliases
    SetAliases {
        player_id: i64,
        aliases: Vec<String>,
    },

    /// Set or clear (omit the name) a player's display name
    SetDisplayName {
        player_id: i64,
        display_name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let log_level = match cli.verbose {
        0 => "error",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let store = Arc::new(
        RumorStore::open(&cli.db, config.players.clone())
            .with_context(|| format!("Failed to open database {}", cli.db.display()))?,
    );
    let engine = RumorEngine::new(config, store);

    match cli.command {
        Commands::Import { file } => import(&engine, &file)?,
        Commands::Feed {
            cursor,
            limit,
            player,
        } => {
            let page = engine.feed(&FeedRequest {
                cursor,
                limit,
                player,
            })?;
            print_json(&page)?;
        }
        Commands::Trending { limit, today } => {
            let today = today.unwrap_or_else(|| Utc::now().date_naive());
            print_json(&engine.trending().trending(limit, today)?)?;
        }
        Commands::Timeline {
            player,
            days,
            today,
        } => {
            let today = today.unwrap_or_else(|| Utc::now().date_naive());
            let days = days.unwrap_or(engine.config().trend.timeline_days);
            print_json(&engine.trending().timeline_with_days(&player, days, today)?)?;
        }
        Commands::Hide {
            news_id,
            reason,
            actor,
        } => {
            run_command(
                &engine,
                ModeratorCommand::SetHidden {
                    news_id,
                    hide: true,
                    reason,
                    actor,
                },
            )
            .await?
        }
        Commands::Unhide { news_id, actor } => {
            run_command(
                &engine,
                ModeratorCommand::SetHidden {
                    news_id,
                    hide: false,
                    reason: None,
                    actor,
                },
            )
            .await?
        }
        Commands::Reassess {
            news_id,
            context,
            actor,
            analyzer,
        } => {
            let engine = with_analysis(engine, &analyzer)?;
            run_command(
                &engine,
                ModeratorCommand::Reassess {
                    news_id,
                    admin_context: context,
                    actor,
                },
            )
            .await?
        }
        Commands::ReassessPending { actor, analyzer } => {
            let engine = with_analysis(engine, &analyzer)?;
            let report = engine.reassessor()?.reassess_pending(&actor).await?;
            print_json(&report)?;
        }
        Commands::SetProbability {
            news_id,
            probability,
        } => {
            run_command(
                &engine,
                ModeratorCommand::SetProbability {
                    news_id,
                    probability,
                },
            )
            .await?
        }
        Commands::Link {
            news_id,
            player,
            role,
        } => {
            run_command(
                &engine,
                ModeratorCommand::LinkPlayer {
                    news_id,
                    player_name: player,
                    role,
                },
            )
            .await?
        }
        Commands::Unlink { news_id, player_id } => {
            run_command(&engine, ModeratorCommand::UnlinkPlayer { news_id, player_id }).await?
        }
        Commands::Merge {
            primary_id,
            duplicate_id,
        } => {
            run_command(
                &engine,
                ModeratorCommand::MergePlayers {
                    primary_id,
                    duplicate_id,
                },
            )
            .await?
        }
        Commands::SearchPlayers { query, limit } => {
            run_command(&engine, ModeratorCommand::SearchPlayers { query, limit }).await?
        }
        Commands::SetAliases { player_id, aliases } => {
            run_command(&engine, ModeratorCommand::SetAliases { player_id, aliases }).await?
        }
        Commands::SetDisplayName {
            player_id,
            display_name,
        } => {
            run_command(
                &engine,
                ModeratorCommand::SetDisplayName {
                    player_id,
                    display_name,
                },
            )
            .await?
        }
    }

    Ok(())
}

fn import(engine: &RumorEngine, file: &Path) -> Result<()> {
    let raw = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let rumors: Vec<NewRumor> = serde_json::from_str(&raw)
        .with_context(|| format!("Expected a JSON array of rumors in {}", file.display()))?;

    let mut ids = Vec::with_capacity(rumors.len());
    for rumor in &rumors {
        ids.push(engine.store().insert_rumor(rumor)?);
    }
    info!("Imported {} rumors from {}", ids.len(), file.display());
    print_json(&serde_json::json!({ "imported": ids.len(), "ids": ids }))
}

fn build_backend(args: &AnalyzerArgs) -> Result<SharedBackend> {
    // Anthropic is the default provider
    let backend = if args.openrouter {
        let key = args.openrouter_key.as_deref().ok_or_else(|| {
            anyhow::anyhow!("OpenRouter API key required. Set OPENROUTER_API_KEY or use --openrouter-key")
        })?;
        create_backend(OpenAIBackendConfig::openrouter(key, &args.model))?
    } else if args.openai {
        let key = args.api_key.as_deref().ok_or_else(|| {
            anyhow::anyhow!("OpenAI API key required. Set OPENAI_API_KEY or use --api-key")
        })?;
        create_backend(OpenAIBackendConfig::openai(key, &args.model))?
    } else {
        let key = args.anthropic_key.as_deref().ok_or_else(|| {
            anyhow::anyhow!("Anthropic API key required. Set ANTHROPIC_API_KEY or use --anthropic-key")
        })?;
        create_anthropic_backend(AnthropicConfig::new(key, &args.model))?
    };

    let provider = if args.openrouter {
        "OpenRouter"
    } else if args.openai {
        "OpenAI"
    } else {
        "Anthropic"
    };
    info!("Analyzer provider: {} | Model: {}", provider, args.model);
    Ok(backend)
}

fn with_analysis(engine: RumorEngine, args: &AnalyzerArgs) -> Result<RumorEngine> {
    let backend = build_backend(args)?;
    let fetcher = HttpArticleFetcher::new(engine.config().fetch.clone())?;
    let analyzer = LlmCredibilityAnalyzer::new(backend, engine.config().analyzer.clone());
    Ok(engine.with_analysis(Arc::new(fetcher), Arc::new(analyzer)))
}

async fn run_command(engine: &RumorEngine, command: ModeratorCommand) -> Result<()> {
    let response: CommandResponse = engine.execute(command).await?;
    print_json(&response)?;
    if !response.success {
        anyhow::bail!("{}", response.message);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
