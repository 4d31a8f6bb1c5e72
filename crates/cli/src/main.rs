//! Kaizen CLI - self-evaluation, GRPO weights and fast-tier pattern transfer.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kaizen_core::{
    Candidate, LearnedPattern, ResultMetrics, RoundKind, TaskInfo, TaskResult, TeamCandidate, TransferAction,
    UserFeedback,
};
use kaizen_evaluator::SelfEvaluator;
use kaizen_grpo::GrpoEngine;
use kaizen_storage::{FileLock, JsonStorage, Store};
use kaizen_transfer::KnowledgeTransfer;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::KaizenConfig;

#[derive(Parser)]
#[command(name = "kaizen")]
#[command(about = "Self-learning optimization core", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the JSON documents
    #[arg(long, global = true, env = "KAIZEN_DATA_DIR", default_value = ".kaizen")]
    data_dir: PathBuf,

    /// Log at debug level instead of info
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a completed task
    Evaluate(EvaluateArgs),
    /// Suggest improvements from recent evaluations
    Suggest {
        /// Average below which a dimension is weak (defaults to the configured 3.0)
        #[arg(long)]
        threshold: Option<f64>,
        /// Evaluations to consider
        #[arg(long, default_value = "20")]
        lookback: usize,
    },
    /// Per-task-type performance
    TeamPerformance {
        /// Best and worst groups to show
        #[arg(long, default_value = "3")]
        top: usize,
    },
    /// Trend of overall scores
    Trends {
        /// Evaluations per window
        #[arg(long, default_value = "5")]
        window: usize,
    },
    /// Generate a candidate group for a task
    Generate {
        /// Task identifier
        task_id: String,
        /// Task domain
        #[arg(long, default_value = "")]
        domain: String,
        /// Group size
        #[arg(long)]
        count: Option<usize>,
        /// Generate team compositions instead of strategies
        #[arg(long)]
        team: bool,
    },
    /// Rank a group of executed candidates and update weights
    Rank {
        /// JSON file holding the candidate array
        file: PathBuf,
        /// Group kind
        #[arg(long, default_value = "task")]
        kind: RoundKind,
        /// Learning rate (defaults to the configured one)
        #[arg(long)]
        learning_rate: Option<f64>,
        /// Compute without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Recommend a strategy or team composition
    Recommend {
        /// Weight table to consult
        #[arg(long, default_value = "task")]
        kind: RoundKind,
        /// Team domain filter
        #[arg(long)]
        domain: Option<String>,
    },
    /// Show GRPO learning state
    GrpoStats {
        /// Recent rounds to include
        #[arg(long, default_value = "10")]
        lookback: usize,
    },
    /// Clear one weight table
    ResetWeights {
        /// Weight table to clear
        #[arg(long)]
        kind: RoundKind,
    },
    /// List promotion candidates from the pattern sources
    Candidates,
    /// Promote one pattern into the fast tier
    Promote {
        /// Pattern key
        key: String,
        /// Pattern confidence
        #[arg(long)]
        confidence: f64,
        /// Successes in a row
        #[arg(long)]
        successes: i64,
        /// Pattern category
        #[arg(long, default_value = "")]
        category: String,
    },
    /// Reconcile the fast tier with the pattern sources
    HotSwap,
    /// List active patterns
    Patterns,
    /// Show one active pattern
    Pattern {
        /// Pattern key
        key: String,
    },
    /// Report one use of an active pattern
    Usage(UsageArgs),
    /// Remove a pattern from the fast tier
    Demote {
        /// Pattern key
        key: String,
        /// Why it is being removed
        #[arg(long, default_value = "manual demotion")]
        reason: String,
    },
    /// Show the transfer log
    History {
        /// Entries to show
        #[arg(long, default_value = "50")]
        limit: usize,
        /// Only this action (promote, demote, auto-demote, hot-swap)
        #[arg(long)]
        action: Option<TransferAction>,
    },
    /// Fast-tier and transfer log counts
    TransferStats,
}

#[derive(Args)]
struct EvaluateArgs {
    /// Task identifier
    task_id: String,
    /// Task type
    #[arg(long = "type", default_value = "general")]
    task_type: String,
    /// The task succeeded
    #[arg(long)]
    success: bool,
    /// Its tests passed
    #[arg(long)]
    tests_pass: bool,
    /// Duration in milliseconds
    #[arg(long)]
    duration: Option<f64>,
    /// Requirements covered (a ratio, or a count with --total)
    #[arg(long)]
    covered: Option<f64>,
    /// Requirements in total
    #[arg(long)]
    total: Option<f64>,
    /// The user was happy with the result
    #[arg(long, conflicts_with = "negative")]
    positive: bool,
    /// The user was unhappy with the result
    #[arg(long)]
    negative: bool,
    /// The user asked for a revision
    #[arg(long)]
    revision: bool,
    /// Score without recording
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
#[group(required = true, multiple = false, id = "outcome")]
struct UsageOutcomeFlag {
    /// The pattern worked
    #[arg(long)]
    success: bool,
    /// The pattern failed
    #[arg(long)]
    failure: bool,
}

#[derive(Args)]
struct UsageArgs {
    /// Pattern key
    key: String,
    #[command(flatten)]
    outcome: UsageOutcomeFlag,
}

/// Filter used when `RUST_LOG` is unset.
fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn read_json_file<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = KaizenConfig::load(&cli.data_dir).await?;
    let storage: Arc<dyn Store> = Arc::new(JsonStorage::new(&cli.data_dir).await?);
    debug!("Using data directory {}", cli.data_dir.display());

    let evaluator = || SelfEvaluator::new(storage.clone()).with_config(config.evaluator.clone());
    let grpo = || GrpoEngine::new(storage.clone()).with_config(config.grpo.clone());
    let transfer = || {
        let lock = FileLock::new(cli.data_dir.join("locks")).with_config(config.lock.clone());
        KnowledgeTransfer::new(storage.clone(), Arc::new(lock)).with_config(config.transfer.clone())
    };

    match cli.command {
        Commands::Evaluate(args) => {
            let user_feedback = match (args.positive, args.negative) {
                (true, _) => Some(UserFeedback::Positive),
                (_, true) => Some(UserFeedback::Negative),
                _ => None,
            };
            let result = TaskResult {
                success: args.success,
                tests_pass: args.tests_pass,
                duration: args.duration,
                metrics: ResultMetrics {
                    requirements_covered: args.covered,
                    requirements_total: args.total,
                    user_feedback,
                    revision_requested: args.revision,
                },
            };
            let task = TaskInfo::new(args.task_id, args.task_type);
            print_json(&evaluator().evaluate_result(&task, &result, !args.dry_run).await?)?;
        }
        Commands::Suggest { threshold, lookback } => {
            let threshold = config.suggestion_threshold(threshold);
            print_json(&evaluator().get_improvement_suggestions(threshold, lookback).await?)?;
        }
        Commands::TeamPerformance { top } => {
            print_json(&evaluator().get_team_performance(top).await?)?;
        }
        Commands::Trends { window } => {
            print_json(&evaluator().get_learning_trends(window).await?)?;
        }
        Commands::Generate {
            task_id,
            domain,
            count,
            team,
        } => {
            let engine = grpo();
            let task = kaizen_core::Task::new(task_id, domain);
            if team {
                print_json(&engine.generate_team_candidates(&task, count))?;
            } else {
                print_json(&engine.generate_candidates(&task, count))?;
            }
        }
        Commands::Rank {
            file,
            kind,
            learning_rate,
            dry_run,
        } => {
            let engine = grpo();
            let mut options = engine.options();
            options.persist = !dry_run;
            if let Some(rate) = learning_rate {
                options.learning_rate = rate;
            }

            let group = match kind {
                RoundKind::Task => {
                    let candidates: Vec<Candidate> = read_json_file(&file).await?;
                    engine.evaluate_group(&candidates, None)
                }
                RoundKind::Team => {
                    let candidates: Vec<TeamCandidate> = read_json_file(&file).await?;
                    engine.evaluate_team_group(&candidates, None)
                }
            };
            let weights = match kind {
                RoundKind::Task => engine.update_weights(&group, options).await?,
                RoundKind::Team => engine.update_team_weights(&group, options).await?,
            };
            print_json(&serde_json::json!({ "group": group, "weights": weights }))?;
        }
        Commands::Recommend { kind, domain } => {
            print_json(&grpo().get_recommendation(kind, domain.as_deref()).await?)?;
        }
        Commands::GrpoStats { lookback } => {
            print_json(&grpo().get_grpo_stats(lookback).await?)?;
        }
        Commands::ResetWeights { kind } => {
            let removed = grpo().reset_weights(kind).await?;
            print_json(&serde_json::json!({ "kind": kind, "removed": removed }))?;
        }
        Commands::Candidates => {
            print_json(&transfer().get_promotion_candidates().await?)?;
        }
        Commands::Promote {
            key,
            confidence,
            successes,
            category,
        } => {
            let mut pattern = LearnedPattern::new(key, confidence, successes);
            pattern.category = category;
            print_json(&transfer().promote_to_system1(&pattern).await?)?;
        }
        Commands::HotSwap => {
            print_json(&transfer().hot_swap().await?)?;
        }
        Commands::Patterns => {
            print_json(&transfer().get_system1_patterns().await?)?;
        }
        Commands::Pattern { key } => match transfer().get_system1_pattern(&key).await? {
            Some(pattern) => print_json(&pattern)?,
            None => anyhow::bail!("Pattern '{}' is not active", key),
        },
        Commands::Usage(args) => {
            let success = args.outcome.success && !args.outcome.failure;
            print_json(&transfer().record_system1_usage(&args.key, success).await?)?;
        }
        Commands::Demote { key, reason } => {
            print_json(&transfer().demote_from_system1(&key, &reason).await?)?;
        }
        Commands::History { limit, action } => {
            print_json(&transfer().get_transfer_history(limit, action).await?)?;
        }
        Commands::TransferStats => {
            print_json(&transfer().get_transfer_stats().await?)?;
        }
    }

    Ok(())
}
