//! GRPO engine - turns ranked groups into persistent strategy weights.

use std::collections::BTreeMap;
use std::sync::Arc;

use kaizen_core::{
    Candidate, GroupResult, GrpoRound, RoundEntry, RoundId, RoundKind, Task, TeamCandidate, TeamVariant,
    WeightDocument, MAX_WEIGHT, MIN_WEIGHT, NEUTRAL_WEIGHT,
};
use kaizen_storage::{read_document, write_document, Result, Store};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::candidates::{generate_candidates, generate_team_candidates, DEFAULT_STRATEGY};
use crate::ranking::{advantage, evaluate_group, evaluate_team_group};
use crate::rules::{unit, RuleSet};

/// Configuration for the GRPO engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GrpoConfig {
    /// Weight document
    pub weights_path: String,
    /// Default learning rate for updates
    pub learning_rate: f64,
    /// Rounds kept in history
    pub max_rounds: usize,
    /// Default group size for candidate generation
    pub default_candidates: usize,
    /// Alternatives returned with a recommendation
    pub max_alternatives: usize,
}

impl Default for GrpoConfig {
    fn default() -> Self {
        Self {
            weights_path: "grpo-weights.json".to_string(),
            learning_rate: 0.1,
            max_rounds: 200,
            default_candidates: 5,
            max_alternatives: 3,
        }
    }
}

/// Options for one weight update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateOptions {
    /// Step size
    pub learning_rate: f64,
    /// Write the round and the new table
    pub persist: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            persist: true,
        }
    }
}

/// Where a recommendation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendationSource {
    /// Learned weights
    History,
    /// No usable weights yet
    Default,
}

/// A label and its weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedLabel {
    /// Strategy label or team key
    pub label: String,
    /// Current weight
    pub weight: f64,
}

/// Best known strategy or team composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// Which table was consulted
    pub kind: RoundKind,
    /// Recommended label
    pub label: String,
    /// Its weight
    pub weight: f64,
    /// Parsed team composition, for team recommendations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamVariant>,
    /// Runners-up, best first
    pub alternatives: Vec<WeightedLabel>,
    /// Where the answer came from
    pub source: RecommendationSource,
}

/// Snapshot of learning state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrpoStats {
    /// Rounds in history
    pub total_rounds: usize,
    /// Task rounds in history
    pub task_rounds: usize,
    /// Team rounds in history
    pub team_rounds: usize,
    /// Strategy weights
    pub weights: BTreeMap<String, f64>,
    /// Team weights
    pub team_weights: BTreeMap<String, f64>,
    /// Latest rounds, most recent first
    pub recent_rounds: Vec<GrpoRound>,
    /// Last write
    pub updated_at: Option<kaizen_core::Time>,
}

fn clamp_weight(weight: f64) -> f64 {
    if weight.is_finite() {
        weight.clamp(MIN_WEIGHT, MAX_WEIGHT)
    } else {
        NEUTRAL_WEIGHT
    }
}

/// Ranks candidate groups and learns weights from the rankings.
pub struct GrpoEngine {
    store: Arc<dyn Store>,
    config: GrpoConfig,
}

impl GrpoEngine {
    /// Create a new engine over `store`.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            config: GrpoConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: GrpoConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &GrpoConfig {
        &self.config
    }

    /// Update options using the configured learning rate.
    pub fn options(&self) -> UpdateOptions {
        UpdateOptions {
            learning_rate: self.config.learning_rate,
            persist: true,
        }
    }

    /// Strategy candidates for `task`; `None` uses the configured group size.
    pub fn generate_candidates(&self, task: &Task, count: Option<usize>) -> Vec<Candidate> {
        generate_candidates(task, count.unwrap_or(self.config.default_candidates))
    }

    /// Team compositions for `task`; `None` uses the configured group size.
    pub fn generate_team_candidates(&self, task: &Task, count: Option<usize>) -> Vec<TeamCandidate> {
        generate_team_candidates(task, count.unwrap_or(self.config.default_candidates))
    }

    /// Rank strategy candidates. Uses the default task rules when `rules` is `None`.
    pub fn evaluate_group(&self, candidates: &[Candidate], rules: Option<&RuleSet>) -> GroupResult {
        match rules {
            Some(rules) => evaluate_group(candidates, rules),
            None => evaluate_group(candidates, &RuleSet::task_defaults()),
        }
    }

    /// Rank team compositions. Uses the default team rules when `rules` is `None`.
    pub fn evaluate_team_group(&self, candidates: &[TeamCandidate], rules: Option<&RuleSet>) -> GroupResult {
        match rules {
            Some(rules) => evaluate_team_group(candidates, rules),
            None => evaluate_team_group(candidates, &RuleSet::team_defaults()),
        }
    }

    async fn load(&self) -> Result<WeightDocument> {
        Ok(read_document(self.store.as_ref(), &self.config.weights_path)
            .await?
            .unwrap_or_default())
    }

    /// Apply a ranked strategy group to the weight table.
    pub async fn update_weights(&self, group: &GroupResult, options: UpdateOptions) -> Result<BTreeMap<String, f64>> {
        self.apply(RoundKind::Task, group, options).await
    }

    /// Apply a ranked team group to the team weight table.
    pub async fn update_team_weights(
        &self,
        group: &GroupResult,
        options: UpdateOptions,
    ) -> Result<BTreeMap<String, f64>> {
        self.apply(RoundKind::Team, group, options).await
    }

    async fn apply(&self, kind: RoundKind, group: &GroupResult, options: UpdateOptions) -> Result<BTreeMap<String, f64>> {
        if group.is_empty() {
            debug!("Skipping {} weight update for an empty group", kind);
            return Ok(BTreeMap::new());
        }

        let learning_rate = if options.learning_rate.is_finite() {
            options.learning_rate.max(0.0)
        } else {
            0.0
        };
        let n = group.len();
        let mut document = self.load().await?;
        let mut entries = Vec::with_capacity(n);

        let table = document.table_mut(kind);
        for ranked in &group.rankings {
            let adv = advantage(ranked.rank, n);
            let composite = unit(ranked.composite);
            let current = table
                .get(&ranked.label)
                .copied()
                .filter(|w| w.is_finite())
                .unwrap_or(NEUTRAL_WEIGHT);
            let weight = clamp_weight(current + learning_rate * adv * composite);
            table.insert(ranked.label.clone(), weight);
            entries.push(RoundEntry {
                label: ranked.label.clone(),
                rank: ranked.rank,
                composite,
                advantage: adv,
                weight,
            });
        }
        let merged = table.clone();

        if options.persist {
            let now = chrono::Utc::now();
            document.rounds.push(GrpoRound {
                id: RoundId::new(),
                kind,
                timestamp: now,
                task_id: group.task_id.clone(),
                learning_rate,
                spread: group.spread,
                entries,
            });
            if document.rounds.len() > self.config.max_rounds {
                let excess = document.rounds.len() - self.config.max_rounds;
                document.rounds.drain(..excess);
            }
            document.updated_at = Some(now);
            write_document(self.store.as_ref(), &self.config.weights_path, &document).await?;

            let best = group.best.as_ref().map(|e| e.label.as_str()).unwrap_or("-");
            info!(
                "Applied {} round: {} candidates, best '{}', spread {:.3}",
                kind, n, best, group.spread
            );
        } else {
            debug!("Computed {} weights for {} candidates without persisting", kind, n);
        }

        Ok(merged)
    }

    /// Highest-weighted label with up to the configured number of alternatives.
    ///
    /// Team weights are filtered on the key's domain segment when `domain`
    /// is given.
    pub async fn get_recommendation(&self, kind: RoundKind, domain: Option<&str>) -> Result<Recommendation> {
        let document = self.load().await?;
        let domain = domain.map(str::trim).filter(|d| !d.is_empty());

        let mut ranked: Vec<WeightedLabel> = document
            .table(kind)
            .iter()
            .filter(|(label, weight)| {
                if !weight.is_finite() {
                    return false;
                }
                match (kind, domain) {
                    (RoundKind::Team, Some(domain)) => TeamVariant::parse(label)
                        .map(|v| v.domain.eq_ignore_ascii_case(domain))
                        .unwrap_or(false),
                    _ => true,
                }
            })
            .map(|(label, weight)| WeightedLabel {
                label: label.clone(),
                weight: *weight,
            })
            .collect();
        // Stable over the sorted map, so equal weights fall back to label order.
        ranked.sort_by(|a, b| b.weight.total_cmp(&a.weight));

        let mut iter = ranked.into_iter();
        let Some(best) = iter.next() else {
            return Ok(default_recommendation(kind, domain));
        };
        let alternatives = iter.take(self.config.max_alternatives).collect();

        Ok(Recommendation {
            kind,
            team: match kind {
                RoundKind::Team => TeamVariant::parse(&best.label),
                RoundKind::Task => None,
            },
            label: best.label,
            weight: best.weight,
            alternatives,
            source: RecommendationSource::History,
        })
    }

    /// Round counts, weight tables and the latest `lookback` rounds.
    pub async fn get_grpo_stats(&self, lookback: usize) -> Result<GrpoStats> {
        let document = self.load().await?;
        let team_rounds = document.rounds.iter().filter(|r| r.kind == RoundKind::Team).count();
        Ok(GrpoStats {
            total_rounds: document.rounds.len(),
            task_rounds: document.rounds.len() - team_rounds,
            team_rounds,
            recent_rounds: document.rounds.iter().rev().take(lookback).cloned().collect(),
            weights: document.weights,
            team_weights: document.team_weights,
            updated_at: document.updated_at,
        })
    }

    /// Clear one weight table, keeping round history. Returns the number of
    /// weights removed.
    pub async fn reset_weights(&self, kind: RoundKind) -> Result<usize> {
        let mut document = self.load().await?;
        let table = document.table_mut(kind);
        let removed = table.len();
        if removed == 0 {
            return Ok(0);
        }
        table.clear();
        document.updated_at = Some(chrono::Utc::now());
        write_document(self.store.as_ref(), &self.config.weights_path, &document).await?;
        info!("Reset {} {} weights", removed, kind);
        Ok(removed)
    }
}

fn default_recommendation(kind: RoundKind, domain: Option<&str>) -> Recommendation {
    let team = match kind {
        RoundKind::Team => Some(TeamVariant {
            pattern: "parallel".to_string(),
            size: 3,
            domain: domain.unwrap_or("general").to_string(),
        }),
        RoundKind::Task => None,
    };
    Recommendation {
        kind,
        label: team
            .as_ref()
            .map(TeamVariant::key)
            .unwrap_or_else(|| DEFAULT_STRATEGY.to_string()),
        weight: NEUTRAL_WEIGHT,
        team,
        alternatives: Vec::new(),
        source: RecommendationSource::Default,
    }
}
