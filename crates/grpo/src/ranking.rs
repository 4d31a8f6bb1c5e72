//! Group-relative ranking of scored candidates.

use std::collections::{BTreeMap, HashMap};

use kaizen_core::{Candidate, CandidateId, Evaluation, GroupResult, RankingEntry, TeamCandidate};

use crate::rules::{unit, RuleSet};

const SELF_EVALUATION_RULE: &str = "self_evaluation";
const UNSEEDED_SCORE: f64 = 0.5;

/// Advantage of `rank` within a group of `n`: +1 for the best, -1 for the
/// worst, linear in between. A group of one has no advantage.
pub fn advantage(rank: usize, n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    1.0 - 2.0 * (rank.saturating_sub(1)) as f64 / (n - 1) as f64
}

/// Map a self-evaluation's overall score from [1, 5] onto [0, 1].
pub fn self_evaluation_score(evaluation: &Evaluation) -> f64 {
    unit((evaluation.overall - 1.0) / 4.0)
}

fn composite(scores: &BTreeMap<String, f64>) -> f64 {
    if scores.is_empty() {
        0.0
    } else {
        scores.values().sum::<f64>() / scores.len() as f64
    }
}

fn rank(task_id: Option<String>, scored: Vec<(CandidateId, String, BTreeMap<String, f64>)>) -> GroupResult {
    let mut entries: Vec<RankingEntry> = scored
        .into_iter()
        .map(|(candidate_id, label, scores)| RankingEntry {
            candidate_id,
            label,
            composite: composite(&scores),
            scores,
            rank: 0,
        })
        .collect();

    // Stable: ties keep input order.
    entries.sort_by(|a, b| b.composite.total_cmp(&a.composite));
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = i + 1;
    }

    let spread = match (entries.first(), entries.last()) {
        (Some(best), Some(worst)) => best.composite - worst.composite,
        _ => 0.0,
    };

    GroupResult {
        task_id,
        best: entries.first().cloned(),
        worst: entries.last().cloned(),
        rankings: entries,
        spread,
    }
}

fn group_task_id<'a>(mut ids: impl Iterator<Item = &'a str>) -> Option<String> {
    ids.next().map(str::to_string)
}

/// Score and rank strategy candidates. Weight keys are strategy labels.
pub fn evaluate_group(candidates: &[Candidate], rules: &RuleSet) -> GroupResult {
    let scored = candidates
        .iter()
        .map(|c| (c.id, c.strategy.clone(), rules.score(&c.result)))
        .collect();
    rank(group_task_id(candidates.iter().map(|c| c.task_id.as_str())), scored)
}

/// Like [`evaluate_group`], with an extra `self_evaluation` score taken from
/// each candidate's self-evaluation. Unseeded candidates score 0.5 there.
pub fn evaluate_group_seeded(
    candidates: &[Candidate],
    rules: &RuleSet,
    seeds: &HashMap<CandidateId, Evaluation>,
) -> GroupResult {
    let scored = candidates
        .iter()
        .map(|c| {
            let mut scores = rules.score(&c.result);
            let seed = seeds.get(&c.id).map(self_evaluation_score).unwrap_or(UNSEEDED_SCORE);
            scores.insert(SELF_EVALUATION_RULE.to_string(), seed);
            (c.id, c.strategy.clone(), scores)
        })
        .collect();
    rank(group_task_id(candidates.iter().map(|c| c.task_id.as_str())), scored)
}

/// Score and rank team compositions. Weight keys are `pattern|size|domain`.
pub fn evaluate_team_group(candidates: &[TeamCandidate], rules: &RuleSet) -> GroupResult {
    let scored = candidates
        .iter()
        .map(|c| {
            let mut result = c.result.clone();
            if result.team_size <= 0.0 {
                result.team_size = c.size as f64;
            }
            (c.id, c.variant().key(), rules.score(&result))
        })
        .collect();
    rank(group_task_id(candidates.iter().map(|c| c.task_id.as_str())), scored)
}
