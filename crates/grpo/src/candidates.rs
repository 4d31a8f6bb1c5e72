//! Candidate generation for strategy and team groups.

use std::collections::BTreeMap;

use kaizen_core::{Candidate, CandidateId, Task, TeamCandidate};

/// Strategy every group starts with.
pub const DEFAULT_STRATEGY: &str = "balanced";

const GENERIC_STRATEGIES: [&str; 4] = ["conservative", "aggressive", "minimal", "thorough"];

const TEAM_PATTERNS: [&str; 5] = ["parallel", "sequential", "hierarchical", "pipeline", "swarm"];
const TEAM_SIZES: [usize; 4] = [3, 2, 4, 5];

const GENERAL_DOMAIN: &str = "general";

fn domain_strategies(domain: &str) -> &'static [&'static str] {
    match domain.to_ascii_lowercase().as_str() {
        "frontend" => &["component-first", "accessibility-first", "mobile-first"],
        "backend" => &["api-first", "schema-first", "test-driven"],
        "testing" => &["coverage-first", "edge-case-first", "property-based"],
        "security" => &["threat-model-first", "least-privilege", "defense-in-depth"],
        "docs" | "documentation" => &["outline-first", "example-driven", "reference-style"],
        "devops" | "infrastructure" => &["declarative", "incremental-rollout", "immutable"],
        _ => &[],
    }
}

fn domain_roster(domain: &str) -> &'static [&'static str] {
    match domain.to_ascii_lowercase().as_str() {
        "frontend" => &["ui-designer", "frontend-developer", "accessibility-reviewer", "tester", "reviewer"],
        "backend" => &["architect", "backend-developer", "database-engineer", "tester", "reviewer"],
        "testing" => &["test-planner", "test-engineer", "automation-engineer", "reviewer", "reporter"],
        "security" => &["threat-modeler", "security-engineer", "auditor", "developer", "reviewer"],
        "devops" | "infrastructure" => &["platform-engineer", "release-manager", "sre", "developer", "reviewer"],
        _ => &["planner", "developer", "tester", "reviewer", "documenter"],
    }
}

/// How far a strategy strays from the known-good path, in [0, 1].
fn exploration(label: &str) -> f64 {
    match label {
        "conservative" => 0.1,
        "minimal" => 0.2,
        "thorough" => 0.4,
        DEFAULT_STRATEGY => 0.5,
        "aggressive" => 0.9,
        _ => 0.6,
    }
}

fn domain_or_general(domain: &str) -> String {
    let domain = domain.trim();
    if domain.is_empty() {
        GENERAL_DOMAIN.to_string()
    } else {
        domain.to_string()
    }
}

/// Build `count` strategy candidates for `task`.
///
/// Labels run "balanced", then the domain's strategies, then the generic
/// ones. Past that the list repeats with a `-v2`, `-v3`, ... suffix.
pub fn generate_candidates(task: &Task, count: usize) -> Vec<Candidate> {
    let mut labels = vec![DEFAULT_STRATEGY];
    labels.extend(domain_strategies(&task.domain).iter().copied());
    labels.extend(GENERIC_STRATEGIES.iter().copied());

    let domain = domain_or_general(&task.domain);
    (0..count)
        .map(|index| {
            let base = labels[index % labels.len()];
            let cycle = index / labels.len();
            let strategy = if cycle == 0 {
                base.to_string()
            } else {
                format!("{}-v{}", base, cycle + 1)
            };

            let mut params = BTreeMap::new();
            params.insert("exploration".to_string(), exploration(base));

            Candidate {
                id: CandidateId::new(),
                task_id: task.id.clone(),
                domain: domain.clone(),
                strategy,
                index,
                params,
                result: Default::default(),
            }
        })
        .collect()
}

fn roster(domain: &str, size: usize) -> Vec<String> {
    let roles = domain_roster(domain);
    (0..size)
        .map(|i| {
            let role = roles[i % roles.len()];
            match i / roles.len() {
                0 => role.to_string(),
                n => format!("{}-{}", role, n + 1),
            }
        })
        .collect()
}

/// Build up to `count` team compositions for `task`.
///
/// Pairs are taken size-major: every pattern at size 3, then size 2, and
/// so on. At most 20 distinct compositions exist.
pub fn generate_team_candidates(task: &Task, count: usize) -> Vec<TeamCandidate> {
    let domain = domain_or_general(&task.domain);
    TEAM_SIZES
        .iter()
        .flat_map(|size| TEAM_PATTERNS.iter().map(move |pattern| (*pattern, *size)))
        .take(count)
        .enumerate()
        .map(|(index, (pattern, size))| TeamCandidate {
            id: CandidateId::new(),
            task_id: task.id.clone(),
            pattern: pattern.to_string(),
            size,
            domain: domain.clone(),
            agents: roster(&domain, size),
            index,
            result: Default::default(),
        })
        .collect()
}
