//! Scoring rules: named pure functions from an execution result to [0, 1].

use std::collections::BTreeMap;
use std::sync::Arc;

use kaizen_core::ExecutionResult;

type RuleFn = Arc<dyn Fn(&ExecutionResult) -> f64 + Send + Sync>;

/// One named scoring function.
#[derive(Clone)]
pub struct ScoringRule {
    name: String,
    func: RuleFn,
}

impl ScoringRule {
    /// Create a rule.
    pub fn new(name: impl Into<String>, func: impl Fn(&ExecutionResult) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Rule name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Score a result, forced into [0, 1]. Non-finite output scores 0.
    pub fn score(&self, result: &ExecutionResult) -> f64 {
        unit((self.func)(result))
    }
}

impl std::fmt::Debug for ScoringRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringRule").field("name", &self.name).finish()
    }
}

/// Clamp into [0, 1], mapping NaN and infinities to 0.
pub(crate) fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// `1 / (1 + x / scale)` for non-negative `x`.
fn inverse(x: f64, scale: f64) -> f64 {
    1.0 / (1.0 + x.max(0.0) / scale)
}

fn ratio(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole
    } else {
        0.0
    }
}

/// An ordered set of scoring rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<ScoringRule>,
}

impl RuleSet {
    /// Empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule, replacing any rule with the same name.
    pub fn with_rule(
        mut self,
        name: impl Into<String>,
        func: impl Fn(&ExecutionResult) -> f64 + Send + Sync + 'static,
    ) -> Self {
        let rule = ScoringRule::new(name, func);
        match self.rules.iter_mut().find(|r| r.name == rule.name) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
        self
    }

    /// Remove a rule by name.
    pub fn without_rule(mut self, name: &str) -> Self {
        self.rules.retain(|r| r.name != name);
        self
    }

    /// Default rules for strategy candidates.
    pub fn task_defaults() -> Self {
        Self::new()
            .with_rule("success", |r| if r.exit_code == 0 { 1.0 } else { 0.0 })
            .with_rule("error_free", |r| if r.error_count <= 0.0 { 1.0 } else { 0.0 })
            .with_rule("speed", |r| inverse(r.duration_ms, 1_000.0))
            .with_rule("brevity", |r| inverse(r.command_length, 500.0))
            .with_rule("side_effects", |r| inverse(r.side_effects, 1.0))
    }

    /// Default rules for team compositions.
    pub fn team_defaults() -> Self {
        Self::new()
            .with_rule("success_rate", |r| ratio(r.success_count, r.task_count))
            .with_rule("efficiency", |r| inverse(r.duration_ms, 60_000.0))
            .with_rule("resource_cost", |r| inverse(r.team_size - 1.0, 5.0))
            .with_rule("completion", |r| ratio(r.completed_count, r.task_count))
    }

    /// Rule names in order.
    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Score a result under every rule.
    pub fn score(&self, result: &ExecutionResult) -> BTreeMap<String, f64> {
        self.rules
            .iter()
            .map(|rule| (rule.name.clone(), rule.score(result)))
            .collect()
    }
}
