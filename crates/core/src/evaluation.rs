//! Self evaluation model - task outcomes and weighted quality scores.

use serde::{Deserialize, Serialize};

use crate::id::EvaluationId;
use crate::lenient;
use crate::Time;

/// A completed task handed to the self evaluator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskInfo {
    /// Caller-side task identifier
    pub id: String,

    /// Task type used for grouping (e.g. "feature", "bugfix")
    #[serde(alias = "type")]
    pub task_type: String,

    /// Free-form description
    pub description: String,
}

impl TaskInfo {
    /// Create task info with an id and type.
    pub fn new(id: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            description: String::new(),
        }
    }
}

/// Implicit user feedback attached to a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserFeedback {
    /// User accepted or praised the result
    Positive,
    /// User rejected or complained about the result
    Negative,
}

/// Optional metrics attached to a task result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResultMetrics {
    /// Requirements covered, as a ratio or a count (see `requirements_total`)
    #[serde(deserialize_with = "lenient::optional_number")]
    pub requirements_covered: Option<f64>,

    /// Total requirements when `requirements_covered` is a count
    #[serde(deserialize_with = "lenient::optional_number")]
    pub requirements_total: Option<f64>,

    /// Implicit feedback signal
    pub user_feedback: Option<UserFeedback>,

    /// Whether the user asked for a revision
    pub revision_requested: bool,
}

/// Raw result of a completed task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskResult {
    /// Whether the task reported success
    pub success: bool,

    /// Whether the tests passed
    pub tests_pass: bool,

    /// Duration in milliseconds
    #[serde(deserialize_with = "lenient::optional_number")]
    pub duration: Option<f64>,

    /// Optional metrics
    pub metrics: ResultMetrics,
}

/// The four scored dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionKind {
    /// Did it work
    Accuracy,
    /// Did it cover what was asked
    Completeness,
    /// How fast
    Efficiency,
    /// Implicit user reaction
    Satisfaction,
}

impl DimensionKind {
    /// All dimensions in scoring order.
    pub const ALL: [DimensionKind; 4] = [
        DimensionKind::Accuracy,
        DimensionKind::Completeness,
        DimensionKind::Efficiency,
        DimensionKind::Satisfaction,
    ];

    /// Weight in hundredths; the four weights add up to exactly 100.
    pub fn weight_percent(&self) -> u32 {
        match self {
            DimensionKind::Accuracy => 35,
            DimensionKind::Completeness => 25,
            DimensionKind::Efficiency => 20,
            DimensionKind::Satisfaction => 20,
        }
    }

    /// Weight as a fraction of 1.0.
    pub fn weight(&self) -> f64 {
        f64::from(self.weight_percent()) / 100.0
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            DimensionKind::Accuracy => "accuracy",
            DimensionKind::Completeness => "completeness",
            DimensionKind::Efficiency => "efficiency",
            DimensionKind::Satisfaction => "satisfaction",
        }
    }
}

impl std::fmt::Display for DimensionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score and weight of one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    /// Score in [1, 5]
    pub score: f64,
    /// Weight in (0, 1)
    pub weight: f64,
}

/// All four dimensions of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Accuracy
    pub accuracy: Dimension,
    /// Completeness
    pub completeness: Dimension,
    /// Efficiency
    pub efficiency: Dimension,
    /// Satisfaction
    pub satisfaction: Dimension,
}

impl Dimensions {
    /// Get one dimension.
    pub fn get(&self, kind: DimensionKind) -> &Dimension {
        match kind {
            DimensionKind::Accuracy => &self.accuracy,
            DimensionKind::Completeness => &self.completeness,
            DimensionKind::Efficiency => &self.efficiency,
            DimensionKind::Satisfaction => &self.satisfaction,
        }
    }

    /// Iterate dimensions in scoring order.
    pub fn iter(&self) -> impl Iterator<Item = (DimensionKind, &Dimension)> {
        DimensionKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }

    /// Weighted sum of scores.
    pub fn weighted_sum(&self) -> f64 {
        self.iter().map(|(_, d)| d.score * d.weight).sum()
    }

    /// Sum of weights.
    pub fn weight_sum(&self) -> f64 {
        self.iter().map(|(_, d)| d.weight).sum()
    }
}

/// Letter grade for an overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    /// >= 4.5
    A,
    /// >= 3.5
    B,
    /// >= 2.5
    C,
    /// >= 1.5
    D,
    /// below 1.5
    F,
}

impl Grade {
    /// Bucket an overall score.
    pub fn from_score(score: f64) -> Self {
        if score >= 4.5 {
            Grade::A
        } else if score >= 3.5 {
            Grade::B
        } else if score >= 2.5 {
            Grade::C
        } else if score >= 1.5 {
            Grade::D
        } else {
            Grade::F
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        f.write_str(s)
    }
}

/// Self evaluator output for one completed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    /// Unique identifier
    pub id: EvaluationId,
    /// Evaluated task
    pub task_id: String,
    /// Task type
    pub task_type: String,
    /// When the evaluation was made
    pub timestamp: Time,
    /// Per-dimension scores
    pub dimensions: Dimensions,
    /// Weighted overall score in [1, 5]
    pub overall: f64,
    /// Letter grade
    pub grade: Grade,
    /// Human-readable feedback
    pub feedback: String,
}
