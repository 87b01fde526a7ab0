//! Grading rubrics: per-dimension criteria, validation, and minimum-score
//! enforcement.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::trace::GradeResult;

/// The five canonical grading dimensions.
pub const DIMENSIONS: [&str; 5] = [
    "accuracy",
    "completeness",
    "relevance",
    "clarity",
    "reasoning",
];

/// Specific guidance for grading one dimension.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DimensionCriteria {
    /// What this dimension means for this specific eval
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Required elements for high scores (4-5)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_have: Vec<String>,
    /// Optional elements that improve scores
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nice_to_have: Vec<String>,
    /// Elements that reduce scores (errors, omissions, inaccuracies)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub penalties: Vec<String>,
}

/// Custom grading criteria for one eval.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GradingRubric {
    /// Which dimensions to grade (defaults to all five)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<DimensionCriteria>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completeness: Option<DimensionCriteria>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<DimensionCriteria>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarity: Option<DimensionCriteria>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<DimensionCriteria>,

    /// Minimum acceptable score per dimension (1-5)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub minimum_scores: BTreeMap<String, i32>,
}

/// A rubric that does not pass validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RubricError {
    #[error("invalid dimension '{0}': must be one of: accuracy, completeness, relevance, clarity, reasoning")]
    InvalidDimension(String),

    #[error("invalid dimension in minimum_scores '{0}': must be one of: accuracy, completeness, relevance, clarity, reasoning")]
    InvalidMinimumDimension(String),

    #[error("minimum score for '{dimension}' must be between 1 and 5, got {score}")]
    ScoreOutOfRange { dimension: String, score: i32 },
}

/// One dimension that scored below its required minimum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreFailure {
    pub dimension: String,
    pub got: i32,
    pub required: i32,
}

impl std::fmt::Display for ScoreFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: got {}, required {}",
            self.dimension, self.got, self.required
        )
    }
}

/// All dimensions that failed their minimum-score thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("eval failed minimum score requirements: {}", self.describe())]
pub struct MinimumScoreError {
    pub failures: Vec<ScoreFailure>,
}

impl MinimumScoreError {
    fn describe(&self) -> String {
        self.failures
            .iter()
            .map(|failure| failure.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn is_valid_dimension(name: &str) -> bool {
    DIMENSIONS.contains(&name)
}

impl GradingRubric {
    /// Check that the rubric is well-formed: dimension names (in both
    /// `dimensions` and `minimum_scores` keys) must be canonical, and minimum
    /// scores must be within 1..=5.
    pub fn validate(&self) -> Result<(), RubricError> {
        for dimension in &self.dimensions {
            if !is_valid_dimension(dimension) {
                return Err(RubricError::InvalidDimension(dimension.clone()));
            }
        }

        for (dimension, &score) in &self.minimum_scores {
            if !is_valid_dimension(dimension) {
                return Err(RubricError::InvalidMinimumDimension(dimension.clone()));
            }
            if !(1..=5).contains(&score) {
                return Err(RubricError::ScoreOutOfRange {
                    dimension: dimension.clone(),
                    score,
                });
            }
        }

        Ok(())
    }

    /// Verify that graded scores meet the rubric's minimum thresholds,
    /// collecting every failing dimension into one error.
    pub fn check_minimum_scores(&self, grade: &GradeResult) -> Result<(), MinimumScoreError> {
        if self.minimum_scores.is_empty() {
            return Ok(());
        }

        let failures: Vec<ScoreFailure> = self
            .minimum_scores
            .iter()
            .filter_map(|(dimension, &required)| {
                let got = grade.score(dimension)?;
                (got < required).then(|| ScoreFailure {
                    dimension: dimension.clone(),
                    got,
                    required,
                })
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(MinimumScoreError { failures })
        }
    }
}
