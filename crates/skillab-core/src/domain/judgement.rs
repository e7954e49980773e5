//! Judge outputs: independent rubric scores and pairwise comparisons.

use serde::{Deserialize, Serialize};

/// One rubric criterion scored by the independent judge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RubricScore {
    pub criterion: String,
    /// Integer score in 1–5.
    pub score: u8,
    pub reasoning: String,
}

/// The independent judge's assessment of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JudgeResult {
    pub rubric_scores: Vec<RubricScore>,
    /// Holistic score in 1–5.
    pub overall_score: u8,
    pub reasoning: String,
    /// SHA-256 hex digest of the prompt that produced this result.
    #[serde(default)]
    pub prompt_digest: String,
}

impl JudgeResult {
    /// Mean rubric score, or the overall score when no rubric entries exist.
    pub fn mean_rubric_score(&self) -> f64 {
        if self.rubric_scores.is_empty() {
            return f64::from(self.overall_score);
        }
        let total: f64 = self.rubric_scores.iter().map(|r| f64::from(r.score)).sum();
        total / self.rubric_scores.len() as f64
    }
}

/// Which run a pairwise outcome favours.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Baseline,
    Skill,
    Tie,
}

impl std::fmt::Display for Winner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Winner::Baseline => write!(f, "baseline"),
            Winner::Skill => write!(f, "skill"),
            Winner::Tie => write!(f, "tie"),
        }
    }
}

/// Five-point magnitude of a pairwise outcome, relative to the winner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Magnitude {
    MuchBetter,
    SlightlyBetter,
    Equal,
    SlightlyWorse,
    MuchWorse,
}

impl Magnitude {
    /// Scalar value used when converting a pairwise outcome to a score.
    pub fn score(self) -> f64 {
        match self {
            Magnitude::MuchBetter => 1.0,
            Magnitude::SlightlyBetter => 0.4,
            Magnitude::Equal => 0.0,
            Magnitude::SlightlyWorse => -0.4,
            Magnitude::MuchWorse => -1.0,
        }
    }

    /// Parse the judge's label; unknown labels read as `Equal`.
    pub fn parse_lenient(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "much-better" => Magnitude::MuchBetter,
            "slightly-better" => Magnitude::SlightlyBetter,
            "slightly-worse" => Magnitude::SlightlyWorse,
            "much-worse" => Magnitude::MuchWorse,
            _ => Magnitude::Equal,
        }
    }
}

/// Pairwise outcome for one rubric criterion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairwiseCriterion {
    pub criterion: String,
    pub winner: Winner,
    pub magnitude: Magnitude,
    pub reasoning: String,
}

/// Position-bias-checked comparison of a baseline run against a skill run.
///
/// Winners are only meaningful when `position_swap_consistent` is true; an
/// inconsistent result already has every outcome collapsed to a tie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairwiseJudgeResult {
    pub rubric_results: Vec<PairwiseCriterion>,
    pub overall_winner: Winner,
    pub overall_magnitude: Magnitude,
    pub overall_reasoning: String,
    pub position_swap_consistent: bool,
}
