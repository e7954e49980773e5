//! Comparison and verdict records produced by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::judgement::PairwiseJudgeResult;
use super::run::RunResult;
use super::scenario::SkillRef;

/// Signed per-signal improvements of the skill run over the baseline run.
///
/// Every field lies in [-1, 1]; positive means the skill run did better.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricBreakdown {
    pub token_reduction: f64,
    pub tool_call_reduction: f64,
    pub task_completion: f64,
    pub time_reduction: f64,
    pub quality_improvement: f64,
    pub overall_judgment_improvement: f64,
    pub error_reduction: f64,
}

impl MetricBreakdown {
    /// Element-wise mean; the zero breakdown for an empty slice.
    pub fn mean(items: &[MetricBreakdown]) -> MetricBreakdown {
        if items.is_empty() {
            return MetricBreakdown::default();
        }
        let n = items.len() as f64;
        let sum = |f: fn(&MetricBreakdown) -> f64| items.iter().map(f).sum::<f64>() / n;
        MetricBreakdown {
            token_reduction: sum(|b| b.token_reduction),
            tool_call_reduction: sum(|b| b.tool_call_reduction),
            task_completion: sum(|b| b.task_completion),
            time_reduction: sum(|b| b.time_reduction),
            quality_improvement: sum(|b| b.quality_improvement),
            overall_judgment_improvement: sum(|b| b.overall_judgment_improvement),
            error_reduction: sum(|b| b.error_reduction),
        }
    }
}

/// Baseline vs. skill outcome for one scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioComparison {
    pub scenario: String,
    /// Representative baseline run (the first attempt).
    pub baseline: RunResult,
    /// Representative skill run (the first attempt).
    pub skill: RunResult,
    pub breakdown: MetricBreakdown,
    pub improvement_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairwise: Option<PairwiseJudgeResult>,
    /// Improvement score of every attempt, when the scenario was repeated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_run_scores: Option<Vec<f64>>,
    /// Attempts whose baseline completed the task while the skill run did not.
    #[serde(default)]
    pub completion_regressions: u32,
    /// Mean over attempts of the normalized gain of the skill's overall
    /// judge score against the baseline's.
    #[serde(default)]
    pub normalized_gain: f64,
}

impl ScenarioComparison {
    pub fn completion_regressed(&self) -> bool {
        self.completion_regressions > 0
    }
}

/// A confidence interval at a given level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceInterval {
    pub low: f64,
    pub high: f64,
    pub level: f64,
}

impl ConfidenceInterval {
    pub fn width(&self) -> f64 {
        self.high - self.low
    }
}

/// Skill-level pass/fail decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillVerdict {
    pub skill: SkillRef,
    pub comparisons: Vec<ScenarioComparison>,
    pub mean_improvement: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_gain: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_interval: Option<ConfidenceInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub significant: Option<bool>,
    pub passed: bool,
    pub reason: String,
    pub evaluated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakdown_mean() {
        let a = MetricBreakdown {
            token_reduction: 0.5,
            task_completion: 1.0,
            ..Default::default()
        };
        let b = MetricBreakdown {
            token_reduction: -0.1,
            task_completion: 0.0,
            ..Default::default()
        };
        let mean = MetricBreakdown::mean(&[a, b]);
        assert!((mean.token_reduction - 0.2).abs() < 1e-12);
        assert_eq!(mean.task_completion, 0.5);
        assert_eq!(MetricBreakdown::mean(&[]), MetricBreakdown::default());
    }

    #[test]
    fn test_interval_width() {
        let ci = ConfidenceInterval {
            low: -0.25,
            high: 0.5,
            level: 0.95,
        };
        assert_eq!(ci.width(), 0.75);
    }
}
