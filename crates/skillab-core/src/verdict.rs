//! Verdict engine.
//!
//! Aggregates [`ScenarioComparison`]s into the pass/fail [`SkillVerdict`]
//! for one skill. The completion-regression rule, when enabled, blocks the
//! skill regardless of score; otherwise the mean improvement is compared
//! against the threshold. The confidence interval and normalized gain are
//! reported alongside.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::compare::mean_normalized_gain;
use crate::domain::{ConfidenceInterval, ScenarioComparison, SkillRef, SkillVerdict};
use crate::obs;
use crate::stats::{
    bootstrap_ci, is_statistically_significant, mean, DEFAULT_BOOTSTRAP_ITERATIONS, DEFAULT_CONFIDENCE_LEVEL,
    DEFAULT_SEED,
};

/// Thresholds and statistics settings for [`compute_verdict`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerdictConfig {
    /// Minimum mean improvement score for the skill to pass.
    pub min_improvement: f64,
    /// Fail any skill whose runs lose task completion the baseline had.
    pub require_completion: bool,
    pub confidence_level: f64,
    pub bootstrap_iterations: usize,
    pub seed: u64,
}

impl Default for VerdictConfig {
    fn default() -> Self {
        Self {
            min_improvement: 0.05,
            require_completion: false,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            bootstrap_iterations: DEFAULT_BOOTSTRAP_ITERATIONS,
            seed: DEFAULT_SEED,
        }
    }
}

/// Scenarios where any attempt's baseline run completed but its skill run did not.
pub fn completion_regressions(comparisons: &[ScenarioComparison]) -> Vec<&str> {
    comparisons
        .iter()
        .filter(|c| c.completion_regressed())
        .map(|c| c.scenario.as_str())
        .collect()
}

/// Every retained per-run score, or one score per scenario when a
/// scenario ran once.
pub fn pooled_scores(comparisons: &[ScenarioComparison]) -> Vec<f64> {
    comparisons
        .iter()
        .flat_map(|c| match &c.per_run_scores {
            Some(scores) => scores.clone(),
            None => vec![c.improvement_score],
        })
        .collect()
}

fn describe_interval(ci: &ConfidenceInterval) -> String {
    format!("{:.0}% CI [{:.3}, {:.3}]", ci.level * 100.0, ci.low, ci.high)
}

/// Aggregate comparisons into the skill's verdict.
pub fn compute_verdict(skill: SkillRef, comparisons: Vec<ScenarioComparison>, config: &VerdictConfig) -> SkillVerdict {
    let scores: Vec<f64> = comparisons.iter().map(|c| c.improvement_score).collect();
    let mean_improvement = mean(&scores);

    let pooled = pooled_scores(&comparisons);
    let confidence_interval = (!pooled.is_empty())
        .then(|| bootstrap_ci(&pooled, config.confidence_level, config.bootstrap_iterations, config.seed));
    let significant = confidence_interval.as_ref().map(is_statistically_significant);
    let normalized_gain = mean_normalized_gain(&comparisons);

    let regressions = completion_regressions(&comparisons);
    let (passed, mut reason) = if comparisons.is_empty() {
        (false, "no scenarios were evaluated".to_string())
    } else if config.require_completion && !regressions.is_empty() {
        (
            false,
            format!(
                "task completion regressed in {} scenario(s): [{}]",
                regressions.len(),
                regressions.join(", ")
            ),
        )
    } else if mean_improvement >= config.min_improvement {
        (
            true,
            format!(
                "mean improvement {:.3} >= threshold {:.3}",
                mean_improvement, config.min_improvement
            ),
        )
    } else {
        (
            false,
            format!(
                "mean improvement {:.3} < threshold {:.3}",
                mean_improvement, config.min_improvement
            ),
        )
    };

    if let Some(ci) = &confidence_interval {
        if significant == Some(true) {
            reason.push_str(&format!("; {}", describe_interval(ci)));
        } else {
            reason.push_str(&format!("; not statistically significant ({})", describe_interval(ci)));
        }
    }

    obs::emit_verdict_computed(&skill.name, mean_improvement, passed);

    SkillVerdict {
        skill,
        comparisons,
        mean_improvement,
        normalized_gain,
        confidence_interval,
        significant,
        passed,
        reason,
        evaluated_at: Utc::now(),
    }
}
