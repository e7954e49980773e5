//! Comparator: turns a baseline/skill run pair into a [`MetricBreakdown`]
//! and a single weighted improvement score.

use serde::{Deserialize, Serialize};

use crate::domain::{MetricBreakdown, PairwiseJudgeResult, RunResult, ScenarioComparison};
use crate::judge::pairwise_scores;
use crate::stats::mean;

/// Span of the 1–5 judge scale used to normalise quality deltas.
const QUALITY_SCALE: f64 = 2.5;

/// Weight of each breakdown signal in the improvement score. Sums to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Weights {
    pub quality: f64,
    pub overall_judgment: f64,
    pub task_completion: f64,
    pub tokens: f64,
    pub errors: f64,
    pub tool_calls: f64,
    pub time: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            quality: 0.40,
            overall_judgment: 0.30,
            task_completion: 0.15,
            tokens: 0.05,
            errors: 0.05,
            tool_calls: 0.025,
            time: 0.025,
        }
    }
}

impl Weights {
    pub fn total(&self) -> f64 {
        self.quality
            + self.overall_judgment
            + self.task_completion
            + self.tokens
            + self.errors
            + self.tool_calls
            + self.time
    }

    /// Dot product of the breakdown with these weights.
    pub fn apply(&self, b: &MetricBreakdown) -> f64 {
        b.quality_improvement * self.quality
            + b.overall_judgment_improvement * self.overall_judgment
            + b.task_completion * self.task_completion
            + b.token_reduction * self.tokens
            + b.error_reduction * self.errors
            + b.tool_call_reduction * self.tool_calls
            + b.time_reduction * self.time
    }
}

/// Relative reduction `(baseline - skill) / baseline`, clamped to [-1, 1].
///
/// A zero baseline with a nonzero skill value is the worst case (-1).
pub fn reduction(baseline: f64, skill: f64) -> f64 {
    if baseline == 0.0 {
        return if skill == 0.0 { 0.0 } else { -1.0 };
    }
    ((baseline - skill) / baseline).clamp(-1.0, 1.0)
}

pub fn completion_delta(baseline: bool, skill: bool) -> f64 {
    match (baseline, skill) {
        (false, true) => 1.0,
        (true, false) => -1.0,
        _ => 0.0,
    }
}

/// Judge-score delta on the 1–5 scale, normalised and clamped to [-1, 1].
pub fn quality_delta(baseline: f64, skill: f64) -> f64 {
    ((skill - baseline) / QUALITY_SCALE).clamp(-1.0, 1.0)
}

/// Breakdown for one run pair. A pairwise result, when present, replaces
/// both quality signals.
pub fn compute_breakdown(
    baseline: &RunResult,
    skill: &RunResult,
    pairwise: Option<&PairwiseJudgeResult>,
) -> MetricBreakdown {
    let (b, s) = (&baseline.metrics, &skill.metrics);

    let (quality_improvement, overall_judgment_improvement) = match pairwise {
        Some(result) => {
            let scores = pairwise_scores(result);
            (scores.quality, scores.overall)
        }
        None => (
            quality_delta(baseline.judge.mean_rubric_score(), skill.judge.mean_rubric_score()),
            quality_delta(
                f64::from(baseline.judge.overall_score),
                f64::from(skill.judge.overall_score),
            ),
        ),
    };

    MetricBreakdown {
        token_reduction: reduction(b.token_estimate as f64, s.token_estimate as f64),
        tool_call_reduction: reduction(f64::from(b.tool_calls), f64::from(s.tool_calls)),
        task_completion: completion_delta(b.task_completed, s.task_completed),
        time_reduction: reduction(b.wall_time_ms as f64, s.wall_time_ms as f64),
        quality_improvement,
        overall_judgment_improvement,
        error_reduction: reduction(f64::from(b.error_count), f64::from(s.error_count)),
    }
}

/// One attempt's judged baseline and skill runs.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPair {
    pub baseline: RunResult,
    pub skill: RunResult,
    pub pairwise: Option<PairwiseJudgeResult>,
}

/// Fold a scenario's run pairs (in attempt order) into a comparison.
///
/// Breakdown, score and normalized gain are means over attempts; the first
/// attempt is kept as the representative. Completion regressions are
/// counted over every attempt. Per-run scores are retained when there is
/// more than one attempt. Returns `None` for an empty slice.
pub fn compare_scenario(scenario: &str, pairs: Vec<RunPair>, weights: &Weights) -> Option<ScenarioComparison> {
    let breakdowns: Vec<MetricBreakdown> = pairs
        .iter()
        .map(|p| compute_breakdown(&p.baseline, &p.skill, p.pairwise.as_ref()))
        .collect();
    let scores: Vec<f64> = breakdowns.iter().map(|b| weights.apply(b)).collect();
    let gains: Vec<f64> = pairs.iter().map(attempt_gain).collect();
    let completion_regressions = pairs
        .iter()
        .filter(|p| p.baseline.metrics.task_completed && !p.skill.metrics.task_completed)
        .count();

    let mut pairs = pairs.into_iter();
    let first = pairs.next()?;
    let repeated = pairs.next().is_some();

    Some(ScenarioComparison {
        scenario: scenario.to_string(),
        baseline: first.baseline,
        skill: first.skill,
        breakdown: MetricBreakdown::mean(&breakdowns),
        improvement_score: mean(&scores),
        pairwise: first.pairwise,
        per_run_scores: repeated.then_some(scores),
        completion_regressions: u32::try_from(completion_regressions).unwrap_or(u32::MAX),
        normalized_gain: mean(&gains),
    })
}

fn attempt_gain(pair: &RunPair) -> f64 {
    normalized_gain(
        rescale_overall(pair.baseline.judge.overall_score),
        rescale_overall(pair.skill.judge.overall_score),
    )
}

/// Judge overall score rescaled from 1–5 to [0, 1].
pub fn rescale_overall(score: u8) -> f64 {
    ((f64::from(score) - 1.0) / 4.0).clamp(0.0, 1.0)
}

/// Ceiling-aware gain `(post - pre) / (1 - pre)`.
///
/// At the ceiling (`pre >= 1`) holding the ceiling scores 0 and any drop
/// scores the raw (negative) difference.
pub fn normalized_gain(pre: f64, post: f64) -> f64 {
    if pre >= 1.0 {
        if post >= 1.0 {
            0.0
        } else {
            post - pre
        }
    } else {
        (post - pre) / (1.0 - pre)
    }
}

/// Mean of the per-scenario normalized gains.
pub fn mean_normalized_gain(comparisons: &[ScenarioComparison]) -> Option<f64> {
    if comparisons.is_empty() {
        return None;
    }
    let gains: Vec<f64> = comparisons.iter().map(|c| c.normalized_gain).collect();
    Some(mean(&gains))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::collect_metrics;
    use crate::domain::{AgentEvent, JudgeResult, Magnitude, Winner};
    use std::path::Path;
    use std::time::Duration;

    fn run(tokens: u64, overall: u8, completed: bool) -> RunResult {
        let mut metrics = collect_metrics(
            vec![AgentEvent::Usage {
                input_tokens: tokens,
                output_tokens: 0,
            }],
            Duration::from_millis(1_000),
            Path::new("/w"),
        );
        metrics.task_completed = completed;
        RunResult {
            metrics,
            judge: JudgeResult {
                rubric_scores: Vec::new(),
                overall_score: overall,
                reasoning: String::new(),
                prompt_digest: String::new(),
            },
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        assert!((Weights::default().total() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_reduction_conventions() {
        assert_eq!(reduction(1000.0, 500.0), 0.5);
        assert_eq!(reduction(100.0, 400.0), -1.0);
        assert_eq!(reduction(0.0, 0.0), 0.0);
        assert_eq!(reduction(0.0, 3.0), -1.0);
        assert_eq!(reduction(10.0, 0.0), 1.0);
    }

    #[test]
    fn test_completion_delta() {
        assert_eq!(completion_delta(false, true), 1.0);
        assert_eq!(completion_delta(true, false), -1.0);
        assert_eq!(completion_delta(true, true), 0.0);
    }

    #[test]
    fn test_token_halving_breakdown() {
        let b = compute_breakdown(&run(1000, 3, true), &run(500, 3, true), None);
        assert_eq!(b.token_reduction, 0.5);
        assert_eq!(b.quality_improvement, 0.0);
        assert_eq!(b.time_reduction, 0.0);
    }

    #[test]
    fn test_identical_runs_score_zero() {
        let b = compute_breakdown(&run(800, 4, true), &run(800, 4, true), None);
        assert_eq!(b, MetricBreakdown::default());
        assert_eq!(Weights::default().apply(&b), 0.0);
    }

    #[test]
    fn test_quality_delta_clamps() {
        let b = compute_breakdown(&run(10, 1, true), &run(10, 5, true), None);
        assert_eq!(b.overall_judgment_improvement, 1.0);
        assert_eq!(b.quality_improvement, 1.0);
    }

    #[test]
    fn test_pairwise_overrides_quality() {
        let pairwise = PairwiseJudgeResult {
            rubric_results: Vec::new(),
            overall_winner: Winner::Baseline,
            overall_magnitude: Magnitude::SlightlyBetter,
            overall_reasoning: String::new(),
            position_swap_consistent: true,
        };
        let b = compute_breakdown(&run(10, 1, true), &run(10, 5, true), Some(&pairwise));
        assert_eq!(b.overall_judgment_improvement, -0.4);
        assert_eq!(b.quality_improvement, 0.0);
    }

    #[test]
    fn test_compare_scenario_single_attempt() {
        let pair = RunPair {
            baseline: run(1000, 3, true),
            skill: run(500, 3, true),
            pairwise: None,
        };
        let c = compare_scenario("s", vec![pair], &Weights::default()).unwrap();
        assert!((c.improvement_score - 0.025).abs() < 1e-12);
        assert!(c.per_run_scores.is_none());
    }

    #[test]
    fn test_compare_scenario_averages_attempts() {
        let pairs = vec![
            RunPair {
                baseline: run(1000, 3, true),
                skill: run(500, 3, true),
                pairwise: None,
            },
            RunPair {
                baseline: run(1000, 3, true),
                skill: run(1000, 3, true),
                pairwise: None,
            },
        ];
        let c = compare_scenario("s", pairs, &Weights::default()).unwrap();
        assert_eq!(c.breakdown.token_reduction, 0.25);
        let scores = c.per_run_scores.unwrap();
        assert_eq!(scores.len(), 2);
        assert!((c.improvement_score - (scores[0] + scores[1]) / 2.0).abs() < 1e-12);
        assert_eq!(c.skill.metrics.token_estimate, 500);
        assert_eq!(c.completion_regressions, 0);
        assert!(compare_scenario("s", Vec::new(), &Weights::default()).is_none());
    }

    #[test]
    fn test_compare_scenario_uses_every_attempt() {
        let pairs = vec![
            RunPair {
                baseline: run(100, 3, true),
                skill: run(100, 3, true),
                pairwise: None,
            },
            RunPair {
                baseline: run(100, 3, true),
                skill: run(100, 5, false),
                pairwise: None,
            },
            RunPair {
                baseline: run(100, 3, false),
                skill: run(100, 4, false),
                pairwise: None,
            },
        ];
        let c = compare_scenario("s", pairs, &Weights::default()).unwrap();
        // only the second attempt lost completion the baseline had
        assert_eq!(c.completion_regressions, 1);
        assert!(c.completion_regressed());
        // per-attempt gains 0.0, 1.0, 0.5
        assert!((c.normalized_gain - 0.5).abs() < 1e-12);
        assert_eq!(mean_normalized_gain(&[c]), Some(0.5));
    }

    #[test]
    fn test_normalized_gain_ceiling() {
        assert_eq!(normalized_gain(0.5, 0.75), 0.5);
        assert_eq!(normalized_gain(1.0, 1.0), 0.0);
        assert_eq!(normalized_gain(1.0, 0.75), -0.25);
        assert_eq!(rescale_overall(1), 0.0);
        assert_eq!(rescale_overall(5), 1.0);
    }
}
