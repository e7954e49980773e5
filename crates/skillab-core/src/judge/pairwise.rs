//! Pairwise judging with a position-swap consistency check.
//!
//! Both orderings are asked concurrently. If they agree on the overall
//! winner the forward result stands; otherwise every outcome collapses to
//! a tie so positional bias can never leak into the score.

use serde::{Deserialize, Serialize};

use super::client::JudgeClient;
use super::error::JudgeError;
use super::parse::{parse_pairwise, Direction};
use super::prompt::{build_pairwise_prompt, effective_rubric, PAIRWISE_PERSONA};
use crate::domain::{Magnitude, PairwiseCriterion, PairwiseJudgeResult, RunMetrics, Scenario, Winner};
use crate::obs;

/// Compares a baseline run against a skill run.
#[derive(Clone)]
pub struct PairwiseJudge {
    client: JudgeClient,
}

impl PairwiseJudge {
    pub fn new(client: JudgeClient) -> Self {
        Self { client }
    }

    pub async fn judge(
        &self,
        scenario: &Scenario,
        baseline: &RunMetrics,
        skill: &RunMetrics,
    ) -> Result<PairwiseJudgeResult, JudgeError> {
        let rubric = effective_rubric(scenario);
        let scope = self
            .client
            .config()
            .permission_scope([&baseline.working_dir, &skill.working_dir]);

        let forward_prompt = build_pairwise_prompt(scenario, &rubric, baseline, skill);
        let reverse_prompt = build_pairwise_prompt(scenario, &rubric, skill, baseline);
        let forward_label = format!("pairwise[{}:forward]", scenario.name);
        let reverse_label = format!("pairwise[{}:reverse]", scenario.name);

        let (forward, reverse) = tokio::try_join!(
            self.client
                .round_trip(&forward_label, PAIRWISE_PERSONA, &forward_prompt, &scope),
            self.client
                .round_trip(&reverse_label, PAIRWISE_PERSONA, &reverse_prompt, &scope),
        )?;

        let forward = parse_pairwise(&forward, &rubric, Direction::Forward);
        let reverse = parse_pairwise(&reverse, &rubric, Direction::Reverse);
        let raw_winners = (forward.overall_winner, reverse.overall_winner);
        let merged = merge_position_swapped(forward, reverse);
        if !merged.position_swap_consistent {
            obs::emit_pairwise_inconsistent(&scenario.name, raw_winners.0, raw_winners.1);
        }
        Ok(merged)
    }
}

/// Combine the two directional results (already mapped to baseline/skill).
pub fn merge_position_swapped(forward: PairwiseJudgeResult, reverse: PairwiseJudgeResult) -> PairwiseJudgeResult {
    if forward.overall_winner == reverse.overall_winner {
        return PairwiseJudgeResult {
            position_swap_consistent: true,
            ..forward
        };
    }

    let rubric_results = forward
        .rubric_results
        .into_iter()
        .map(|c| PairwiseCriterion {
            criterion: c.criterion,
            winner: Winner::Tie,
            magnitude: Magnitude::Equal,
            reasoning: "position-swap inconsistent; treated as tie".to_string(),
        })
        .collect();

    PairwiseJudgeResult {
        rubric_results,
        overall_winner: Winner::Tie,
        overall_magnitude: Magnitude::Equal,
        overall_reasoning: format!(
            "Position-swap inconsistent (forward={}, reverse={}); treated as tie",
            forward.overall_winner, reverse.overall_winner
        ),
        position_swap_consistent: false,
    }
}

/// Pairwise outcome as two scalars in [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairwiseScores {
    pub quality: f64,
    pub overall: f64,
}

/// Signed value of one outcome: positive favours the skill.
pub fn outcome_score(winner: Winner, magnitude: Magnitude) -> f64 {
    match winner {
        Winner::Skill => magnitude.score(),
        Winner::Baseline => -magnitude.score(),
        Winner::Tie => 0.0,
    }
}

/// Convert a pairwise result into (quality, overall) scores.
pub fn pairwise_scores(result: &PairwiseJudgeResult) -> PairwiseScores {
    let quality = if result.rubric_results.is_empty() {
        0.0
    } else {
        let total: f64 = result
            .rubric_results
            .iter()
            .map(|c| outcome_score(c.winner, c.magnitude))
            .sum();
        total / result.rubric_results.len() as f64
    };
    PairwiseScores {
        quality: quality.clamp(-1.0, 1.0),
        overall: outcome_score(result.overall_winner, result.overall_magnitude).clamp(-1.0, 1.0),
    }
}
