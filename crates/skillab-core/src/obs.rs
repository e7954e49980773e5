//! Structured observability hooks for the evaluation lifecycle.
//!
//! This module provides:
//! - Scenario-scoped spans via [`scenario_span`], attached with `Instrument`
//! - Emission functions for key lifecycle events: runs, judge calls, verdicts
//!
//! Every event carries an `event = "..."` field so log pipelines can filter
//! on it. Verbosity is controlled by `SKILLAB_LOG`.

use tracing::{info, warn};

use crate::domain::{RunMetrics, Variant, Winner};

/// Span tagging all work for one scenario.
///
/// # Example
///
/// ```ignore
/// async { /* runs + judging */ }.instrument(scenario_span("fix-bug")).await;
/// ```
pub fn scenario_span(scenario: &str) -> tracing::Span {
    tracing::info_span!("skillab.scenario", scenario = %scenario)
}

/// Emit event: evaluation of a skill started.
pub fn emit_evaluation_started(skill: &str, scenarios: usize, runs_per_scenario: u32) {
    info!(
        event = "evaluation.started",
        skill = %skill,
        scenarios = scenarios,
        runs_per_scenario = runs_per_scenario,
    );
}

/// Emit event: a scenario's attempts are starting.
pub fn emit_scenario_started(scenario: &str, runs: u32) {
    info!(event = "scenario.started", scenario = %scenario, runs = runs);
}

/// Emit event: one agent run finished and its metrics were collected.
pub fn emit_run_completed(scenario: &str, variant: Variant, attempt: u32, metrics: &RunMetrics) {
    info!(
        event = "run.completed",
        scenario = %scenario,
        variant = %variant,
        attempt = attempt,
        tokens = metrics.token_estimate,
        tool_calls = metrics.tool_calls,
        turns = metrics.turns,
        wall_time_ms = metrics.wall_time_ms,
        errors = metrics.error_count,
        task_completed = metrics.task_completed,
    );
}

/// Emit event: a judge attempt failed and may be retried (warning level).
pub fn emit_judge_attempt_failed(label: &str, attempt: u32, max_attempts: u32, error: &str) {
    warn!(
        event = "judge.attempt_failed",
        label = %label,
        attempt = attempt,
        max_attempts = max_attempts,
        error = %error,
    );
}

/// Emit event: closing an evaluator session failed (warning level).
pub fn emit_session_close_error(label: &str, error: &dyn std::fmt::Display) {
    warn!(event = "judge.session_close_error", label = %label, error = %error);
}

/// Emit event: the two pairwise orderings disagreed (warning level).
pub fn emit_pairwise_inconsistent(scenario: &str, forward: Winner, reverse: Winner) {
    warn!(
        event = "pairwise.inconsistent",
        scenario = %scenario,
        forward = %forward,
        reverse = %reverse,
    );
}

/// Emit event: a scenario comparison was scored.
pub fn emit_scenario_compared(scenario: &str, improvement_score: f64, runs: usize) {
    info!(
        event = "scenario.compared",
        scenario = %scenario,
        improvement_score = improvement_score,
        runs = runs,
    );
}

/// Emit event: the overall verdict for a skill.
pub fn emit_verdict_computed(skill: &str, mean_improvement: f64, passed: bool) {
    info!(
        event = "verdict.computed",
        skill = %skill,
        mean_improvement = mean_improvement,
        passed = passed,
    );
}
