//! skillab core library
//!
//! A/B evaluation of agent skills: run every scenario with and without a
//! skill, check the results, judge both runs with an LLM evaluator and
//! decide whether the skill measurably helps.

pub mod assertions;
pub mod collector;
pub mod compare;
pub mod domain;
pub mod harness;
pub mod judge;
pub mod metrics;
pub mod obs;
pub mod replay;
pub mod stats;
pub mod telemetry;
pub mod verdict;

pub use domain::{
    AgentEvent, Assertion, AssertionResult, Check, ConfidenceInterval, ConfigError, Constraint, FileSetup,
    JudgeResult, Magnitude, MetricBreakdown, PairwiseCriterion, PairwiseJudgeResult, Result, RubricScore,
    RunMetrics, RunResult, RuntimeError, Scenario, ScenarioComparison, ScenarioSuite, SkillRef, SkillVerdict,
    SkillabError, TokenSource, Variant, Winner,
};

pub use assertions::{evaluate_assertion, evaluate_assertions, evaluate_constraints};
pub use collector::collect_metrics;
pub use compare::{compare_scenario, compute_breakdown, normalized_gain, RunPair, Weights};
pub use harness::{AgentRuntime, Harness, HarnessConfig, RunRequest};
pub use judge::{
    pairwise_scores, Evaluator, EvaluatorSession, HttpEvaluator, HttpEvaluatorConfig, JudgeClient, JudgeConfig,
    JudgeError, PairwiseJudge, PermissionScope, RetryPolicy, SessionConfig,
};
pub use replay::{Recording, ReplayRuntime};
pub use stats::{bootstrap_ci, is_statistically_significant, wilson_interval};
pub use verdict::{compute_verdict, VerdictConfig};

/// Global metrics singleton.
pub use metrics::METRICS;

/// Centralised tracing initialisation.
pub use telemetry::init_tracing;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
