//! Domain models for skillab.
//!
//! Canonical definitions for the core entities:
//! - `Scenario` / `ScenarioSuite`: what a skill is evaluated against
//! - `RunMetrics` / `AgentEvent`: what one agent run produced
//! - `JudgeResult` / `PairwiseJudgeResult`: what the evaluator said
//! - `ScenarioComparison` / `SkillVerdict`: what the engine decided

pub mod error;
pub mod judgement;
pub mod run;
pub mod scenario;
pub mod verdict;

// Re-export main types and errors
pub use error::{ConfigError, Result, RuntimeError, SkillabError};
pub use judgement::{
    JudgeResult, Magnitude, PairwiseCriterion, PairwiseJudgeResult, RubricScore, Winner,
};
pub use run::{AgentEvent, RunMetrics, RunResult, TokenSource, Variant};
pub use scenario::{
    Assertion, AssertionResult, Check, Constraint, FileSetup, Scenario, ScenarioSuite, SkillRef,
};
pub use verdict::{ConfidenceInterval, MetricBreakdown, ScenarioComparison, SkillVerdict};
