//! LLM-as-judge: independent scoring and position-swapped pairwise
//! comparison behind a pluggable [`Evaluator`].

pub mod client;
pub mod error;
pub mod evaluator;
pub mod pairwise;
pub mod parse;
pub mod prompt;
pub mod retry;

pub use client::{JudgeClient, JudgeConfig};
pub use error::JudgeError;
pub use evaluator::{
    Evaluator, EvaluatorSession, HttpEvaluator, HttpEvaluatorConfig, PermissionDecision, PermissionKind,
    PermissionRequest, PermissionScope, SessionConfig,
};
pub use pairwise::{pairwise_scores, PairwiseJudge, PairwiseScores};
pub use retry::{retry_bounded, RetryPolicy};
