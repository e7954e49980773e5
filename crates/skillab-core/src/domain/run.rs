//! Agent run observations: the raw event vocabulary and the per-run metrics snapshot.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::judgement::JudgeResult;
use super::scenario::AssertionResult;

/// Which side of the A/B comparison a run belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Baseline,
    Skill,
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Baseline => write!(f, "baseline"),
            Variant::Skill => write!(f, "skill"),
        }
    }
}

/// A typed event emitted by the agent runtime during one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A user message sent into the session.
    UserMessage { content: String },

    /// Streaming fragment of an assistant message.
    AssistantMessageDelta { content: String },

    /// A complete assistant message (one turn).
    AssistantMessage { content: String },

    /// A tool began executing.
    ToolExecutionStart {
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arguments: Option<serde_json::Value>,
    },

    /// A tool finished executing.
    ToolExecutionComplete {
        tool_name: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },

    /// Token usage reported by the runtime.
    Usage {
        #[serde(default)]
        input_tokens: u64,
        #[serde(default)]
        output_tokens: u64,
    },

    /// The session went idle (turn finished).
    SessionIdle,

    /// The agent session reported an error.
    SessionError { message: String },

    /// The harness failed to drive the runtime; synthesized, never emitted by runtimes.
    RunnerError { message: String },
}

impl AgentEvent {
    /// Whether this event counts toward a run's error total.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            AgentEvent::SessionError { .. } | AgentEvent::RunnerError { .. }
        )
    }
}

/// Where a run's token figure came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    /// Summed from runtime usage events.
    Reported,
    /// Estimated from message characters.
    Estimated,
}

/// Immutable summary of one agent run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMetrics {
    pub run_id: Uuid,
    pub token_estimate: u64,
    pub token_source: TokenSource,
    pub tool_calls: u32,
    /// Tool name to number of executions.
    pub tool_breakdown: BTreeMap<String, u32>,
    pub turns: u32,
    pub wall_time_ms: u64,
    pub error_count: u32,
    pub events: Vec<AgentEvent>,
    pub final_output: String,
    pub task_completed: bool,
    #[serde(default)]
    pub assertion_results: Vec<AssertionResult>,
    pub working_dir: PathBuf,
}

impl RunMetrics {
    /// Attach assertion/constraint results and derive the completion flag.
    ///
    /// With no results the flag falls back to "no errors occurred".
    pub fn with_assertion_results(mut self, results: Vec<AssertionResult>) -> Self {
        self.task_completed = if results.is_empty() {
            self.error_count == 0
        } else {
            results.iter().all(|r| r.passed)
        };
        self.assertion_results = results;
        self
    }

    /// Number of attached checks that passed.
    pub fn assertions_passed(&self) -> usize {
        self.assertion_results.iter().filter(|r| r.passed).count()
    }
}

/// A run together with the independent judge's assessment of it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResult {
    pub metrics: RunMetrics,
    pub judge: JudgeResult,
}
