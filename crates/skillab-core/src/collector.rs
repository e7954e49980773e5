//! Metrics collector: folds one run's event stream into [`RunMetrics`].
//!
//! Token accounting is two-tier and never mixed within a run: if any usage
//! event carried a nonzero count, the run's tokens are the sum of reported
//! usage; otherwise they are estimated from message characters.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use uuid::Uuid;

use crate::domain::{AgentEvent, RunMetrics, TokenSource};

/// Characters per token for the fallback estimate.
pub const CHARS_PER_TOKEN: u64 = 4;

/// Fold `events` plus wall-clock duration into a fresh [`RunMetrics`].
///
/// The completion flag starts from the error-count fallback; attach
/// assertion results with [`RunMetrics::with_assertion_results`].
pub fn collect_metrics(events: Vec<AgentEvent>, wall_time: Duration, working_dir: &Path) -> RunMetrics {
    let mut reported_tokens = 0u64;
    let mut message_chars = 0u64;
    let mut tool_calls = 0u32;
    let mut tool_breakdown: BTreeMap<String, u32> = BTreeMap::new();
    let mut turns = 0u32;
    let mut error_count = 0u32;
    let mut final_messages: Vec<&str> = Vec::new();
    let mut deltas = String::new();

    for event in &events {
        match event {
            AgentEvent::UserMessage { content } => {
                message_chars += content.chars().count() as u64;
            }
            AgentEvent::AssistantMessage { content } => {
                turns += 1;
                message_chars += content.chars().count() as u64;
                final_messages.push(content);
            }
            AgentEvent::AssistantMessageDelta { content } => deltas.push_str(content),
            AgentEvent::ToolExecutionStart { tool_name, .. } => {
                tool_calls += 1;
                *tool_breakdown.entry(tool_name.clone()).or_insert(0) += 1;
            }
            AgentEvent::Usage {
                input_tokens,
                output_tokens,
            } => reported_tokens += input_tokens + output_tokens,
            AgentEvent::SessionError { .. } | AgentEvent::RunnerError { .. } => error_count += 1,
            AgentEvent::ToolExecutionComplete { .. } | AgentEvent::SessionIdle => {}
        }
    }

    let (token_estimate, token_source) = if reported_tokens > 0 {
        (reported_tokens, TokenSource::Reported)
    } else {
        (message_chars.div_ceil(CHARS_PER_TOKEN), TokenSource::Estimated)
    };

    let final_output = if final_messages.is_empty() {
        deltas
    } else {
        final_messages.join("\n")
    };

    RunMetrics {
        run_id: Uuid::new_v4(),
        token_estimate,
        token_source,
        tool_calls,
        tool_breakdown,
        turns,
        wall_time_ms: u64::try_from(wall_time.as_millis()).unwrap_or(u64::MAX),
        error_count,
        task_completed: error_count == 0,
        events,
        final_output,
        assertion_results: Vec::new(),
        working_dir: working_dir.to_path_buf(),
    }
}
