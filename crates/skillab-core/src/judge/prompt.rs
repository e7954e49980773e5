//! Prompt construction for independent and pairwise judging.

use std::fmt::Write as _;

use sha2::{Digest, Sha256};

use crate::domain::{AgentEvent, RunMetrics, Scenario, TokenSource};

pub const MESSAGE_LIMIT: usize = 500;
pub const TOOL_LIMIT: usize = 200;
pub const ERROR_LIMIT: usize = 300;
pub const OUTPUT_LIMIT: usize = 4_000;

/// Rubric used when a scenario configures none.
pub const DEFAULT_RUBRIC: [&str; 2] = [
    "Correctness: the final result fully and accurately accomplishes the task",
    "Efficiency: the agent reached the result without unnecessary steps or detours",
];

pub const INDEPENDENT_PERSONA: &str = "\
You are an impartial expert evaluator of AI coding-agent sessions. \
You judge one session at a time against the task it was given and a rubric. \
Every score is an integer from 1 (very poor) to 5 (excellent); 3 means acceptable. \
Judge from the transcript and metrics given below. \
Only if your session offers file tools may you read, never modify, files in the listed working directory. \
Reply with a single JSON object and nothing else, in exactly this shape:
{\"rubric_scores\": [{\"criterion\": \"<criterion>\", \"score\": <1-5>, \"reasoning\": \"<short>\"}], \
\"overall_score\": <1-5>, \"reasoning\": \"<short>\"}";

pub const PAIRWISE_PERSONA: &str = "\
You are an impartial expert evaluator comparing two AI coding-agent sessions, A and B, \
that attempted the same task. The order of presentation carries no meaning. \
For each rubric criterion and overall, decide which session is better (\"A\", \"B\" or \"tie\") \
and by how much: much-better, slightly-better, equal, slightly-worse or much-worse, \
stated from the winner's point of view. \
Judge from the transcripts and metrics given below. \
Only if your session offers file tools may you read, never modify, files in the listed working directories. \
Reply with a single JSON object and nothing else, in exactly this shape:
{\"rubric_results\": [{\"criterion\": \"<criterion>\", \"winner\": \"A|B|tie\", \"magnitude\": \"<magnitude>\", \"reasoning\": \"<short>\"}], \
\"overall_winner\": \"A|B|tie\", \"overall_magnitude\": \"<magnitude>\", \"overall_reasoning\": \"<short>\"}";

/// The scenario's rubric, or the default two-item rubric.
pub fn effective_rubric(scenario: &Scenario) -> Vec<String> {
    if scenario.rubric.is_empty() {
        DEFAULT_RUBRIC.iter().map(|c| c.to_string()).collect()
    } else {
        scenario.rubric.clone()
    }
}

/// Cut `text` to at most `limit` characters, marking the cut.
pub fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        None => text.to_string(),
        Some((byte_idx, _)) => format!("{}… [truncated]", &text[..byte_idx]),
    }
}

fn write_rubric(out: &mut String, rubric: &[String]) {
    out.push_str("## Rubric\n");
    for (i, criterion) in rubric.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, criterion);
    }
    out.push('\n');
}

/// One-paragraph metrics summary.
pub fn metrics_summary(metrics: &RunMetrics) -> String {
    let mut out = String::new();
    let source = match metrics.token_source {
        TokenSource::Reported => "reported",
        TokenSource::Estimated => "estimated",
    };
    let _ = writeln!(out, "- tokens: {} ({source})", metrics.token_estimate);
    let tools = metrics
        .tool_breakdown
        .iter()
        .map(|(name, n)| format!("{name}×{n}"))
        .collect::<Vec<_>>()
        .join(", ");
    if tools.is_empty() {
        let _ = writeln!(out, "- tool calls: {}", metrics.tool_calls);
    } else {
        let _ = writeln!(out, "- tool calls: {} ({tools})", metrics.tool_calls);
    }
    let _ = writeln!(out, "- turns: {}", metrics.turns);
    let _ = writeln!(out, "- wall time: {}ms", metrics.wall_time_ms);
    let _ = writeln!(out, "- errors: {}", metrics.error_count);
    let _ = writeln!(out, "- task completed: {}", metrics.task_completed);
    if !metrics.assertion_results.is_empty() {
        let _ = writeln!(
            out,
            "- checks passed: {}/{}",
            metrics.assertions_passed(),
            metrics.assertion_results.len()
        );
    }
    out
}

/// Compact event timeline. Deltas, usage and idle events are omitted.
pub fn render_timeline(events: &[AgentEvent]) -> String {
    let mut out = String::new();
    let mut step = 0usize;
    for event in events {
        let line = match event {
            AgentEvent::UserMessage { content } => format!("user: {}", truncate(content, MESSAGE_LIMIT)),
            AgentEvent::AssistantMessage { content } => {
                format!("assistant: {}", truncate(content, MESSAGE_LIMIT))
            }
            AgentEvent::ToolExecutionStart { tool_name, arguments } => match arguments {
                Some(args) => format!("tool call {tool_name}: {}", truncate(&args.to_string(), TOOL_LIMIT)),
                None => format!("tool call {tool_name}"),
            },
            AgentEvent::ToolExecutionComplete {
                tool_name,
                success,
                output,
            } => {
                let status = if *success { "ok" } else { "failed" };
                match output {
                    Some(output) => format!("tool {tool_name} {status}: {}", truncate(output, TOOL_LIMIT)),
                    None => format!("tool {tool_name} {status}"),
                }
            }
            AgentEvent::SessionError { message } => format!("session error: {}", truncate(message, ERROR_LIMIT)),
            AgentEvent::RunnerError { message } => format!("runner error: {}", truncate(message, ERROR_LIMIT)),
            AgentEvent::AssistantMessageDelta { .. } | AgentEvent::Usage { .. } | AgentEvent::SessionIdle => {
                continue
            }
        };
        step += 1;
        let _ = writeln!(out, "[{step}] {line}");
    }
    out
}

fn write_transcript(out: &mut String, heading: &str, metrics: &RunMetrics) {
    let _ = writeln!(out, "## {heading}: working directory\n{}\n", metrics.working_dir.display());
    let _ = writeln!(out, "## {heading}: final output");
    if metrics.final_output.trim().is_empty() {
        out.push_str("(no output)\n\n");
    } else {
        let _ = writeln!(out, "{}\n", truncate(&metrics.final_output, OUTPUT_LIMIT));
    }
    let _ = writeln!(out, "## {heading}: metrics\n{}", metrics_summary(metrics));
    let timeline = render_timeline(&metrics.events);
    if !timeline.is_empty() {
        let _ = writeln!(out, "## {heading}: timeline\n{timeline}");
    }
}

/// User prompt for judging one run.
pub fn build_independent_prompt(scenario: &Scenario, rubric: &[String], metrics: &RunMetrics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Task\n{}\n", scenario.prompt);
    write_rubric(&mut out, rubric);
    write_transcript(&mut out, "Session", metrics);
    out.push_str("Score each rubric criterion in order, then give an overall score.\n");
    out
}

/// User prompt for comparing two runs presented as A and B.
pub fn build_pairwise_prompt(scenario: &Scenario, rubric: &[String], a: &RunMetrics, b: &RunMetrics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Task\n{}\n", scenario.prompt);
    write_rubric(&mut out, rubric);
    write_transcript(&mut out, "Session A", a);
    write_transcript(&mut out, "Session B", b);
    out.push_str("Compare A and B on each rubric criterion in order, then overall.\n");
    out
}

/// Hex SHA-256 over the system instruction and prompt, for audit trails.
pub fn prompt_digest(system: &str, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(system.as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.as_bytes());
    hex::encode(hasher.finalize())
}
