//! Lenient parsing of evaluator replies.
//!
//! Extraction is strict (no JSON means the attempt failed); interpretation
//! of the extracted object is lenient (bad scores become neutral).

use serde_json::Value;

use super::error::JudgeError;
use crate::domain::{Magnitude, PairwiseCriterion, PairwiseJudgeResult, RubricScore, Winner};

const NEUTRAL_SCORE: u8 = 3;

/// Find the JSON object in a free-text reply.
///
/// Fenced code blocks are tried first, then a brace-balanced scan for the
/// first complete top-level object.
pub fn extract_json(reply: &str) -> Result<Value, JudgeError> {
    for block in fenced_blocks(reply) {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(block.trim()) {
            return Ok(value);
        }
    }

    let mut search_from = 0;
    while let Some(offset) = reply[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_object_end(&reply[start..]) {
            let candidate = &reply[start..start + end];
            if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
                return Ok(value);
            }
        }
        search_from = start + 1;
    }

    Err(JudgeError::MalformedResponse(format!(
        "no JSON object found in reply ({} chars)",
        reply.chars().count()
    )))
}

/// Bodies of ``` fenced blocks, with any language tag line removed.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        match body.find("```") {
            Some(close) => {
                blocks.push(&body[..close]);
                rest = &body[close + 3..];
            }
            None => break,
        }
    }
    blocks
}

/// Byte length of the object starting at `text[0] == '{'`, if it closes.
fn balanced_object_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// First present field among `keys` (snake_case and camelCase spellings).
fn field<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k)).filter(|v| !v.is_null())
}

fn text_field(obj: &Value, keys: &[&str]) -> String {
    match field(obj, keys) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Clamp a score into 1..=5; anything unreadable is neutral.
pub fn parse_score(value: Option<&Value>) -> u8 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(x) if x.is_finite() => x.round().clamp(1.0, 5.0) as u8,
        _ => NEUTRAL_SCORE,
    }
}

/// Interpreted independent-judge reply.
#[derive(Debug, Clone, PartialEq)]
pub struct IndependentReply {
    pub rubric_scores: Vec<RubricScore>,
    pub overall_score: u8,
    pub reasoning: String,
}

/// Interpret an extracted independent-judge object.
///
/// Entries without a criterion name take the rubric criterion at the same
/// position.
pub fn parse_independent(value: &Value, rubric: &[String]) -> IndependentReply {
    let entries = field(value, &["rubric_scores", "rubricScores", "scores"])
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let rubric_scores = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let mut criterion = text_field(entry, &["criterion", "name"]);
            if criterion.is_empty() {
                criterion = rubric.get(i).cloned().unwrap_or_else(|| format!("criterion {}", i + 1));
            }
            RubricScore {
                criterion,
                score: parse_score(field(entry, &["score"])),
                reasoning: text_field(entry, &["reasoning", "rationale"]),
            }
        })
        .collect();

    IndependentReply {
        rubric_scores,
        overall_score: parse_score(field(value, &["overall_score", "overallScore", "score"])),
        reasoning: text_field(value, &["reasoning", "overall_reasoning", "overallReasoning"]),
    }
}

/// Which session the evaluator preferred, by presentation slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    A,
    B,
    Tie,
}

impl Slot {
    pub fn parse_lenient(raw: &str) -> Slot {
        match raw.trim().to_ascii_lowercase().as_str() {
            "a" | "session a" | "response a" => Slot::A,
            "b" | "session b" | "response b" => Slot::B,
            _ => Slot::Tie,
        }
    }
}

/// Presentation order of one pairwise call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// A = baseline, B = skill.
    Forward,
    /// A = skill, B = baseline.
    Reverse,
}

impl Direction {
    pub fn resolve(self, slot: Slot) -> Winner {
        match (self, slot) {
            (_, Slot::Tie) => Winner::Tie,
            (Direction::Forward, Slot::A) | (Direction::Reverse, Slot::B) => Winner::Baseline,
            (Direction::Forward, Slot::B) | (Direction::Reverse, Slot::A) => Winner::Skill,
        }
    }
}

fn parse_outcome(obj: &Value, winner_keys: &[&str], magnitude_keys: &[&str], direction: Direction) -> (Winner, Magnitude) {
    let slot = Slot::parse_lenient(&text_field(obj, winner_keys));
    let winner = direction.resolve(slot);
    let magnitude = if winner == Winner::Tie {
        Magnitude::Equal
    } else {
        Magnitude::parse_lenient(&text_field(obj, magnitude_keys))
    };
    (winner, magnitude)
}

/// Interpret one direction's pairwise object, already mapped to
/// baseline/skill. `position_swap_consistent` is left `true`; merging the
/// two directions decides it.
pub fn parse_pairwise(value: &Value, rubric: &[String], direction: Direction) -> PairwiseJudgeResult {
    let entries = field(value, &["rubric_results", "rubricResults", "criteria"])
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let rubric_results = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let mut criterion = text_field(entry, &["criterion", "name"]);
            if criterion.is_empty() {
                criterion = rubric.get(i).cloned().unwrap_or_else(|| format!("criterion {}", i + 1));
            }
            let (winner, magnitude) = parse_outcome(entry, &["winner"], &["magnitude"], direction);
            PairwiseCriterion {
                criterion,
                winner,
                magnitude,
                reasoning: text_field(entry, &["reasoning", "rationale"]),
            }
        })
        .collect();

    let (overall_winner, overall_magnitude) = parse_outcome(
        value,
        &["overall_winner", "overallWinner", "winner"],
        &["overall_magnitude", "overallMagnitude", "magnitude"],
        direction,
    );

    PairwiseJudgeResult {
        rubric_results,
        overall_winner,
        overall_magnitude,
        overall_reasoning: text_field(value, &["overall_reasoning", "overallReasoning", "reasoning"]),
        position_swap_consistent: true,
    }
}
