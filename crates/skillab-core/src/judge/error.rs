//! Error types for the judging layer.

/// Errors produced while talking to, or interpreting, the judge evaluator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JudgeError {
    #[error("judge call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("evaluator transport error: {0}")]
    Transport(String),

    #[error("malformed judge response: {0}")]
    MalformedResponse(String),

    #[error("evaluator has been shut down")]
    EvaluatorClosed,

    #[error("{label} failed after {attempts} attempt(s): {}", .failures.join("; "))]
    RetriesExhausted {
        label: String,
        attempts: u32,
        failures: Vec<String>,
    },
}

impl From<reqwest::Error> for JudgeError {
    fn from(err: reqwest::Error) -> Self {
        JudgeError::Transport(err.to_string())
    }
}
