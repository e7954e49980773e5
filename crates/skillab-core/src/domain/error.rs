//! Domain-level error taxonomy for skillab.

use crate::judge::JudgeError;

/// Errors produced while loading or validating scenario configuration.
///
/// These are always raised before any agent run starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("suite must contain at least one scenario")]
    EmptySuite,

    #[error("scenario #{index} has an empty name")]
    EmptyScenarioName { index: usize },

    #[error("duplicate scenario name: {name}")]
    DuplicateScenario { name: String },

    #[error("scenario {scenario}: {reason}")]
    InvalidScenario { scenario: String, reason: String },

    #[error("scenario {scenario}, assertion #{index}: {reason}")]
    InvalidAssertion {
        scenario: String,
        index: usize,
        reason: String,
    },

    #[error("assertion of type {kind} is missing required field `{field}`")]
    MissingAssertionField { kind: String, field: String },

    #[error("failed to parse suite: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors surfaced by the agent runtime collaborator.
///
/// The harness never propagates these; they are folded into the run's
/// event stream as a runner-level error.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("agent run timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("no recording for scenario {scenario} ({variant}, attempt {attempt})")]
    MissingRecording {
        scenario: String,
        variant: String,
        attempt: u32,
    },

    #[error("agent session failed: {0}")]
    Session(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// skillab domain errors.
#[derive(Debug, thiserror::Error)]
pub enum SkillabError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("judging failed for scenario {scenario}: {source}")]
    Judge {
        scenario: String,
        #[source]
        source: JudgeError,
    },

    #[error("judge task for scenario {scenario} did not complete: {reason}")]
    JudgeTask { scenario: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for skillab domain operations.
pub type Result<T> = std::result::Result<T, SkillabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::DuplicateScenario {
            name: "refactor".to_string(),
        };
        assert!(err.to_string().contains("duplicate scenario name"));
        assert!(err.to_string().contains("refactor"));

        let err = ConfigError::InvalidAssertion {
            scenario: "lint".to_string(),
            index: 2,
            reason: "invalid pattern".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("lint"));
        assert!(msg.contains("#2"));
    }

    #[test]
    fn test_config_error_wraps_into_domain_error() {
        let err: SkillabError = ConfigError::EmptySuite.into();
        assert!(err.to_string().starts_with("configuration error"));
    }

    #[test]
    fn test_judge_error_names_scenario() {
        let err = SkillabError::Judge {
            scenario: "docs".to_string(),
            source: JudgeError::MalformedResponse("no JSON object found".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("docs"));
        assert!(msg.contains("no JSON object found"));
    }
}
