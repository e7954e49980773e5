//! Scenario suites: the scripted prompts a skill is evaluated against.

use std::collections::HashSet;
use std::path::{Component, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// Identity of the skill under evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkillRef {
    /// Skill name (for reporting).
    pub name: String,

    /// Directory holding the skill's instructions/resources.
    pub path: PathBuf,
}

/// A file written into the working directory before a run starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileSetup {
    /// Path relative to the working directory.
    pub path: String,

    /// File content.
    #[serde(default)]
    pub content: String,
}

/// A deterministic pass/fail condition over one run's observable output.
///
/// Deserialized from a `type`-tagged table. An unrecognized `type` becomes
/// [`Assertion::Unsupported`], which always evaluates to a failed result
/// instead of rejecting the whole suite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "RawAssertion", into = "RawAssertion")]
pub enum Assertion {
    FileExists { path: String },
    FileNotExists { path: String },
    FileContains { path: String, value: String },
    OutputContains { value: String },
    OutputNotContains { value: String },
    OutputMatches { pattern: String },
    OutputNotMatches { pattern: String },
    ExitSuccess,
    Unsupported { kind: String },
}

impl Assertion {
    /// The configuration tag for this assertion.
    pub fn kind(&self) -> &str {
        match self {
            Assertion::FileExists { .. } => "file_exists",
            Assertion::FileNotExists { .. } => "file_not_exists",
            Assertion::FileContains { .. } => "file_contains",
            Assertion::OutputContains { .. } => "output_contains",
            Assertion::OutputNotContains { .. } => "output_not_contains",
            Assertion::OutputMatches { .. } => "output_matches",
            Assertion::OutputNotMatches { .. } => "output_not_matches",
            Assertion::ExitSuccess => "exit_success",
            Assertion::Unsupported { kind } => kind.as_str(),
        }
    }
}

/// Flat wire form of [`Assertion`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawAssertion {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl TryFrom<RawAssertion> for Assertion {
    type Error = ConfigError;

    fn try_from(raw: RawAssertion) -> Result<Self, Self::Error> {
        let RawAssertion {
            kind,
            path,
            value,
            pattern,
        } = raw;

        let require = |field: Option<String>, name: &str| {
            field.ok_or_else(|| ConfigError::MissingAssertionField {
                kind: kind.clone(),
                field: name.to_string(),
            })
        };

        let assertion = match kind.as_str() {
            "file_exists" => Assertion::FileExists {
                path: require(path, "path")?,
            },
            "file_not_exists" => Assertion::FileNotExists {
                path: require(path, "path")?,
            },
            "file_contains" => Assertion::FileContains {
                path: require(path, "path")?,
                value: require(value, "value")?,
            },
            "output_contains" => Assertion::OutputContains {
                value: require(value, "value")?,
            },
            "output_not_contains" => Assertion::OutputNotContains {
                value: require(value, "value")?,
            },
            "output_matches" => Assertion::OutputMatches {
                pattern: require(pattern, "pattern")?,
            },
            "output_not_matches" => Assertion::OutputNotMatches {
                pattern: require(pattern, "pattern")?,
            },
            "exit_success" => Assertion::ExitSuccess,
            _ => Assertion::Unsupported { kind: kind.clone() },
        };
        Ok(assertion)
    }
}

impl From<Assertion> for RawAssertion {
    fn from(assertion: Assertion) -> Self {
        let kind = assertion.kind().to_string();
        let mut raw = RawAssertion {
            kind,
            path: None,
            value: None,
            pattern: None,
        };
        match assertion {
            Assertion::FileExists { path } | Assertion::FileNotExists { path } => {
                raw.path = Some(path);
            }
            Assertion::FileContains { path, value } => {
                raw.path = Some(path);
                raw.value = Some(value);
            }
            Assertion::OutputContains { value } | Assertion::OutputNotContains { value } => {
                raw.value = Some(value);
            }
            Assertion::OutputMatches { pattern } | Assertion::OutputNotMatches { pattern } => {
                raw.pattern = Some(pattern);
            }
            Assertion::ExitSuccess | Assertion::Unsupported { .. } => {}
        }
        raw
    }
}

/// Scenario-level budget and tool-usage constraints, checked against run metrics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    ExpectTool { tool: String },
    RejectTool { tool: String },
    MaxTurns { limit: u32 },
    MaxTokens { limit: u64 },
}

/// The item an [`AssertionResult`] reports on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "source", content = "check", rename_all = "snake_case")]
pub enum Check {
    Assertion(Assertion),
    Constraint(Constraint),
}

/// Outcome of one assertion or constraint against one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssertionResult {
    pub check: Check,
    pub passed: bool,
    pub message: String,
}

/// One scripted prompt plus setup and expected behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub prompt: String,

    #[serde(default)]
    pub setup: Vec<FileSetup>,

    #[serde(default)]
    pub assertions: Vec<Assertion>,

    /// Natural-language criteria for the judge; a default rubric is used when empty.
    #[serde(default)]
    pub rubric: Vec<String>,

    /// Per-run agent timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub expect_tools: Vec<String>,

    #[serde(default)]
    pub reject_tools: Vec<String>,

    #[serde(default)]
    pub max_turns: Option<u32>,

    #[serde(default)]
    pub max_tokens: Option<u64>,
}

impl Scenario {
    /// Create a scenario with only a name and prompt.
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            setup: Vec::new(),
            assertions: Vec::new(),
            rubric: Vec::new(),
            timeout_secs: None,
            expect_tools: Vec::new(),
            reject_tools: Vec::new(),
            max_turns: None,
            max_tokens: None,
        }
    }

    /// Add an assertion.
    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    /// Add a rubric criterion.
    pub fn with_criterion(mut self, criterion: impl Into<String>) -> Self {
        self.rubric.push(criterion.into());
        self
    }

    /// Add a setup file.
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.setup.push(FileSetup {
            path: path.into(),
            content: content.into(),
        });
        self
    }

    /// Scenario constraints in a stable order: expected tools, rejected
    /// tools, turn budget, token budget.
    pub fn constraints(&self) -> Vec<Constraint> {
        let mut constraints: Vec<Constraint> = self
            .expect_tools
            .iter()
            .map(|tool| Constraint::ExpectTool { tool: tool.clone() })
            .collect();
        constraints.extend(
            self.reject_tools
                .iter()
                .map(|tool| Constraint::RejectTool { tool: tool.clone() }),
        );
        if let Some(limit) = self.max_turns {
            constraints.push(Constraint::MaxTurns { limit });
        }
        if let Some(limit) = self.max_tokens {
            constraints.push(Constraint::MaxTokens { limit });
        }
        constraints
    }

    /// Validate this scenario. `index` is its position in the suite.
    pub fn validate(&self, index: usize) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyScenarioName { index });
        }
        let invalid = |reason: &str| ConfigError::InvalidScenario {
            scenario: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.prompt.trim().is_empty() {
            return Err(invalid("prompt must not be empty"));
        }
        if self.timeout_secs == Some(0) {
            return Err(invalid("timeout_secs must be positive"));
        }
        if self.max_turns == Some(0) {
            return Err(invalid("max_turns must be positive"));
        }
        if self.max_tokens == Some(0) {
            return Err(invalid("max_tokens must be positive"));
        }
        if self.rubric.iter().any(|c| c.trim().is_empty()) {
            return Err(invalid("rubric criteria must not be empty"));
        }
        for setup in &self.setup {
            let path = PathBuf::from(&setup.path);
            if setup.path.trim().is_empty() || path.is_absolute() {
                return Err(invalid("setup file paths must be relative and non-empty"));
            }
            if path.components().any(|c| matches!(c, Component::ParentDir)) {
                return Err(invalid("setup file paths must stay inside the working directory"));
            }
        }
        for (i, assertion) in self.assertions.iter().enumerate() {
            crate::assertions::validate_assertion(assertion).map_err(|reason| {
                ConfigError::InvalidAssertion {
                    scenario: self.name.clone(),
                    index: i,
                    reason,
                }
            })?;
        }
        Ok(())
    }
}

/// A skill plus the scenarios it is evaluated against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioSuite {
    pub skill: SkillRef,
    pub scenarios: Vec<Scenario>,
}

impl ScenarioSuite {
    /// Parse and validate a suite from TOML.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let suite: ScenarioSuite = toml::from_str(input)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Validate every scenario and reject duplicate names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scenarios.is_empty() {
            return Err(ConfigError::EmptySuite);
        }
        let mut seen = HashSet::new();
        for (index, scenario) in self.scenarios.iter().enumerate() {
            scenario.validate(index)?;
            if !seen.insert(scenario.name.as_str()) {
                return Err(ConfigError::DuplicateScenario {
                    name: scenario.name.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUITE: &str = r#"
[skill]
name = "rust-errors"
path = "skills/rust-errors"

[[scenarios]]
name = "add-error-type"
prompt = "Add a thiserror enum to src/lib.rs"
rubric = ["Uses thiserror derive", "Variants carry context"]
expect_tools = ["edit_file"]
max_turns = 12

[[scenarios.setup]]
path = "src/lib.rs"
content = "pub fn run() {}"

[[scenarios.assertions]]
type = "file_contains"
path = "src/*.rs"
value = "thiserror"

[[scenarios.assertions]]
type = "output_matches"
pattern = "error(s)? (type|enum)"
"#;

    #[test]
    fn test_suite_parses_from_toml() {
        let suite = ScenarioSuite::from_toml_str(SUITE).expect("parse");
        assert_eq!(suite.skill.name, "rust-errors");
        let scenario = &suite.scenarios[0];
        assert_eq!(scenario.setup.len(), 1);
        assert_eq!(
            scenario.assertions[0],
            Assertion::FileContains {
                path: "src/*.rs".to_string(),
                value: "thiserror".to_string(),
            }
        );
        assert_eq!(scenario.rubric.len(), 2);
        assert_eq!(scenario.max_turns, Some(12));
    }

    #[test]
    fn test_unknown_assertion_type_is_kept_as_unsupported() {
        let raw = RawAssertion {
            kind: "process_exits_zero".to_string(),
            path: None,
            value: None,
            pattern: None,
        };
        let assertion = Assertion::try_from(raw).expect("unknown types are not config errors");
        assert_eq!(
            assertion,
            Assertion::Unsupported {
                kind: "process_exits_zero".to_string()
            }
        );
    }

    #[test]
    fn test_missing_field_is_config_error() {
        let raw = RawAssertion {
            kind: "file_contains".to_string(),
            path: Some("README.md".to_string()),
            value: None,
            pattern: None,
        };
        let err = Assertion::try_from(raw).unwrap_err();
        assert!(err.to_string().contains("`value`"));
    }

    #[test]
    fn test_invalid_pattern_rejected_at_validation() {
        let input = r#"
[skill]
name = "s"
path = "skills/s"

[[scenarios]]
name = "bad-regex"
prompt = "do it"

[[scenarios.assertions]]
type = "output_matches"
pattern = "([unclosed"
"#;
        let err = ScenarioSuite::from_toml_str(input).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAssertion { index: 0, .. }));
    }

    #[test]
    fn test_duplicate_scenario_names_rejected() {
        let suite = ScenarioSuite {
            skill: SkillRef {
                name: "s".to_string(),
                path: PathBuf::from("skills/s"),
            },
            scenarios: vec![Scenario::new("a", "p"), Scenario::new("a", "q")],
        };
        assert!(matches!(
            suite.validate(),
            Err(ConfigError::DuplicateScenario { .. })
        ));
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let err = Scenario::new("a", "  ").validate(0).unwrap_err();
        assert!(err.to_string().contains("prompt"));
    }

    #[test]
    fn test_setup_paths_confined_to_working_dir() {
        assert!(Scenario::new("a", "p").with_file("src/lib.rs", "").validate(0).is_ok());
        assert!(Scenario::new("a", "p").with_file("/etc/passwd", "").validate(0).is_err());
        let err = Scenario::new("a", "p")
            .with_file("src/../../escape.txt", "")
            .validate(0)
            .unwrap_err();
        assert!(err.to_string().contains("inside the working directory"));
    }

    #[test]
    fn test_constraints_order() {
        let mut scenario = Scenario::new("a", "p");
        scenario.expect_tools = vec!["read".to_string(), "edit".to_string()];
        scenario.reject_tools = vec!["shell".to_string()];
        scenario.max_tokens = Some(5000);

        let constraints = scenario.constraints();
        assert_eq!(constraints.len(), 4);
        assert_eq!(
            constraints[2],
            Constraint::RejectTool {
                tool: "shell".to_string()
            }
        );
        assert_eq!(constraints[3], Constraint::MaxTokens { limit: 5000 });
    }

    #[test]
    fn test_assertion_serializes_flat() {
        let json = serde_json::to_value(Assertion::OutputContains {
            value: "done".to_string(),
        })
        .expect("serialize");
        assert_eq!(json, serde_json::json!({"type": "output_contains", "value": "done"}));
    }
}
