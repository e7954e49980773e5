//! Assertion evaluator.
//!
//! Checks [`Assertion`]s against a run's final output and working directory,
//! and scenario [`Constraint`]s against its [`RunMetrics`]. Every check
//! yields exactly one [`AssertionResult`]; nothing here aborts a batch.

use std::path::{Path, PathBuf};

use futures::future::join_all;
use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::domain::{Assertion, AssertionResult, Check, Constraint, RunMetrics};

/// Validate an assertion's configuration. Returns a reason on failure.
///
/// Patterns are compiled here so a malformed regex is a configuration error
/// rather than an evaluation-time surprise.
pub fn validate_assertion(assertion: &Assertion) -> Result<(), String> {
    match assertion {
        Assertion::OutputMatches { pattern } | Assertion::OutputNotMatches { pattern } => {
            compile_pattern(pattern)
                .map(|_| ())
                .map_err(|e| format!("invalid pattern {pattern:?}: {e}"))
        }
        Assertion::FileExists { path }
        | Assertion::FileNotExists { path }
        | Assertion::FileContains { path, .. } => {
            if path.trim().is_empty() {
                Err("path must not be empty".to_string())
            } else {
                Ok(())
            }
        }
        Assertion::OutputContains { value } | Assertion::OutputNotContains { value } => {
            if value.is_empty() {
                Err("value must not be empty".to_string())
            } else {
                Ok(())
            }
        }
        Assertion::ExitSuccess | Assertion::Unsupported { .. } => Ok(()),
    }
}

/// Evaluate `assertions` against one run. Results are in input order.
pub async fn evaluate_assertions(
    assertions: &[Assertion],
    output: &str,
    working_dir: &Path,
) -> Vec<AssertionResult> {
    join_all(
        assertions
            .iter()
            .map(|assertion| evaluate_assertion(assertion, output, working_dir)),
    )
    .await
}

/// Evaluate a single assertion.
pub async fn evaluate_assertion(
    assertion: &Assertion,
    output: &str,
    working_dir: &Path,
) -> AssertionResult {
    let (passed, message) = match assertion {
        Assertion::OutputContains { value } => {
            let found = contains_ignore_case(output, value);
            (
                found,
                if found {
                    format!("output contains {value:?}")
                } else {
                    format!("output does not contain {value:?}")
                },
            )
        }
        Assertion::OutputNotContains { value } => {
            let found = contains_ignore_case(output, value);
            (
                !found,
                if found {
                    format!("output unexpectedly contains {value:?}")
                } else {
                    format!("output does not contain {value:?}")
                },
            )
        }
        Assertion::OutputMatches { pattern } => match compile_pattern(pattern) {
            Ok(re) => {
                let matched = re.is_match(output);
                (
                    matched,
                    if matched {
                        format!("output matches /{pattern}/")
                    } else {
                        format!("output does not match /{pattern}/")
                    },
                )
            }
            Err(e) => (false, format!("invalid pattern /{pattern}/ (no match): {e}")),
        },
        Assertion::OutputNotMatches { pattern } => match compile_pattern(pattern) {
            Ok(re) => {
                let matched = re.is_match(output);
                (
                    !matched,
                    if matched {
                        format!("output unexpectedly matches /{pattern}/")
                    } else {
                        format!("output does not match /{pattern}/")
                    },
                )
            }
            Err(e) => (false, format!("invalid pattern /{pattern}/: {e}")),
        },
        Assertion::FileExists { path } => {
            let matches = resolve_glob(working_dir, path);
            if matches.is_empty() {
                (false, format!("no file matches {path}"))
            } else {
                (true, format!("{} file(s) match {path}", matches.len()))
            }
        }
        Assertion::FileNotExists { path } => {
            let matches = resolve_glob(working_dir, path);
            if matches.is_empty() {
                (true, format!("no file matches {path}"))
            } else {
                (
                    false,
                    format!("{} file(s) unexpectedly match {path}", matches.len()),
                )
            }
        }
        Assertion::FileContains { path, value } => {
            let matches = resolve_glob(working_dir, path);
            if matches.is_empty() {
                (false, format!("no file matches {path}"))
            } else {
                match first_file_containing(&matches, value).await {
                    Some(hit) => (
                        true,
                        format!(
                            "{} contains {value:?}",
                            hit.strip_prefix(working_dir).unwrap_or(&hit).display()
                        ),
                    ),
                    None => (
                        false,
                        format!("none of {} file(s) matching {path} contain {value:?}", matches.len()),
                    ),
                }
            }
        }
        Assertion::ExitSuccess => {
            // The runtime exposes no exit code; a non-empty answer is the proxy.
            let ok = !output.trim().is_empty();
            (
                ok,
                if ok {
                    "run produced output".to_string()
                } else {
                    "run produced no output".to_string()
                },
            )
        }
        Assertion::Unsupported { kind } => (false, format!("unsupported assertion type: {kind}")),
    };

    debug!(kind = assertion.kind(), passed, "assertion evaluated");
    AssertionResult {
        check: Check::Assertion(assertion.clone()),
        passed,
        message,
    }
}

/// Evaluate scenario constraints against a run's metrics, in input order.
pub fn evaluate_constraints(constraints: &[Constraint], metrics: &RunMetrics) -> Vec<AssertionResult> {
    constraints
        .iter()
        .map(|constraint| evaluate_constraint(constraint, metrics))
        .collect()
}

/// Evaluate a single constraint.
pub fn evaluate_constraint(constraint: &Constraint, metrics: &RunMetrics) -> AssertionResult {
    let (passed, message) = match constraint {
        Constraint::ExpectTool { tool } => {
            let count = metrics.tool_breakdown.get(tool).copied().unwrap_or(0);
            if count > 0 {
                (true, format!("tool {tool} used {count} time(s)"))
            } else {
                (false, format!("expected tool {tool} was not used"))
            }
        }
        Constraint::RejectTool { tool } => {
            let count = metrics.tool_breakdown.get(tool).copied().unwrap_or(0);
            if count == 0 {
                (true, format!("tool {tool} was not used"))
            } else {
                (false, format!("rejected tool {tool} used {count} time(s)"))
            }
        }
        Constraint::MaxTurns { limit } => (
            metrics.turns <= *limit,
            format!("{} turn(s), limit {limit}", metrics.turns),
        ),
        Constraint::MaxTokens { limit } => (
            metrics.token_estimate <= *limit,
            format!("{} token(s), limit {limit}", metrics.token_estimate),
        ),
    };

    AssertionResult {
        check: Check::Constraint(constraint.clone()),
        passed,
        message,
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Expand `pattern` relative to `working_dir`, sorted.
///
/// Only `pattern` is glob syntax; the directory is matched literally. A
/// pattern the glob engine rejects is treated as a literal path.
fn resolve_glob(working_dir: &Path, pattern: &str) -> Vec<PathBuf> {
    let full = working_dir.join(pattern);
    let escaped_dir = glob::Pattern::escape(&working_dir.to_string_lossy());
    let full_pattern = Path::new(&escaped_dir).join(pattern);

    match glob::glob(&full_pattern.to_string_lossy()) {
        Ok(paths) => {
            let mut matches: Vec<PathBuf> = paths.filter_map(|entry| entry.ok()).collect();
            matches.sort();
            matches
        }
        Err(e) => {
            debug!(pattern, error = %e, "glob rejected pattern; using literal path");
            if full.exists() {
                vec![full]
            } else {
                Vec::new()
            }
        }
    }
}

async fn first_file_containing(paths: &[PathBuf], value: &str) -> Option<PathBuf> {
    for path in paths {
        match tokio::fs::read_to_string(path).await {
            Ok(content) if content.contains(value) => return Some(path.clone()),
            Ok(_) => {}
            Err(e) => debug!(path = %path.display(), error = %e, "skipping unreadable file"),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TokenSource;
    use std::collections::BTreeMap;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn metrics_with_tools(tools: &[(&str, u32)], turns: u32, tokens: u64) -> RunMetrics {
        RunMetrics {
            run_id: Uuid::new_v4(),
            token_estimate: tokens,
            token_source: TokenSource::Reported,
            tool_calls: tools.iter().map(|(_, n)| n).sum(),
            tool_breakdown: tools
                .iter()
                .map(|(name, n)| (name.to_string(), *n))
                .collect::<BTreeMap<_, _>>(),
            turns,
            wall_time_ms: 0,
            error_count: 0,
            events: Vec::new(),
            final_output: String::new(),
            task_completed: false,
            assertion_results: Vec::new(),
            working_dir: PathBuf::new(),
        }
    }

    #[tokio::test]
    async fn test_output_contains_is_case_insensitive_and_exclusive() {
        let dir = tempdir().unwrap();
        let output = "Created the Parser module";
        let contains = Assertion::OutputContains {
            value: "parser MODULE".to_string(),
        };
        let not_contains = Assertion::OutputNotContains {
            value: "parser MODULE".to_string(),
        };

        let a = evaluate_assertion(&contains, output, dir.path()).await;
        let b = evaluate_assertion(&not_contains, output, dir.path()).await;
        assert!(a.passed);
        assert!(!b.passed);
    }

    #[tokio::test]
    async fn test_output_matches_case_insensitive() {
        let dir = tempdir().unwrap();
        let assertion = Assertion::OutputMatches {
            pattern: r"^all \d+ tests passed$".to_string(),
        };
        let result = evaluate_assertion(&assertion, "ALL 12 TESTS PASSED", dir.path()).await;
        assert!(result.passed);
    }

    #[tokio::test]
    async fn test_malformed_pattern_fails_without_panicking() {
        let dir = tempdir().unwrap();
        let matches = Assertion::OutputMatches {
            pattern: "(unclosed".to_string(),
        };
        let not_matches = Assertion::OutputNotMatches {
            pattern: "(unclosed".to_string(),
        };
        let results = evaluate_assertions(&[matches, not_matches], "anything", dir.path()).await;
        assert!(results.iter().all(|r| !r.passed));
        assert!(results[0].message.contains("invalid pattern"));
    }

    #[tokio::test]
    async fn test_exit_success_requires_output() {
        let dir = tempdir().unwrap();
        assert!(evaluate_assertion(&Assertion::ExitSuccess, "done", dir.path()).await.passed);
        assert!(!evaluate_assertion(&Assertion::ExitSuccess, "  \n", dir.path()).await.passed);
    }

    #[tokio::test]
    async fn test_unsupported_assertion_fails_with_diagnostic() {
        let dir = tempdir().unwrap();
        let result = evaluate_assertion(
            &Assertion::Unsupported {
                kind: "screenshot_matches".to_string(),
            },
            "output",
            dir.path(),
        )
        .await;
        assert!(!result.passed);
        assert!(result.message.contains("screenshot_matches"));
    }

    #[tokio::test]
    async fn test_file_exists_with_glob() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();

        let exists = Assertion::FileExists {
            path: "src/*.rs".to_string(),
        };
        let missing = Assertion::FileNotExists {
            path: "src/*.py".to_string(),
        };
        let results = evaluate_assertions(&[exists, missing], "", dir.path()).await;
        assert!(results[0].passed);
        assert!(results[1].passed);
    }

    #[tokio::test]
    async fn test_invalid_glob_falls_back_to_literal_path() {
        let dir = tempdir().unwrap();
        // "[" opens an unterminated character class, which glob rejects.
        std::fs::write(dir.path().join("notes[draft.md"), "x").unwrap();
        let result = evaluate_assertion(
            &Assertion::FileExists {
                path: "notes[draft.md".to_string(),
            },
            "",
            dir.path(),
        )
        .await;
        assert!(result.passed);
    }

    #[tokio::test]
    async fn test_file_contains_needs_a_matching_file_with_the_value() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("hit.txt"), "the needle is here").unwrap();
        std::fs::write(dir.path().join("miss.txt"), "only hay").unwrap();

        let both = Assertion::FileContains {
            path: "*.txt".to_string(),
            value: "needle".to_string(),
        };
        let only_miss = Assertion::FileContains {
            path: "miss.*".to_string(),
            value: "needle".to_string(),
        };
        let results = evaluate_assertions(&[both, only_miss], "", dir.path()).await;
        assert!(results[0].passed, "{}", results[0].message);
        assert!(results[0].message.starts_with("hit.txt contains"));
        assert!(!results[1].passed);
        assert!(results[1].message.contains("none of 1 file(s)"));
    }

    #[tokio::test]
    async fn test_file_contains_skips_unreadable_matches() {
        let dir = tempdir().unwrap();
        // the directory sorts before the file and cannot be read as text
        std::fs::create_dir_all(dir.path().join("notes/0-archive")).unwrap();
        std::fs::write(dir.path().join("notes/1-today.md"), "ship it").unwrap();

        let result = evaluate_assertion(
            &Assertion::FileContains {
                path: "notes/*".to_string(),
                value: "ship".to_string(),
            },
            "",
            dir.path(),
        )
        .await;
        assert!(result.passed, "{}", result.message);
        assert!(result.message.contains("1-today.md"));
    }

    #[tokio::test]
    async fn test_working_dir_is_not_glob_syntax() {
        let root = tempfile::Builder::new().prefix("run[1]?-").tempdir().unwrap();
        std::fs::write(root.path().join("README.md"), "# title").unwrap();

        let results = evaluate_assertions(
            &[
                Assertion::FileExists {
                    path: "*.md".to_string(),
                },
                Assertion::FileContains {
                    path: "README.md".to_string(),
                    value: "title".to_string(),
                },
            ],
            "",
            root.path(),
        )
        .await;
        assert!(results.iter().all(|r| r.passed));
    }

    #[test]
    fn test_constraints_each_yield_a_result() {
        let metrics = metrics_with_tools(&[("read_file", 2), ("shell", 1)], 4, 900);
        let constraints = vec![
            Constraint::ExpectTool {
                tool: "read_file".to_string(),
            },
            Constraint::ExpectTool {
                tool: "edit_file".to_string(),
            },
            Constraint::RejectTool {
                tool: "shell".to_string(),
            },
            Constraint::MaxTurns { limit: 4 },
            Constraint::MaxTokens { limit: 800 },
        ];
        let results = evaluate_constraints(&constraints, &metrics);
        let passed: Vec<bool> = results.iter().map(|r| r.passed).collect();
        assert_eq!(passed, vec![true, false, false, true, false]);
    }

    #[test]
    fn test_validate_assertion() {
        assert!(validate_assertion(&Assertion::OutputMatches {
            pattern: "ok|done".to_string()
        })
        .is_ok());
        assert!(validate_assertion(&Assertion::OutputNotMatches {
            pattern: "[a-".to_string()
        })
        .is_err());
        assert!(validate_assertion(&Assertion::FileExists {
            path: " ".to_string()
        })
        .is_err());
    }
}
