//! skillab - A/B evaluation of agent skills
//!
//! ## Commands
//!
//! - `validate`: Check a scenario suite without running anything
//! - `judge`: Re-judge recorded baseline/skill runs and print the verdict

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use skillab_core::{
    Evaluator, Harness, HarnessConfig, HttpEvaluator, HttpEvaluatorConfig, JudgeClient, JudgeConfig, Recording,
    ReplayRuntime, RetryPolicy, ScenarioSuite, SkillVerdict, VerdictConfig, METRICS,
};

#[derive(Parser)]
#[command(name = "skillab")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A/B evaluation harness for agent skills", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a scenario suite
    Validate {
        /// Path to the suite (TOML)
        #[arg(short, long)]
        suite: PathBuf,
    },

    /// Judge recorded runs of a suite and compute the skill verdict
    Judge {
        /// Path to the suite (TOML)
        #[arg(short, long)]
        suite: PathBuf,

        /// Path to the recorded runs (JSON)
        #[arg(short, long)]
        recording: PathBuf,

        /// Attempts per scenario
        #[arg(long, default_value = "1")]
        runs: u32,

        /// Also run the position-swapped pairwise judge
        #[arg(long)]
        pairwise: bool,

        /// Minimum mean improvement score to pass
        #[arg(long, default_value = "0.05")]
        threshold: f64,

        /// Fail when the skill loses task completion the baseline had
        #[arg(long)]
        require_completion: bool,

        /// Replay each run's recorded wall time
        #[arg(long)]
        pace: bool,

        /// Chat-completions endpoint of the judge model
        #[arg(long, env = "SKILLAB_JUDGE_ENDPOINT")]
        endpoint: String,

        /// API key for the judge endpoint
        #[arg(long, env = "SKILLAB_JUDGE_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Judge model identity
        #[arg(long, env = "SKILLAB_JUDGE_MODEL", default_value = "gpt-4o")]
        model: String,

        /// Per-attempt judge timeout in seconds
        #[arg(long, default_value = "120")]
        judge_timeout: u64,
    },
}

/// Options for [`cmd_judge`] beyond the evaluator itself.
struct JudgeOptions {
    runs: u32,
    pairwise: bool,
    threshold: f64,
    require_completion: bool,
    pace: bool,
    model: String,
    judge_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    skillab_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Validate { suite } => cmd_validate(&suite, cli.json).await,
        Commands::Judge {
            suite,
            recording,
            runs,
            pairwise,
            threshold,
            require_completion,
            pace,
            endpoint,
            api_key,
            model,
            judge_timeout,
        } => {
            let evaluator = Arc::new(HttpEvaluator::new(HttpEvaluatorConfig {
                api_key,
                ..HttpEvaluatorConfig::new(endpoint)
            }));
            let options = JudgeOptions {
                runs,
                pairwise,
                threshold,
                require_completion,
                pace,
                model,
                judge_timeout_secs: judge_timeout,
            };
            let result = cmd_judge(&suite, &recording, evaluator.clone(), &options).await;
            evaluator.shutdown();
            METRICS.flush();

            let verdict = result?;
            print_verdict(&verdict, cli.json)?;
            if !verdict.passed {
                bail!("skill {} did not pass: {}", verdict.skill.name, verdict.reason);
            }
            Ok(())
        }
    }
}

async fn load_suite(path: &Path) -> Result<ScenarioSuite> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read suite {}", path.display()))?;
    ScenarioSuite::from_toml_str(&raw).with_context(|| format!("Invalid suite {}", path.display()))
}

async fn cmd_validate(path: &Path, json: bool) -> Result<()> {
    let suite = load_suite(path).await?;
    if json {
        let summary = serde_json::json!({
            "valid": true,
            "skill": suite.skill.name,
            "scenarios": suite.scenarios.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Suite for skill '{}' is valid ({} scenario(s))",
            suite.skill.name,
            suite.scenarios.len()
        );
        for scenario in &suite.scenarios {
            println!(
                "  - {} ({} assertion(s), {} constraint(s))",
                scenario.name,
                scenario.assertions.len(),
                scenario.constraints().len()
            );
        }
    }
    Ok(())
}

async fn cmd_judge(
    suite_path: &Path,
    recording_path: &Path,
    evaluator: Arc<dyn Evaluator>,
    options: &JudgeOptions,
) -> Result<SkillVerdict> {
    let suite = load_suite(suite_path).await?;
    let recording = Recording::load(recording_path)
        .await
        .with_context(|| format!("Failed to load recording {}", recording_path.display()))?;

    let runs = options.runs.max(1);
    for scenario in &suite.scenarios {
        let recorded = recording.attempts(&scenario.name);
        if recorded < runs as usize {
            bail!(
                "recording has {recorded} attempt(s) for scenario '{}', {runs} requested",
                scenario.name
            );
        }
    }

    let judge = JudgeClient::new(
        evaluator,
        JudgeConfig {
            model: options.model.clone(),
            retry: RetryPolicy {
                timeout_ms: options.judge_timeout_secs.saturating_mul(1_000),
                ..RetryPolicy::default()
            },
            skill_dir: Some(suite.skill.path.clone()),
        },
    );
    let config = HarnessConfig {
        runs_per_scenario: runs,
        pairwise: options.pairwise,
        verdict: VerdictConfig {
            min_improvement: options.threshold,
            require_completion: options.require_completion,
            ..VerdictConfig::default()
        },
        ..HarnessConfig::default()
    };
    let runtime = Arc::new(ReplayRuntime::new(recording).with_pacing(options.pace));
    let harness = Harness::new(runtime, judge, config);

    info!(skill = %suite.skill.name, runs, pairwise = options.pairwise, "judging recorded runs");
    let verdict = harness
        .evaluate_skill(&suite)
        .await
        .with_context(|| format!("Evaluation of skill '{}' failed", suite.skill.name))?;
    Ok(verdict)
}

fn print_verdict(verdict: &SkillVerdict, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(verdict)?);
        return Ok(());
    }

    let status = if verdict.passed { "PASSED" } else { "FAILED" };
    println!("Skill '{}': {}", verdict.skill.name, status);
    println!("  mean improvement: {:.3}", verdict.mean_improvement);
    if let Some(ci) = &verdict.confidence_interval {
        println!(
            "  {:.0}% CI: [{:.3}, {:.3}]{}",
            ci.level * 100.0,
            ci.low,
            ci.high,
            if verdict.significant == Some(true) { "" } else { " (not significant)" }
        );
    }
    if let Some(gain) = verdict.normalized_gain {
        println!("  normalized gain: {gain:.3}");
    }
    for c in &verdict.comparisons {
        let b = &c.breakdown;
        println!(
            "  {}: {:+.3} (quality {:+.2}, judgment {:+.2}, completion {:+.0}, tokens {:+.2}, errors {:+.2})",
            c.scenario,
            c.improvement_score,
            b.quality_improvement,
            b.overall_judgment_improvement,
            b.task_completion,
            b.token_reduction,
            b.error_reduction
        );
        if let Some(p) = &c.pairwise {
            if !p.position_swap_consistent {
                println!("    pairwise judges disagreed; counted as a tie");
            }
        }
    }
    println!("  reason: {}", verdict.reason);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use skillab_core::{EvaluatorSession, JudgeError, SessionConfig};

    const SUITE: &str = r#"
[skill]
name = "changelog"
path = "/skills/changelog"

[[scenarios]]
name = "add-entry"
prompt = "Add a changelog entry for the new flag"

[[scenarios.assertions]]
type = "file_contains"
path = "CHANGELOG.md"
value = "--flag"
"#;

    const RECORDING: &str = r#"{
        "scenarios": {
            "add-entry": [{
                "baseline": {
                    "events": [
                        {"type": "tool_execution_start", "tool_name": "read_file"},
                        {"type": "tool_execution_start", "tool_name": "read_file"},
                        {"type": "assistant_message", "content": "I could not find the changelog."}
                    ]
                },
                "skill": {
                    "events": [
                        {"type": "tool_execution_start", "tool_name": "edit_file"},
                        {"type": "assistant_message", "content": "Added the entry."}
                    ],
                    "files": {"CHANGELOG.md": "- add --flag"}
                }
            }]
        }
    }"#;

    /// Scores runs that claim success higher than runs that do not.
    struct OutputAwareEvaluator;

    struct OutputAwareSession;

    #[async_trait]
    impl EvaluatorSession for OutputAwareSession {
        async fn send(&mut self, prompt: &str) -> std::result::Result<String, JudgeError> {
            let score = if prompt.contains("Added the entry.") { 5 } else { 2 };
            Ok(format!("{{\"rubric_scores\": [], \"overall_score\": {score}, \"reasoning\": \"ok\"}}"))
        }

        async fn close(&mut self) -> std::result::Result<(), JudgeError> {
            Ok(())
        }
    }

    #[async_trait]
    impl Evaluator for OutputAwareEvaluator {
        async fn open_session(
            &self,
            _config: SessionConfig,
        ) -> std::result::Result<Box<dyn EvaluatorSession>, JudgeError> {
            Ok(Box::new(OutputAwareSession))
        }
    }

    fn options(runs: u32) -> JudgeOptions {
        JudgeOptions {
            runs,
            pairwise: false,
            threshold: 0.05,
            require_completion: true,
            pace: false,
            model: "judge".to_string(),
            judge_timeout_secs: 5,
        }
    }

    fn write_fixtures(dir: &Path) -> (PathBuf, PathBuf) {
        let suite = dir.join("suite.toml");
        let recording = dir.join("recording.json");
        std::fs::write(&suite, SUITE).unwrap();
        std::fs::write(&recording, RECORDING).unwrap();
        (suite, recording)
    }

    #[tokio::test]
    async fn test_validate_accepts_suite() {
        let dir = tempfile::tempdir().unwrap();
        let (suite, _) = write_fixtures(dir.path());
        assert!(cmd_validate(&suite, false).await.is_ok());
    }

    #[tokio::test]
    async fn test_validate_rejects_bad_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let suite = dir.path().join("bad.toml");
        std::fs::write(
            &suite,
            r#"
[skill]
name = "s"
path = "/s"

[[scenarios]]
name = "a"
prompt = "p"

[[scenarios.assertions]]
type = "output_matches"
pattern = "("
"#,
        )
        .unwrap();
        let err = cmd_validate(&suite, false).await.unwrap_err();
        assert!(format!("{err:#}").contains("invalid pattern"));
    }

    #[tokio::test]
    async fn test_judge_recorded_runs_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let (suite, recording) = write_fixtures(dir.path());

        let verdict = cmd_judge(&suite, &recording, Arc::new(OutputAwareEvaluator), &options(1))
            .await
            .unwrap();

        assert!(verdict.passed, "reason: {}", verdict.reason);
        assert_eq!(verdict.comparisons.len(), 1);
        let c = &verdict.comparisons[0];
        assert!(!c.baseline.metrics.task_completed);
        assert!(c.skill.metrics.task_completed);
        assert_eq!(c.breakdown.task_completion, 1.0);
        assert_eq!(c.breakdown.tool_call_reduction, 0.5);
        assert!(print_verdict(&verdict, true).is_ok());
    }

    #[tokio::test]
    async fn test_judge_rejects_more_runs_than_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let (suite, recording) = write_fixtures(dir.path());
        let err = cmd_judge(&suite, &recording, Arc::new(OutputAwareEvaluator), &options(2))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("1 attempt(s)"));
    }
}
