//! Evaluation harness: runs every scenario with and without the skill,
//! judges each attempt and aggregates the verdict.
//!
//! Within one attempt the baseline and skill runs execute concurrently.
//! Judging for an attempt is spawned as a task so the next attempt's runs
//! start while the evaluator is still busy. Any judge task that exhausts
//! its retries fails the whole evaluation; no further agent runs start once
//! one has failed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, Instrument};

use crate::assertions::{evaluate_assertions, evaluate_constraints};
use crate::collector::collect_metrics;
use crate::compare::{compare_scenario, RunPair, Weights};
use crate::domain::{
    AgentEvent, Result, RunMetrics, RunResult, RuntimeError, Scenario, ScenarioComparison, ScenarioSuite,
    SkillVerdict, SkillabError, Variant,
};
use crate::judge::{JudgeClient, PairwiseJudge, PermissionScope};
use crate::metrics::METRICS;
use crate::obs;
use crate::verdict::{compute_verdict, VerdictConfig};

/// Everything an agent runtime needs to perform one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub scenario: String,
    pub variant: Variant,
    /// 1-based attempt number.
    pub attempt: u32,
    pub model: String,
    pub working_dir: PathBuf,
    /// Skill directories to load; empty for the baseline.
    pub skill_dirs: Vec<PathBuf>,
    pub permissions: PermissionScope,
    pub prompt: String,
    pub timeout: Duration,
}

/// The agent under test.
///
/// Implementations stream events into `events` as they happen. An `Err`
/// return is recorded as a runner-level error event; it never aborts the
/// evaluation.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn execute(&self, request: RunRequest, events: mpsc::UnboundedSender<AgentEvent>)
        -> std::result::Result<(), RuntimeError>;
}

/// Harness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Model the agent runs with.
    pub agent_model: String,
    /// Attempts per scenario.
    pub runs_per_scenario: u32,
    /// Run timeout for scenarios that set none.
    pub default_timeout_secs: u64,
    /// Also run the position-swapped pairwise judge.
    pub pairwise: bool,
    #[serde(default)]
    pub weights: Weights,
    #[serde(default)]
    pub verdict: VerdictConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            agent_model: "default".to_string(),
            runs_per_scenario: 1,
            default_timeout_secs: 300,
            pairwise: false,
            weights: Weights::default(),
            verdict: VerdictConfig::default(),
        }
    }
}

/// A finished run whose working directory is kept alive until judged.
struct CompletedRun {
    metrics: RunMetrics,
    _workdir: TempDir,
}

type JudgeTask = JoinHandle<Result<RunPair>>;

pub struct Harness {
    runtime: Arc<dyn AgentRuntime>,
    judge: JudgeClient,
    config: HarnessConfig,
}

impl Harness {
    pub fn new(runtime: Arc<dyn AgentRuntime>, judge: JudgeClient, config: HarnessConfig) -> Self {
        Self { runtime, judge, config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Evaluate one skill against its suite.
    pub async fn evaluate_skill(&self, suite: &ScenarioSuite) -> Result<SkillVerdict> {
        suite.validate()?;
        let runs = self.config.runs_per_scenario.max(1);
        obs::emit_evaluation_started(&suite.skill.name, suite.scenarios.len(), runs);

        let judge_failed = Arc::new(AtomicBool::new(false));
        let mut scheduled: Vec<(String, Vec<JudgeTask>)> = Vec::with_capacity(suite.scenarios.len());
        'scenarios: for scenario in &suite.scenarios {
            let span = obs::scenario_span(&scenario.name);
            obs::emit_scenario_started(&scenario.name, runs);

            let mut tasks = Vec::with_capacity(runs as usize);
            for attempt in 1..=runs {
                if judge_failed.load(Ordering::SeqCst) {
                    debug!(scenario = %scenario.name, attempt, "judging already failed; no further runs");
                    scheduled.push((scenario.name.clone(), tasks));
                    break 'scenarios;
                }
                let (baseline, skill) = tokio::join!(
                    self.execute_run(scenario, Variant::Baseline, attempt, &[]),
                    self.execute_run(scenario, Variant::Skill, attempt, std::slice::from_ref(&suite.skill.path)),
                );
                let (baseline, skill) = match (baseline, skill) {
                    (Ok(b), Ok(s)) => (b, s),
                    (Err(err), _) | (_, Err(err)) => {
                        abort_all(scheduled.iter().flat_map(|(_, t)| t).chain(&tasks));
                        return Err(err);
                    }
                };
                tasks.push(self.spawn_judging(
                    scenario.clone(),
                    baseline,
                    skill,
                    span.clone(),
                    judge_failed.clone(),
                ));
            }
            scheduled.push((scenario.name.clone(), tasks));
        }

        // A set failure flag guarantees an error from one of the scheduled tasks.
        let comparisons = collect_comparisons(scheduled, &self.config.weights).await?;

        Ok(compute_verdict(suite.skill.clone(), comparisons, &self.config.verdict))
    }

    /// Evaluate several skills in order. The first fatal error fails the batch.
    pub async fn evaluate_batch(&self, suites: &[ScenarioSuite]) -> Result<Vec<SkillVerdict>> {
        for suite in suites {
            suite.validate()?;
        }
        let mut verdicts = Vec::with_capacity(suites.len());
        for suite in suites {
            verdicts.push(self.evaluate_skill(suite).await?);
        }
        Ok(verdicts)
    }

    async fn execute_run(
        &self,
        scenario: &Scenario,
        variant: Variant,
        attempt: u32,
        skill_dirs: &[PathBuf],
    ) -> Result<CompletedRun> {
        let workdir = tempfile::Builder::new().prefix("skillab-run-").tempdir()?;
        write_setup_files(scenario, workdir.path()).await?;

        let timeout = Duration::from_secs(scenario.timeout_secs.unwrap_or(self.config.default_timeout_secs));
        let permissions = PermissionScope::new(
            std::iter::once(workdir.path().to_path_buf()).chain(skill_dirs.iter().cloned()),
        );
        let request = RunRequest {
            scenario: scenario.name.clone(),
            variant,
            attempt,
            model: self.config.agent_model.clone(),
            working_dir: workdir.path().to_path_buf(),
            skill_dirs: skill_dirs.to_vec(),
            permissions,
            prompt: scenario.prompt.clone(),
            timeout,
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let started = Instant::now();
        let outcome = match tokio::time::timeout(timeout, self.runtime.execute(request, tx)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(RuntimeError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };
        let wall_time = started.elapsed();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        if let Err(err) = outcome {
            debug!(scenario = %scenario.name, %variant, attempt, error = %err, "agent run failed");
            events.push(AgentEvent::RunnerError {
                message: err.to_string(),
            });
        }

        let metrics = collect_metrics(events, wall_time, workdir.path());
        let mut checks = evaluate_assertions(&scenario.assertions, &metrics.final_output, workdir.path()).await;
        checks.extend(evaluate_constraints(&scenario.constraints(), &metrics));
        let metrics = metrics.with_assertion_results(checks);

        METRICS.inc_runs();
        obs::emit_run_completed(&scenario.name, variant, attempt, &metrics);

        Ok(CompletedRun {
            metrics,
            _workdir: workdir,
        })
    }

    fn spawn_judging(
        &self,
        scenario: Scenario,
        baseline: CompletedRun,
        skill: CompletedRun,
        span: tracing::Span,
        judge_failed: Arc<AtomicBool>,
    ) -> JudgeTask {
        let judge = self.judge.clone();
        let pairwise_judge = self.config.pairwise.then(|| PairwiseJudge::new(self.judge.clone()));

        tokio::spawn(
            async move {
                let independent = async {
                    tokio::try_join!(
                        judge.judge(&scenario, &baseline.metrics),
                        judge.judge(&scenario, &skill.metrics),
                    )
                };
                let compared = async {
                    match &pairwise_judge {
                        Some(pj) => pj.judge(&scenario, &baseline.metrics, &skill.metrics).await.map(Some),
                        None => Ok(None),
                    }
                };
                let ((baseline_judge, skill_judge), pairwise) = match tokio::try_join!(independent, compared) {
                    Ok(judged) => judged,
                    Err(source) => {
                        judge_failed.store(true, Ordering::SeqCst);
                        return Err(SkillabError::Judge {
                            scenario: scenario.name.clone(),
                            source,
                        });
                    }
                };

                // Working directories are released here, after judging.
                Ok::<_, SkillabError>(RunPair {
                    baseline: RunResult {
                        metrics: baseline.metrics,
                        judge: baseline_judge,
                    },
                    skill: RunResult {
                        metrics: skill.metrics,
                        judge: skill_judge,
                    },
                    pairwise,
                })
            }
            .instrument(span),
        )
    }
}

async fn write_setup_files(scenario: &Scenario, root: &Path) -> Result<()> {
    for file in &scenario.setup {
        let target = root.join(&file.path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &file.content).await?;
    }
    Ok(())
}

/// Await every judge task in scenario then attempt order. On the first
/// failure all tasks not yet awaited are aborted.
async fn collect_comparisons(
    scheduled: Vec<(String, Vec<JudgeTask>)>,
    weights: &Weights,
) -> Result<Vec<ScenarioComparison>> {
    let mut comparisons = Vec::with_capacity(scheduled.len());
    let mut remaining = scheduled.into_iter();
    while let Some((scenario, tasks)) = remaining.next() {
        let runs = tasks.len();
        let mut pairs = Vec::with_capacity(runs);
        let mut tasks = tasks.into_iter();
        while let Some(task) = tasks.next() {
            let joined = match task.await {
                Ok(result) => result,
                Err(err) => Err(SkillabError::JudgeTask {
                    scenario: scenario.clone(),
                    reason: err.to_string(),
                }),
            };
            match joined {
                Ok(pair) => pairs.push(pair),
                Err(err) => {
                    abort_all(tasks.as_slice());
                    for (_, rest) in remaining {
                        abort_all(&rest);
                    }
                    return Err(err);
                }
            }
        }
        if let Some(comparison) = compare_scenario(&scenario, pairs, weights) {
            obs::emit_scenario_compared(&scenario, comparison.improvement_score, runs);
            comparisons.push(comparison);
        }
    }
    Ok(comparisons)
}

fn abort_all<'a>(tasks: impl IntoIterator<Item = &'a JudgeTask>) {
    for task in tasks {
        task.abort();
    }
}
