//! Independent judge: scores one run against the scenario rubric.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::error::JudgeError;
use super::evaluator::{Evaluator, PermissionScope, SessionConfig};
use super::parse::{extract_json, parse_independent};
use super::prompt::{build_independent_prompt, effective_rubric, prompt_digest, INDEPENDENT_PERSONA};
use super::retry::{retry_bounded, RetryPolicy};
use crate::domain::{JudgeResult, RunMetrics, Scenario};
use crate::metrics::METRICS;
use crate::obs;

/// Judge configuration shared by independent and pairwise judging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Evaluator model identity.
    pub model: String,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Skill directory the evaluator may read in addition to run directories.
    #[serde(default)]
    pub skill_dir: Option<PathBuf>,
}

impl JudgeConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            retry: RetryPolicy::default(),
            skill_dir: None,
        }
    }

    /// Read scope for a call that inspects the given run directories.
    pub fn permission_scope<'a>(&self, run_dirs: impl IntoIterator<Item = &'a PathBuf>) -> PermissionScope {
        let roots = run_dirs.into_iter().cloned().chain(self.skill_dir.clone());
        PermissionScope::new(roots)
    }
}

/// Client for independent judging. Cheap to clone.
#[derive(Clone)]
pub struct JudgeClient {
    evaluator: Arc<dyn Evaluator>,
    config: JudgeConfig,
}

impl JudgeClient {
    pub fn new(evaluator: Arc<dyn Evaluator>, config: JudgeConfig) -> Self {
        Self { evaluator, config }
    }

    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    /// Score one run. Each attempt opens a fresh session; exhausted
    /// retries are returned to the caller.
    pub async fn judge(&self, scenario: &Scenario, metrics: &RunMetrics) -> Result<JudgeResult, JudgeError> {
        let rubric = effective_rubric(scenario);
        let prompt = build_independent_prompt(scenario, &rubric, metrics);
        let scope = self.config.permission_scope([&metrics.working_dir]);
        let label = format!("judge[{}]", scenario.name);

        let value = self.round_trip(&label, INDEPENDENT_PERSONA, &prompt, &scope).await?;
        let reply = parse_independent(&value, &rubric);

        Ok(JudgeResult {
            rubric_scores: reply.rubric_scores,
            overall_score: reply.overall_score,
            reasoning: reply.reasoning,
            prompt_digest: prompt_digest(INDEPENDENT_PERSONA, &prompt),
        })
    }

    /// Send `prompt` under the retry policy and return the reply's JSON object.
    pub(crate) async fn round_trip(
        &self,
        label: &str,
        system: &str,
        prompt: &str,
        scope: &PermissionScope,
    ) -> Result<Value, JudgeError> {
        retry_bounded(&self.config.retry, label, |attempt| async move {
            METRICS.inc_judge_calls();
            debug!(label, attempt, "judge attempt");

            let mut session = self
                .evaluator
                .open_session(SessionConfig {
                    model: self.config.model.clone(),
                    system_instruction: system.to_string(),
                    permissions: scope.clone(),
                })
                .await?;

            let reply = session.send(prompt).await;
            if let Err(err) = session.close().await {
                obs::emit_session_close_error(label, &err);
            }
            extract_json(&reply?)
        })
        .await
    }
}
