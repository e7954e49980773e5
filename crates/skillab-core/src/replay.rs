//! Replay of recorded agent runs.
//!
//! A recording holds, per scenario, one entry per attempt with the event
//! stream each variant produced and the files it left behind. Replaying
//! lets a suite be re-judged offline without invoking a live agent.

use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::instrument;

use crate::domain::{AgentEvent, RuntimeError, SkillabError, Variant};
use crate::harness::{AgentRuntime, RunRequest};

/// What one variant did in one attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecordedRun {
    pub events: Vec<AgentEvent>,
    /// Original wall-clock duration, replayed when pacing is enabled.
    #[serde(default)]
    pub wall_time_ms: u64,
    /// Files (relative path -> content) present in the working directory
    /// when the run ended.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

/// Both variants of one attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecordedAttempt {
    pub baseline: RecordedRun,
    pub skill: RecordedRun,
}

impl RecordedAttempt {
    pub fn variant(&self, variant: Variant) -> &RecordedRun {
        match variant {
            Variant::Baseline => &self.baseline,
            Variant::Skill => &self.skill,
        }
    }
}

/// Recorded attempts keyed by scenario name, in attempt order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Recording {
    pub scenarios: BTreeMap<String, Vec<RecordedAttempt>>,
}

impl Recording {
    pub fn from_json_str(input: &str) -> Result<Self, SkillabError> {
        Ok(serde_json::from_str(input)?)
    }

    pub async fn load(path: &Path) -> Result<Self, SkillabError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_json_str(&raw)
    }

    /// Number of recorded attempts for `scenario`.
    pub fn attempts(&self, scenario: &str) -> usize {
        self.scenarios.get(scenario).map_or(0, Vec::len)
    }

    pub fn get(&self, scenario: &str, variant: Variant, attempt: u32) -> Option<&RecordedRun> {
        let index = usize::try_from(attempt.checked_sub(1)?).ok()?;
        self.scenarios
            .get(scenario)
            .and_then(|attempts| attempts.get(index))
            .map(|a| a.variant(variant))
    }
}

/// [`AgentRuntime`] that replays a [`Recording`].
pub struct ReplayRuntime {
    recording: Recording,
    pace: bool,
}

impl ReplayRuntime {
    pub fn new(recording: Recording) -> Self {
        Self {
            recording,
            pace: false,
        }
    }

    /// Sleep for each run's recorded wall time so time metrics are preserved.
    pub fn with_pacing(mut self, pace: bool) -> Self {
        self.pace = pace;
        self
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }
}

async fn restore_files(run: &RecordedRun, root: &Path) -> Result<(), RuntimeError> {
    for (relative, content) in &run.files {
        let rel = Path::new(relative);
        let escapes = rel.is_absolute() || rel.components().any(|c| matches!(c, Component::ParentDir));
        if escapes {
            return Err(RuntimeError::Session(format!(
                "recorded file {relative} is outside the working directory"
            )));
        }
        let target = root.join(rel);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, content).await?;
    }
    Ok(())
}

#[async_trait]
impl AgentRuntime for ReplayRuntime {
    #[instrument(skip_all, fields(scenario = %request.scenario, variant = %request.variant, attempt = request.attempt))]
    async fn execute(
        &self,
        request: RunRequest,
        events: mpsc::UnboundedSender<AgentEvent>,
    ) -> Result<(), RuntimeError> {
        let run = self
            .recording
            .get(&request.scenario, request.variant, request.attempt)
            .ok_or_else(|| RuntimeError::MissingRecording {
                scenario: request.scenario.clone(),
                variant: request.variant.to_string(),
                attempt: request.attempt,
            })?;

        restore_files(run, &request.working_dir).await?;

        for event in &run.events {
            if events.send(event.clone()).is_err() {
                return Err(RuntimeError::Session("event receiver dropped".to_string()));
            }
        }

        if self.pace && run.wall_time_ms > 0 {
            tokio::time::sleep(Duration::from_millis(run.wall_time_ms)).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::PermissionScope;
    use std::path::PathBuf;

    const RECORDING: &str = r#"{
        "scenarios": {
            "fix-bug": [
                {
                    "baseline": {
                        "events": [{"type": "assistant_message", "content": "done"}],
                        "wall_time_ms": 1200
                    },
                    "skill": {
                        "events": [
                            {"type": "tool_execution_start", "tool_name": "edit_file"},
                            {"type": "assistant_message", "content": "fixed"}
                        ],
                        "files": {"src/lib.rs": "pub fn fixed() {}"}
                    }
                }
            ]
        }
    }"#;

    fn request(dir: &Path, variant: Variant, attempt: u32) -> RunRequest {
        RunRequest {
            scenario: "fix-bug".to_string(),
            variant,
            attempt,
            model: "m".to_string(),
            working_dir: dir.to_path_buf(),
            skill_dirs: Vec::new(),
            permissions: PermissionScope::new([PathBuf::from(dir)]),
            prompt: "p".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_recording_lookup() {
        let recording = Recording::from_json_str(RECORDING).unwrap();
        assert_eq!(recording.attempts("fix-bug"), 1);
        assert_eq!(recording.attempts("other"), 0);
        assert_eq!(recording.get("fix-bug", Variant::Baseline, 1).unwrap().wall_time_ms, 1200);
        assert!(recording.get("fix-bug", Variant::Skill, 2).is_none());
        assert!(recording.get("fix-bug", Variant::Skill, 0).is_none());
    }

    #[tokio::test]
    async fn test_replay_streams_events_and_restores_files() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = ReplayRuntime::new(Recording::from_json_str(RECORDING).unwrap());
        let (tx, mut rx) = mpsc::unbounded_channel();

        runtime.execute(request(dir.path(), Variant::Skill, 1), tx).await.unwrap();

        let mut received = Vec::new();
        while let Ok(event) = rx.try_recv() {
            received.push(event);
        }
        assert_eq!(received.len(), 2);
        let restored = std::fs::read_to_string(dir.path().join("src/lib.rs")).unwrap();
        assert_eq!(restored, "pub fn fixed() {}");
    }

    #[tokio::test]
    async fn test_missing_attempt_is_runtime_error() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = ReplayRuntime::new(Recording::from_json_str(RECORDING).unwrap());
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = runtime
            .execute(request(dir.path(), Variant::Baseline, 3), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::MissingRecording { attempt: 3, .. }));
    }

    #[tokio::test]
    async fn test_escaping_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut run = RecordedRun::default();
        run.files.insert("../outside.txt".to_string(), "x".to_string());
        let err = restore_files(&run, dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("outside the working directory"));
    }
}
