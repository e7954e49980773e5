//! The evaluator boundary: a model service that accepts a system
//! instruction plus a prompt and returns free text.
//!
//! [`Evaluator`] opens isolated sessions; each session is used for exactly
//! one judge attempt and then closed. [`HttpEvaluator`] talks to any
//! OpenAI-compatible chat-completions endpoint.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::debug;

use super::error::JudgeError;

/// Kind of action an evaluator session asks permission for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    Read,
    Shell,
    Write,
    Network,
}

/// A permission request raised by an evaluator session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequest {
    pub kind: PermissionKind,
    /// Target path (or working directory for shell). Relative paths are
    /// resolved against the first allowed root.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    Approved,
    Denied { reason: String },
}

impl PermissionDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, PermissionDecision::Approved)
    }
}

/// Read-only access confined to a set of directories.
///
/// Reads and shell actions are approved only inside an allowed root;
/// writes and network access are always denied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionScope {
    roots: Vec<PathBuf>,
}

impl PermissionScope {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().map(|r| normalize(&r)).collect(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn permits(&self, request: &PermissionRequest) -> PermissionDecision {
        match request.kind {
            PermissionKind::Write => PermissionDecision::Denied {
                reason: "write access is not granted to the judge".to_string(),
            },
            PermissionKind::Network => PermissionDecision::Denied {
                reason: "network access is not granted to the judge".to_string(),
            },
            PermissionKind::Read | PermissionKind::Shell => {
                let Some(first_root) = self.roots.first() else {
                    return PermissionDecision::Denied {
                        reason: "no directories are readable in this session".to_string(),
                    };
                };
                let target = match &request.path {
                    Some(path) if path.is_absolute() => normalize(path),
                    Some(path) => normalize(&first_root.join(path)),
                    None if request.kind == PermissionKind::Shell => first_root.clone(),
                    None => {
                        return PermissionDecision::Denied {
                            reason: "read request without a path".to_string(),
                        }
                    }
                };
                if self.roots.iter().any(|root| target.starts_with(root)) {
                    PermissionDecision::Approved
                } else {
                    PermissionDecision::Denied {
                        reason: format!("{} is outside the allowed directories", target.display()),
                    }
                }
            }
        }
    }
}

/// Lexically resolve `.` and `..` so that `root/../etc` cannot escape `root`.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Per-session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub model: String,
    pub system_instruction: String,
    pub permissions: PermissionScope,
}

/// A model service that can open isolated judging sessions.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn open_session(&self, config: SessionConfig) -> Result<Box<dyn EvaluatorSession>, JudgeError>;
}

/// One isolated conversation with the evaluator.
///
/// Dropping a session must release its resources; [`close`](Self::close)
/// is the graceful path and is always attempted after a send.
#[async_trait]
pub trait EvaluatorSession: Send {
    async fn send(&mut self, prompt: &str) -> Result<String, JudgeError>;
    async fn close(&mut self) -> Result<(), JudgeError>;
}

/// Connection settings for [`HttpEvaluator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpEvaluatorConfig {
    /// Full chat-completions URL.
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_temperature() -> f32 {
    0.0
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl HttpEvaluatorConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Evaluator backed by an OpenAI-compatible chat-completions endpoint.
///
/// The HTTP client is created on first use and shared by all sessions.
/// After [`shutdown`](Self::shutdown) no new sessions can be opened.
pub struct HttpEvaluator {
    config: HttpEvaluatorConfig,
    client: OnceCell<reqwest::Client>,
    closed: AtomicBool,
}

impl HttpEvaluator {
    pub fn new(config: HttpEvaluatorConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    async fn client(&self) -> Result<&reqwest::Client, JudgeError> {
        self.client
            .get_or_try_init(|| async {
                reqwest::Client::builder()
                    .connect_timeout(Duration::from_millis(self.config.connect_timeout_ms))
                    .build()
                    .map_err(JudgeError::from)
            })
            .await
    }

    /// Refuse further sessions. Sessions already open finish normally.
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(endpoint = %self.config.endpoint, "http evaluator shut down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Evaluator for HttpEvaluator {
    async fn open_session(&self, config: SessionConfig) -> Result<Box<dyn EvaluatorSession>, JudgeError> {
        if self.is_shut_down() {
            return Err(JudgeError::EvaluatorClosed);
        }
        let client = self.client().await?.clone();
        // The HTTP endpoint has no tool access; the scope is only recorded.
        debug!(
            model = %config.model,
            readable_roots = ?config.permissions.roots(),
            "evaluator session opened"
        );
        Ok(Box::new(HttpSession {
            client,
            config: self.config.clone(),
            model: config.model,
            system_instruction: config.system_instruction,
            closed: false,
        }))
    }
}

struct HttpSession {
    client: reqwest::Client,
    config: HttpEvaluatorConfig,
    model: String,
    system_instruction: String,
    closed: bool,
}

#[async_trait]
impl EvaluatorSession for HttpSession {
    async fn send(&mut self, prompt: &str) -> Result<String, JudgeError> {
        if self.closed {
            return Err(JudgeError::EvaluatorClosed);
        }

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.system_instruction },
                { "role": "user", "content": prompt },
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(JudgeError::Transport(format!("evaluator returned {status}: {text}")));
        }

        let payload: serde_json::Value = response.json().await?;
        extract_message_content(&payload)
    }

    async fn close(&mut self) -> Result<(), JudgeError> {
        self.closed = true;
        Ok(())
    }
}

/// Pull `choices[0].message.content` out of a chat-completions payload.
pub fn extract_message_content(payload: &serde_json::Value) -> Result<String, JudgeError> {
    let content = payload
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .ok_or_else(|| JudgeError::MalformedResponse("missing choices[0].message.content".to_string()))?;

    if content.trim().is_empty() {
        return Err(JudgeError::MalformedResponse("evaluator returned an empty reply".to_string()));
    }
    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> PermissionScope {
        PermissionScope::new([PathBuf::from("/tmp/run-a"), PathBuf::from("/skills/demo")])
    }

    fn request(kind: PermissionKind, path: Option<&str>) -> PermissionRequest {
        PermissionRequest {
            kind,
            path: path.map(PathBuf::from),
        }
    }

    #[test]
    fn test_read_inside_roots_approved() {
        let s = scope();
        assert!(s.permits(&request(PermissionKind::Read, Some("/tmp/run-a/src/lib.rs"))).is_approved());
        assert!(s.permits(&request(PermissionKind::Read, Some("/skills/demo/SKILL.md"))).is_approved());
        assert!(s.permits(&request(PermissionKind::Read, Some("src/main.rs"))).is_approved());
    }

    #[test]
    fn test_read_escape_denied() {
        let s = scope();
        assert!(!s.permits(&request(PermissionKind::Read, Some("/etc/passwd"))).is_approved());
        assert!(!s.permits(&request(PermissionKind::Read, Some("/tmp/run-a/../run-b/x"))).is_approved());
        assert!(!s.permits(&request(PermissionKind::Read, Some("../../etc/passwd"))).is_approved());
        assert!(!s.permits(&request(PermissionKind::Read, None)).is_approved());
    }

    #[test]
    fn test_shell_confined_to_roots() {
        let s = scope();
        assert!(s.permits(&request(PermissionKind::Shell, None)).is_approved());
        assert!(s.permits(&request(PermissionKind::Shell, Some("/tmp/run-a"))).is_approved());
        assert!(!s.permits(&request(PermissionKind::Shell, Some("/"))).is_approved());
    }

    #[test]
    fn test_write_and_network_always_denied() {
        let s = scope();
        assert!(!s.permits(&request(PermissionKind::Write, Some("/tmp/run-a/x"))).is_approved());
        assert!(!s.permits(&request(PermissionKind::Network, None)).is_approved());
    }

    #[test]
    fn test_empty_scope_denies_everything() {
        let s = PermissionScope::default();
        assert!(!s.permits(&request(PermissionKind::Shell, None)).is_approved());
    }

    #[test]
    fn test_extract_message_content() {
        let payload = json!({"choices": [{"message": {"role": "assistant", "content": "{\"overall_score\": 4}"}}]});
        assert_eq!(extract_message_content(&payload).unwrap(), "{\"overall_score\": 4}");

        let empty = json!({"choices": [{"message": {"content": "  "}}]});
        assert!(matches!(extract_message_content(&empty), Err(JudgeError::MalformedResponse(_))));

        let missing = json!({"error": "overloaded"});
        assert!(extract_message_content(&missing).is_err());
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_sessions() {
        let evaluator = HttpEvaluator::new(HttpEvaluatorConfig::new("http://127.0.0.1:9/v1/chat/completions"));
        evaluator.shutdown();
        let result = evaluator
            .open_session(SessionConfig {
                model: "m".to_string(),
                system_instruction: "s".to_string(),
                permissions: PermissionScope::default(),
            })
            .await;
        assert!(matches!(result, Err(JudgeError::EvaluatorClosed)));
    }
}
