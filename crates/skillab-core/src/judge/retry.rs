//! Bounded retry with per-attempt timeout and exponential backoff.
//!
//! Every judge round-trip goes through [`retry_bounded`]; the policy is
//! testable without any evaluator behind it.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::JudgeError;
use crate::metrics::METRICS;
use crate::obs;

/// Retry policy for evaluator calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Maximum wall-clock time for a single attempt (milliseconds).
    pub timeout_ms: u64,
    /// Maximum number of retries (0 = run once).
    pub max_retries: u32,
    /// Base delay for exponential backoff between attempts (milliseconds).
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            max_retries: 2,
            backoff_base_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(1 << (attempt - 1).min(16)))
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up.
///
/// `op` receives the 1-based attempt number. Each attempt is bounded by
/// `policy.timeout_ms`; a timed-out attempt is dropped and counted as a
/// failure. On exhaustion every failure is returned in
/// [`JudgeError::RetriesExhausted`].
pub async fn retry_bounded<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, JudgeError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts();
    let timeout = Duration::from_millis(policy.timeout_ms);
    let mut failures = Vec::new();

    for attempt in 1..=max_attempts {
        let failure = match tokio::time::timeout(timeout, op(attempt)).await {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    debug!(label, attempt, "judge call recovered after retry");
                }
                return Ok(value);
            }
            Ok(Err(err)) => err.to_string(),
            Err(_elapsed) => {
                METRICS.inc_judge_timeouts();
                JudgeError::Timeout {
                    timeout_ms: policy.timeout_ms,
                }
                .to_string()
            }
        };

        obs::emit_judge_attempt_failed(label, attempt, max_attempts, &failure);
        failures.push(format!("attempt {attempt}: {failure}"));

        if attempt < max_attempts {
            METRICS.inc_judge_retries();
            tokio::time::sleep(policy.backoff(attempt)).await;
        }
    }

    Err(JudgeError::RetriesExhausted {
        label: label.to_string(),
        attempts: max_attempts,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout_ms: 1_000,
            max_retries,
            backoff_base_ms: 1,
        }
    }

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            backoff_base_ms: 100,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let result = retry_bounded(&fast_policy(2), "t", |_| async { Ok::<_, String>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_recovers_on_third_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_bounded(&fast_policy(2), "t", {
            let calls = calls.clone();
            move |attempt| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::Relaxed);
                    if attempt < 3 {
                        Err("transient")
                    } else {
                        Ok(attempt)
                    }
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_accumulates_failures() {
        let err = retry_bounded(&fast_policy(2), "judge[skill]", |attempt| async move {
            Err::<(), _>(format!("bad reply {attempt}"))
        })
        .await
        .unwrap_err();

        match err {
            JudgeError::RetriesExhausted {
                label,
                attempts,
                failures,
            } => {
                assert_eq!(label, "judge[skill]");
                assert_eq!(attempts, 3);
                assert_eq!(failures.len(), 3);
                assert_eq!(failures[2], "attempt 3: bad reply 3");
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failed_attempt() {
        let policy = RetryPolicy {
            timeout_ms: 50,
            max_retries: 1,
            backoff_base_ms: 10,
        };
        let err = retry_bounded(&policy, "t", |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, String>(())
        })
        .await
        .unwrap_err();

        match err {
            JudgeError::RetriesExhausted { failures, .. } => {
                assert_eq!(failures.len(), 2);
                assert!(failures[0].contains("timed out after 50ms"));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }
}
