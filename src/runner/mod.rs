/**
 * Model Session Runner
 *
 * DESIGN DECISION: The Runner is a trait (`ModelSession`), not a concrete client, so the
 * actual model vendor integration stays external
 * WHY: the underlying model client itself is deliberately out of scope; the core only needs
 * the streaming/approval/cancellation *contract* a session honours
 *
 * PATTERN: `#[async_trait]` method returning `crate::error::Result<T>`, grounded on an
 * async-trait domain-agent pattern; retry back-off and cancellation-aware sleeping grounded
 * on a `tokio::select!`-based client idiom
 */

mod backoff;
mod cancellation;
mod tool_call;

pub use backoff::{abortable_sleep, compute_retry_delay};
pub use cancellation::CancellationToken;
pub use tool_call::{intercept_tool_calls, InterceptedToolCall};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::error::Result;
use crate::events::{EngineEvent, EventSender};
use crate::model::approval::{ApprovalRegistry, ApprovalRequest, ApprovalRequestInfo, ApprovalResolution};
use crate::model::task::TaskId;
use crate::model::todo::TodoMutation;

/// One incremental event a session produces while running.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Text(String),
    ToolUse { name: String, arguments: Option<serde_json::Value> },
    ToolResult { name: String, result: serde_json::Value },
    /// Parsed `"<used>:<max>"` telemetry. Malformed payloads never reach this variant - see
    /// `parse_context_telemetry`.
    Context { used_tokens: u64, max_tokens: u64 },
    Todo(TodoMutation),
    Error(String),
}

/// Parse the `"<usedTokens>:<maxTokens>"` context telemetry string. Malformed input is
/// ignored, i.e. yields `None` rather than a default.
pub fn parse_context_telemetry(raw: &str) -> Option<(u64, u64)> {
    let (used, max) = raw.split_once(':')?;
    Some((used.trim().parse().ok()?, max.trim().parse().ok()?))
}

#[derive(Debug, Clone, Default)]
pub struct UsageCounters {
    pub used_tokens: u64,
    pub max_tokens: u64,
    pub turns: u32,
}

/// Everything a session needs to run one stage invocation.
pub struct RunnerInput {
    pub task_id: TaskId,
    pub prompt: String,
    pub model: String,
    pub working_dir: PathBuf,
    pub max_turns: u32,
    pub timeout: Duration,
    pub resume_handle: Option<String>,
    /// Attempt number within the engine's retry budget; the Runner does not track or bound
    /// this itself.
    pub attempt: u32,
}

/// The terminating result of one session run.
#[derive(Debug, Clone)]
pub enum RunnerOutcome {
    Completed { text: String, usage: UsageCounters, resume_handle: Option<String> },
    /// Cancellation propagated to completion; not an error.
    Cancelled,
    /// A retryable transient failure (rate-limit, network). `retry_after_secs` mirrors the
    /// server's `Retry-After` header when present.
    Retryable { retry_after_secs: Option<u64>, message: String },
    /// Non-recoverable within this attempt.
    Failed { message: String },
}

/// The adapter between the stage engine and an external model.
#[async_trait]
pub trait ModelSession: Send + Sync {
    /// Drive one invocation. Stream events are pushed to `stream_tx` as they occur;
    /// tool-use approvals are registered on `approvals` and awaited there. `cancellation`
    /// must be honoured promptly: outstanding I/O dropped, outstanding approvals resolved
    /// deny, return `RunnerOutcome::Cancelled` without further stream events.
    async fn run(
        &self,
        input: RunnerInput,
        stream_tx: mpsc::UnboundedSender<StreamEvent>,
        approvals: Arc<Mutex<ApprovalRegistry>>,
        events: EventSender,
        session_id: String,
        cancellation: CancellationToken,
    ) -> Result<RunnerOutcome>;
}

/// Register a tool-use approval request, publish it on the event channel so a presentation
/// layer can act on it, and await its resolution, honouring cancellation.
pub async fn request_approval(
    approvals: &Arc<Mutex<ApprovalRegistry>>,
    events: &EventSender,
    session_id: String,
    task_id: TaskId,
    tool_name: String,
    tool_input: serde_json::Value,
    cancellation: &CancellationToken,
) -> ApprovalResolution {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let request_id = uuid::Uuid::new_v4().to_string();
    {
        let mut registry = approvals.lock().await;
        let request = ApprovalRequest {
            request_id: request_id.clone(),
            session_id: session_id.clone(),
            task_id,
            tool_name,
            tool_input,
            resolver: tx,
        };
        let _ = events.send(EngineEvent::ApprovalRequest(ApprovalRequestInfo::from(&request)));
        registry.insert(request);
    }

    tokio::select! {
        resolution = rx => resolution.unwrap_or(ApprovalResolution { allow: false, message: Some("session ended".to_string()) }),
        _ = cancellation.cancelled() => {
            let mut registry = approvals.lock().await;
            registry.deny_all_for_session(&session_id, "session ended");
            ApprovalResolution { allow: false, message: Some("session ended".to_string()) }
        }
    }
}

/// Run `attempt_fn` with back-off on retryable outcomes, bounded by `max_attempts`. The
/// retry counter is owned by the caller; the Runner itself tracks no state across attempts.
pub async fn run_with_retry<F, Fut>(
    max_attempts: u32,
    cancellation: &CancellationToken,
    mut attempt_fn: F,
) -> Result<RunnerOutcome>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<RunnerOutcome>>,
{
    let mut attempt = 0;
    loop {
        let outcome = attempt_fn(attempt).await?;
        match outcome {
            RunnerOutcome::Retryable { retry_after_secs, message } if attempt + 1 < max_attempts => {
                eprintln!("runner: retryable failure on attempt {attempt} ({message}), backing off");
                let delay = compute_retry_delay(retry_after_secs, attempt);
                abortable_sleep(delay, cancellation).await;
                if cancellation.is_cancelled() {
                    return Ok(RunnerOutcome::Cancelled);
                }
                attempt += 1;
            }
            RunnerOutcome::Retryable { message, .. } => {
                return Ok(RunnerOutcome::Failed { message: format!("retries exhausted: {message}") });
            }
            other => return Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_context_telemetry_valid() {
        assert_eq!(parse_context_telemetry("1200:8000"), Some((1200, 8000)));
    }

    #[test]
    fn test_parse_context_telemetry_malformed_ignored() {
        assert_eq!(parse_context_telemetry("not-a-ratio"), None);
        assert_eq!(parse_context_telemetry("1200"), None);
    }

    #[tokio::test]
    async fn test_run_with_retry_stops_on_success() {
        let token = CancellationToken::new();
        let calls = std::sync::atomic::AtomicU32::new(0);
        let result = run_with_retry(3, &token, |_attempt| {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Ok(RunnerOutcome::Completed { text: "done".into(), usage: UsageCounters::default(), resume_handle: None }) }
        })
        .await
        .unwrap();

        assert!(matches!(result, RunnerOutcome::Completed { .. }));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_with_retry_exhausts_attempts() {
        let token = CancellationToken::new();
        let result = run_with_retry(2, &token, |_attempt| async {
            Ok(RunnerOutcome::Retryable { retry_after_secs: Some(0), message: "rate limited".into() })
        })
        .await
        .unwrap();

        match result {
            RunnerOutcome::Failed { message } => assert!(message.contains("retries exhausted")),
            _ => panic!("expected Failed after exhausting retries"),
        }
    }

    #[tokio::test]
    async fn test_request_approval_publishes_event_and_resolves() {
        let approvals = Arc::new(Mutex::new(ApprovalRegistry::new()));
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let cancellation = CancellationToken::new();

        let approvals_clone = approvals.clone();
        let waiter = tokio::spawn(async move {
            request_approval(
                &approvals_clone,
                &events_tx,
                "session-1".to_string(),
                1,
                "write_file".to_string(),
                serde_json::json!({"path": "a.txt"}),
                &cancellation,
            )
            .await
        });

        let published = events_rx.recv().await.unwrap();
        let request_id = match published {
            EngineEvent::ApprovalRequest(info) => {
                assert_eq!(info.task_id, 1);
                assert_eq!(info.tool_name, "write_file");
                info.request_id
            }
            other => panic!("expected ApprovalRequest, got {:?}", other),
        };

        assert!(approvals.lock().await.len() == 1);
        approvals.lock().await.resolve(&request_id, ApprovalResolution { allow: true, message: None });

        let resolution = waiter.await.unwrap();
        assert!(resolution.allow);
    }

    #[tokio::test]
    async fn test_request_approval_cancellation_denies_whole_session() {
        let approvals = Arc::new(Mutex::new(ApprovalRegistry::new()));
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let resolution = request_approval(
            &approvals,
            &events_tx,
            "session-2".to_string(),
            1,
            "write_file".to_string(),
            serde_json::json!({}),
            &cancellation,
        )
        .await;

        assert!(!resolution.allow);
        assert!(approvals.lock().await.is_empty());
        assert!(matches!(events_rx.recv().await, Some(EngineEvent::ApprovalRequest(_))));
    }
}
