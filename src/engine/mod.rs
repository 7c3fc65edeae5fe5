/**
 * Pipeline Engine
 *
 * DESIGN DECISION: One `PipelineEngine` driving every task's state machine, with per-task
 * cancellation tokens in a shared map so `pause`/`pipeline:pause-all` commands can interrupt
 * an in-flight session cooperatively
 * WHY: there are no OS threads in this design; per-task pipelines execute independently and
 * may overlap in time, and the transition protocol is a loop (recurse at step 1 for the new
 * current stage) rather than a one-shot call
 *
 * PATTERN: state machine grounded on an executor's status-enum pattern, generalized from
 * sprint-task states to pipeline-stage states; the overall drive loop
 * grounded on task_scheduler/scheduler.rs's main loop, converted to a real `async fn`
 */

mod state;
mod workshop;

pub use state::{can_transition, Denial};
pub use workshop::{maybe_autoname_session, DEFAULT_WORKSHOP_TITLE};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};

use crate::config::ConfigResolver;
use crate::error::{Error, Result};
use crate::events::{EngineEvent, EventSender, StatusKind, StreamKind};
use crate::model::approval::ApprovalRegistry;
use crate::model::group::{TaskGroup, WorkOrder};
use crate::model::handoff::{Handoff, HandoffStatus};
use crate::model::stage::{next_stage, stage_config, StageKind};
use crate::model::stage_output::{
    CodeReviewOutput, DesignReviewOutput, ImplementationOutput, PlanOutput, StageOutput, VerifyOutput,
};
use crate::model::task::{ActivityKind, Task, TaskId, TaskStatus};
use crate::persistence::{PersistenceStore, TaskPatch};
use crate::runner::{run_with_retry, CancellationToken, ModelSession, RunnerInput, RunnerOutcome, StreamEvent};
use crate::template::{self, SiblingSummary, TemplateSource};

const RETRY_MAX_ATTEMPTS: u32 = 3;
const STALL_THRESHOLD: Duration = Duration::from_secs(60);
const DEBOUNCE_INTERVAL: Duration = Duration::from_secs(2);
const WATCHDOG_TICK: Duration = Duration::from_secs(5);

/// Outcome of running one stage's session to completion.
enum StageResult {
    Completed { text: String },
    TimedOut { text: String },
    Cancelled,
    SessionFailed { message: String },
}

/// What happens after a stage settles successfully.
enum GateDecision {
    AwaitingReview,
    Advanced(StageKind),
    Done,
    Blocked(Denial),
}

pub struct PipelineEngine {
    store: Arc<PersistenceStore>,
    events: EventSender,
    runner: Arc<dyn ModelSession>,
    templates: Arc<dyn TemplateSource>,
    approvals: Arc<Mutex<ApprovalRegistry>>,
    config: ConfigResolver,
    working_dir: PathBuf,
    sessions: Mutex<HashMap<TaskId, CancellationToken>>,
}

impl PipelineEngine {
    pub fn new(
        store: Arc<PersistenceStore>,
        events: EventSender,
        runner: Arc<dyn ModelSession>,
        templates: Arc<dyn TemplateSource>,
        approvals: Arc<Mutex<ApprovalRegistry>>,
        config: ConfigResolver,
        working_dir: PathBuf,
    ) -> Self {
        Self { store, events, runner, templates, approvals, config, working_dir, sessions: Mutex::new(HashMap::new()) }
    }

    /// Start a task from its tier's first stage.
    pub async fn start(&self, task_id: TaskId) -> Result<()> {
        let mut task = self.store.get_task(task_id).ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
        let first = crate::model::stage::first_stage(task.tier);
        task.status = TaskStatus::Running(first);
        task.started_at = Some(Utc::now());
        task.log(ActivityKind::StageStarted, format!("{:?}", first));
        self.store.replace_task(&task)?;
        self.advance(task_id).await
    }

    /// Drive `task_id` through as many stages as the gate protocol allows without stopping.
    pub async fn advance(&self, task_id: TaskId) -> Result<()> {
        loop {
            let mut task = self.store.get_task(task_id).ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
            let stage = match task.status {
                TaskStatus::Running(s) => s,
                _ => return Ok(()),
            };

            let group_ctx = self.group_context(&task);
            let prompt = template::assemble_prompt(
                self.templates.as_ref(),
                &task,
                stage,
                group_ctx.as_ref().map(|(g, w, s)| (g, w.as_ref(), s.as_slice())),
            )?;

            let result = self.drive_stage(&task, stage, prompt).await?;

            match result {
                StageResult::Cancelled => return Ok(()),
                StageResult::SessionFailed { message } => {
                    self.fail_stage(&mut task, stage, message, false)?;
                    return Ok(());
                }
                StageResult::TimedOut { text } => {
                    let timeout_ms = self.config.resolve_timeout_ms(task.tier, stage);
                    self.fail_stage(&mut task, stage, text, true)?;
                    self.events.send_ignore(EngineEvent::Status {
                        task_id,
                        kind: StatusKind::Error,
                        stage: Some(stage),
                        reason: Some(format!("timed out after {timeout_ms}ms")),
                    });
                    return Ok(());
                }
                StageResult::Completed { text } => {
                    let decision = self.finish_stage_success(&mut task, stage, &text);
                    self.store.replace_task(&task)?;

                    match decision {
                        GateDecision::AwaitingReview => {
                            self.events.send_ignore(EngineEvent::Status {
                                task_id,
                                kind: StatusKind::AwaitingReview,
                                stage: Some(stage),
                                reason: None,
                            });
                            return Ok(());
                        }
                        GateDecision::Done => {
                            self.events.send_ignore(EngineEvent::Status {
                                task_id,
                                kind: StatusKind::Complete,
                                stage: Some(stage),
                                reason: None,
                            });
                            return Ok(());
                        }
                        GateDecision::Blocked(denial) => {
                            self.events.send_ignore(EngineEvent::Status {
                                task_id,
                                kind: StatusKind::CircuitBreaker,
                                stage: Some(stage),
                                reason: Some(format!("{:?}", denial)),
                            });
                            return Ok(());
                        }
                        GateDecision::Advanced(_next) => {
                            self.events.send_ignore(EngineEvent::Status {
                                task_id,
                                kind: StatusKind::Start,
                                stage: Some(stage),
                                reason: None,
                            });
                            // loop continues: advance() re-enters at the top for the new stage
                        }
                    }
                }
            }
        }
    }

    /// External `pipeline:approve` - satisfy the gate for a task in `awaiting_review`.
    pub async fn approve(&self, task_id: TaskId) -> Result<()> {
        let mut task = self.store.get_task(task_id).ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
        let stage = match task.status {
            TaskStatus::AwaitingReview(s) => s,
            _ => return Err(Error::InvalidTransition(format!("task {task_id} is not awaiting review"))),
        };

        match self.transition_forward(&mut task, stage) {
            GateDecision::Done | GateDecision::Advanced(_) | GateDecision::Blocked(_) => {}
            GateDecision::AwaitingReview => unreachable!("transition_forward never yields AwaitingReview"),
        }
        self.store.replace_task(&task)?;
        self.advance(task_id).await
    }

    /// External `pipeline:reject` - append a `needs_intervention` hand-off, increment the
    /// rejection counter, and restart the same stage.
    pub async fn reject(&self, task_id: TaskId, feedback: impl Into<String>) -> Result<()> {
        let mut task = self.store.get_task(task_id).ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
        let stage = match task.status {
            TaskStatus::AwaitingReview(s) => s,
            _ => return Err(Error::InvalidTransition(format!("task {task_id} is not awaiting review"))),
        };

        let feedback = feedback.into();
        let mut handoff = Handoff::synthesize(stage, "reviewer", "human", HandoffStatus::NeedsIntervention, &feedback);
        handoff.next_stage_needs = feedback.clone();
        task.append_handoff(handoff);
        let count = task.increment_review_count(stage);
        task.log(ActivityKind::Rejected, format!("{:?} rejected: {feedback}", stage));
        task.stage_outputs.remove(&stage);

        if count >= crate::model::task::CIRCUIT_BREAKER_LIMIT {
            task.status = TaskStatus::Blocked;
            task.log(ActivityKind::CircuitBreakerTripped, format!("{:?} rejected {count} times", stage));
            self.store.replace_task(&task)?;
            self.events.send_ignore(EngineEvent::Status {
                task_id,
                kind: StatusKind::CircuitBreaker,
                stage: Some(stage),
                reason: Some(format!("{count} rejections")),
            });
            return Ok(());
        }

        task.status = TaskStatus::Running(stage);
        self.store.replace_task(&task)?;
        self.advance(task_id).await
    }

    /// External `pipeline:pause` - signal the task's active session to stop at the next safe
    /// point, preserving stage and resume handle.
    pub async fn pause(&self, task_id: TaskId, reason: impl Into<String>) -> Result<()> {
        let mut task = self.store.get_task(task_id).ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
        if let Some(token) = self.sessions.lock().await.get(&task_id) {
            token.cancel();
        }
        task.pause_reason = Some(reason.into());
        task.paused_from_status = Some(Box::new(task.status));
        task.status = TaskStatus::Paused;
        self.store.replace_task(&task)?;
        self.events.send_ignore(EngineEvent::Status { task_id, kind: StatusKind::Pause, stage: None, reason: task.pause_reason.clone() });
        Ok(())
    }

    /// External `pipeline:resume` - restore the status a pause came from and continue driving.
    pub async fn resume(&self, task_id: TaskId) -> Result<()> {
        let mut task = self.store.get_task(task_id).ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
        if let Some(prior) = task.paused_from_status.take() {
            task.status = *prior;
        }
        task.pause_reason = None;
        self.store.replace_task(&task)?;
        self.advance(task_id).await
    }

    fn group_context(&self, task: &Task) -> Option<(TaskGroup, Option<WorkOrder>, Vec<SiblingSummary>)> {
        let group_id = task.group_id?;
        let group = self.store.get_group(group_id)?;
        let siblings = self
            .store
            .list_tasks_by_project(Some(group_id))
            .into_iter()
            .filter(|t| t.id != task.id)
            .map(|t| SiblingSummary {
                id: t.id,
                title: t.title,
                files_touched: t
                    .stage_outputs
                    .get(&StageKind::Implement)
                    .and_then(|o| match o {
                        StageOutput::Implementation(impl_out) => Some(impl_out.files_changed.clone()),
                        _ => None,
                    })
                    .unwrap_or_default(),
            })
            .collect();
        Some((group, task.work_order.clone(), siblings))
    }

    /// Mutates `task` in place: appends the hand-off, records the stage output, clears
    /// transient session fields, and decides the gate outcome.
    fn finish_stage_success(&self, task: &mut Task, stage: StageKind, text: &str) -> GateDecision {
        let parsed = template::parse_tail(text);
        let model_label = self.config.resolve_model(task.tier, stage);

        let handoff = match parsed {
            Some(p) => Handoff {
                stage,
                agent_label: "model".to_string(),
                model_label: model_label.clone(),
                timestamp: Utc::now(),
                status: p.status.unwrap_or(HandoffStatus::Completed),
                summary: p.summary,
                key_decisions: p.key_decisions,
                open_questions: p.open_questions,
                files_modified: p.files_modified,
                next_stage_needs: p.next_stage_needs,
                warnings: p.warnings,
                status_note: p.status_note,
            },
            None => Handoff::synthesize(stage, "model", model_label, HandoffStatus::Completed, text),
        };

        task.append_handoff(handoff);
        task.stage_outputs.insert(stage, build_stage_output(stage, text));
        task.log(ActivityKind::StageCompleted, format!("{:?}", stage));
        task.pending_content = None;
        task.active_session = None;
        task.current_agent = None;

        // `pauses` has no layered override - whether a stage gates on human review is a
        // compile-time property of the stage, not something project/global settings tune.
        let pauses = stage_config(task.tier, stage).map(|c| c.pauses).unwrap_or(false);
        if pauses {
            let score = task.stage_outputs.get(&stage).and_then(|o| o.score());
            let threshold = self.config.resolve_auto_approve_threshold(task.tier, stage);
            let auto_approved = task.auto_mode && threshold.is_some() && score.is_some() && score.unwrap() >= threshold.unwrap();
            if !auto_approved {
                task.status = TaskStatus::AwaitingReview(stage);
                return GateDecision::AwaitingReview;
            }
        }

        self.transition_forward(task, stage)
    }

    /// Evaluate the next stage (or terminal `done`) and apply it to `task`.
    fn transition_forward(&self, task: &mut Task, stage: StageKind) -> GateDecision {
        match next_stage(task.tier, stage) {
            None => {
                task.status = TaskStatus::Done;
                task.completed_at = Some(Utc::now());
                task.log(ActivityKind::StageCompleted, "task completed".to_string());
                GateDecision::Done
            }
            Some(next) => match can_transition(task, next) {
                Ok(()) => {
                    task.stage_outputs.remove(&next);
                    task.status = TaskStatus::Running(next);
                    GateDecision::Advanced(next)
                }
                Err(denial) => {
                    task.status = TaskStatus::Blocked;
                    task.log(ActivityKind::CircuitBreakerTripped, format!("{:?}", denial));
                    GateDecision::Blocked(denial)
                }
            },
        }
    }

    fn fail_stage(&self, task: &mut Task, stage: StageKind, message: String, timed_out: bool) -> Result<()> {
        let model_label = self.config.resolve_model(task.tier, stage);
        let mut handoff = Handoff::synthesize(stage, "model", model_label, HandoffStatus::Blocked, &message);
        if timed_out {
            let timeout_ms = self.config.resolve_timeout_ms(task.tier, stage);
            handoff.mark_timed_out(timeout_ms);
        } else {
            handoff.warnings = message.clone();
        }
        task.append_handoff(handoff);
        task.log(ActivityKind::Rejected, format!("{:?} failed: {message}", stage));
        task.pending_content = None;
        task.active_session = None;
        task.status = TaskStatus::Blocked;
        self.store.replace_task(task)
    }

    /// Run one stage's session: stream consumption, 2 s-debounced partial-content durability,
    /// 60 s stall detection, and the advisory per-stage timeout.
    async fn drive_stage(&self, task: &Task, stage: StageKind, prompt: String) -> Result<StageResult> {
        if stage_config(task.tier, stage).is_none() {
            return Err(Error::InvalidTransition(format!("no config for {:?}", stage)));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let cancellation = CancellationToken::new();
        self.sessions.lock().await.insert(task.id, cancellation.clone());

        let listener = {
            let store = self.store.clone();
            let events = self.events.clone();
            let task_id = task.id;
            tokio::spawn(async move { stream_listener(rx, store, events, task_id, stage).await })
        };

        let resume_handle = task.active_session.clone();
        let runner = self.runner.clone();
        let approvals = self.approvals.clone();
        let events = self.events.clone();
        let working_dir = self.working_dir.clone();
        let task_id = task.id;
        let model = self.config.resolve_model(task.tier, stage);
        let max_turns = self.config.resolve_max_turns(task.tier, stage);
        let timeout = Duration::from_millis(self.config.resolve_timeout_ms(task.tier, stage));

        let run_future = run_with_retry(RETRY_MAX_ATTEMPTS, &cancellation, |attempt| {
            let input = RunnerInput {
                task_id,
                prompt: prompt.clone(),
                model: model.clone(),
                working_dir: working_dir.clone(),
                max_turns,
                timeout,
                resume_handle: resume_handle.clone(),
                attempt,
            };
            let stream_tx = tx.clone();
            let approvals = approvals.clone();
            let events = events.clone();
            let runner = runner.clone();
            let session_id = format!("task-{task_id}-{stage:?}");
            let token = cancellation.clone();
            async move { runner.run(input, stream_tx, approvals, events, session_id, token).await }
        });

        let timed_out;
        let outcome = tokio::select! {
            outcome = run_future => { timed_out = false; outcome? }
            _ = tokio::time::sleep(timeout) => {
                cancellation.cancel();
                timed_out = true;
                RunnerOutcome::Cancelled
            }
        };

        drop(tx);
        self.sessions.lock().await.remove(&task.id);
        let accumulated = listener.await.unwrap_or_default();

        Ok(match outcome {
            RunnerOutcome::Completed { text, .. } if !timed_out => StageResult::Completed { text: if text.is_empty() { accumulated } else { text } },
            RunnerOutcome::Failed { message } if !timed_out => StageResult::SessionFailed { message },
            _ if timed_out => StageResult::TimedOut { text: accumulated },
            _ => StageResult::Cancelled,
        })
    }
}

async fn stream_listener(
    mut rx: mpsc::UnboundedReceiver<StreamEvent>,
    store: Arc<PersistenceStore>,
    events: EventSender,
    task_id: TaskId,
    stage: StageKind,
) -> String {
    let mut accumulated = String::new();
    let mut last_flush = tokio::time::Instant::now();
    let mut last_activity = tokio::time::Instant::now();
    let mut stalled_emitted = false;
    let mut ticker = tokio::time::interval(WATCHDOG_TICK);

    loop {
        tokio::select! {
            maybe_event = rx.recv() => {
                match maybe_event {
                    Some(StreamEvent::Text(t)) => {
                        accumulated.push_str(&t);
                        last_activity = tokio::time::Instant::now();
                        stalled_emitted = false;
                        events.send_ignore(EngineEvent::Stream { task_id, kind: StreamKind::Text, content: Some(t), tool_name: None, tool_input: None });
                        if last_flush.elapsed() >= DEBOUNCE_INTERVAL {
                            let _ = store.update_task(task_id, TaskPatch { pending_content: Some(Some(accumulated.clone())), ..Default::default() });
                            last_flush = tokio::time::Instant::now();
                        }
                    }
                    Some(StreamEvent::ToolUse { name, arguments }) => {
                        last_activity = tokio::time::Instant::now();
                        stalled_emitted = false;
                        events.send_ignore(EngineEvent::Stream { task_id, kind: StreamKind::ToolUse, content: None, tool_name: Some(name), tool_input: arguments });
                    }
                    Some(StreamEvent::ToolResult { .. }) => {}
                    Some(StreamEvent::Context { used_tokens, max_tokens }) => {
                        events.send_ignore(EngineEvent::ContextUpdate { task_id, stage, context_tokens: used_tokens, context_max: max_tokens });
                    }
                    Some(StreamEvent::Todo(mutation)) => {
                        if let Some(mut t) = store.get_task(task_id) {
                            let list = t.todos.entry(stage).or_default();
                            crate::model::todo::apply_mutation(list, mutation);
                            let snapshot = list.clone();
                            let _ = store.replace_task(&t);
                            events.send_ignore(EngineEvent::TodosUpdated { task_id, stage, todos: snapshot });
                        }
                    }
                    Some(StreamEvent::Error(message)) => {
                        events.send_ignore(EngineEvent::Stream { task_id, kind: StreamKind::Error, content: Some(message), tool_name: None, tool_input: None });
                    }
                    None => break,
                }
            }
            _ = ticker.tick() => {
                if last_activity.elapsed() >= STALL_THRESHOLD && !stalled_emitted {
                    events.send_ignore(EngineEvent::Status {
                        task_id,
                        kind: StatusKind::Error,
                        stage: Some(stage),
                        reason: Some("stalled: no stream activity for 60s".to_string()),
                    });
                    stalled_emitted = true;
                }
            }
        }
    }

    if last_flush.elapsed() > Duration::ZERO && !accumulated.is_empty() {
        let _ = store.update_task(task_id, TaskPatch { pending_content: Some(Some(accumulated.clone())), ..Default::default() });
    }

    events.send_ignore(EngineEvent::Stream { task_id, kind: StreamKind::Complete, content: None, tool_name: None, tool_input: None });
    accumulated
}

/// Best-effort score extraction from freeform text (e.g. "Score: 4.2"), used for the
/// auto-approval gate on `plan`/`code_review`.
fn extract_score(text: &str) -> Option<f64> {
    let re = regex::Regex::new(r"(?i)score\s*[:=]\s*([0-9]+(?:\.[0-9]+)?)").ok()?;
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

fn build_stage_output(stage: StageKind, text: &str) -> StageOutput {
    match stage {
        StageKind::Brainstorm => StageOutput::Brainstorm { text: text.to_string() },
        StageKind::DesignReview => StageOutput::DesignReview(DesignReviewOutput {
            approach: text.to_string(),
            risks: Vec::new(),
            alternatives_considered: Vec::new(),
        }),
        StageKind::Plan => StageOutput::Plan(PlanOutput {
            steps: text.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect(),
            files_touched: Vec::new(),
            score: extract_score(text),
        }),
        StageKind::Implement => StageOutput::Implementation(ImplementationOutput { notes: text.to_string(), files_changed: Vec::new() }),
        StageKind::CodeReview => StageOutput::CodeReview(CodeReviewOutput { comments: vec![text.to_string()], score: extract_score(text) }),
        StageKind::Verify => StageOutput::Verify(VerifyOutput { passed: !text.to_lowercase().contains("fail"), test_results: text.to_string() }),
    }
}

/// Tiny extension so every event send site reads as one line; the channel's only failure mode
/// is "no receiver left", which is not an engine error.
trait SendIgnore {
    fn send_ignore(&self, event: EngineEvent);
}

impl SendIgnore for EventSender {
    fn send_ignore(&self, event: EngineEvent) {
        let _ = self.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::stage::Tier;

    #[test]
    fn test_build_stage_output_plan_extracts_score() {
        let output = build_stage_output(StageKind::Plan, "Step 1\nStep 2\nScore: 4.5\n");
        match output {
            StageOutput::Plan(o) => {
                assert_eq!(o.score, Some(4.5));
                assert_eq!(o.steps.len(), 3);
            }
            _ => panic!("expected Plan"),
        }
    }

    #[test]
    fn test_build_stage_output_verify_detects_failure_keyword() {
        let output = build_stage_output(StageKind::Verify, "3 tests passed, 1 test failed");
        match output {
            StageOutput::Verify(o) => assert!(!o.passed),
            _ => panic!("expected Verify"),
        }
    }

    #[test]
    fn test_extract_score_missing_returns_none() {
        assert_eq!(extract_score("no score here"), None);
    }

    #[test]
    fn test_gate_decision_blocked_on_tripped_breaker() {
        let mut task = Task::new(1, "t", "d", Tier::L3, 1);
        task.increment_review_count(StageKind::Plan);
        task.increment_review_count(StageKind::Plan);
        task.increment_review_count(StageKind::Plan);
        task.status = TaskStatus::Running(StageKind::Brainstorm);

        // Directly exercise the pure transition step that `finish_stage_success` delegates to.
        match can_transition(&task, StageKind::Plan) {
            Err(Denial::CircuitBreaker { stage, count }) => {
                assert_eq!(stage, StageKind::Plan);
                assert_eq!(count, 3);
            }
            other => panic!("expected circuit breaker denial, got {:?}", other),
        }
    }
}
