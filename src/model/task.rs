/**
 * Task - primary entity
 *
 * DESIGN DECISION: One struct holding identity, tier/priority, live status, per-stage
 * outputs, rejection counters, hand-off chain, activity log, and transient streaming state
 * WHY: Task is the aggregate the Engine drives through its state machine; splitting it
 * across multiple tables is a persistence-layer concern, not a modelling one, so the
 * in-memory shape stays one struct and `canTransition`/restart logic can reason about it
 * without joining records
 *
 * REASONING CHAIN:
 * 1. `status` is the single source of truth for "what stage is this task at, or is it
 *    paused/blocked/backlog"
 * 2. `stage_outputs` is the tagged-union map from stage_output.rs: presence implies the
 *    stage ran
 * 3. `review_counts` are the circuit-breaker counters (plan_review_count, impl_review_count)
 *    that are strictly non-decreasing while the task is live
 * 4. `pending_content` is the partial-streaming buffer; it is promoted to an assistant
 *    message on next open if non-empty after a crash
 * 5. `pause_reason`/`paused_from_status` let pauseAll/resume round-trip a task's prior stage
 *
 * PATTERN: aggregate entity, generalized from a sprint-task record but expanded with the
 * live pipeline state a one-shot sprint task never needed (sprint tasks run once; pipeline
 * tasks re-enter across many stage transitions)
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::group::WorkOrder;
use super::handoff::Handoff;
use super::stage::{StageKind, Tier};
use super::stage_output::StageOutput;
use super::todo::TodoItem;

pub type TaskId = i64;

/// Status labels map 1-1 to stages except that between stages a task may be `Backlog`,
/// `Blocked`, `AwaitingReview`, or one of the paused variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Running(StageKind),
    AwaitingReview(StageKind),
    Paused,
    Blocked,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    StageStarted,
    StageCompleted,
    Rejected,
    CircuitBreakerTripped,
    Paused,
    Resumed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub at: DateTime<Utc>,
    pub kind: ActivityKind,
    pub message: String,
}

/// Rejection counters per breaker-tracked stage. A `BTreeMap` keyed by the breaker-tracked stage rather than two
/// named fields, so restart-from-stage can reset "counters belonging to S and after"
/// generically without a stage-specific match arm.
pub type ReviewCounts = BTreeMap<StageKind, u32>;

pub const CIRCUIT_BREAKER_LIMIT: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub tier: Tier,
    pub priority: i32,
    pub status: TaskStatus,
    pub auto_mode: bool,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub current_agent: Option<String>,
    pub group_id: Option<i64>,
    pub dependencies: Vec<TaskId>,
    /// Scoping description for a grouped task (GLOSSARY: Work order), rendered into the
    /// `work_order` template placeholder.
    pub work_order: Option<WorkOrder>,

    pub stage_outputs: BTreeMap<StageKind, StageOutput>,
    pub review_counts: ReviewCounts,
    pub handoffs: Vec<Handoff>,
    pub activity_log: Vec<ActivityEntry>,
    pub todos: BTreeMap<StageKind, Vec<TodoItem>>,

    /// Partial-streaming buffer. `None` when no session is mid-stream.
    pub pending_content: Option<String>,
    /// Opaque resume handle for the active session, if any.
    pub active_session: Option<String>,

    pub pause_reason: Option<String>,
    pub paused_from_status: Option<Box<TaskStatus>>,
}

impl Task {
    pub fn new(id: TaskId, title: impl Into<String>, description: impl Into<String>, tier: Tier, priority: i32) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
            tier,
            priority,
            status: TaskStatus::Backlog,
            auto_mode: false,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            current_agent: None,
            group_id: None,
            dependencies: Vec::new(),
            work_order: None,
            stage_outputs: BTreeMap::new(),
            review_counts: BTreeMap::new(),
            handoffs: Vec::new(),
            activity_log: Vec::new(),
            todos: BTreeMap::new(),
            pending_content: None,
            active_session: None,
            pause_reason: None,
            paused_from_status: None,
        }
    }

    pub fn log(&mut self, kind: ActivityKind, message: impl Into<String>) {
        self.activity_log.push(ActivityEntry { at: Utc::now(), kind, message: message.into() });
    }

    /// Append a new hand-off. Hand-offs are never rewritten.
    pub fn append_handoff(&mut self, handoff: Handoff) {
        self.handoffs.push(handoff);
    }

    pub fn review_count(&self, stage: StageKind) -> u32 {
        *self.review_counts.get(&stage).unwrap_or(&0)
    }

    /// Increment the rejection counter for `stage`. Counters are strictly non-decreasing
    /// while the task is live; they only reset via `restart_from_stage`.
    pub fn increment_review_count(&mut self, stage: StageKind) -> u32 {
        let entry = self.review_counts.entry(stage).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Restart from stage `from`: clear the persisted output and counters of `from` and every
    /// stage after it in the tier's sequence, clear transient session/agent/todo state, and
    /// leave dependency edges and all other metadata untouched.
    pub fn restart_from_stage(&mut self, from: StageKind) {
        let affected = affected_stages(self.tier, from);
        for stage in &affected {
            self.stage_outputs.remove(stage);
            self.review_counts.remove(stage);
            self.todos.remove(stage);
        }
        self.active_session = None;
        self.current_agent = None;
        self.pending_content = None;
        self.status = TaskStatus::Running(from);
    }
}

/// The affected set for a restart from `from`: `from` and every stage after it in the
/// tier's ordered sequence.
pub fn affected_stages(tier: Tier, from: StageKind) -> Vec<StageKind> {
    let seq = super::stage::stage_sequence(tier);
    match seq.iter().position(|s| s.kind == from) {
        Some(idx) => seq[idx..].iter().map(|s| s.kind).collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::stage_output::ImplementationOutput;

    #[test]
    fn test_review_count_monotonic() {
        let mut task = Task::new(1, "t", "d", Tier::L3, 1);
        assert_eq!(task.review_count(StageKind::Plan), 0);
        task.increment_review_count(StageKind::Plan);
        task.increment_review_count(StageKind::Plan);
        assert_eq!(task.review_count(StageKind::Plan), 2);
    }

    #[test]
    fn test_restart_clears_affected_stage_outputs_and_counters() {
        let mut task = Task::new(1, "t", "d", Tier::L3, 1);
        task.stage_outputs.insert(
            StageKind::Plan,
            StageOutput::Implementation(ImplementationOutput { notes: "x".into(), files_changed: vec![] }),
        );
        task.stage_outputs.insert(
            StageKind::Implement,
            StageOutput::Implementation(ImplementationOutput { notes: "y".into(), files_changed: vec![] }),
        );
        task.increment_review_count(StageKind::Plan);
        task.increment_review_count(StageKind::Implement);

        task.restart_from_stage(StageKind::Plan);

        assert!(!task.stage_outputs.contains_key(&StageKind::Plan));
        assert!(!task.stage_outputs.contains_key(&StageKind::Implement));
        assert_eq!(task.review_count(StageKind::Plan), 0);
        assert_eq!(task.review_count(StageKind::Implement), 0);
    }

    #[test]
    fn test_restart_preserves_earlier_stage_output() {
        let mut task = Task::new(1, "t", "d", Tier::L3, 1);
        task.stage_outputs.insert(StageKind::Brainstorm, StageOutput::Brainstorm { text: "ideas".into() });
        task.restart_from_stage(StageKind::Plan);
        assert!(task.stage_outputs.contains_key(&StageKind::Brainstorm));
    }

    #[test]
    fn test_restart_preserves_dependencies() {
        let mut task = Task::new(1, "t", "d", Tier::L3, 1);
        task.dependencies = vec![2, 3];
        task.restart_from_stage(StageKind::Plan);
        assert_eq!(task.dependencies, vec![2, 3]);
    }
}
