/**
 * Scheduler & Capacity Arbiter
 *
 * DESIGN DECISION: A thin cooperative layer above the Engine and the dependency graph - it
 * never mutates a task's stage state directly, only calls `PipelineEngine::start/pause/resume`
 * and publishes events
 * WHY: the scheduler is cooperative, it never kills an in-flight call. Pause propagates to
 * the engine, which asks the Runner to stop at the next safe point.
 *
 * PATTERN: grounded on a progress-monitor snapshot idiom for usage telemetry and hysteresis
 * bookkeeping, and a dependency graph's `ready_tasks()` for auto-unblock, reused here through
 * `graph::newly_unblocked`
 */

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::engine::PipelineEngine;
use crate::error::Result;
use crate::events::EngineEvent;
use crate::events::EventSender;
use crate::graph::{self, DependencyGraph};
use crate::model::group::{GroupStatus, TaskGroup};
use crate::model::task::{Task, TaskId, TaskStatus};
use crate::persistence::PersistenceStore;

/// Live usage telemetry the scheduler polls.
#[derive(Debug, Clone, Copy)]
pub struct UsageSnapshot {
    pub five_hour_ratio: f64,
    pub seven_day_ratio: f64,
    pub countdown_secs: u64,
}

/// Hysteresis thresholds for capacity throttling.
#[derive(Debug, Clone, Copy)]
pub struct CapacityConfig {
    pub ceiling: f64,
    pub floor: f64,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self { ceiling: 0.9, floor: 0.7 }
    }
}

pub struct Scheduler {
    store: Arc<PersistenceStore>,
    events: EventSender,
    engine: Arc<PipelineEngine>,
    capacity: CapacityConfig,
    /// Tasks the scheduler itself paused for capacity pressure, in the priority order they
    /// must resume in.
    capacity_paused: Mutex<Vec<TaskId>>,
}

impl Scheduler {
    pub fn new(store: Arc<PersistenceStore>, events: EventSender, engine: Arc<PipelineEngine>, capacity: CapacityConfig) -> Self {
        Self { store, events, engine, capacity, capacity_paused: Mutex::new(Vec::new()) }
    }

    /// Admit a backlog task: refuse and report blockers if any prerequisite is not `done`.
    pub async fn admit(&self, graph: &DependencyGraph, task_id: TaskId) -> Result<()> {
        let task = self.store.get_task(task_id).ok_or_else(|| crate::error::Error::NotFound(format!("task {task_id}")))?;
        if task.status != TaskStatus::Backlog {
            return Err(crate::error::Error::InvalidTransition(format!("task {task_id} is not in backlog")));
        }

        let statuses = self.status_map();
        let blockers = graph::is_task_blocked(graph, task_id, &statuses);
        if !blockers.is_empty() {
            return Err(crate::error::Error::TaskBlocked(format!(
                "task {task_id} blocked on {:?}",
                blockers
            )));
        }

        self.engine.start(task_id).await
    }

    fn status_map(&self) -> HashMap<TaskId, TaskStatus> {
        self.store.list_tasks_by_project(None).into_iter().map(|t| (t.id, t.status)).collect()
    }

    /// Re-evaluate the ready set after `completed_id` finishes, emitting `task-unblocked` for
    /// each newly-ready dependent.
    pub fn auto_unblock(&self, graph: &DependencyGraph, completed_id: TaskId) -> Vec<TaskId> {
        let statuses = self.status_map();
        let unblocked = graph::newly_unblocked(graph, completed_id, &statuses);
        for &task_id in &unblocked {
            let _ = self.events.send(EngineEvent::TaskUnblocked { task_id });
        }
        unblocked
    }

    /// Capacity throttling with hysteresis. Crossing the
    /// ceiling pauses every currently-running task and records the count; falling below the
    /// floor resumes them in the priority order they were paused in.
    pub async fn check_capacity(&self, usage: UsageSnapshot) -> Result<()> {
        let mut paused = self.capacity_paused.lock().await;

        if paused.is_empty() && usage.five_hour_ratio >= self.capacity.ceiling {
            let mut running: Vec<Task> = self
                .store
                .list_tasks_by_project(None)
                .into_iter()
                .filter(|t| matches!(t.status, TaskStatus::Running(_)))
                .collect();
            running.sort_by(|a, b| b.priority.cmp(&a.priority));

            for task in &running {
                self.engine.pause(task.id, "capacity ceiling exceeded").await?;
            }
            *paused = running.iter().map(|t| t.id).collect();

            let _ = self.events.send(EngineEvent::UsagePaused {
                paused_count: paused.len(),
                utilization: usage.five_hour_ratio,
                countdown_secs: usage.countdown_secs,
            });
        } else if !paused.is_empty() && usage.five_hour_ratio < self.capacity.floor {
            for &task_id in paused.iter() {
                self.engine.resume(task_id).await?;
            }
            paused.clear();
        }

        Ok(())
    }

    /// Context-handoff gate: when remaining tokens fall short of the estimated
    /// need for the next stage, suspend the task and surface a proposal rather than letting
    /// the session run out of context mid-stage.
    pub async fn propose_context_handoff(
        &self,
        task_id: TaskId,
        current_stage: crate::model::stage::StageKind,
        next_stage: crate::model::stage::StageKind,
        used_tokens: u64,
        max_tokens: u64,
        estimated_need: u64,
    ) -> Result<()> {
        let remaining = max_tokens.saturating_sub(used_tokens);
        if remaining >= estimated_need {
            return Ok(());
        }

        self.engine.pause(task_id, "context handoff pending approval").await?;
        let usage_percent = if max_tokens == 0 { 0.0 } else { used_tokens as f64 / max_tokens as f64 };
        let _ = self.events.send(EngineEvent::ContextHandoff {
            task_id,
            current_stage,
            next_stage,
            usage_percent,
            remaining_tokens: remaining,
            estimated_need,
        });
        Ok(())
    }

    /// Record a new dependency edge (`child` depends on `parent`): validate the graph stays
    /// acyclic, then persist it both on the child's own `dependencies` list and in the indexed
    /// `task_dependencies` table.
    pub fn add_dependency(&self, graph: &DependencyGraph, child_id: TaskId, parent_id: TaskId) -> Result<DependencyGraph> {
        let updated = graph::try_add_edge(graph, child_id, parent_id)?;

        let mut child = self
            .store
            .get_task(child_id)
            .ok_or_else(|| crate::error::Error::NotFound(format!("task {child_id}")))?;
        if !child.dependencies.contains(&parent_id) {
            child.dependencies.push(parent_id);
            self.store.replace_task(&child)?;
        }
        self.store.add_dependency(child_id, parent_id)?;

        Ok(updated)
    }

    /// Create a new task group, persisting it before any member task is assigned to it.
    pub fn create_group(&self, group: &TaskGroup) -> Result<()> {
        self.store.insert_group(group)
    }

    /// Move a group between `Planning`/`Queued`/`Running`/`Paused`/`Failed`/`Completed`,
    /// e.g. pausing a group halts `group_runnable` for every member in one call.
    pub fn set_group_status(&self, group_id: i64, status: GroupStatus) -> Result<()> {
        self.store.update_group_status(group_id, status)
    }

    /// Group orchestration: a sibling may run only if the group is not paused and
    /// it has no unmet dependency on another member still in progress, honouring the group's
    /// `executionOrder` as a priority hint rather than a strict barrier.
    pub fn group_runnable(&self, group: &TaskGroup, members: &[Task]) -> Vec<TaskId> {
        if group.status == GroupStatus::Paused {
            return Vec::new();
        }

        let done_or_absent = |id: TaskId| -> bool {
            members.iter().find(|t| t.id == id).map(|t| t.status == TaskStatus::Done).unwrap_or(true)
        };

        let mut runnable: Vec<TaskId> = members
            .iter()
            .filter(|t| t.status == TaskStatus::Backlog)
            .filter(|t| t.dependencies.iter().all(|&dep| done_or_absent(dep)))
            .map(|t| t.id)
            .collect();

        runnable.sort_by_key(|id| group.execution_order.iter().position(|x| x == id).unwrap_or(usize::MAX));
        runnable
    }
}
