/**
 * Task Group
 *
 * DESIGN DECISION: Groups carry a shared-context blob and an ordering hint, not their own
 * stage machine
 * WHY: Group is an optional parent that shares context and an execution order; the group
 * itself never runs stages, its member tasks do
 */

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Planning,
    Queued,
    Running,
    Paused,
    Failed,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGroup {
    pub id: i64,
    pub title: String,
    pub status: GroupStatus,
    /// Member task ordering hint used by the scheduler's group orchestration.
    pub execution_order: Vec<super::task::TaskId>,
    /// Shared-context blob consumed by grouped-task prompts.
    pub shared_context: String,
}

impl TaskGroup {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            status: GroupStatus::Planning,
            execution_order: Vec::new(),
            shared_context: String::new(),
        }
    }
}

/// Structured description that scopes a grouped task (GLOSSARY: Work order).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkOrder {
    pub objective: String,
    pub files: Vec<WorkOrderFile>,
    pub patterns: Vec<String>,
    pub integration_points: Vec<String>,
    pub constraints: Vec<String>,
    pub expected_tests: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkOrderFile {
    pub path: String,
    pub action: String,
    pub description: String,
}
