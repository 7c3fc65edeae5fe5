/**
 * External Event & Command Catalogue
 *
 * DESIGN DECISION: One `EngineEvent` enum carrying every message type the core publishes to
 * presentation layers, and one `Command` enum for everything it accepts, both moved across a
 * `tokio::sync::mpsc::UnboundedSender` cloned into each task's pipeline future
 * WHY: the core publishes an event channel with these message types; a single channel keeps
 * ordering guarantees per task without requiring the presentation layer to subscribe to six
 * different streams
 *
 * PATTERN: grounded on a one-writer-per-consumer IPC framing idiom, adapted from
 * newline-delimited IPC to an in-process channel
 */

use serde::{Deserialize, Serialize};

use crate::model::approval::ApprovalRequestInfo;
use crate::model::stage::StageKind;
use crate::model::task::TaskId;
use crate::model::todo::TodoItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Text,
    ToolUse,
    Error,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusKind {
    Start,
    AwaitingReview,
    Complete,
    Error,
    Pause,
    UsagePaused,
    CircuitBreaker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    #[serde(rename = "stream")]
    Stream { task_id: TaskId, kind: StreamKind, content: Option<String>, tool_name: Option<String>, tool_input: Option<serde_json::Value> },

    #[serde(rename = "status")]
    Status { task_id: TaskId, kind: StatusKind, stage: Option<StageKind>, reason: Option<String> },

    #[serde(rename = "approval-request")]
    ApprovalRequest(ApprovalRequestInfo),

    #[serde(rename = "todos-updated")]
    TodosUpdated { task_id: TaskId, stage: StageKind, todos: Vec<TodoItem> },

    #[serde(rename = "context-update")]
    ContextUpdate { task_id: TaskId, stage: StageKind, context_tokens: u64, context_max: u64 },

    #[serde(rename = "context-handoff")]
    ContextHandoff {
        task_id: TaskId,
        current_stage: StageKind,
        next_stage: StageKind,
        usage_percent: f64,
        remaining_tokens: u64,
        estimated_need: u64,
    },

    #[serde(rename = "usage-paused")]
    UsagePaused { paused_count: usize, utilization: f64, countdown_secs: u64 },

    #[serde(rename = "task-unblocked")]
    TaskUnblocked { task_id: TaskId },

    #[serde(rename = "session-renamed")]
    SessionRenamed { session_id: String, title: String },

    #[serde(rename = "task-merged")]
    TaskMerged { task_id: TaskId },
}

/// Commands accepted from the presentation layer. CRUD commands over the data
/// model are handled directly through `PersistenceStore`/`Task` APIs rather than routed
/// through this enum, which is the pipeline-control surface specifically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum Command {
    #[serde(rename = "pipeline:start")]
    PipelineStart { task_id: TaskId },
    #[serde(rename = "pipeline:step")]
    PipelineStep { task_id: TaskId },
    #[serde(rename = "pipeline:approve")]
    PipelineApprove { task_id: TaskId },
    #[serde(rename = "pipeline:reject")]
    PipelineReject { task_id: TaskId, feedback: String },
    #[serde(rename = "pipeline:respond")]
    PipelineRespond { task_id: TaskId, text: String },
    #[serde(rename = "pipeline:resolve-approval")]
    PipelineResolveApproval { request_id: String, allow: bool, message: Option<String> },
    #[serde(rename = "pipeline:pause")]
    PipelinePause { task_id: TaskId },
    #[serde(rename = "pipeline:resume")]
    PipelineResume { task_id: TaskId },
    #[serde(rename = "pipeline:pause-all")]
    PipelinePauseAll,
    #[serde(rename = "pipeline:approve-context-handoff")]
    PipelineApproveContextHandoff { task_id: TaskId },
    #[serde(rename = "workshop:recover-session")]
    WorkshopRecoverSession { session_id: String },
    #[serde(rename = "workshop:rename-session")]
    WorkshopRenameSession { session_id: String, title: String },
}

pub type EventSender = tokio::sync::mpsc::UnboundedSender<EngineEvent>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_serde_round_trip() {
        let cmd = Command::PipelineReject { task_id: 1, feedback: "needs more detail".into() };
        let json = serde_json::to_string(&cmd).unwrap();
        let back: Command = serde_json::from_str(&json).unwrap();
        match back {
            Command::PipelineReject { task_id, feedback } => {
                assert_eq!(task_id, 1);
                assert_eq!(feedback, "needs more detail");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_event_serde_round_trip() {
        let event = EngineEvent::TaskUnblocked { task_id: 7 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("task-unblocked"));
        let back: EngineEvent = serde_json::from_str(&json).unwrap();
        match back {
            EngineEvent::TaskUnblocked { task_id } => assert_eq!(task_id, 7),
            _ => panic!("wrong variant"),
        }
    }
}
