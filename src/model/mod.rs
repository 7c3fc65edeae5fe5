/**
 * Data Model
 *
 * Aggregate entity types shared across every component: Task, Hand-off, Todo Item, Task
 * Group, Settings, and Approval Request. Pure types and their invariant-preserving methods
 * live here; persistence, scheduling, and orchestration consume them but do not own their
 * shape.
 */

pub mod approval;
pub mod group;
pub mod handoff;
pub mod settings;
pub mod stage;
pub mod stage_output;
pub mod task;
pub mod todo;

pub use approval::{ApprovalRegistry, ApprovalRequest, ApprovalRequestInfo, ApprovalResolution};
pub use group::{GroupStatus, TaskGroup, WorkOrder, WorkOrderFile};
pub use handoff::{Handoff, HandoffStatus};
pub use settings::{Settings, SettingsScope, StageOverride, ValidationHook};
pub use stage::{StageConfig, StageKind, Tier};
pub use stage_output::StageOutput;
pub use task::{ActivityEntry, ActivityKind, Task, TaskId, TaskStatus, CIRCUIT_BREAKER_LIMIT};
pub use todo::{TodoItem, TodoMutation, TodoStatus};
