/**
 * Todo Item & Todo-Tool Polymorphism
 *
 * DESIGN DECISION: Represent the three todo-tool shapes as a sum type parsed at the edge
 * WHY: passing an already-typed variant to the Engine, rather than a bag of optional fields
 * the Engine has to disambiguate itself, keeps the mutation unambiguous at the call site
 *
 * REASONING CHAIN:
 * 1. The Runner observes a `todo` stream event and parses its payload into one of three shapes
 * 2. create-one: a single new TodoItem: {subject}
 * 3. update-one-by-id: {id, status}
 * 4. write-whole-list: the complete replacement list for a stage
 * 5. The Engine applies the variant and re-emits `todos-updated` with the resulting full list
 *
 * PATTERN: sum type parsed at the ingestion boundary, generalized from an executor's status
 * enum discipline
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub subject: String,
    pub status: TodoStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TodoItem {
    pub fn new(subject: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            subject: subject.into(),
            status: TodoStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The three tool shapes the Runner's `todo` stream event can carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TodoMutation {
    CreateOne { subject: String },
    UpdateOneById { id: String, status: TodoStatus },
    WriteWholeList { items: Vec<TodoItem> },
}

/// Apply a mutation to a stage's todo list, returning the resulting full list.
///
/// Unknown ids in `UpdateOneById` are a no-op: todos are informational only, the engine
/// never blocks on them, so a stale reference should not be treated as an error.
pub fn apply_mutation(list: &mut Vec<TodoItem>, mutation: TodoMutation) -> &Vec<TodoItem> {
    match mutation {
        TodoMutation::CreateOne { subject } => list.push(TodoItem::new(subject)),
        TodoMutation::UpdateOneById { id, status } => {
            if let Some(item) = list.iter_mut().find(|t| t.id == id) {
                item.status = status;
                item.updated_at = Utc::now();
            }
        }
        TodoMutation::WriteWholeList { items } => *list = items,
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_one() {
        let mut list = Vec::new();
        apply_mutation(&mut list, TodoMutation::CreateOne { subject: "write tests".into() });
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].status, TodoStatus::Pending);
    }

    #[test]
    fn test_update_one_by_id() {
        let mut list = vec![TodoItem::new("a")];
        let id = list[0].id.clone();
        apply_mutation(&mut list, TodoMutation::UpdateOneById { id, status: TodoStatus::Completed });
        assert_eq!(list[0].status, TodoStatus::Completed);
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let mut list = vec![TodoItem::new("a")];
        apply_mutation(
            &mut list,
            TodoMutation::UpdateOneById { id: "nonexistent".into(), status: TodoStatus::Completed },
        );
        assert_eq!(list[0].status, TodoStatus::Pending);
    }

    #[test]
    fn test_write_whole_list_replaces() {
        let mut list = vec![TodoItem::new("a"), TodoItem::new("b")];
        apply_mutation(&mut list, TodoMutation::WriteWholeList { items: vec![TodoItem::new("c")] });
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].subject, "c");
    }
}
