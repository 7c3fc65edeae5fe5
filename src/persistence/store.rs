/**
 * Persistence Store
 *
 * DESIGN DECISION: A single `rusqlite::Connection` behind a `Mutex`, one row per Task/Group
 * holding a JSON blob for the complex nested fields plus a few indexed scalar columns
 * WHY: complex fields (structured outputs, arrays) are serialised as text, and this store is
 * the single source of truth that serialises writes - a single connection guarded by a mutex
 * gives us that serialization for free without a connection pool nothing here needs
 *
 * REASONING CHAIN:
 * 1. `tasks` keeps `id`, `status`, `tier`, `group_id`, `priority` as real columns (so the
 *    scheduler can filter/list without deserializing every row) and `data` as the full
 *    Task JSON (everything else: stage_outputs, handoffs, todos, activity_log, ...)
 * 2. `updateTask` reads the row, applies a `TaskPatch` to the in-memory `Task`, re-serializes,
 *    and writes back inside one transaction, an atomic merge
 * 3. A corrupt `data` blob must not crash a read: the row is logged and
 *    skipped/falls back rather than propagating a parse error to the caller
 * 4. Write failures propagate as `Error::Persistence`; read failures on individual rows
 *    return `None` for that row and are logged
 *
 * PATTERN: grounded on a `Connection` + `CREATE TABLE IF NOT EXISTS` + `params!` idiom,
 * extended with the additive-migration helper from migrations.rs and a
 * JSON-blob-plus-indexed-columns layout used for outcome/calibration-style tables
 */

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::model::{
    group::{GroupStatus, TaskGroup},
    settings::{Settings, SettingsScope},
    task::{Task, TaskId, TaskStatus},
};

use super::migrations::ensure_column;

pub struct PersistenceStore {
    conn: Mutex<Connection>,
}

/// Partial update applied atomically to a stored task.
/// `Some(None)` clears the field to NULL; `None` leaves it untouched.
#[derive(Debug, Default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub current_agent: Option<Option<String>>,
    pub pending_content: Option<Option<String>>,
    pub active_session: Option<Option<String>>,
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub pause_reason: Option<Option<String>>,
    pub paused_from_status: Option<Option<TaskStatus>>,
}

impl TaskPatch {
    fn apply(self, task: &mut Task) {
        if let Some(v) = self.status {
            task.status = v;
        }
        if let Some(v) = self.current_agent {
            task.current_agent = v;
        }
        if let Some(v) = self.pending_content {
            task.pending_content = v;
        }
        if let Some(v) = self.active_session {
            task.active_session = v;
        }
        if let Some(v) = self.started_at {
            task.started_at = v;
        }
        if let Some(v) = self.completed_at {
            task.completed_at = v;
        }
        if let Some(v) = self.pause_reason {
            task.pause_reason = v;
        }
        if let Some(v) = self.paused_from_status {
            task.paused_from_status = v.map(Box::new);
        }
    }
}

impl PersistenceStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        println!("persistence store opened: {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                tier TEXT NOT NULL,
                status TEXT NOT NULL,
                group_id INTEGER,
                priority INTEGER NOT NULL DEFAULT 0,
                data TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS task_dependencies (
                parent_id INTEGER NOT NULL,
                child_id INTEGER NOT NULL,
                PRIMARY KEY (parent_id, child_id)
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS task_groups (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                status TEXT NOT NULL,
                data TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                scope TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (scope, key)
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS workshop_sessions (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS workshop_messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // Additive migrations layered onto a pre-existing `tasks` table.
        ensure_column(&conn, "tasks", "pending_content", "TEXT")?;
        ensure_column(&conn, "task_groups", "work_order", "TEXT")?;

        conn.execute("CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)", [])?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_tasks_group ON tasks(group_id)", [])?;

        Ok(())
    }

    pub fn insert_task(&self, task: &Task) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let data = serde_json::to_string(task)?;
        let status = serde_json::to_string(&task.status)?;
        let tier = serde_json::to_string(&task.tier)?;
        conn.execute(
            "INSERT INTO tasks (id, title, tier, status, group_id, priority, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![task.id, task.title, tier, status, task.group_id, task.priority, data],
        )?;
        Ok(())
    }

    /// Read one task. A corrupt `data` blob is logged and yields `None` rather than an error,
    /// so a single bad row never blocks listing the rest.
    pub fn get_task(&self, id: TaskId) -> Option<Task> {
        let conn = self.conn.lock().unwrap();
        let data: Option<String> = conn
            .query_row("SELECT data FROM tasks WHERE id = ?1", params![id], |row| row.get(0))
            .optional()
            .ok()
            .flatten();

        data.and_then(|json| match serde_json::from_str::<Task>(&json) {
            Ok(task) => Some(task),
            Err(e) => {
                eprintln!("persistence: corrupt task row {id}, falling back to None: {e}");
                None
            }
        })
    }

    pub fn list_tasks_by_project(&self, group_id: Option<i64>) -> Vec<Task> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = match group_id {
            Some(_) => conn.prepare("SELECT data FROM tasks WHERE group_id = ?1").unwrap(),
            None => conn.prepare("SELECT data FROM tasks").unwrap(),
        };

        let rows: Vec<String> = if let Some(gid) = group_id {
            stmt.query_map(params![gid], |row| row.get::<_, String>(0))
                .unwrap()
                .filter_map(|r| r.ok())
                .collect()
        } else {
            stmt.query_map([], |row| row.get::<_, String>(0))
                .unwrap()
                .filter_map(|r| r.ok())
                .collect()
        };

        rows.into_iter()
            .filter_map(|json| match serde_json::from_str::<Task>(&json) {
                Ok(t) => Some(t),
                Err(e) => {
                    eprintln!("persistence: dropping corrupt task row during list: {e}");
                    None
                }
            })
            .collect()
    }

    /// Merge a partial update atomically.
    pub fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let data: String = conn
            .query_row("SELECT data FROM tasks WHERE id = ?1", params![id], |row| row.get(0))
            .map_err(|_| Error::NotFound(format!("task {id}")))?;

        let mut task: Task = serde_json::from_str(&data).map_err(|e| {
            eprintln!("persistence: corrupt task row {id} during update: {e}");
            Error::Persistence(format!("corrupt task row {id}"))
        })?;

        patch.apply(&mut task);
        let new_data = serde_json::to_string(&task)?;
        let status = serde_json::to_string(&task.status)?;

        conn.execute(
            "UPDATE tasks SET data = ?1, status = ?2 WHERE id = ?3",
            params![new_data, status, id],
        )?;
        Ok(())
    }

    /// Replace the full task row (used for multi-field structural mutations like appending a
    /// hand-off or restarting from a stage, where a semantic `TaskPatch` would need one field
    /// per nested collection).
    pub fn replace_task(&self, task: &Task) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let data = serde_json::to_string(task)?;
        let status = serde_json::to_string(&task.status)?;
        conn.execute(
            "UPDATE tasks SET data = ?1, status = ?2, group_id = ?3, priority = ?4 WHERE id = ?5",
            params![data, status, task.group_id, task.priority, task.id],
        )?;
        Ok(())
    }

    pub fn add_dependency(&self, child_id: TaskId, parent_id: TaskId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO task_dependencies (parent_id, child_id) VALUES (?1, ?2)",
            params![parent_id, child_id],
        )?;
        Ok(())
    }

    pub fn insert_group(&self, group: &TaskGroup) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let data = serde_json::to_string(group)?;
        let status = serde_json::to_string(&group.status)?;
        conn.execute(
            "INSERT INTO task_groups (id, title, status, data) VALUES (?1, ?2, ?3, ?4)",
            params![group.id, group.title, status, data],
        )?;
        Ok(())
    }

    pub fn get_group(&self, id: i64) -> Option<TaskGroup> {
        let conn = self.conn.lock().unwrap();
        let data: Option<String> = conn
            .query_row("SELECT data FROM task_groups WHERE id = ?1", params![id], |row| row.get(0))
            .optional()
            .ok()
            .flatten();
        data.and_then(|json| serde_json::from_str(&json).ok())
    }

    pub fn update_group_status(&self, id: i64, status: GroupStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let status_json = serde_json::to_string(&status)?;
        let affected = conn.execute(
            "UPDATE task_groups SET status = ?1 WHERE id = ?2",
            params![status_json, id],
        )?;
        if affected == 0 {
            return Err(Error::NotFound(format!("group {id}")));
        }
        Ok(())
    }

    pub fn put_setting(&self, scope: SettingsScope, settings: &Settings) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let value = serde_json::to_string(settings)?;
        conn.execute(
            "INSERT INTO settings (scope, key, value) VALUES (?1, 'config', ?2)
             ON CONFLICT(scope, key) DO UPDATE SET value = excluded.value",
            params![scope.key(), value],
        )?;
        Ok(())
    }

    /// Corrupt settings JSON falls back to default rather than failing the read.
    pub fn get_setting(&self, scope: SettingsScope) -> Settings {
        let conn = self.conn.lock().unwrap();
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE scope = ?1 AND key = 'config'",
                params![scope.key()],
                |row| row.get(0),
            )
            .optional()
            .ok()
            .flatten();

        match value {
            Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                eprintln!("persistence: corrupt settings blob for {}: {e}", scope.key());
                Settings::default()
            }),
            None => Settings::default(),
        }
    }

    pub fn insert_workshop_session(&self, session_id: &str, title: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO workshop_sessions (id, title, created_at) VALUES (?1, ?2, ?3)",
            params![session_id, title, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn workshop_session_title(&self, session_id: &str) -> Option<String> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT title FROM workshop_sessions WHERE id = ?1", params![session_id], |row| row.get(0))
            .optional()
            .ok()
            .flatten()
    }

    pub fn rename_workshop_session(&self, session_id: &str, title: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE workshop_sessions SET title = ?1 WHERE id = ?2",
            params![title, session_id],
        )?;
        if affected == 0 {
            return Err(Error::NotFound(format!("workshop session {session_id}")));
        }
        Ok(())
    }
}
