/**
 * Persistence Store
 *
 * One SQLite file per project, opened through `PersistenceStore`. Schema creation is
 * idempotent (`CREATE TABLE IF NOT EXISTS`) and later column additions go through
 * `migrations::ensure_column` so an existing database file is never destructively altered.
 */

mod migrations;
mod store;

pub use store::{PersistenceStore, TaskPatch};
