/**
 * Additive Schema Migration
 *
 * DESIGN DECISION: Check the table descriptor via `PRAGMA table_info`, and if a column is
 * absent, `ALTER TABLE ... ADD COLUMN` with a permissive default
 * WHY: schema migration is additive and idempotent; the core never destructively migrates
 * user data. `pending_content`/`todos`/`work_order` are the kind of column a later version
 * adds to an existing table
 *
 * REASONING CHAIN:
 * 1. `cargo run` against an older database file must not fail or drop rows
 * 2. Re-running the same migration on an already-migrated database must be a no-op
 * 3. `ALTER TABLE ADD COLUMN` with `DEFAULT NULL`/`DEFAULT ''` satisfies both
 *
 * PATTERN: additive migration via table_info probe, grounded on storage/sqlite.rs's
 * `CREATE TABLE IF NOT EXISTS` idempotence, extended to column-level idempotence
 */

use rusqlite::Connection;

use crate::error::Result;

/// Ensure `table` has a column named `column`; if missing, add it with `default_clause`
/// (e.g. `"TEXT"` or `"TEXT DEFAULT ''"`).
pub fn ensure_column(conn: &Connection, table: &str, column: &str, ddl_type_and_default: &str) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let existing: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(|r| r.ok())
        .collect();

    if existing.iter().any(|c| c == column) {
        return Ok(());
    }

    conn.execute(
        &format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, ddl_type_and_default),
        [],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_column_adds_missing_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE tasks (id INTEGER PRIMARY KEY)", []).unwrap();

        ensure_column(&conn, "tasks", "pending_content", "TEXT").unwrap();

        let mut stmt = conn.prepare("PRAGMA table_info(tasks)").unwrap();
        let cols: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        assert!(cols.contains(&"pending_content".to_string()));
    }

    #[test]
    fn test_ensure_column_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE tasks (id INTEGER PRIMARY KEY)", []).unwrap();

        ensure_column(&conn, "tasks", "todos", "TEXT").unwrap();
        // Second call must not error even though the column already exists.
        ensure_column(&conn, "tasks", "todos", "TEXT").unwrap();
    }
}
