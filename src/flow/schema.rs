//! Database schema for the flow store.

use crate::error::Result;
use rusqlite::Connection;

/// Create every table and index if missing.
///
/// Edge foreign keys deliberately carry no `ON DELETE CASCADE`: removing a
/// task must go through the explicit two-phase deletion so the edge set and
/// the bucket ordering are cleaned up together.
pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS flows (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id),
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS statuses (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id),
            name TEXT NOT NULL,
            position INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id),
            status_id TEXT NOT NULL REFERENCES statuses(id),
            title TEXT NOT NULL,
            position INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        -- No two tasks of a bucket may ever share a position
        CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_status_position
            ON tasks(status_id, position);
        CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);

        CREATE TABLE IF NOT EXISTS dependencies (
            flow_id TEXT NOT NULL REFERENCES flows(id),
            id TEXT NOT NULL,
            source_id TEXT NOT NULL REFERENCES tasks(id),
            target_id TEXT NOT NULL REFERENCES tasks(id),
            type TEXT NOT NULL DEFAULT 'default',
            data TEXT,
            created_at TEXT NOT NULL,
            PRIMARY KEY (flow_id, id)
        );

        CREATE INDEX IF NOT EXISTS idx_dependencies_source ON dependencies(source_id);
        CREATE INDEX IF NOT EXISTS idx_dependencies_target ON dependencies(target_id);

        -- Immutable audit log
        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            operation TEXT NOT NULL,
            flow_id TEXT,
            status_id TEXT,
            subject_id TEXT,
            details TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_audit_subject ON audit_log(subject_id);
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        init(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('projects', 'flows', 'statuses', 'tasks', 'dependencies', 'audit_log')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 6);
    }

    #[test]
    fn test_position_uniqueness_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO projects VALUES ('p', 'P', 'now');
             INSERT INTO statuses VALUES ('s', 'p', 'Todo', 0);
             INSERT INTO tasks VALUES ('a', 'p', 's', 'A', 0, 'now');",
        )
        .unwrap();

        let dup = conn.execute("INSERT INTO tasks VALUES ('b', 'p', 's', 'B', 0, 'now')", []);
        assert!(dup.is_err());
    }
}
