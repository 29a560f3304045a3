//! Projects, flows, status buckets and task rows.
//!
//! These records are owned by the surrounding task-management system. The
//! engine only needs to create them (so nodes have somewhere to live) and
//! resolve them (to validate scopes). Every function takes a borrowed
//! connection so it can run inside a caller's transaction.

use crate::error::{Entity, Error, Result};
use crate::flow::id::generate_id;
use crate::flow::models::{Flow, Project, StatusBucket, TaskNode};
use crate::flow::ordering;
use rusqlite::{params, Connection, OptionalExtension};

/// Column list matching [`parse_task`].
pub const TASK_COLUMNS: &str = "id, project_id, status_id, title, position, created_at";

/// Attempts at drawing an unused generated id before giving up.
const MAX_ID_ATTEMPTS: usize = 16;

/// Current time as an RFC 3339 string with millisecond precision.
pub fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Parse a task from a row selected with [`TASK_COLUMNS`].
pub fn parse_task(row: &rusqlite::Row) -> rusqlite::Result<TaskNode> {
    Ok(TaskNode {
        id: row.get(0)?,
        project_id: row.get(1)?,
        status_id: row.get(2)?,
        title: row.get(3)?,
        position: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn parse_flow(row: &rusqlite::Row) -> rusqlite::Result<Flow> {
    Ok(Flow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn parse_status(row: &rusqlite::Row) -> rusqlite::Result<StatusBucket> {
    Ok(StatusBucket {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        position: row.get(3)?,
    })
}

/// Draw a generated id that is not yet used as a primary key of `table`.
fn fresh_id(conn: &Connection, table: &str, seed: &str, fallback: &str) -> Result<String> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1)");
    for _ in 0..MAX_ID_ATTEMPTS {
        let id = generate_id(seed, fallback);
        let taken: bool = conn.query_row(&sql, params![&id], |row| row.get(0))?;
        if !taken {
            return Ok(id);
        }
    }
    Err(Error::Conflict(format!("could not allocate a free {fallback} id for {seed:?}")))
}

fn require_name(name: &str, what: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidArgument(format!("{what} name must not be empty")));
    }
    Ok(())
}

/// Get a project by id.
pub fn get_project(conn: &Connection, id: &str) -> Result<Option<Project>> {
    let project = conn
        .query_row(
            "SELECT id, name, created_at FROM projects WHERE id = ?1",
            params![id],
            |row| Ok(Project { id: row.get(0)?, name: row.get(1)?, created_at: row.get(2)? }),
        )
        .optional()?;
    Ok(project)
}

/// Get a flow by id.
pub fn get_flow(conn: &Connection, id: &str) -> Result<Option<Flow>> {
    let flow = conn
        .query_row(
            "SELECT id, project_id, name, created_at FROM flows WHERE id = ?1",
            params![id],
            parse_flow,
        )
        .optional()?;
    Ok(flow)
}

/// Get a status bucket by id.
pub fn get_status(conn: &Connection, id: &str) -> Result<Option<StatusBucket>> {
    let status = conn
        .query_row(
            "SELECT id, project_id, name, position FROM statuses WHERE id = ?1",
            params![id],
            parse_status,
        )
        .optional()?;
    Ok(status)
}

/// Get a task by id.
pub fn get_task(conn: &Connection, id: &str) -> Result<Option<TaskNode>> {
    let task = conn
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            params![id],
            parse_task,
        )
        .optional()?;
    Ok(task)
}

/// Resolve a flow or fail with `NotFound`.
pub fn require_flow(conn: &Connection, id: &str) -> Result<Flow> {
    get_flow(conn, id)?.ok_or_else(|| Error::not_found(Entity::Flow, id))
}

/// Resolve a status bucket or fail with `NotFound`.
pub fn require_status(conn: &Connection, id: &str) -> Result<StatusBucket> {
    get_status(conn, id)?.ok_or_else(|| Error::not_found(Entity::Status, id))
}

/// Resolve a task or fail with `NotFound`.
pub fn require_task(conn: &Connection, id: &str) -> Result<TaskNode> {
    get_task(conn, id)?.ok_or_else(|| Error::not_found(Entity::Task, id))
}

/// Insert a project.
pub fn insert_project(conn: &Connection, name: &str) -> Result<Project> {
    require_name(name, "project")?;
    let project = Project {
        id: fresh_id(conn, "projects", name, "project")?,
        name: name.to_string(),
        created_at: now(),
    };
    conn.execute(
        "INSERT INTO projects (id, name, created_at) VALUES (?1, ?2, ?3)",
        params![&project.id, &project.name, &project.created_at],
    )?;
    Ok(project)
}

/// Insert a flow scoped to an existing project.
pub fn insert_flow(conn: &Connection, project_id: &str, name: &str) -> Result<Flow> {
    require_name(name, "flow")?;
    if get_project(conn, project_id)?.is_none() {
        return Err(Error::not_found(Entity::Project, project_id));
    }
    let flow = Flow {
        id: fresh_id(conn, "flows", name, "flow")?,
        project_id: project_id.to_string(),
        name: name.to_string(),
        created_at: now(),
    };
    conn.execute(
        "INSERT INTO flows (id, project_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![&flow.id, &flow.project_id, &flow.name, &flow.created_at],
    )?;
    Ok(flow)
}

/// Insert a status bucket as the last column of its project.
pub fn insert_status(conn: &Connection, project_id: &str, name: &str) -> Result<StatusBucket> {
    require_name(name, "status")?;
    if get_project(conn, project_id)?.is_none() {
        return Err(Error::not_found(Entity::Project, project_id));
    }
    let position: i64 = conn.query_row(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM statuses WHERE project_id = ?1",
        params![project_id],
        |row| row.get(0),
    )?;
    let status = StatusBucket {
        id: fresh_id(conn, "statuses", name, "status")?,
        project_id: project_id.to_string(),
        name: name.to_string(),
        position,
    };
    conn.execute(
        "INSERT INTO statuses (id, project_id, name, position) VALUES (?1, ?2, ?3, ?4)",
        params![&status.id, &status.project_id, &status.name, status.position],
    )?;
    Ok(status)
}

/// Insert a task, appending it to the end of its status bucket.
///
/// The caller must hold the bucket's scope.
pub fn insert_task(conn: &Connection, status_id: &str, title: &str) -> Result<TaskNode> {
    require_name(title, "task")?;
    let status = require_status(conn, status_id)?;
    let id = fresh_id(conn, "tasks", title, "task")?;
    let position = ordering::next_position(conn, status_id)?;
    let task = TaskNode {
        id,
        project_id: status.project_id,
        status_id: status.id,
        title: title.to_string(),
        position,
        created_at: now(),
    };
    conn.execute(
        "INSERT INTO tasks (id, project_id, status_id, title, position, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            &task.id,
            &task.project_id,
            &task.status_id,
            &task.title,
            task.position,
            &task.created_at
        ],
    )?;
    Ok(task)
}

/// List a project's status buckets in column order.
pub fn list_statuses(conn: &Connection, project_id: &str) -> Result<Vec<StatusBucket>> {
    if get_project(conn, project_id)?.is_none() {
        return Err(Error::not_found(Entity::Project, project_id));
    }
    let mut stmt = conn.prepare(
        "SELECT id, project_id, name, position FROM statuses
         WHERE project_id = ?1 ORDER BY position ASC",
    )?;
    let statuses =
        stmt.query_map(params![project_id], parse_status)?.collect::<rusqlite::Result<_>>()?;
    Ok(statuses)
}

/// List every task of a project in creation order.
pub fn list_project_tasks(conn: &Connection, project_id: &str) -> Result<Vec<TaskNode>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ?1 ORDER BY rowid ASC"
    ))?;
    let tasks =
        stmt.query_map(params![project_id], parse_task)?.collect::<rusqlite::Result<_>>()?;
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::schema;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        schema::init(&conn).unwrap();
        conn
    }

    #[test]
    fn test_insert_and_resolve() {
        let conn = conn();
        let project = insert_project(&conn, "Website").unwrap();
        let flow = insert_flow(&conn, &project.id, "Launch plan").unwrap();
        let todo = insert_status(&conn, &project.id, "To Do").unwrap();
        let done = insert_status(&conn, &project.id, "Done").unwrap();

        assert_eq!(todo.position, 0);
        assert_eq!(done.position, 1);
        assert_eq!(require_flow(&conn, &flow.id).unwrap(), flow);

        let statuses = list_statuses(&conn, &project.id).unwrap();
        assert_eq!(statuses, vec![todo, done]);
    }

    #[test]
    fn test_insert_task_appends() {
        let conn = conn();
        let project = insert_project(&conn, "P").unwrap();
        let todo = insert_status(&conn, &project.id, "To Do").unwrap();

        let a = insert_task(&conn, &todo.id, "A").unwrap();
        let b = insert_task(&conn, &todo.id, "B").unwrap();
        assert_eq!(a.position, 0);
        assert_eq!(b.position, 1);
        assert_eq!(b.project_id, project.id);

        let tasks = list_project_tasks(&conn, &project.id).unwrap();
        assert_eq!(tasks, vec![a, b]);
    }

    #[test]
    fn test_missing_parents_are_not_found() {
        let conn = conn();
        let err = insert_flow(&conn, "nope", "F").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);

        let err = insert_task(&conn, "nope", "T").unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: Entity::Status, .. }));

        assert!(require_task(&conn, "nope").is_err());
    }

    #[test]
    fn test_blank_names_rejected() {
        let conn = conn();
        let err = insert_project(&conn, "   ").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }
}
