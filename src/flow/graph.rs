//! Dependency edges of a flow.
//!
//! Edges are directed, typed, and carry an opaque JSON payload. Both
//! endpoints must be tasks of the flow's project. Cycles and self-loops are
//! allowed; the graph is a presentation structure, not a scheduler.

use crate::error::{Entity, Error, Result};
use crate::flow::catalog::{self, now};
use crate::flow::id::{generate_edge_id, validate_id};
use crate::flow::models::{payload_or_empty, Dependency, EdgeSpec, Flow, DEFAULT_EDGE_TYPE};
use rusqlite::{params, Connection};
use std::collections::BTreeSet;

/// Column list matching [`parse_edge`].
pub const EDGE_COLUMNS: &str = "id, flow_id, source_id, target_id, type, data";

const MAX_ID_ATTEMPTS: usize = 16;

/// Parse an edge from a row selected with [`EDGE_COLUMNS`].
pub fn parse_edge(row: &rusqlite::Row) -> rusqlite::Result<Dependency> {
    let raw: Option<String> = row.get(5)?;
    let data = match raw {
        Some(text) => serde_json::from_str(&text).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?,
        None => payload_or_empty(None),
    };
    Ok(Dependency {
        id: row.get(0)?,
        flow_id: row.get(1)?,
        source_id: row.get(2)?,
        target_id: row.get(3)?,
        edge_type: row.get(4)?,
        data,
    })
}

/// List a flow's edges in insertion order.
///
/// # Errors
///
/// Returns `NotFound` if the flow does not exist.
pub fn list_edges(conn: &Connection, flow_id: &str) -> Result<Vec<Dependency>> {
    catalog::require_flow(conn, flow_id)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {EDGE_COLUMNS} FROM dependencies WHERE flow_id = ?1 ORDER BY rowid ASC"
    ))?;
    let edges = stmt.query_map(params![flow_id], parse_edge)?.collect::<rusqlite::Result<_>>()?;
    Ok(edges)
}

/// Whether `edge_id` is taken in `flow_id`.
pub fn edge_exists(conn: &Connection, flow_id: &str, edge_id: &str) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM dependencies WHERE flow_id = ?1 AND id = ?2)",
        params![flow_id, edge_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn require_endpoint(conn: &Connection, flow: &Flow, task_id: &str) -> Result<()> {
    match catalog::get_task(conn, task_id)? {
        Some(task) if task.project_id == flow.project_id => Ok(()),
        _ => Err(Error::not_found(Entity::Task, format!("{task_id} (in flow {})", flow.id))),
    }
}

fn resolve_edge_id(conn: &Connection, flow: &Flow, spec: &EdgeSpec) -> Result<String> {
    if let Some(id) = &spec.id {
        validate_id(id)?;
        if edge_exists(conn, &flow.id, id)? {
            return Err(Error::Conflict(format!("edge {id} already exists in flow {}", flow.id)));
        }
        return Ok(id.clone());
    }
    for _ in 0..MAX_ID_ATTEMPTS {
        let id = generate_edge_id(&spec.source, &spec.target);
        if !edge_exists(conn, &flow.id, &id)? {
            return Ok(id);
        }
    }
    Err(Error::Conflict(format!(
        "could not allocate a free edge id for {} -> {}",
        spec.source, spec.target
    )))
}

/// Insert one edge into `flow`.
///
/// # Errors
///
/// Returns `NotFound` if an endpoint is not a task of the flow's project,
/// `InvalidArgument` for a malformed id, and `Conflict` if the id is taken.
pub fn create_edge(conn: &Connection, flow: &Flow, spec: EdgeSpec) -> Result<Dependency> {
    require_endpoint(conn, flow, &spec.source)?;
    require_endpoint(conn, flow, &spec.target)?;
    let id = resolve_edge_id(conn, flow, &spec)?;

    let edge_type = match spec.edge_type {
        Some(t) if !t.trim().is_empty() => t,
        _ => DEFAULT_EDGE_TYPE.to_string(),
    };
    let edge = Dependency {
        id,
        flow_id: flow.id.clone(),
        source_id: spec.source,
        target_id: spec.target,
        edge_type,
        data: payload_or_empty(spec.data),
    };

    conn.execute(
        "INSERT INTO dependencies (flow_id, id, source_id, target_id, type, data, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            &edge.flow_id,
            &edge.id,
            &edge.source_id,
            &edge.target_id,
            &edge.edge_type,
            serde_json::to_string(&edge.data)?,
            now()
        ],
    )?;
    Ok(edge)
}

/// Insert several edges into one flow, in order.
///
/// Fails on the first bad spec; the caller's transaction discards the rest.
pub fn create_edges(conn: &Connection, flow: &Flow, specs: Vec<EdgeSpec>) -> Result<Vec<Dependency>> {
    if specs.is_empty() {
        return Err(Error::InvalidArgument("no edges to create".to_string()));
    }
    specs.into_iter().map(|spec| create_edge(conn, flow, spec)).collect()
}

/// Delete the listed edges of a flow and return how many existed.
///
/// Unknown ids are skipped; repeated ids count once.
///
/// # Errors
///
/// Returns `NotFound` if the flow does not exist.
pub fn delete_edges(conn: &Connection, flow_id: &str, edge_ids: &[String]) -> Result<usize> {
    catalog::require_flow(conn, flow_id)?;
    let unique: BTreeSet<&str> = edge_ids.iter().map(String::as_str).collect();
    let mut stmt = conn.prepare("DELETE FROM dependencies WHERE flow_id = ?1 AND id = ?2")?;
    let mut removed = 0;
    for id in unique {
        removed += stmt.execute(params![flow_id, id])?;
    }
    Ok(removed)
}

/// Delete every edge, in any flow, with `task_id` as an endpoint.
pub fn delete_edges_touching(conn: &Connection, task_id: &str) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM dependencies WHERE source_id = ?1 OR target_id = ?1",
        params![task_id],
    )?;
    Ok(removed)
}

/// Ids of flows holding an edge with `task_id` as an endpoint.
pub fn flows_touching(conn: &Connection, task_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT flow_id FROM dependencies
         WHERE source_id = ?1 OR target_id = ?1 ORDER BY flow_id",
    )?;
    let flows = stmt.query_map(params![task_id], |row| row.get(0))?.collect::<rusqlite::Result<_>>()?;
    Ok(flows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::flow::schema;
    use serde_json::json;

    struct Fixture {
        conn: Connection,
        flow: Flow,
        a: String,
        b: String,
    }

    fn fixture() -> Fixture {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        schema::init(&conn).unwrap();
        let project = catalog::insert_project(&conn, "P").unwrap();
        let flow = catalog::insert_flow(&conn, &project.id, "Main").unwrap();
        let todo = catalog::insert_status(&conn, &project.id, "To Do").unwrap();
        let a = catalog::insert_task(&conn, &todo.id, "A").unwrap().id;
        let b = catalog::insert_task(&conn, &todo.id, "B").unwrap().id;
        Fixture { conn, flow, a, b }
    }

    #[test]
    fn test_create_with_defaults() {
        let f = fixture();
        let edge = create_edge(&f.conn, &f.flow, EdgeSpec::new(&f.a, &f.b)).unwrap();
        assert_eq!(edge.edge_type, DEFAULT_EDGE_TYPE);
        assert_eq!(edge.data, json!({}));
        assert!(edge.id.starts_with(&format!("{}-{}", f.a, f.b)));

        let listed = list_edges(&f.conn, &f.flow.id).unwrap();
        assert_eq!(listed, vec![edge]);
    }

    #[test]
    fn test_payload_is_stored_verbatim() {
        let f = fixture();
        let data = json!({"label": "blocks", "style": {"stroke": "#f00"}, "n": [1, 2.5, null]});
        let spec = EdgeSpec::new(&f.a, &f.b).with_id("e1").with_type("smoothstep").with_data(data.clone());
        create_edge(&f.conn, &f.flow, spec).unwrap();

        let listed = list_edges(&f.conn, &f.flow.id).unwrap();
        assert_eq!(listed[0].data, data);
        assert_eq!(listed[0].edge_type, "smoothstep");
    }

    #[test]
    fn test_duplicate_id_conflicts() {
        let f = fixture();
        create_edge(&f.conn, &f.flow, EdgeSpec::new(&f.a, &f.b).with_id("e1")).unwrap();
        let err = create_edge(&f.conn, &f.flow, EdgeSpec::new(&f.b, &f.a).with_id("e1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_self_loop_and_parallel_edges_allowed() {
        let f = fixture();
        create_edge(&f.conn, &f.flow, EdgeSpec::new(&f.a, &f.a)).unwrap();
        create_edge(&f.conn, &f.flow, EdgeSpec::new(&f.a, &f.b)).unwrap();
        create_edge(&f.conn, &f.flow, EdgeSpec::new(&f.b, &f.a)).unwrap();
        assert_eq!(list_edges(&f.conn, &f.flow.id).unwrap().len(), 3);
    }

    #[test]
    fn test_endpoint_outside_project() {
        let f = fixture();
        let other = catalog::insert_project(&f.conn, "Other").unwrap();
        let status = catalog::insert_status(&f.conn, &other.id, "S").unwrap();
        let stranger = catalog::insert_task(&f.conn, &status.id, "X").unwrap();

        let err = create_edge(&f.conn, &f.flow, EdgeSpec::new(&f.a, &stranger.id)).unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: Entity::Task, .. }));
        let err = create_edge(&f.conn, &f.flow, EdgeSpec::new("ghost", &f.b)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_malformed_id_rejected() {
        let f = fixture();
        let err = create_edge(&f.conn, &f.flow, EdgeSpec::new(&f.a, &f.b).with_id("a b")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_delete_counts_existing_only() {
        let f = fixture();
        create_edge(&f.conn, &f.flow, EdgeSpec::new(&f.a, &f.b).with_id("e1")).unwrap();
        create_edge(&f.conn, &f.flow, EdgeSpec::new(&f.b, &f.a).with_id("e2")).unwrap();

        let ids = vec!["e1".to_string(), "e1".to_string(), "nope".to_string()];
        assert_eq!(delete_edges(&f.conn, &f.flow.id, &ids).unwrap(), 1);
        assert_eq!(delete_edges(&f.conn, &f.flow.id, &[]).unwrap(), 0);
        assert_eq!(list_edges(&f.conn, &f.flow.id).unwrap().len(), 1);

        let err = delete_edges(&f.conn, "ghost", &ids).unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: Entity::Flow, .. }));
    }

    #[test]
    fn test_delete_only_touches_named_flow() {
        let f = fixture();
        let other = catalog::insert_flow(&f.conn, &f.flow.project_id, "Alt").unwrap();
        create_edge(&f.conn, &f.flow, EdgeSpec::new(&f.a, &f.b).with_id("e1")).unwrap();
        create_edge(&f.conn, &other, EdgeSpec::new(&f.b, &f.a).with_id("e1")).unwrap();

        assert_eq!(delete_edges(&f.conn, &f.flow.id, &["e1".to_string()]).unwrap(), 1);

        assert!(list_edges(&f.conn, &f.flow.id).unwrap().is_empty());
        let remaining = list_edges(&f.conn, &other.id).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "e1");
        assert_eq!(remaining[0].flow_id, other.id);
    }

    #[test]
    fn test_same_id_in_two_flows() {
        let f = fixture();
        let second = catalog::insert_flow(&f.conn, &f.flow.project_id, "Alt").unwrap();
        create_edge(&f.conn, &f.flow, EdgeSpec::new(&f.a, &f.b).with_id("e1")).unwrap();
        create_edge(&f.conn, &second, EdgeSpec::new(&f.a, &f.b).with_id("e1")).unwrap();

        assert_eq!(flows_touching(&f.conn, &f.a).unwrap().len(), 2);
        assert_eq!(delete_edges_touching(&f.conn, &f.b).unwrap(), 2);
        assert!(flows_touching(&f.conn, &f.a).unwrap().is_empty());
    }

    #[test]
    fn test_create_edges_empty_is_invalid() {
        let f = fixture();
        let err = create_edges(&f.conn, &f.flow, vec![]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
