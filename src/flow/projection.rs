//! Read-only graph view of a flow.

use crate::error::Result;
use crate::flow::models::FlowGraph;
use crate::flow::{catalog, graph};
use rusqlite::{Connection, TransactionBehavior};

/// Assemble every task of the flow's project and every edge of the flow.
///
/// Both reads happen in one transaction so the view reflects a single
/// committed state.
///
/// # Errors
///
/// Returns `NotFound` if the flow does not exist.
pub fn project(conn: &mut Connection, flow_id: &str) -> Result<FlowGraph> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
    let flow = catalog::require_flow(&tx, flow_id)?;
    let nodes = catalog::list_project_tasks(&tx, &flow.project_id)?;
    let edges = graph::list_edges(&tx, flow_id)?;
    tx.finish()?;
    Ok(FlowGraph { flow_id: flow.id, nodes, edges })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::flow::models::EdgeSpec;
    use crate::flow::schema;
    use serde_json::json;

    #[test]
    fn test_projection_contains_nodes_and_edges() {
        let mut conn = Connection::open_in_memory().unwrap();
        schema::init(&conn).unwrap();
        let project = catalog::insert_project(&conn, "P").unwrap();
        let flow = catalog::insert_flow(&conn, &project.id, "F").unwrap();
        let todo = catalog::insert_status(&conn, &project.id, "To Do").unwrap();
        let a = catalog::insert_task(&conn, &todo.id, "A").unwrap();
        let b = catalog::insert_task(&conn, &todo.id, "B").unwrap();
        let lone = catalog::insert_task(&conn, &todo.id, "Lone").unwrap();
        graph::create_edge(&conn, &flow, EdgeSpec::new(&a.id, &b.id).with_id("e1")).unwrap();

        let view = super::project(&mut conn, &flow.id).unwrap();
        assert_eq!(view.nodes, vec![a, b, lone]);
        assert_eq!(view.edges.len(), 1);
        assert_eq!(view.edges[0].data, json!({}));
    }

    #[test]
    fn test_unknown_flow() {
        let mut conn = Connection::open_in_memory().unwrap();
        schema::init(&conn).unwrap();
        assert_eq!(project(&mut conn, "nope").unwrap_err().kind(), ErrorKind::NotFound);
    }
}
