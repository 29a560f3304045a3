//! Atomic multi-operation mutations.
//!
//! A batch names every bucket and flow it touches before it starts. Those
//! scopes are locked (in a global order), one immediate transaction is
//! opened, and the operations run in sequence against the state left by the
//! ones before them. The first failure drops the transaction, which rolls
//! back everything the batch did.

use crate::error::{Error, Result};
use crate::flow::audit::{self, AuditScope};
use crate::flow::locks::{ScopeKey, ScopeLocks};
use crate::flow::models::{Dependency, EdgeSpec, TaskNode};
use crate::flow::{catalog, graph, ordering};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// One mutation inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum BatchOp {
    /// Add an edge to a flow.
    CreateEdge {
        /// Target flow.
        flow_id: String,
        /// The edge to add.
        edge: EdgeSpec,
    },
    /// Remove edges from a flow by id.
    DeleteEdges {
        /// Target flow.
        flow_id: String,
        /// Ids to remove; unknown ids are skipped.
        edge_ids: Vec<String>,
    },
    /// Replace a bucket's order.
    Reorder {
        /// Target bucket.
        status_id: String,
        /// Every member of the bucket, in the new order.
        task_ids: Vec<String>,
    },
    /// Move a task between (or within) buckets.
    MoveTask {
        /// Task to move.
        task_id: String,
        /// Bucket the task is expected to be in.
        from_status_id: String,
        /// Destination bucket.
        to_status_id: String,
        /// Destination index, clamped to the bucket (negative means 0);
        /// appends when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_position: Option<i64>,
    },
}

impl BatchOp {
    /// Scopes this operation mutates.
    pub fn scopes(&self) -> Vec<ScopeKey> {
        match self {
            Self::CreateEdge { flow_id, .. } | Self::DeleteEdges { flow_id, .. } => {
                vec![ScopeKey::Flow(flow_id.clone())]
            }
            Self::Reorder { status_id, .. } => vec![ScopeKey::Bucket(status_id.clone())],
            Self::MoveTask { from_status_id, to_status_id, .. } => vec![
                ScopeKey::Bucket(from_status_id.clone()),
                ScopeKey::Bucket(to_status_id.clone()),
            ],
        }
    }

    /// Operation name as recorded in the audit log.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateEdge { .. } => "create_edge",
            Self::DeleteEdges { .. } => "delete_edges",
            Self::Reorder { .. } => "reorder",
            Self::MoveTask { .. } => "move_task",
        }
    }
}

/// What one operation of a committed batch produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum BatchOutcome {
    /// The edge as stored.
    EdgeCreated {
        /// Created edge.
        edge: Dependency,
    },
    /// Number of edges actually removed.
    EdgesDeleted {
        /// Flow the edges were removed from.
        flow_id: String,
        /// How many existed.
        count: usize,
    },
    /// The bucket after reordering.
    Reordered {
        /// Reordered bucket.
        status_id: String,
        /// Members in their new positions.
        tasks: Vec<TaskNode>,
    },
    /// The task after moving.
    Moved {
        /// Moved task with its new status and position.
        task: TaskNode,
    },
}

/// Shared flag for cancelling a running batch from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Takes effect at the next operation boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Deadline and cancellation for a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    deadline: Option<Instant>,
    cancel: Option<CancelToken>,
}

impl BatchOptions {
    /// Fail the batch if it has not committed within `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Fail the batch if it has not committed by `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Fail the batch once `token` is cancelled.
    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Whether a deadline is set.
    #[must_use]
    pub const fn has_deadline(&self) -> bool {
        self.deadline.is_some()
    }

    /// Fail with `Cancelled` if the token fired or the deadline passed.
    pub fn check(&self) -> Result<()> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(Error::Cancelled("batch cancelled by caller".to_string()));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::Cancelled("batch deadline exceeded".to_string()));
        }
        Ok(())
    }
}

/// Run `body` in one immediate transaction while holding `scopes`.
///
/// The scopes are acquired before the transaction opens and released after
/// it commits or rolls back. `options` is checked once before the body runs
/// and again just before commit.
pub fn run_scoped<T, F>(
    conn: &mut Connection,
    locks: &ScopeLocks,
    scopes: Vec<ScopeKey>,
    options: &BatchOptions,
    body: F,
) -> Result<T>
where
    F: FnOnce(&Transaction<'_>) -> Result<T>,
{
    let guard = locks.acquire(scopes);
    debug!(scopes = ?guard.keys(), "scopes acquired");
    options.check()?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = body(&tx)?;
    options.check()?;
    tx.commit()?;
    Ok(value)
}

/// Create an edge and audit it. Runs inside the caller's transaction.
pub fn create_edge_audited(conn: &Connection, flow_id: &str, spec: EdgeSpec) -> Result<Dependency> {
    let flow = catalog::require_flow(conn, flow_id)?;
    let edge = graph::create_edge(conn, &flow, spec)?;
    let scope =
        AuditScope { flow_id: Some(flow_id), subject_id: Some(&edge.id), ..AuditScope::default() };
    let details = format!("{} -> {} ({})", edge.source_id, edge.target_id, edge.edge_type);
    audit::record(conn, "create_edge", scope, Some(&details))?;
    Ok(edge)
}

/// Delete edges by id and audit it. Runs inside the caller's transaction.
pub fn delete_edges_audited(conn: &Connection, flow_id: &str, edge_ids: &[String]) -> Result<usize> {
    let count = graph::delete_edges(conn, flow_id, edge_ids)?;
    let scope = AuditScope { flow_id: Some(flow_id), ..AuditScope::default() };
    audit::record(conn, "delete_edges", scope, Some(&serde_json::to_string(edge_ids)?))?;
    Ok(count)
}

/// Reorder a bucket and audit it. Runs inside the caller's transaction.
pub fn reorder_audited(conn: &Connection, status_id: &str, task_ids: &[String]) -> Result<Vec<TaskNode>> {
    let tasks = ordering::reorder(conn, status_id, task_ids)?;
    let scope = AuditScope { status_id: Some(status_id), ..AuditScope::default() };
    audit::record(conn, "reorder", scope, Some(&serde_json::to_string(task_ids)?))?;
    Ok(tasks)
}

/// Move a task and audit it. Runs inside the caller's transaction.
pub fn move_task_audited(
    conn: &Connection,
    task_id: &str,
    from_status_id: &str,
    to_status_id: &str,
    target_position: Option<usize>,
) -> Result<TaskNode> {
    let task = ordering::move_task(conn, task_id, from_status_id, to_status_id, target_position)?;
    let scope = AuditScope {
        status_id: Some(to_status_id),
        subject_id: Some(task_id),
        ..AuditScope::default()
    };
    let details = format!("{from_status_id} -> {to_status_id} @ {}", task.position);
    audit::record(conn, "move_task", scope, Some(&details))?;
    Ok(task)
}

/// Apply one operation inside an open transaction.
pub fn apply_op(conn: &Connection, op: BatchOp) -> Result<BatchOutcome> {
    match op {
        BatchOp::CreateEdge { flow_id, edge } => {
            Ok(BatchOutcome::EdgeCreated { edge: create_edge_audited(conn, &flow_id, edge)? })
        }
        BatchOp::DeleteEdges { flow_id, edge_ids } => {
            let count = delete_edges_audited(conn, &flow_id, &edge_ids)?;
            Ok(BatchOutcome::EdgesDeleted { flow_id, count })
        }
        BatchOp::Reorder { status_id, task_ids } => {
            let tasks = reorder_audited(conn, &status_id, &task_ids)?;
            Ok(BatchOutcome::Reordered { status_id, tasks })
        }
        BatchOp::MoveTask { task_id, from_status_id, to_status_id, target_position } => {
            let target = target_position.map(ordering::target_index);
            let task = move_task_audited(conn, &task_id, &from_status_id, &to_status_id, target)?;
            Ok(BatchOutcome::Moved { task })
        }
    }
}

/// Apply `ops` atomically.
///
/// # Errors
///
/// Returns `InvalidArgument` for an empty batch or one longer than
/// `max_ops`, `Cancelled` if `options` fires before commit, or the first
/// error any operation raises. In every error case nothing is persisted.
#[instrument(skip_all, fields(ops = ops.len()))]
pub fn apply_batch(
    conn: &mut Connection,
    locks: &ScopeLocks,
    ops: Vec<BatchOp>,
    options: &BatchOptions,
    max_ops: usize,
) -> Result<Vec<BatchOutcome>> {
    if ops.is_empty() {
        return Err(Error::InvalidArgument("batch contains no operations".to_string()));
    }
    if ops.len() > max_ops {
        return Err(Error::InvalidArgument(format!(
            "batch of {} operations exceeds the limit of {max_ops}",
            ops.len()
        )));
    }

    let scopes: Vec<ScopeKey> = ops.iter().flat_map(BatchOp::scopes).collect();

    let result = run_scoped(conn, locks, scopes, options, |tx| {
        let mut outcomes = Vec::with_capacity(ops.len());
        for (index, op) in ops.into_iter().enumerate() {
            options.check()?;
            debug!(index, op = op.name(), "applying");
            outcomes.push(apply_op(tx, op)?);
        }
        Ok(outcomes)
    });

    match &result {
        Ok(outcomes) => debug!(applied = outcomes.len(), "batch committed"),
        Err(e) => warn!(error = %e, kind = %e.kind(), "batch rolled back"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::flow::schema;
    use serde_json::json;

    struct Fixture {
        conn: Connection,
        locks: ScopeLocks,
        flow: String,
        todo: String,
        done: String,
        a: String,
        b: String,
    }

    fn fixture() -> Fixture {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        schema::init(&conn).unwrap();
        let project = catalog::insert_project(&conn, "P").unwrap();
        let flow = catalog::insert_flow(&conn, &project.id, "F").unwrap().id;
        let todo = catalog::insert_status(&conn, &project.id, "To Do").unwrap().id;
        let done = catalog::insert_status(&conn, &project.id, "Done").unwrap().id;
        let a = catalog::insert_task(&conn, &todo, "A").unwrap().id;
        let b = catalog::insert_task(&conn, &todo, "B").unwrap().id;
        Fixture { conn, locks: ScopeLocks::new(), flow, todo, done, a, b }
    }

    fn run(f: &mut Fixture, ops: Vec<BatchOp>) -> Result<Vec<BatchOutcome>> {
        apply_batch(&mut f.conn, &f.locks, ops, &BatchOptions::default(), 100)
    }

    #[test]
    fn test_op_json_shape() {
        let op: BatchOp = serde_json::from_value(json!({
            "op": "move-task",
            "task_id": "t1",
            "from_status_id": "todo",
            "to_status_id": "done"
        }))
        .unwrap();
        assert_eq!(op.name(), "move_task");
        assert_eq!(
            op.scopes(),
            vec![ScopeKey::Bucket("todo".to_string()), ScopeKey::Bucket("done".to_string())]
        );

        let op: BatchOp = serde_json::from_value(json!({
            "op": "create-edge",
            "flow_id": "f",
            "edge": {"source": "a", "target": "b", "type": "step"}
        }))
        .unwrap();
        assert_eq!(op.scopes(), vec![ScopeKey::Flow("f".to_string())]);
    }

    #[test]
    fn test_later_ops_see_earlier_ones() {
        let mut f = fixture();
        let ops = vec![
            BatchOp::CreateEdge {
                flow_id: f.flow.clone(),
                edge: EdgeSpec::new(&f.a, &f.b).with_id("e1"),
            },
            BatchOp::DeleteEdges { flow_id: f.flow.clone(), edge_ids: vec!["e1".to_string()] },
            BatchOp::MoveTask {
                task_id: f.a.clone(),
                from_status_id: f.todo.clone(),
                to_status_id: f.done.clone(),
                target_position: None,
            },
            BatchOp::Reorder { status_id: f.todo.clone(), task_ids: vec![f.b.clone()] },
        ];

        let outcomes = run(&mut f, ops).unwrap();
        assert_eq!(outcomes.len(), 4);
        assert!(matches!(&outcomes[1], BatchOutcome::EdgesDeleted { count: 1, .. }));
        assert!(matches!(&outcomes[2], BatchOutcome::Moved { task } if task.position == 0));

        let log = audit::query(&f.conn, None, None).unwrap();
        let names: Vec<&str> = log.iter().rev().map(|e| e.operation.as_str()).collect();
        assert_eq!(names, vec!["create_edge", "delete_edges", "move_task", "reorder"]);
    }

    #[test]
    fn test_failure_rolls_back_everything() {
        let mut f = fixture();
        let ops = vec![
            BatchOp::CreateEdge { flow_id: f.flow.clone(), edge: EdgeSpec::new(&f.a, &f.b) },
            BatchOp::Reorder { status_id: f.todo.clone(), task_ids: vec![f.b.clone(), f.a.clone()] },
            BatchOp::MoveTask {
                task_id: f.a.clone(),
                from_status_id: f.done.clone(),
                to_status_id: f.todo.clone(),
                target_position: Some(0),
            },
        ];

        let err = run(&mut f, ops).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(graph::list_edges(&f.conn, &f.flow).unwrap().is_empty());
        assert_eq!(ordering::list_ordered(&f.conn, &f.todo).unwrap(), vec![f.a.clone(), f.b.clone()]);
        assert!(audit::query(&f.conn, None, None).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_create_in_one_batch_conflicts() {
        let mut f = fixture();
        let edge = EdgeSpec::new(&f.a, &f.b).with_id("e1");
        let ops = vec![
            BatchOp::CreateEdge { flow_id: f.flow.clone(), edge: edge.clone() },
            BatchOp::CreateEdge { flow_id: f.flow.clone(), edge },
        ];
        assert_eq!(run(&mut f, ops).unwrap_err().kind(), ErrorKind::Conflict);
        assert!(graph::list_edges(&f.conn, &f.flow).unwrap().is_empty());
    }

    #[test]
    fn test_empty_and_oversized_batches() {
        let mut f = fixture();
        assert_eq!(run(&mut f, vec![]).unwrap_err().kind(), ErrorKind::InvalidArgument);

        let op = BatchOp::DeleteEdges { flow_id: f.flow.clone(), edge_ids: vec![] };
        let err =
            apply_batch(&mut f.conn, &f.locks, vec![op.clone(), op], &BatchOptions::default(), 1)
                .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_cancelled_batch_persists_nothing() {
        let mut f = fixture();
        let token = CancelToken::new();
        token.cancel();
        let options = BatchOptions::default().with_cancel(token);
        let ops = vec![BatchOp::CreateEdge { flow_id: f.flow.clone(), edge: EdgeSpec::new(&f.a, &f.b) }];

        let err = apply_batch(&mut f.conn, &f.locks, ops, &options, 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(graph::list_edges(&f.conn, &f.flow).unwrap().is_empty());
    }

    #[test]
    fn test_expired_deadline() {
        let mut f = fixture();
        let options = BatchOptions::default().with_deadline(Instant::now());
        assert!(options.has_deadline());
        let ops = vec![BatchOp::DeleteEdges { flow_id: f.flow.clone(), edge_ids: vec![] }];
        let err = apply_batch(&mut f.conn, &f.locks, ops, &options, 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
