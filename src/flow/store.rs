//! Flow store trait and `SQLite` implementation.

use crate::error::{Entity, Error, Result};
use crate::flow::audit::{self, AuditScope};
use crate::flow::batch::{self, BatchOp, BatchOptions, BatchOutcome};
use crate::flow::locks::{ScopeKey, ScopeLocks};
use crate::flow::models::{
    AuditEntry, Dependency, EdgeSpec, Flow, FlowGraph, OrderingReport, Project, StatusBucket,
    TaskDeletion, TaskNode,
};
use crate::flow::ordering::{self, Bucket};
use crate::flow::{catalog, graph, projection, schema};
use rusqlite::{Connection, Transaction};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Attempts at pinning down the scopes of a task deletion before giving up.
const MAX_DELETE_ATTEMPTS: usize = 5;

/// Trait for flow graph and ordering operations.
///
/// Every mutation is atomic: it either commits entirely or leaves the store
/// unchanged.
#[allow(clippy::missing_errors_doc)]
pub trait FlowStore {
    // Catalogue
    /// Create a project.
    fn create_project(&self, name: &str) -> Result<Project>;

    /// Create a flow within a project.
    fn create_flow(&self, project_id: &str, name: &str) -> Result<Flow>;

    /// Create a status bucket as the project's last column.
    fn create_status(&self, project_id: &str, name: &str) -> Result<StatusBucket>;

    /// Create a task at the end of a status bucket.
    fn create_task(&self, status_id: &str, title: &str) -> Result<TaskNode>;

    /// Get a flow by id.
    fn get_flow(&self, id: &str) -> Result<Option<Flow>>;

    /// Get a status bucket by id.
    fn get_status(&self, id: &str) -> Result<Option<StatusBucket>>;

    /// Get a task by id.
    fn get_task(&self, id: &str) -> Result<Option<TaskNode>>;

    /// List a project's status buckets in column order.
    fn list_statuses(&self, project_id: &str) -> Result<Vec<StatusBucket>>;

    /// List every task of a project.
    fn list_tasks(&self, project_id: &str) -> Result<Vec<TaskNode>>;

    /// Delete a task, its edges in every flow, and its slot in its bucket.
    fn delete_task(&self, id: &str) -> Result<TaskDeletion>;

    // Graph
    /// List a flow's edges in insertion order.
    fn list_edges(&self, flow_id: &str) -> Result<Vec<Dependency>>;

    /// Create one edge.
    fn create_edge(&self, flow_id: &str, spec: EdgeSpec) -> Result<Dependency>;

    /// Create several edges atomically.
    fn create_edges(&self, flow_id: &str, specs: Vec<EdgeSpec>) -> Result<Vec<Dependency>>;

    /// Delete edges by id, returning how many existed.
    fn delete_edges(&self, flow_id: &str, edge_ids: &[String]) -> Result<usize>;

    // Ordering
    /// Task ids of a bucket in position order.
    fn list_ordered(&self, status_id: &str) -> Result<Vec<String>>;

    /// Replace a bucket's order with a permutation of its members.
    fn reorder(&self, status_id: &str, task_ids: &[String]) -> Result<Vec<TaskNode>>;

    /// Move a task to a position in another (or the same) bucket.
    fn move_task(
        &self,
        task_id: &str,
        from_status_id: &str,
        to_status_id: &str,
        target_position: Option<usize>,
    ) -> Result<TaskNode>;

    /// Verify a bucket's positions are exactly `0..k`.
    fn check_ordering(&self, status_id: &str) -> Result<OrderingReport>;

    // Coordinator
    /// Apply several mutations atomically, under the configured deadline if any.
    fn apply_batch(&self, ops: Vec<BatchOp>) -> Result<Vec<BatchOutcome>>;

    /// Apply several mutations atomically with explicit cancellation.
    fn apply_batch_with(&self, ops: Vec<BatchOp>, options: &BatchOptions)
        -> Result<Vec<BatchOutcome>>;

    // Projection
    /// Nodes and edges of a flow.
    fn project(&self, flow_id: &str) -> Result<FlowGraph>;

    // Audit
    /// Audit entries newest first, optionally for one subject, flow or status.
    fn get_audit_log(&self, subject: Option<&str>, limit: Option<usize>)
        -> Result<Vec<AuditEntry>>;
}

/// Tunables for a [`SqliteFlowStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// How long a connection waits for another writer before failing.
    pub busy_timeout: Duration,
    /// Largest accepted batch.
    pub max_batch_ops: usize,
    /// Deadline applied to batches that do not bring their own.
    pub batch_timeout: Option<Duration>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { busy_timeout: Duration::from_secs(5), max_batch_ops: 1000, batch_timeout: None }
    }
}

/// SQLite-based flow store.
///
/// Each operation opens a new connection. Clones share one scope-lock
/// registry, so mutations through any clone are serialised per bucket and
/// per flow.
#[derive(Debug, Clone)]
pub struct SqliteFlowStore {
    db_path: PathBuf,
    settings: StoreSettings,
    locks: Arc<ScopeLocks>,
}

impl SqliteFlowStore {
    /// Create a store at the given database path with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_settings(db_path, StoreSettings::default())
    }

    /// Create a store at the given database path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn with_settings(db_path: impl AsRef<Path>, settings: StoreSettings) -> Result<Self> {
        let store = Self {
            db_path: db_path.as_ref().to_path_buf(),
            settings,
            locks: Arc::new(ScopeLocks::new()),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Get the database path.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Get the store settings.
    #[must_use]
    pub const fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(self.settings.busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.open()?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        schema::init(&conn)
    }

    /// Run a single mutation holding `scopes`.
    fn mutate<T>(
        &self,
        scopes: Vec<ScopeKey>,
        body: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.open()?;
        batch::run_scoped(&mut conn, &self.locks, scopes, &BatchOptions::default(), body)
    }

    /// Scopes a deletion of `task_id` would need, read outside any lock.
    fn deletion_scopes(&self, task_id: &str) -> Result<(String, Vec<String>)> {
        let conn = self.open()?;
        let task = catalog::require_task(&conn, task_id)?;
        let flows = graph::flows_touching(&conn, task_id)?;
        Ok((task.status_id, flows))
    }
}

impl FlowStore for SqliteFlowStore {
    fn create_project(&self, name: &str) -> Result<Project> {
        self.mutate(vec![], |tx| {
            let project = catalog::insert_project(tx, name)?;
            let scope = AuditScope { subject_id: Some(&project.id), ..AuditScope::default() };
            audit::record(tx, "create_project", scope, Some(name))?;
            Ok(project)
        })
    }

    fn create_flow(&self, project_id: &str, name: &str) -> Result<Flow> {
        self.mutate(vec![], |tx| {
            let flow = catalog::insert_flow(tx, project_id, name)?;
            let scope = AuditScope { flow_id: Some(&flow.id), ..AuditScope::default() };
            audit::record(tx, "create_flow", scope, Some(name))?;
            Ok(flow)
        })
    }

    fn create_status(&self, project_id: &str, name: &str) -> Result<StatusBucket> {
        self.mutate(vec![], |tx| {
            let status = catalog::insert_status(tx, project_id, name)?;
            let scope = AuditScope { status_id: Some(&status.id), ..AuditScope::default() };
            audit::record(tx, "create_status", scope, Some(name))?;
            Ok(status)
        })
    }

    fn create_task(&self, status_id: &str, title: &str) -> Result<TaskNode> {
        self.mutate(vec![ScopeKey::Bucket(status_id.to_string())], |tx| {
            let task = catalog::insert_task(tx, status_id, title)?;
            let scope = AuditScope {
                status_id: Some(status_id),
                subject_id: Some(&task.id),
                ..AuditScope::default()
            };
            audit::record(tx, "create_task", scope, Some(title))?;
            Ok(task)
        })
    }

    fn get_flow(&self, id: &str) -> Result<Option<Flow>> {
        catalog::get_flow(&self.open()?, id)
    }

    fn get_status(&self, id: &str) -> Result<Option<StatusBucket>> {
        catalog::get_status(&self.open()?, id)
    }

    fn get_task(&self, id: &str) -> Result<Option<TaskNode>> {
        catalog::get_task(&self.open()?, id)
    }

    fn list_statuses(&self, project_id: &str) -> Result<Vec<StatusBucket>> {
        catalog::list_statuses(&self.open()?, project_id)
    }

    fn list_tasks(&self, project_id: &str) -> Result<Vec<TaskNode>> {
        let conn = self.open()?;
        if catalog::get_project(&conn, project_id)?.is_none() {
            return Err(Error::not_found(Entity::Project, project_id));
        }
        catalog::list_project_tasks(&conn, project_id)
    }

    /// The task's bucket and the flows holding its edges are read first,
    /// locked, then re-read inside the transaction. If a concurrent mutation
    /// moved the task or linked it into another flow in between, the
    /// attempt is abandoned and repeated.
    #[instrument(skip(self))]
    fn delete_task(&self, id: &str) -> Result<TaskDeletion> {
        for attempt in 1..=MAX_DELETE_ATTEMPTS {
            let (status_id, flows) = self.deletion_scopes(id)?;
            let mut scopes = vec![ScopeKey::Bucket(status_id.clone())];
            scopes.extend(flows.iter().cloned().map(ScopeKey::Flow));

            let deletion = self.mutate(scopes, |tx| {
                let task = catalog::require_task(tx, id)?;
                let current = graph::flows_touching(tx, id)?;
                if task.status_id != status_id || current.iter().any(|f| !flows.contains(f)) {
                    return Ok(None);
                }

                let edges_removed = graph::delete_edges_touching(tx, id)?;
                let mut bucket = Bucket::load(tx, &status_id)?;
                bucket.remove(id);
                tx.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
                ordering::write_back(tx, &[&bucket])?;

                let scope = AuditScope {
                    status_id: Some(&status_id),
                    subject_id: Some(id),
                    ..AuditScope::default()
                };
                let details = format!("{edges_removed} edges removed");
                audit::record(tx, "delete_task", scope, Some(&details))?;
                Ok(Some(TaskDeletion { task, edges_removed }))
            })?;

            if let Some(deletion) = deletion {
                debug!(edges_removed = deletion.edges_removed, "task deleted");
                return Ok(deletion);
            }
            debug!(attempt, "task changed scope during deletion, retrying");
        }
        Err(Error::Conflict(format!("task {id} kept changing while being deleted")))
    }

    fn list_edges(&self, flow_id: &str) -> Result<Vec<Dependency>> {
        graph::list_edges(&self.open()?, flow_id)
    }

    fn create_edge(&self, flow_id: &str, spec: EdgeSpec) -> Result<Dependency> {
        self.mutate(vec![ScopeKey::Flow(flow_id.to_string())], |tx| {
            batch::create_edge_audited(tx, flow_id, spec)
        })
    }

    fn create_edges(&self, flow_id: &str, specs: Vec<EdgeSpec>) -> Result<Vec<Dependency>> {
        if specs.is_empty() {
            return Err(Error::InvalidArgument("no edges to create".to_string()));
        }
        if specs.len() > self.settings.max_batch_ops {
            return Err(Error::InvalidArgument(format!(
                "{} edges exceed the batch limit of {}",
                specs.len(),
                self.settings.max_batch_ops
            )));
        }
        self.mutate(vec![ScopeKey::Flow(flow_id.to_string())], |tx| {
            specs.into_iter().map(|spec| batch::create_edge_audited(tx, flow_id, spec)).collect()
        })
    }

    fn delete_edges(&self, flow_id: &str, edge_ids: &[String]) -> Result<usize> {
        self.mutate(vec![ScopeKey::Flow(flow_id.to_string())], |tx| {
            batch::delete_edges_audited(tx, flow_id, edge_ids)
        })
    }

    fn list_ordered(&self, status_id: &str) -> Result<Vec<String>> {
        ordering::list_ordered(&self.open()?, status_id)
    }

    fn reorder(&self, status_id: &str, task_ids: &[String]) -> Result<Vec<TaskNode>> {
        self.mutate(vec![ScopeKey::Bucket(status_id.to_string())], |tx| {
            batch::reorder_audited(tx, status_id, task_ids)
        })
    }

    fn move_task(
        &self,
        task_id: &str,
        from_status_id: &str,
        to_status_id: &str,
        target_position: Option<usize>,
    ) -> Result<TaskNode> {
        let scopes = vec![
            ScopeKey::Bucket(from_status_id.to_string()),
            ScopeKey::Bucket(to_status_id.to_string()),
        ];
        self.mutate(scopes, |tx| {
            batch::move_task_audited(tx, task_id, from_status_id, to_status_id, target_position)
        })
    }

    fn check_ordering(&self, status_id: &str) -> Result<OrderingReport> {
        ordering::check(&self.open()?, status_id)
    }

    fn apply_batch(&self, ops: Vec<BatchOp>) -> Result<Vec<BatchOutcome>> {
        self.apply_batch_with(ops, &BatchOptions::default())
    }

    fn apply_batch_with(
        &self,
        ops: Vec<BatchOp>,
        options: &BatchOptions,
    ) -> Result<Vec<BatchOutcome>> {
        let options = match self.settings.batch_timeout {
            Some(timeout) if !options.has_deadline() => options.clone().with_timeout(timeout),
            _ => options.clone(),
        };
        let mut conn = self.open()?;
        batch::apply_batch(&mut conn, &self.locks, ops, &options, self.settings.max_batch_ops)
    }

    fn project(&self, flow_id: &str) -> Result<FlowGraph> {
        projection::project(&mut self.open()?, flow_id)
    }

    fn get_audit_log(
        &self,
        subject: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<AuditEntry>> {
        audit::query(&self.open()?, subject, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, SqliteFlowStore) {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");
        let store = SqliteFlowStore::new(&db_path).unwrap();
        (dir, store)
    }

    struct Board {
        flow: Flow,
        todo: StatusBucket,
        done: StatusBucket,
    }

    fn board(store: &SqliteFlowStore) -> Board {
        let project = store.create_project("Website").unwrap();
        let flow = store.create_flow(&project.id, "Launch").unwrap();
        let todo = store.create_status(&project.id, "To Do").unwrap();
        let done = store.create_status(&project.id, "Done").unwrap();
        Board { flow, todo, done }
    }

    #[test]
    fn test_store_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("nested").join("deeper").join("flow.db");
        let store = SqliteFlowStore::new(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(store.db_path(), db_path.as_path());
    }

    #[test]
    fn test_create_task_appends_to_bucket() {
        let (_dir, store) = create_test_store();
        let b = board(&store);
        let x = store.create_task(&b.todo.id, "X").unwrap();
        let y = store.create_task(&b.todo.id, "Y").unwrap();

        assert_eq!((x.position, y.position), (0, 1));
        assert_eq!(store.list_ordered(&b.todo.id).unwrap(), vec![x.id, y.id]);
    }

    #[test]
    fn test_edge_roundtrip_through_projection() {
        let (_dir, store) = create_test_store();
        let b = board(&store);
        let t1 = store.create_task(&b.todo.id, "Design").unwrap();
        let t2 = store.create_task(&b.todo.id, "Build").unwrap();

        let spec = EdgeSpec::new(&t1.id, &t2.id).with_id("e1").with_data(json!({"animated": true}));
        store.create_edge(&b.flow.id, spec).unwrap();

        let graph = store.project(&b.flow.id).unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges[0].id, "e1");
        assert_eq!(graph.edges[0].data, json!({"animated": true}));
    }

    #[test]
    fn test_create_edges_is_atomic() {
        let (_dir, store) = create_test_store();
        let b = board(&store);
        let t1 = store.create_task(&b.todo.id, "A").unwrap();
        let t2 = store.create_task(&b.todo.id, "B").unwrap();

        let specs = vec![EdgeSpec::new(&t1.id, &t2.id), EdgeSpec::new(&t1.id, "ghost")];
        let err = store.create_edges(&b.flow.id, specs).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(store.list_edges(&b.flow.id).unwrap().is_empty());
    }

    #[test]
    fn test_delete_task_cleans_edges_and_closes_gap() {
        let (_dir, store) = create_test_store();
        let b = board(&store);
        let a = store.create_task(&b.todo.id, "A").unwrap();
        let mid = store.create_task(&b.todo.id, "Mid").unwrap();
        let c = store.create_task(&b.todo.id, "C").unwrap();
        store.create_edge(&b.flow.id, EdgeSpec::new(&a.id, &mid.id)).unwrap();
        store.create_edge(&b.flow.id, EdgeSpec::new(&mid.id, &c.id)).unwrap();
        store.create_edge(&b.flow.id, EdgeSpec::new(&a.id, &c.id).with_id("keep")).unwrap();

        let deletion = store.delete_task(&mid.id).unwrap();
        assert_eq!(deletion.edges_removed, 2);
        assert_eq!(deletion.task.id, mid.id);

        let edges = store.list_edges(&b.flow.id).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].id, "keep");
        assert_eq!(store.list_ordered(&b.todo.id).unwrap(), vec![a.id, c.id.clone()]);
        assert_eq!(store.get_task(&c.id).unwrap().unwrap().position, 1);
        assert!(store.check_ordering(&b.todo.id).unwrap().is_dense());

        let err = store.delete_task(&mid.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_move_and_audit() {
        let (_dir, store) = create_test_store();
        let b = board(&store);
        let x = store.create_task(&b.todo.id, "X").unwrap();

        let moved = store.move_task(&x.id, &b.todo.id, &b.done.id, None).unwrap();
        assert_eq!(moved.status_id, b.done.id);
        assert_eq!(moved.position, 0);

        let log = store.get_audit_log(Some(&x.id), None).unwrap();
        assert_eq!(log[0].operation, "move_task");
        assert_eq!(log[1].operation, "create_task");
    }

    #[test]
    fn test_batch_timeout_from_settings() {
        let dir = TempDir::new().unwrap();
        let settings = StoreSettings { batch_timeout: Some(Duration::ZERO), ..StoreSettings::default() };
        let store = SqliteFlowStore::with_settings(dir.path().join("t.db"), settings).unwrap();
        let b = board(&store);

        let ops = vec![BatchOp::DeleteEdges { flow_id: b.flow.id.clone(), edge_ids: vec![] }];
        let err = store.apply_batch(ops).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
