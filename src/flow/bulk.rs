//! JSON transport for flow operations.
//!
//! Every operation takes a JSON document and returns a serialisable output,
//! so callers (the CLI, a web handler) only shuttle strings. Failures are
//! rendered as an [`ErrorOutput`] carrying the error kind.
//!
//! # JSON Format for `create-edges`
//!
//! ```json
//! {
//!   "flow_id": "launch-1a2b",
//!   "edges": [
//!     {"source": "design-0001", "target": "build-0002"},
//!     {"id": "e7", "source": "build-0002", "target": "ship-0003",
//!      "type": "smoothstep", "data": {"label": "blocks"}}
//!   ]
//! }
//! ```
//!
//! `id`, `type` and `data` are optional; `source_id`/`target_id` are
//! accepted as aliases.
//!
//! # JSON Format for `reorder`
//!
//! ```json
//! {"status_id": "todo-0001", "task_ids": ["c-0003", "a-0001", "b-0002"]}
//! ```
//!
//! # JSON Format for `move`
//!
//! ```json
//! {"task_id": "x-0001", "from_status_id": "todo-0001",
//!  "to_status_id": "done-0002", "target_position": 1}
//! ```
//!
//! # JSON Format for `batch`
//!
//! ```json
//! {
//!   "timeout_ms": 2000,
//!   "ops": [
//!     {"op": "move-task", "task_id": "x", "from_status_id": "a", "to_status_id": "b"},
//!     {"op": "reorder", "status_id": "a", "task_ids": ["y", "z"]},
//!     {"op": "create-edge", "flow_id": "f", "edge": {"source": "y", "target": "x"}},
//!     {"op": "delete-edges", "flow_id": "f", "edge_ids": ["e1"]}
//!   ]
//! }
//! ```

use crate::config::EngineConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::flow::batch::{BatchOp, BatchOptions, BatchOutcome};
use crate::flow::models::{Dependency, EdgeSpec, TaskNode};
use crate::flow::ordering;
use crate::flow::store::{FlowStore, SqliteFlowStore};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Input format for creating edges.
#[derive(Debug, Deserialize)]
pub struct CreateEdgesInput {
    /// Flow receiving the edges.
    pub flow_id: String,
    /// Edges to create, all or nothing.
    pub edges: Vec<EdgeSpec>,
}

/// Output format for creating edges.
#[derive(Debug, Serialize)]
pub struct CreateEdgesOutput {
    /// Number of edges created.
    pub created: usize,
    /// The edges as stored.
    pub edges: Vec<Dependency>,
}

/// Output format for deleting edges.
#[derive(Debug, Serialize)]
pub struct DeleteEdgesOutput {
    /// Number of edges that existed and were removed.
    pub deleted: usize,
}

/// Input format for reordering a bucket.
#[derive(Debug, Deserialize)]
pub struct ReorderInput {
    /// Bucket to reorder.
    pub status_id: String,
    /// Every member of the bucket in the new order.
    pub task_ids: Vec<String>,
}

/// Output format for reordering a bucket.
#[derive(Debug, Serialize)]
pub struct ReorderOutput {
    /// Reordered bucket.
    pub status_id: String,
    /// Members with their new positions.
    pub tasks: Vec<TaskNode>,
}

/// Input format for moving a task.
#[derive(Debug, Deserialize)]
pub struct MoveInput {
    /// Task to move.
    pub task_id: String,
    /// Bucket the task is currently in.
    pub from_status_id: String,
    /// Destination bucket.
    pub to_status_id: String,
    /// Destination index, clamped to the bucket (negative means 0);
    /// appends when absent.
    #[serde(default)]
    pub target_position: Option<i64>,
}

/// Output format for moving a task.
#[derive(Debug, Serialize)]
pub struct MoveOutput {
    /// The task in its new place.
    pub task: TaskNode,
}

/// Input format for an atomic batch.
#[derive(Debug, Deserialize)]
pub struct BatchInput {
    /// Operations, applied in order.
    pub ops: Vec<BatchOp>,
    /// Deadline in milliseconds, overriding the configured one.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Output format for an atomic batch.
#[derive(Debug, Serialize)]
pub struct BatchOutput {
    /// Number of operations applied.
    pub applied: usize,
    /// Per-operation results, in input order.
    pub outcomes: Vec<BatchOutcome>,
}

/// Error rendering for JSON callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorOutput {
    /// Error classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl From<&Error> for ErrorOutput {
    fn from(err: &Error) -> Self {
        Self { kind: err.kind(), message: err.to_string() }
    }
}

/// Decode request JSON; a malformed request is the caller's fault.
fn parse<T: DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| Error::InvalidArgument(format!("malformed request: {e}")))
}

/// Parse JSON input and create edges atomically.
///
/// # Errors
///
/// Returns an error if the JSON is invalid or any edge is rejected.
pub fn create_edges_from_json(store: &dyn FlowStore, json: &str) -> Result<CreateEdgesOutput> {
    let input: CreateEdgesInput = parse(json)?;
    let edges = store.create_edges(&input.flow_id, input.edges)?;
    Ok(CreateEdgesOutput { created: edges.len(), edges })
}

/// Split a comma-separated id list, dropping blanks.
#[must_use]
pub fn parse_edge_ids(csv: &str) -> Vec<String> {
    csv.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
}

/// Delete the edges named in a comma-separated id list.
///
/// # Errors
///
/// Returns an error if the flow does not exist.
pub fn delete_edges_from_csv(
    store: &dyn FlowStore,
    flow_id: &str,
    csv: &str,
) -> Result<DeleteEdgesOutput> {
    let deleted = store.delete_edges(flow_id, &parse_edge_ids(csv))?;
    Ok(DeleteEdgesOutput { deleted })
}

/// Parse JSON input and reorder a bucket.
///
/// # Errors
///
/// Returns an error if the JSON is invalid or the order is rejected.
pub fn reorder_from_json(store: &dyn FlowStore, json: &str) -> Result<ReorderOutput> {
    let input: ReorderInput = parse(json)?;
    let tasks = store.reorder(&input.status_id, &input.task_ids)?;
    Ok(ReorderOutput { status_id: input.status_id, tasks })
}

/// Parse JSON input and move a task.
///
/// # Errors
///
/// Returns an error if the JSON is invalid or the move is rejected.
pub fn move_from_json(store: &dyn FlowStore, json: &str) -> Result<MoveOutput> {
    let input: MoveInput = parse(json)?;
    let task = store.move_task(
        &input.task_id,
        &input.from_status_id,
        &input.to_status_id,
        input.target_position.map(ordering::target_index),
    )?;
    Ok(MoveOutput { task })
}

/// Parse JSON input and apply it as one atomic batch.
///
/// # Errors
///
/// Returns an error if the JSON is invalid or the batch rolls back.
pub fn batch_from_json(store: &dyn FlowStore, json: &str) -> Result<BatchOutput> {
    let input: BatchInput = parse(json)?;
    let outcomes = match input.timeout_ms {
        Some(ms) => {
            let options = BatchOptions::default().with_timeout(Duration::from_millis(ms));
            store.apply_batch_with(input.ops, &options)?
        }
        None => store.apply_batch(input.ops)?,
    };
    Ok(BatchOutput { applied: outcomes.len(), outcomes })
}

/// Render a flow's projection as pretty JSON.
///
/// # Errors
///
/// Returns an error if the flow does not exist.
pub fn project_to_json(store: &dyn FlowStore, flow_id: &str) -> Result<String> {
    Ok(serde_json::to_string_pretty(&store.project(flow_id)?)?)
}

/// Open the default flow store.
///
/// `TASKFLOW_DB_PATH` wins if set; otherwise the database path and tunables
/// come from `.taskflow/config.yaml` in the current directory, falling back
/// to the per-project file under the user data directory.
///
/// # Errors
///
/// Returns an error if the configuration is malformed or the database
/// cannot be opened.
pub fn open_default_store() -> Result<SqliteFlowStore> {
    let cwd = env::current_dir()?;
    let config = EngineConfig::load_from(&cwd)?.unwrap_or_default();
    let db_path = env::var("TASKFLOW_DB_PATH")
        .map_or_else(|_| config.resolve_database_path(&cwd), PathBuf::from);
    SqliteFlowStore::with_settings(db_path, config.store_settings())
}
