//! Model types for the flow graph and ordering engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default edge type tag.
pub const DEFAULT_EDGE_TYPE: &str = "default";

/// A project: the scope owning flows, statuses and tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// RFC 3339 timestamp when the project was created.
    pub created_at: String,
}

/// A flow graph scope. Edges belong to exactly one flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    /// Unique identifier.
    pub id: String,
    /// Project whose tasks are the nodes of this flow.
    pub project_id: String,
    /// Display name.
    pub name: String,
    /// RFC 3339 timestamp when the flow was created.
    pub created_at: String,
}

/// A status bucket (Kanban column).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBucket {
    /// Unique identifier.
    pub id: String,
    /// Owning project.
    pub project_id: String,
    /// Column title.
    pub name: String,
    /// Column index on the board (columns are appended in creation order).
    pub position: i64,
}

/// A task node.
///
/// `position` is meaningful only relative to other tasks sharing `status_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNode {
    /// Unique identifier.
    pub id: String,
    /// Owning project (and therefore flow scope).
    pub project_id: String,
    /// Current status bucket.
    pub status_id: String,
    /// Title.
    pub title: String,
    /// Zero-based index within the status bucket.
    pub position: i64,
    /// RFC 3339 timestamp when the task was created.
    pub created_at: String,
}

/// A dependency edge between two task nodes of one flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    /// Identifier, unique within `flow_id`.
    pub id: String,
    /// Flow this edge belongs to.
    pub flow_id: String,
    /// Source task id.
    pub source_id: String,
    /// Target task id.
    pub target_id: String,
    /// Edge semantics tag.
    #[serde(rename = "type")]
    pub edge_type: String,
    /// Presentation metadata, stored verbatim.
    pub data: Value,
}

/// Request to create one edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    /// Caller-chosen id; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Source task id.
    #[serde(alias = "source_id")]
    pub source: String,
    /// Target task id.
    #[serde(alias = "target_id")]
    pub target: String,
    /// Edge type; defaults to [`DEFAULT_EDGE_TYPE`].
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
    /// Opaque payload; defaults to an empty object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl EdgeSpec {
    /// An edge from `source` to `target` with every optional field defaulted.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self { id: None, source: source.into(), target: target.into(), edge_type: None, data: None }
    }

    /// Set the caller-chosen id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the edge type.
    #[must_use]
    pub fn with_type(mut self, edge_type: impl Into<String>) -> Self {
        self.edge_type = Some(edge_type.into());
        self
    }

    /// Set the payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Normalise an optional payload: absent or `null` becomes `{}`.
pub fn payload_or_empty(data: Option<Value>) -> Value {
    match data {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(v) => v,
    }
}

/// The externally consumed graph view of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    /// The flow being projected.
    pub flow_id: String,
    /// Every task of the flow's project.
    pub nodes: Vec<TaskNode>,
    /// Every edge of the flow, in insertion order.
    pub edges: Vec<Dependency>,
}

/// Result of deleting a task node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDeletion {
    /// The task as it was just before deletion.
    pub task: TaskNode,
    /// Number of edges removed because the task was an endpoint.
    pub edges_removed: usize,
}

/// Outcome of an ordering integrity check on one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingReport {
    /// Bucket that was checked.
    pub status_id: String,
    /// Number of member tasks.
    pub members: usize,
    /// Positions missing from `0..members`.
    pub gaps: Vec<i64>,
    /// Positions held by more than one task.
    pub duplicates: Vec<i64>,
}

impl OrderingReport {
    /// Whether the bucket holds exactly the positions `0..members`.
    #[must_use]
    pub fn is_dense(&self) -> bool {
        self.gaps.is_empty() && self.duplicates.is_empty()
    }
}

/// An entry in the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique identifier for the entry.
    pub id: i64,
    /// RFC 3339 timestamp when the operation committed.
    pub timestamp: String,
    /// Type of operation (e.g. "create_edge", "reorder").
    pub operation: String,
    /// Flow touched by the operation, if any.
    pub flow_id: Option<String>,
    /// Status bucket touched by the operation, if any.
    pub status_id: Option<String>,
    /// Primary subject (edge or task id), if any.
    pub subject_id: Option<String>,
    /// Additional details about the operation.
    pub details: Option<String>,
}
