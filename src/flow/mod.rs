//! Flow graph and ordering engine.
//!
//! This module provides:
//! - Dependency edges between tasks, scoped to a flow, with opaque payloads
//! - Dense per-status ordering of tasks (Kanban columns)
//! - Atomic batches mixing edge and ordering mutations
//! - A read-only projection of a flow's nodes and edges
//! - Audit logging for all mutations
//!
//! # Example
//!
//! ```no_run
//! use taskflow::flow::{EdgeSpec, FlowStore, SqliteFlowStore};
//!
//! let store = SqliteFlowStore::new("/tmp/taskflow.db").unwrap();
//! let project = store.create_project("Website").unwrap();
//! let flow = store.create_flow(&project.id, "Launch").unwrap();
//! let todo = store.create_status(&project.id, "To Do").unwrap();
//! let done = store.create_status(&project.id, "Done").unwrap();
//!
//! let design = store.create_task(&todo.id, "Design").unwrap();
//! let build = store.create_task(&todo.id, "Build").unwrap();
//! store.create_edge(&flow.id, EdgeSpec::new(&design.id, &build.id)).unwrap();
//!
//! // Drag "Build" into the first slot of "Done"
//! store.move_task(&build.id, &todo.id, &done.id, Some(0)).unwrap();
//!
//! let graph = store.project(&flow.id).unwrap();
//! assert_eq!(graph.edges.len(), 1);
//! ```

pub mod audit;
pub mod batch;
pub mod bulk;
pub mod catalog;
pub mod graph;
pub mod id;
pub mod locks;
pub mod models;
pub mod ordering;
pub mod projection;
pub mod schema;
pub mod store;

pub use batch::{BatchOp, BatchOptions, BatchOutcome, CancelToken};
pub use locks::{ScopeGuard, ScopeKey, ScopeLocks};
pub use models::{
    AuditEntry, Dependency, EdgeSpec, Flow, FlowGraph, OrderingReport, Project, StatusBucket,
    TaskDeletion, TaskNode, DEFAULT_EDGE_TYPE,
};
pub use ordering::Bucket;
pub use store::{FlowStore, SqliteFlowStore, StoreSettings};
