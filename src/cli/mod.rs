//! Hierarchical CLI for taskflow.
//!
//! Two-level commands for the catalogue, flow edges, and bucket ordering,
//! plus atomic batches and graph projection. Results are printed as JSON on
//! stdout; failures as `{"kind": ..., "message": ...}` on stderr.

mod catalog;
mod edges;
mod order;
mod run;


pub use catalog::CatalogCommand;
pub use edges::EdgesCommand;
pub use order::OrderCommand;
pub use run::{run, run_with_store, CliOutput};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Taskflow CLI - dependency graphs and Kanban ordering for tasks.
///
/// For detailed help on any command group, use:
///   taskflow <command> --help
#[derive(Parser, Debug)]
#[command(name = "taskflow")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Database file. Defaults to `TASKFLOW_DB_PATH`, then the configured
    /// or per-project location.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// User id to act as.
    #[arg(long, global = true, default_value = "local")]
    pub actor: String,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Projects, flows, status buckets and tasks.
    #[command(subcommand)]
    Catalog(CatalogCommand),

    /// Dependency edges of a flow.
    #[command(subcommand)]
    Edges(EdgesCommand),

    /// Task ordering within status buckets.
    #[command(subcommand)]
    Order(OrderCommand),

    /// Apply an atomic batch (stdin: batch JSON).
    ///
    /// Operations run in order; if any fails, none are applied.
    Batch,

    /// Print a flow's nodes and edges.
    Graph {
        /// Flow ID
        flow_id: String,
    },

    /// Get the audit log of committed mutations.
    #[command(name = "audit-log")]
    AuditLog {
        /// Filter by edge, task, flow or status ID
        #[arg(long)]
        subject: Option<String>,

        /// Maximum number of entries to return
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show version information.
    Version,
}

impl Command {
    /// Returns true if this command requires stdin input.
    #[must_use]
    pub const fn needs_stdin(&self) -> bool {
        matches!(self, Self::Batch | Self::Edges(EdgesCommand::Import))
    }

    /// Returns true if this command needs a store.
    #[must_use]
    pub const fn needs_store(&self) -> bool {
        !matches!(self, Self::Version)
    }
}
